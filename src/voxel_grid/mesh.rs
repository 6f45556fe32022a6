use std::collections::HashMap;
use std::f64::consts::PI;

use crate::error::{VoxelResult, VoxelizeError};

/// Axis-aligned bounding box in world units (mm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
	pub min: [f64; 3],
	pub max: [f64; 3],
}

impl Bounds {
	/// Extent per axis (`max - min`)
	pub fn extent(&self) -> [f64; 3] {
		[
			self.max[0] - self.min[0],
			self.max[1] - self.min[1],
			self.max[2] - self.min[2],
		]
	}
}

/// Closed triangulated surface, read-only for the voxelizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
	vertices: Vec<[f64; 3]>,
	triangles: Vec<[usize; 3]>,
}

impl Mesh {
	/// Build a mesh from indexed triangles. Every index must refer to an existing vertex.
	pub fn new(vertices: Vec<[f64; 3]>, triangles: Vec<[usize; 3]>) -> VoxelResult<Self> {
		for (t, tri) in triangles.iter().enumerate() {
			if let Some(&bad) = tri.iter().find(|&&v| v >= vertices.len()) {
				return Err(VoxelizeError::DegenerateMesh(format!(
					"triangle {} references vertex {} but the mesh has {} vertices",
					t,
					bad,
					vertices.len()
				)));
			}
		}
		if let Some(v) = vertices.iter().position(|p| p.iter().any(|c| !c.is_finite())) {
			return Err(VoxelizeError::DegenerateMesh(format!(
				"vertex {} has a non-finite coordinate",
				v
			)));
		}
		Ok(Self { vertices, triangles })
	}

	/// Build a mesh from unindexed triangles, welding bit-identical positions.
	pub fn from_triangle_soup(soup: &[[[f64; 3]; 3]]) -> VoxelResult<Self> {
		let mut lookup: HashMap<[u64; 3], usize> = HashMap::with_capacity(soup.len() * 3 / 2);
		let mut vertices: Vec<[f64; 3]> = Vec::with_capacity(soup.len() / 2 + 3);
		let mut triangles = Vec::with_capacity(soup.len());

		for corners in soup {
			let mut tri = [0usize; 3];
			for (slot, p) in tri.iter_mut().zip(corners.iter()) {
				// -0.0 and 0.0 must weld together
				let key = p.map(|c| if c == 0.0 { 0u64 } else { c.to_bits() });
				*slot = *lookup.entry(key).or_insert_with(|| {
					vertices.push(*p);
					vertices.len() - 1
				});
			}
			triangles.push(tri);
		}
		Self::new(vertices, triangles)
	}

	pub fn vertices(&self) -> &[[f64; 3]] {
		&self.vertices
	}

	pub fn triangles(&self) -> &[[usize; 3]] {
		&self.triangles
	}

	pub fn vertex_count(&self) -> usize {
		self.vertices.len()
	}

	pub fn triangle_count(&self) -> usize {
		self.triangles.len()
	}

	/// Corner positions of triangle `t`
	#[inline]
	pub fn corners(&self, t: usize) -> [[f64; 3]; 3] {
		let [a, b, c] = self.triangles[t];
		[self.vertices[a], self.vertices[b], self.vertices[c]]
	}

	/// Bounding box of the vertices referenced by triangles, `None` for an empty mesh.
	pub fn bounds(&self) -> Option<Bounds> {
		let mut min = [f64::MAX; 3];
		let mut max = [f64::MIN; 3];
		let mut seen = false;
		for tri in &self.triangles {
			for &v in tri {
				let p = self.vertices[v];
				for axis in 0..3 {
					min[axis] = min[axis].min(p[axis]);
					max[axis] = max[axis].max(p[axis]);
				}
				seen = true;
			}
		}
		seen.then_some(Bounds { min, max })
	}

	/// Signed enclosed volume (divergence theorem). Negative for inward-facing surfaces.
	pub fn signed_volume(&self) -> f64 {
		let mut sum = 0.0;
		for t in 0..self.triangles.len() {
			let [a, b, c] = self.corners(t);
			let cross = [
				b[1] * c[2] - b[2] * c[1],
				b[2] * c[0] - b[0] * c[2],
				b[0] * c[1] - b[1] * c[0],
			];
			sum += a[0] * cross[0] + a[1] * cross[1] + a[2] * cross[2];
		}
		sum / 6.0
	}

	/// Count edges not shared by exactly two triangles. Zero for a watertight surface.
	pub fn open_edge_count(&self) -> usize {
		let mut edges: HashMap<(usize, usize), usize> = HashMap::with_capacity(self.triangles.len() * 3 / 2);
		for tri in &self.triangles {
			for e in 0..3 {
				let a = tri[e];
				let b = tri[(e + 1) % 3];
				*edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
			}
		}
		edges.values().filter(|&&n| n != 2).count()
	}

	/// Copy of the mesh shifted by `offset`
	pub fn translated(&self, offset: [f64; 3]) -> Self {
		let vertices = self
			.vertices
			.iter()
			.map(|p| [p[0] + offset[0], p[1] + offset[1], p[2] + offset[2]])
			.collect();
		Self {
			vertices,
			triangles: self.triangles.clone(),
		}
	}

	/// Axis-aligned box with outward-facing triangles.
	pub fn cuboid(min: [f64; 3], max: [f64; 3]) -> Self {
		// vertex n has x from bit 0, y from bit 1, z from bit 2
		let vertices = (0..8)
			.map(|n| {
				[
					if n & 1 == 0 { min[0] } else { max[0] },
					if n & 2 == 0 { min[1] } else { max[1] },
					if n & 4 == 0 { min[2] } else { max[2] },
				]
			})
			.collect();
		let triangles = vec![
			[0, 2, 3], [0, 3, 1], // z = min
			[4, 5, 7], [4, 7, 6], // z = max
			[0, 1, 5], [0, 5, 4], // y = min
			[2, 6, 7], [2, 7, 3], // y = max
			[0, 4, 6], [0, 6, 2], // x = min
			[1, 3, 7], [1, 7, 5], // x = max
		];
		Self { vertices, triangles }
	}

	/// Latitude/longitude tessellated sphere with outward-facing triangles.
	pub fn uv_sphere(center: [f64; 3], radius: f64, stacks: usize, slices: usize) -> Self {
		let stacks = stacks.max(2);
		let slices = slices.max(3);
		let mut vertices = Vec::with_capacity((stacks - 1) * slices + 2);
		vertices.push([center[0], center[1], center[2] + radius]);
		for i in 1..stacks {
			let theta = PI * i as f64 / stacks as f64;
			for j in 0..slices {
				let phi = 2.0 * PI * j as f64 / slices as f64;
				vertices.push([
					center[0] + radius * theta.sin() * phi.cos(),
					center[1] + radius * theta.sin() * phi.sin(),
					center[2] + radius * theta.cos(),
				]);
			}
		}
		let south = vertices.len();
		vertices.push([center[0], center[1], center[2] - radius]);

		let ring = |i: usize, j: usize| 1 + (i - 1) * slices + (j % slices);
		let mut triangles = Vec::with_capacity(2 * slices * (stacks - 1));
		for j in 0..slices {
			triangles.push([0, ring(1, j), ring(1, j + 1)]);
		}
		for i in 1..stacks - 1 {
			for j in 0..slices {
				triangles.push([ring(i, j), ring(i + 1, j), ring(i + 1, j + 1)]);
				triangles.push([ring(i, j), ring(i + 1, j + 1), ring(i, j + 1)]);
			}
		}
		for j in 0..slices {
			triangles.push([south, ring(stacks - 1, j + 1), ring(stacks - 1, j)]);
		}
		Self { vertices, triangles }
	}
}
