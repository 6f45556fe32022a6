use crate::error::{VoxelResult, VoxelizeError};
use crate::voxel_grid::mesh::{Bounds, Mesh};

/// Default blank margin, as a fraction of each bound's own magnitude.
pub const DEFAULT_MARGIN: f64 = 0.1;

/// Isotropic voxel grid geometry (no voxel storage)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
	pub len_i: usize,  // Number of voxels along X (scan axis)
	pub len_j: usize,  // Number of voxels along Y
	pub len_k: usize,  // Number of voxels along Z
	pub spacing: f64,  // Voxel edge length in mm
	pub origin: [f64; 3],  // Center of voxel (0, 0, 0)
}

impl Grid {
	/// Explicit grid. Validates spacing, dimensions and total size.
	pub fn new(origin: [f64; 3], spacing: f64, dims: [usize; 3]) -> VoxelResult<Self> {
		check_voxel_size(spacing)?;
		if dims.contains(&0) {
			return Err(VoxelizeError::DegenerateMesh(format!(
				"grid dimensions {:?} must be at least 1 on every axis",
				dims
			)));
		}
		if origin.iter().any(|c| !c.is_finite()) {
			return Err(VoxelizeError::DegenerateMesh(format!(
				"grid origin {:?} is not finite",
				origin
			)));
		}
		let grid = Self {
			len_i: dims[0],
			len_j: dims[1],
			len_k: dims[2],
			spacing,
			origin,
		};
		grid.checked_voxel_count()?;
		Ok(grid)
	}

	/// Derive a grid covering `bounds` plus the magnitude-relative margin.
	///
	/// Each bound moves outward by `|bound| * margin`, so a bound sitting at 0
	/// receives no margin at all. Meshes near the origin are therefore
	/// under-margined; downstream tools rely on this layout, so it stays.
	pub fn from_bounds(bounds: &Bounds, voxel_size: f64, margin: f64) -> VoxelResult<Self> {
		check_voxel_size(voxel_size)?;
		let extent = bounds.extent();
		if extent.iter().any(|&e| !(e > 0.0)) {
			return Err(VoxelizeError::DegenerateMesh(format!(
				"bounding box {:?} .. {:?} has zero extent",
				bounds.min, bounds.max
			)));
		}

		let mut dims = [1usize; 3];
		let mut origin = [0.0; 3];
		for axis in 0..3 {
			let lo = bounds.min[axis] - (bounds.min[axis] * margin).abs();
			let hi = bounds.max[axis] + (bounds.max[axis] * margin).abs();
			dims[axis] = calculate_dimension(lo, hi, voxel_size)?;
			origin[axis] = lo + voxel_size / 2.0;
		}
		Self::new(origin, voxel_size, dims)
	}

	/// GridBuilder entry point: checks the mesh, then sizes the grid from its bounds.
	pub fn for_mesh(mesh: &Mesh, voxel_size: f64, margin: f64) -> VoxelResult<Self> {
		check_voxel_size(voxel_size)?;
		let bounds = mesh
			.bounds()
			.ok_or_else(|| VoxelizeError::DegenerateMesh("mesh has no triangles".to_string()))?;
		Self::from_bounds(&bounds, voxel_size, margin)
	}

	pub fn dims(&self) -> [usize; 3] {
		[self.len_i, self.len_j, self.len_k]
	}

	/// Total number of voxels IxJxK
	pub fn voxel_count(&self) -> usize {
		self.len_i * self.len_j * self.len_k
	}

	/// Number of rows along the scan axis (one per (j, k) pair)
	pub fn row_count(&self) -> usize {
		self.len_j * self.len_k
	}

	/// World coordinate of voxel center `index` along `axis`
	#[inline]
	pub fn center(&self, axis: usize, index: usize) -> f64 {
		self.origin[axis] + index as f64 * self.spacing
	}

	/// Continuous voxel coordinate of a world position along `axis`
	#[inline]
	pub fn to_voxel(&self, axis: usize, world: f64) -> f64 {
		(world - self.origin[axis]) / self.spacing
	}

	/// Row id of the line of voxels at (j, k)
	#[inline]
	pub fn row_id(&self, j: usize, k: usize) -> usize {
		j + k * self.len_j
	}

	/// Inverse of [`Grid::row_id`]
	#[inline]
	pub fn row_jk(&self, row: usize) -> (usize, usize) {
		(row % self.len_j, row / self.len_j)
	}

	fn checked_voxel_count(&self) -> VoxelResult<usize> {
		self.len_i
			.checked_mul(self.len_j)
			.and_then(|n| n.checked_mul(self.len_k))
			.filter(|&n| n <= isize::MAX as usize)
			.ok_or(VoxelizeError::GridTooLarge {
				len_i: self.len_i,
				len_j: self.len_j,
				len_k: self.len_k,
			})
	}
}

fn check_voxel_size(voxel_size: f64) -> VoxelResult<()> {
	if voxel_size.is_finite() && voxel_size > 0.0 {
		Ok(())
	} else {
		Err(VoxelizeError::InvalidVoxelSize(voxel_size))
	}
}

fn calculate_dimension(lo: f64, hi: f64, voxel_size: f64) -> VoxelResult<usize> {
	let span = ((hi - lo) / voxel_size).ceil();
	if !span.is_finite() || span >= usize::MAX as f64 {
		return Err(VoxelizeError::GridTooLarge {
			len_i: usize::MAX,
			len_j: usize::MAX,
			len_k: usize::MAX,
		});
	}
	Ok((span as usize).max(1))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn bounds(min: [f64; 3], max: [f64; 3]) -> Bounds {
		Bounds { min, max }
	}

	#[test]
	fn margin_scales_with_bound_magnitude() {
		let grid = Grid::from_bounds(&bounds([-10.0, 5.0, 0.0], [10.0, 15.0, 20.0]), 1.0, DEFAULT_MARGIN).unwrap();
		// x: -11 .. 11, y: 4.5 .. 16.5, z: 0 .. 22
		assert_eq!(grid.dims(), [22, 12, 22]);
		assert!((grid.origin[0] - -10.5).abs() < 1e-12);
		assert!((grid.origin[1] - 5.0).abs() < 1e-12);
		assert!((grid.origin[2] - 0.5).abs() < 1e-12);
	}

	#[test]
	fn zero_bound_gets_no_margin() {
		let grid = Grid::from_bounds(&bounds([0.0; 3], [10.0; 3]), 1.0, DEFAULT_MARGIN).unwrap();
		assert_eq!(grid.dims(), [11, 11, 11]);
		assert_eq!(grid.origin, [0.5; 3]);
	}

	#[test]
	fn coarse_voxels_keep_one_cell() {
		let grid = Grid::from_bounds(&bounds([0.0; 3], [1.0, 1.0, 50.0]), 10.0, DEFAULT_MARGIN).unwrap();
		assert_eq!(grid.dims(), [1, 1, 6]);
	}

	#[test]
	fn rejects_non_positive_voxel_size() {
		let b = bounds([0.0; 3], [1.0; 3]);
		for s in [0.0, -1.0, f64::NAN, f64::INFINITY] {
			assert!(matches!(
				Grid::from_bounds(&b, s, DEFAULT_MARGIN),
				Err(VoxelizeError::InvalidVoxelSize(_))
			));
		}
	}

	#[test]
	fn rejects_flat_bounds() {
		let err = Grid::from_bounds(&bounds([0.0; 3], [1.0, 1.0, 0.0]), 0.5, DEFAULT_MARGIN).unwrap_err();
		assert!(matches!(err, VoxelizeError::DegenerateMesh(_)));
	}

	#[test]
	fn rejects_empty_mesh() {
		let mesh = Mesh::new(vec![], vec![]).unwrap();
		assert!(matches!(Grid::for_mesh(&mesh, 1.0, DEFAULT_MARGIN), Err(VoxelizeError::DegenerateMesh(_))));
	}

	#[test]
	fn huge_grid_is_reported() {
		let err = Grid::new([0.0; 3], 1.0, [usize::MAX / 2, 4, 4]).unwrap_err();
		assert!(matches!(err, VoxelizeError::GridTooLarge { .. }));
	}

	#[test]
	fn row_ids_round_trip() {
		let grid = Grid::new([0.0; 3], 1.0, [3, 4, 5]).unwrap();
		assert_eq!(grid.row_count(), 20);
		assert_eq!(grid.row_jk(grid.row_id(3, 2)), (3, 2));
	}
}
