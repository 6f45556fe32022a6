//! Scan conversion of a closed triangle mesh into per-row inside intervals.
//!
//! Rows run along X. Every row is the line through voxel centers at a fixed
//! (y, z); each triangle it pierces contributes one crossing, and the even-odd
//! rule turns the sorted crossings into voxel intervals.
//!
//! Point-in-triangle tests happen in the Y-Z projection with exact orientation
//! predicates. When the row point lies exactly on a projected edge or vertex the
//! tie is broken as if the point were moved by (eps, eps^2), which assigns every
//! shared edge and vertex to exactly one triangle on each side of the surface.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use indicatif::{ProgressBar, ProgressStyle};
use robust::{orient2d, Coord};

use crate::voxel_grid::grid::Grid;
use crate::voxel_grid::mesh::Mesh;

/// Rows a worker takes from the task list per pull
const ROW_BATCH: usize = 64;

/// Crossings closer than this (in voxels) count as one position.
pub const DEFAULT_MERGE_TOLERANCE: f64 = 1e-6;

/// Which way the surface is crossed when walking along +X.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
	Entering,
	Exiting,
}

impl Direction {
	#[inline]
	fn sign(self) -> i64 {
		match self {
			Direction::Entering => 1,
			Direction::Exiting => -1,
		}
	}
}

/// Surface crossing at world coordinate `x` along a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
	pub x: f64,
	pub direction: Direction,
}

/// Inclusive range of voxel indices along a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
	pub start: usize,
	pub end: usize,
}

impl Interval {
	/// Number of voxels covered, never zero
	#[allow(clippy::len_without_is_empty)]
	pub fn len(&self) -> usize {
		self.end - self.start + 1
	}
}

/// Classification of one scanned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
	/// No crossings, entirely background
	Outside,
	/// Even crossing count with balanced directions
	Closed,
	/// Even count but entering and exiting crossings do not cancel
	Unbalanced,
	/// Odd count, left as background
	OddCrossings,
}

/// Result of scanning a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowScan {
	pub intervals: Vec<Interval>,
	pub status: RowStatus,
	pub tangent_clusters: usize,
	pub merged_crossings: usize,
}

/// Counters collected over all rows of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
	pub rows: usize,
	pub rows_hit: usize,
	pub odd_rows: usize,
	pub unbalanced_rows: usize,
	pub tangent_clusters: usize,
	pub merged_crossings: usize,
}

impl ScanReport {
	/// True when no row had to be degraded.
	pub fn is_closed(&self) -> bool {
		self.odd_rows == 0
	}

	fn absorb(&mut self, scan: &RowScan) {
		match scan.status {
			RowStatus::Outside => {}
			RowStatus::Closed => self.rows_hit += 1,
			RowStatus::Unbalanced => {
				self.rows_hit += 1;
				self.unbalanced_rows += 1;
			}
			RowStatus::OddCrossings => {
				self.rows_hit += 1;
				self.odd_rows += 1;
			}
		}
		self.tangent_clusters += scan.tangent_clusters;
		self.merged_crossings += scan.merged_crossings;
	}
}

/// Per-row interval table for a whole grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Stencil {
	pub grid: Grid,
	pub rows: Vec<Vec<Interval>>,
	pub report: ScanReport,
}

impl Stencil {
	/// Intervals of the row at (j, k)
	pub fn row(&self, j: usize, k: usize) -> &[Interval] {
		&self.rows[self.grid.row_id(j, k)]
	}
}

/// Tuning knobs of the scan converter.
#[derive(Debug, Clone)]
pub struct ScanOptions {
	/// Worker threads, 0 picks one per available core
	pub threads: usize,
	/// Show a progress bar on stderr
	pub progress: bool,
	/// Crossing merge distance in voxels
	pub merge_tolerance: f64,
}

impl Default for ScanOptions {
	fn default() -> Self {
		Self {
			threads: 0,
			progress: false,
			merge_tolerance: DEFAULT_MERGE_TOLERANCE,
		}
	}
}

/// Triangle prepared for row tests
#[derive(Debug, Clone)]
struct Facet {
	// (y, z) of the corners
	yz: [[f64; 2]; 3],
	x: [f64; 3],
	x_min: f64,
	x_max: f64,
	// projected winding is counter-clockwise, normal has +X component
	exiting: bool,
}

impl Facet {
	fn project(corners: [[f64; 3]; 3]) -> Option<Self> {
		let yz = corners.map(|p| [p[1], p[2]]);
		let area = orient2d(coord(yz[0]), coord(yz[1]), coord(yz[2]));
		if area == 0.0 {
			// parallel to the scan axis, the neighbours carry the crossing
			return None;
		}
		let x = corners.map(|p| p[0]);
		Some(Self {
			yz,
			x,
			x_min: x[0].min(x[1]).min(x[2]),
			x_max: x[0].max(x[1]).max(x[2]),
			exiting: area > 0.0,
		})
	}

	fn y_range(&self) -> (f64, f64) {
		let ys = self.yz.map(|p| p[0]);
		(ys[0].min(ys[1]).min(ys[2]), ys[0].max(ys[1]).max(ys[2]))
	}

	fn z_range(&self) -> (f64, f64) {
		let zs = self.yz.map(|p| p[1]);
		(zs[0].min(zs[1]).min(zs[2]), zs[0].max(zs[1]).max(zs[2]))
	}

	/// Crossing of the row line through `p = (y, z)`, if the perturbed point lies inside.
	fn pierce(&self, p: [f64; 2]) -> Option<Crossing> {
		let [a, b, c] = self.yz;
		let wa = orient2d(coord(b), coord(c), coord(p));
		let wb = orient2d(coord(c), coord(a), coord(p));
		let wc = orient2d(coord(a), coord(b), coord(p));
		let sa = edge_side(wa, b, c);
		if sa != edge_side(wb, c, a) || sa != edge_side(wc, a, b) {
			return None;
		}

		let sum = wa + wb + wc;
		let x = if sum != 0.0 {
			(wa * self.x[0] + wb * self.x[1] + wc * self.x[2]) / sum
		} else {
			(self.x[0] + self.x[1] + self.x[2]) / 3.0
		};
		Some(Crossing {
			x: x.clamp(self.x_min, self.x_max),
			direction: if self.exiting {
				Direction::Exiting
			} else {
				Direction::Entering
			},
		})
	}
}

#[inline]
fn coord(p: [f64; 2]) -> Coord<f64> {
	Coord { x: p[0], y: p[1] }
}

/// Side of `p` relative to the directed edge `a -> b`, given `det = orient2d(a, b, p)`.
///
/// A zero determinant is resolved with the point nudged to `p + (eps, eps^2)`.
/// Swapping `a` and `b` always flips the answer, so two triangles sharing the
/// edge never both claim the point.
#[inline]
fn edge_side(det: f64, a: [f64; 2], b: [f64; 2]) -> bool {
	if det != 0.0 {
		return det > 0.0;
	}
	let dz = b[1] - a[1];
	if dz != 0.0 { dz < 0.0 } else { b[0] > a[0] }
}

/// Compressed row storage of candidate facets per row.
struct RowIndex {
	starts: Vec<usize>,
	facets: Vec<usize>,
}

impl RowIndex {
	fn build(facets: &[Facet], grid: &Grid) -> Self {
		let spans: Vec<Option<(RangeInclusive<usize>, RangeInclusive<usize>)>> = facets
			.iter()
			.map(|f| {
				let (y0, y1) = f.y_range();
				let (z0, z1) = f.z_range();
				Some((
					index_span(grid, 1, y0, y1, grid.len_j)?,
					index_span(grid, 2, z0, z1, grid.len_k)?,
				))
			})
			.collect();

		let mut starts = vec![0usize; grid.row_count() + 1];
		for (js, ks) in spans.iter().flatten() {
			for k in ks.clone() {
				for j in js.clone() {
					starts[grid.row_id(j, k) + 1] += 1;
				}
			}
		}
		for row in 0..grid.row_count() {
			starts[row + 1] += starts[row];
		}

		let mut cursor = starts.clone();
		let mut entries = vec![0usize; starts[grid.row_count()]];
		for (f, span) in spans.iter().enumerate() {
			if let Some((js, ks)) = span {
				for k in ks.clone() {
					for j in js.clone() {
						let row = grid.row_id(j, k);
						entries[cursor[row]] = f;
						cursor[row] += 1;
					}
				}
			}
		}

		Self {
			starts,
			facets: entries,
		}
	}

	#[inline]
	fn candidates(&self, row: usize) -> &[usize] {
		&self.facets[self.starts[row]..self.starts[row + 1]]
	}
}

/// Rows along `axis` whose centers may fall inside [lo, hi], padded by one row per side.
fn index_span(grid: &Grid, axis: usize, lo: f64, hi: f64, len: usize) -> Option<RangeInclusive<usize>> {
	let first = grid.to_voxel(axis, lo).floor() - 1.0;
	let last = grid.to_voxel(axis, hi).ceil() + 1.0;
	let max = (len - 1) as f64;
	if last < 0.0 || first > max {
		return None;
	}
	Some(first.max(0.0) as usize..=last.min(max) as usize)
}

/// Voxels along X whose centers lie in [x0, x1]
fn voxel_span(grid: &Grid, x0: f64, x1: f64) -> Option<Interval> {
	let first = grid.to_voxel(0, x0).ceil();
	let last = grid.to_voxel(0, x1).floor();
	let max = (grid.len_i - 1) as f64;
	if last < 0.0 || first > max || first > last {
		return None;
	}
	Some(Interval {
		start: first.max(0.0) as usize,
		end: last.min(max) as usize,
	})
}

/// Sort crossings and collapse clusters closer than `tolerance`.
///
/// A cluster whose directions cancel is a tangential touch and vanishes;
/// any other cluster becomes one crossing at its mean position.
/// Returns (tangent clusters dropped, crossings merged away).
fn collapse_crossings(crossings: &mut Vec<Crossing>, tolerance: f64) -> (usize, usize) {
	crossings.sort_by(|l, r| l.x.total_cmp(&r.x).then(l.direction.cmp(&r.direction)));

	let mut tangents = 0;
	let mut merged = 0;
	let mut write = 0;
	let mut read = 0;
	while read < crossings.len() {
		let start = crossings[read].x;
		let mut end = read + 1;
		while end < crossings.len() && crossings[end].x - start <= tolerance {
			end += 1;
		}

		let cluster = &crossings[read..end];
		let net: i64 = cluster.iter().map(|c| c.direction.sign()).sum();
		if net == 0 {
			tangents += 1;
		} else {
			merged += cluster.len() - 1;
			let x = cluster.iter().map(|c| c.x).sum::<f64>() / cluster.len() as f64;
			crossings[write] = Crossing {
				x,
				direction: if net > 0 {
					Direction::Entering
				} else {
					Direction::Exiting
				},
			};
			write += 1;
		}
		read = end;
	}
	crossings.truncate(write);
	(tangents, merged)
}

/// Read-only state shared by the scan workers
struct ScanContext<'a> {
	grid: &'a Grid,
	facets: &'a [Facet],
	index: &'a RowIndex,
	tolerance: f64,
}

impl ScanContext<'_> {
	/// Scan one row, reusing `crossings` as scratch space.
	fn scan_row(&self, row: usize, crossings: &mut Vec<Crossing>) -> RowScan {
		let (j, k) = self.grid.row_jk(row);
		let p = [self.grid.center(1, j), self.grid.center(2, k)];

		crossings.clear();
		crossings.extend(
			self.index
				.candidates(row)
				.iter()
				.filter_map(|&f| self.facets[f].pierce(p)),
		);
		let (tangent_clusters, merged_crossings) = collapse_crossings(crossings, self.tolerance);

		let mut scan = RowScan {
			intervals: Vec::new(),
			status: RowStatus::Outside,
			tangent_clusters,
			merged_crossings,
		};
		if crossings.is_empty() {
			return scan;
		}
		if crossings.len() % 2 == 1 {
			scan.status = RowStatus::OddCrossings;
			return scan;
		}

		let net: i64 = crossings.iter().map(|c| c.direction.sign()).sum();
		scan.status = if net == 0 {
			RowStatus::Closed
		} else {
			RowStatus::Unbalanced
		};
		scan.intervals = crossings
			.chunks_exact(2)
			.filter_map(|pair| voxel_span(self.grid, pair[0].x, pair[1].x))
			.collect();
		scan
	}

	/// Pull batches of rows off the shared task list until it runs dry.
	fn run_worker(&self, tasks: &[usize], cursor: &AtomicUsize, pb: &ProgressBar) -> Vec<(usize, RowScan)> {
		let mut out = Vec::new();
		let mut crossings = Vec::new();
		loop {
			let first = cursor.fetch_add(ROW_BATCH, Ordering::Relaxed);
			if first >= tasks.len() {
				break;
			}
			let batch = &tasks[first..(first + ROW_BATCH).min(tasks.len())];
			for &row in batch {
				out.push((row, self.scan_row(row, &mut crossings)));
			}
			pb.inc(batch.len() as u64);
		}
		out
	}
}

fn row_progress(len: usize, visible: bool) -> ProgressBar {
	if !visible {
		return ProgressBar::hidden();
	}
	let pb = ProgressBar::new(len as u64);
	if let Ok(style) = ProgressStyle::default_bar().template("Scanning Rows: [{bar:40.cyan/blue}] {pos}/{len} ({eta})") {
		pb.set_style(style.progress_chars("#>-"));
	}
	pb
}

/// Compute the inside intervals of every row of `grid`.
///
/// Rows overlapped by at least one triangle become tasks; scoped workers pull
/// them in batches and the per-row results are gathered into the returned
/// table. Rows with an odd crossing count stay empty and are counted in the
/// report rather than failing the scan.
pub fn scan_convert(mesh: &Mesh, grid: &Grid, options: &ScanOptions) -> Stencil {
	let facets: Vec<Facet> = (0..mesh.triangle_count())
		.filter_map(|t| Facet::project(mesh.corners(t)))
		.collect();
	let index = RowIndex::build(&facets, grid);
	let tasks: Vec<usize> = (0..grid.row_count())
		.filter(|&row| !index.candidates(row).is_empty())
		.collect();
	log::debug!(
		"scan: {} of {} triangles project to area, {} candidate entries, {} rows to scan",
		facets.len(),
		mesh.triangle_count(),
		index.facets.len(),
		tasks.len()
	);

	let context = ScanContext {
		grid,
		facets: &facets,
		index: &index,
		tolerance: options.merge_tolerance * grid.spacing,
	};
	let threads = worker_count(options.threads, tasks.len().div_ceil(ROW_BATCH));
	let cursor = AtomicUsize::new(0);
	let pb = row_progress(tasks.len(), options.progress);

	let results: Vec<Vec<(usize, RowScan)>> = thread::scope(|scope| {
		let mut handles = Vec::with_capacity(threads);
		for _ in 0..threads {
			handles.push(scope.spawn(|| context.run_worker(&tasks, &cursor, &pb)));
		}
		handles
			.into_iter()
			.map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
			.collect()
	});
	pb.finish_and_clear();

	let mut report = ScanReport {
		rows: grid.row_count(),
		..ScanReport::default()
	};
	let mut rows = vec![Vec::new(); grid.row_count()];
	for (row, scan) in results.into_iter().flatten() {
		report.absorb(&scan);
		rows[row] = scan.intervals;
	}

	Stencil {
		grid: *grid,
		rows,
		report,
	}
}

/// Worker threads for `batches` units of work; `requested == 0` means one per core.
pub(crate) fn worker_count(requested: usize, batches: usize) -> usize {
	let available = if requested == 0 {
		thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
	} else {
		requested
	};
	available.min(batches).max(1)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn square_facets() -> Vec<Facet> {
		// unit square in the plane x = 1 split along its diagonal, normal +X
		let a = [1.0, 0.0, 0.0];
		let b = [1.0, 1.0, 0.0];
		let c = [1.0, 1.0, 1.0];
		let d = [1.0, 0.0, 1.0];
		vec![Facet::project([a, b, c]).unwrap(), Facet::project([a, c, d]).unwrap()]
	}

	fn hits(facets: &[Facet], p: [f64; 2]) -> usize {
		facets.iter().filter_map(|f| f.pierce(p)).count()
	}

	#[test]
	fn edge_side_flips_with_edge_direction() {
		let pts = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.5, 0.5]];
		for &a in &pts {
			for &b in &pts {
				if a != b {
					assert_ne!(edge_side(0.0, a, b), edge_side(0.0, b, a));
				}
			}
		}
	}

	#[test]
	fn shared_diagonal_is_claimed_once() {
		let facets = square_facets();
		for t in [0.0, 0.25, 0.5, 0.75, 1.0] {
			let n = hits(&facets, [t, t]);
			assert!(n <= 1, "point ({t}, {t}) hit {n} facets");
		}
		assert_eq!(hits(&facets, [0.5, 0.5]), 1);
		assert_eq!(hits(&facets, [0.25, 0.75]), 1);
		assert_eq!(hits(&facets, [2.0, 0.5]), 0);
	}

	#[test]
	fn pierce_reports_plane_position_and_direction() {
		let facets = square_facets();
		let crossing = facets[0].pierce([0.7, 0.2]).unwrap();
		assert_eq!(crossing.x, 1.0);
		assert_eq!(crossing.direction, Direction::Exiting);
	}

	#[test]
	fn axis_parallel_triangle_is_skipped() {
		assert!(Facet::project([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]).is_none());
	}

	#[test]
	fn opposite_crossings_at_same_position_cancel() {
		let mut crossings = vec![
			Crossing { x: 3.0, direction: Direction::Exiting },
			Crossing { x: 1.0, direction: Direction::Entering },
			Crossing { x: 3.0, direction: Direction::Entering },
			Crossing { x: 5.0, direction: Direction::Exiting },
		];
		let (tangents, merged) = collapse_crossings(&mut crossings, 1e-9);
		assert_eq!((tangents, merged), (1, 0));
		assert_eq!(crossings.len(), 2);
		assert_eq!(crossings[0].x, 1.0);
		assert_eq!(crossings[1].x, 5.0);
	}

	#[test]
	fn duplicate_crossings_collapse_to_one() {
		let mut crossings = vec![
			Crossing { x: 2.0, direction: Direction::Entering },
			Crossing { x: 2.0 + 1e-12, direction: Direction::Entering },
			Crossing { x: 4.0, direction: Direction::Exiting },
		];
		let (tangents, merged) = collapse_crossings(&mut crossings, 1e-9);
		assert_eq!((tangents, merged), (0, 1));
		assert_eq!(crossings.len(), 2);
		assert_eq!(crossings[0].direction, Direction::Entering);
	}

	#[test]
	fn span_uses_centers_inside_the_pair() {
		let grid = Grid::new([0.5, 0.5, 0.5], 1.0, [11, 1, 1]).unwrap();
		assert_eq!(voxel_span(&grid, 0.0, 10.0), Some(Interval { start: 0, end: 9 }));
		assert_eq!(voxel_span(&grid, 2.6, 3.4), None);
		assert_eq!(voxel_span(&grid, -5.0, 50.0), Some(Interval { start: 0, end: 10 }));
		assert_eq!(voxel_span(&grid, 2.5, 2.5), Some(Interval { start: 2, end: 2 }));
	}

	#[test]
	fn cube_rows_fill_between_faces() {
		let mesh = Mesh::cuboid([0.0; 3], [10.0; 3]);
		let grid = Grid::new([0.5; 3], 1.0, [11, 11, 11]).unwrap();
		let stencil = scan_convert(&mesh, &grid, &ScanOptions::default());
		assert!(stencil.report.is_closed());
		assert_eq!(stencil.report.rows_hit, 100);
		assert_eq!(stencil.row(4, 7), &[Interval { start: 0, end: 9 }]);
		assert!(stencil.row(10, 3).is_empty());
	}

	#[test]
	fn open_mesh_rows_are_degraded() {
		let cube = Mesh::cuboid([0.0; 3], [4.0; 3]);
		// drop one triangle of the x = min face
		let triangles: Vec<_> = cube.triangles().iter().copied().filter(|t| *t != [0, 4, 6]).collect();
		let mesh = Mesh::new(cube.vertices().to_vec(), triangles).unwrap();
		let grid = Grid::new([-0.5, 0.5, 0.5], 1.0, [6, 4, 4]).unwrap();
		let stencil = scan_convert(&mesh, &grid, &ScanOptions::default());
		assert!(stencil.report.odd_rows > 0);
		for k in 0..4 {
			for j in 0..4 {
				let closed = stencil.row(j, k);
				assert!(closed.is_empty() || closed == [Interval { start: 1, end: 4 }]);
			}
		}
	}

	#[test]
	fn worker_count_is_bounded() {
		assert_eq!(worker_count(8, 3), 3);
		assert_eq!(worker_count(2, 100), 2);
		assert_eq!(worker_count(4, 0), 1);
	}
}
