use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::{VoxelResult, VoxelizeError};
use crate::file_io::format::{ImageFormat, MeshFormat, WriteOptions};
use crate::voxel_grid::fill::fill_volume;
use crate::voxel_grid::grid::{Grid, DEFAULT_MARGIN};
use crate::voxel_grid::mesh::Mesh;
use crate::voxel_grid::scan::{scan_convert, ScanOptions, ScanReport, DEFAULT_MERGE_TOLERANCE};
use crate::voxel_grid::volume::Volume;

/// Settings of one voxelization run.
#[derive(Debug, Clone)]
pub struct VoxelizeOptions {
	/// Isotropic voxel edge length in mm
	pub voxel_size: f64,
	/// Margin fraction applied to each bound's magnitude
	pub margin: f64,
	/// Worker threads, 0 picks one per available core
	pub threads: usize,
	/// Show progress bars on stderr
	pub progress: bool,
	/// Fail with `NonClosedSurface` instead of degrading odd rows
	pub strict: bool,
	/// Crossing merge distance in voxels
	pub merge_tolerance: f64,
}

impl VoxelizeOptions {
	pub fn new(voxel_size: f64) -> Self {
		Self {
			voxel_size,
			margin: DEFAULT_MARGIN,
			threads: 0,
			progress: false,
			strict: false,
			merge_tolerance: DEFAULT_MERGE_TOLERANCE,
		}
	}

	fn scan_options(&self) -> ScanOptions {
		ScanOptions {
			threads: self.threads,
			progress: self.progress,
			merge_tolerance: self.merge_tolerance,
		}
	}
}

/// Filled volume together with the diagnostics of the scan that produced it.
#[derive(Debug, Clone)]
pub struct Voxelization {
	pub volume: Volume,
	pub report: ScanReport,
}

/// Grid, scan and fill `mesh` at `options.voxel_size`.
pub fn voxelize(mesh: &Mesh, options: &VoxelizeOptions) -> VoxelResult<Voxelization> {
	let grid = Grid::for_mesh(mesh, options.voxel_size, options.margin)?;
	voxelize_on_grid(mesh, &grid, options)
}

/// Scan and fill `mesh` on a caller-supplied grid; `options.voxel_size` and `margin` are ignored.
pub fn voxelize_on_grid(mesh: &Mesh, grid: &Grid, options: &VoxelizeOptions) -> VoxelResult<Voxelization> {
	if mesh.triangle_count() == 0 {
		return Err(VoxelizeError::DegenerateMesh("mesh has no triangles".to_string()));
	}
	log_mesh_diagnostics(mesh);
	log::info!(
		"Grid: {} x {} x {} voxels at {} mm",
		grid.len_i, grid.len_j, grid.len_k, grid.spacing
	);

	let start_time = Instant::now();
	let stencil = scan_convert(mesh, grid, &options.scan_options());
	let report = stencil.report;
	log::info!(
		"Scan Time: {:.3} seconds ({} of {} rows inside)",
		start_time.elapsed().as_secs_f64(),
		report.rows_hit,
		report.rows
	);
	if report.unbalanced_rows > 0 {
		log::warn!(
			"{} rows crossed the surface with unbalanced orientation; check triangle winding",
			report.unbalanced_rows
		);
	}
	if !report.is_closed() {
		if options.strict {
			return Err(VoxelizeError::NonClosedSurface { rows: report.odd_rows });
		}
		log::warn!(
			"surface is not closed: {} rows had an odd number of crossings and were left empty",
			report.odd_rows
		);
	}
	log::debug!(
		"{} tangential touches dropped, {} coincident crossings merged",
		report.tangent_clusters,
		report.merged_crossings
	);

	let start_time = Instant::now();
	let volume = fill_volume(&stencil, options.threads);
	log::info!("Fill Time: {:.3} seconds", start_time.elapsed().as_secs_f64());
	Ok(Voxelization { volume, report })
}

fn log_mesh_diagnostics(mesh: &Mesh) {
	log::info!(
		"Mesh: {} vertices, {} triangles",
		mesh.vertex_count(),
		mesh.triangle_count()
	);
	let open_edges = mesh.open_edge_count();
	if open_edges > 0 {
		log::warn!("mesh has {} edges not shared by exactly two triangles", open_edges);
	}
	let enclosed = mesh.signed_volume();
	if enclosed < 0.0 {
		log::warn!("mesh encloses negative volume {:.3} mm^3; triangles face inward", enclosed);
	} else {
		log::debug!("mesh encloses {:.3} mm^3", enclosed);
	}
}

/// Outcome of [`convert_file`]
#[derive(Debug, Clone)]
pub struct ConversionSummary {
	/// Files actually written (header and data files for MetaImage)
	pub written: Vec<PathBuf>,
	pub report: ScanReport,
	pub filled_voxels: usize,
}

/// Load `input`, voxelize it and write the volume to `output`.
///
/// Both extensions are checked before any work starts.
pub fn convert_file(
	input: &Path,
	output: &Path,
	options: &VoxelizeOptions,
	write_options: &WriteOptions,
) -> VoxelResult<ConversionSummary> {
	let mesh_format = MeshFormat::from_path(input)?;
	let image_format = ImageFormat::from_path(output, write_options)?;

	let start_time = Instant::now();
	let mesh = mesh_format.load(input)?;
	log::info!(
		"Loaded {}: {:.3} seconds",
		input.display(),
		start_time.elapsed().as_secs_f64()
	);

	let Voxelization { volume, report } = voxelize(&mesh, options)?;
	volume.report_memory();
	let filled_voxels = volume.count_filled();
	log::info!(
		"Filled voxels: {} ({:.3} mm^3)",
		filled_voxels,
		volume.filled_volume()
	);

	let written = image_format.write(&volume, output)?;
	Ok(ConversionSummary {
		written,
		report,
		filled_voxels,
	})
}
