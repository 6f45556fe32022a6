pub mod error;

pub mod voxel_grid {
	pub mod info;
	pub mod mesh;
	pub mod grid;
	pub mod volume;
	pub mod utils;
	pub mod scan;
	pub mod fill;
	pub mod pipeline;
}

pub mod file_io {
	pub mod stl;
	pub mod vtp;
	pub mod format;
	pub mod mhd_output;
	pub mod nifti_output;
}

pub use error::{MeshParseError, VoxelResult, VoxelizeError};
pub use voxel_grid::grid::Grid;
pub use voxel_grid::mesh::Mesh;
pub use voxel_grid::pipeline::{convert_file, voxelize, voxelize_on_grid, VoxelizeOptions, Voxelization};
pub use voxel_grid::volume::Volume;
