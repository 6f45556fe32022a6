use crate::voxel_grid::grid::Grid;

/// Value written to voxels enclosed by the surface
pub const FOREGROUND: u8 = 255;
/// Value of every other voxel
pub const BACKGROUND: u8 = 0;

/// Binary voxel volume with one byte per voxel, X fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
	pub(crate) grid: Grid,
	pub(crate) data: Vec<u8>,
}

impl Volume {
	/// Allocate a volume over `grid` with every voxel set to [`BACKGROUND`]
	pub fn new(grid: Grid) -> Self {
		Self {
			data: vec![BACKGROUND; grid.voxel_count()],
			grid,
		}
	}

	pub fn grid(&self) -> &Grid {
		&self.grid
	}

	pub fn data(&self) -> &[u8] {
		&self.data
	}
}
