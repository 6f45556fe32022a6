use std::mem::size_of;

use crate::voxel_grid::volume::{Volume, BACKGROUND};

/// Format large numbers with KB, MB, GB, TB suffixes
pub fn format_bytes(bytes: usize) -> String {
	const KB: usize = 1024;
	const MB: usize = KB * 1024;
	const GB: usize = MB * 1024;
	const TB: usize = GB * 1024;

	if bytes >= TB {
		format!("{:.2} TB", bytes as f64 / TB as f64)
	} else if bytes >= GB {
		format!("{:.2} GB", bytes as f64 / GB as f64)
	} else if bytes >= MB {
		format!("{:.2} MB", bytes as f64 / MB as f64)
	} else if bytes >= KB {
		format!("{:.2} KB", bytes as f64 / KB as f64)
	} else {
		format!("{} bytes", bytes)
	}
}

impl Volume {
	/// Log the grid layout and the memory held by the voxel buffer
	pub fn report_memory(&self) {
		let struct_overhead = size_of::<Self>() - size_of::<Vec<u8>>();
		let buffer_bytes = self.data.capacity();
		let g = &self.grid;

		log::info!("Volume Memory Report:");
		log::info!("  Dimensions: {} x {} x {}", g.len_i, g.len_j, g.len_k);
		log::info!("  Total Voxels: {:e}", g.voxel_count() as f64);
		log::info!("  Spacing: {:.4} mm", g.spacing);
		log::info!(
			"  Origin: ({:.4}, {:.4}, {:.4}) mm",
			g.origin[0], g.origin[1], g.origin[2]
		);
		log::info!("  Voxel Buffer: {}", format_bytes(buffer_bytes));
		log::info!("  Total Memory Used: {}", format_bytes(struct_overhead + buffer_bytes));
	}

	/// Convert (i, j, k) to a linear index
	#[inline]
	pub fn ijk_to_index(&self, i: usize, j: usize, k: usize) -> usize {
		i + j * self.grid.len_i + k * self.grid.len_i * self.grid.len_j
	}

	/// Get a voxel value using (i, j, k) coordinates (panics if out of bounds)
	#[inline]
	pub fn get_voxel_ijk(&self, i: usize, j: usize, k: usize) -> u8 {
		self.data[self.ijk_to_index(i, j, k)]
	}

	/// True when the voxel at (i, j, k) is foreground
	#[inline]
	pub fn is_filled(&self, i: usize, j: usize, k: usize) -> bool {
		self.get_voxel_ijk(i, j, k) != BACKGROUND
	}

	/// Count the number of foreground voxels
	pub fn count_filled(&self) -> usize {
		self.data.iter().filter(|&&v| v != BACKGROUND).count()
	}

	/// Foreground volume in mm^3
	pub fn filled_volume(&self) -> f64 {
		self.count_filled() as f64 * self.grid.spacing.powi(3)
	}
}
