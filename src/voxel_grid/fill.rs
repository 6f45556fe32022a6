use std::thread;

use crate::voxel_grid::scan::{worker_count, Interval, Stencil};
use crate::voxel_grid::volume::{Volume, FOREGROUND};

/// Rows per fill task
const FILL_BATCH: usize = 256;

/// Write every interval of `stencil` into a fresh background volume.
///
/// Each row owns the contiguous slice `len_i` voxels long, so workers receive
/// disjoint runs of rows and never share a byte of the buffer.
pub fn fill_volume(stencil: &Stencil, threads: usize) -> Volume {
	let mut volume = Volume::new(stencil.grid);
	let len_i = stencil.grid.len_i;
	let rows_per_task = stencil.rows.len().div_ceil(worker_count(threads, stencil.rows.len().div_ceil(FILL_BATCH))).max(1);

	thread::scope(|scope| {
		let buffers = volume.data.chunks_mut(len_i * rows_per_task);
		for (buffer, rows) in buffers.zip(stencil.rows.chunks(rows_per_task)) {
			scope.spawn(move || fill_rows(buffer, rows, len_i));
		}
	});
	volume
}

fn fill_rows(buffer: &mut [u8], rows: &[Vec<Interval>], len_i: usize) {
	for (row, intervals) in buffer.chunks_mut(len_i).zip(rows) {
		for interval in intervals {
			row[interval.start..=interval.end].fill(FOREGROUND);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::voxel_grid::grid::Grid;
	use crate::voxel_grid::scan::ScanReport;

	fn stencil() -> Stencil {
		let grid = Grid::new([0.0; 3], 1.0, [5, 3, 2]).unwrap();
		let mut rows = vec![Vec::new(); grid.row_count()];
		rows[grid.row_id(1, 0)] = vec![Interval { start: 1, end: 3 }];
		rows[grid.row_id(2, 1)] = vec![Interval { start: 0, end: 0 }, Interval { start: 2, end: 4 }];
		Stencil {
			grid,
			rows,
			report: ScanReport::default(),
		}
	}

	#[test]
	fn intervals_become_foreground() {
		let volume = fill_volume(&stencil(), 1);
		assert_eq!(volume.count_filled(), 7);
		assert!(volume.is_filled(1, 1, 0) && volume.is_filled(3, 1, 0));
		assert!(!volume.is_filled(0, 1, 0) && !volume.is_filled(4, 1, 0));
		assert!(volume.is_filled(0, 2, 1) && !volume.is_filled(1, 2, 1));
	}

	#[test]
	fn fill_is_idempotent_and_thread_independent() {
		let s = stencil();
		let first = fill_volume(&s, 1);
		let second = fill_volume(&s, 1);
		let parallel = fill_volume(&s, 4);
		assert_eq!(first.data(), second.data());
		assert_eq!(first.data(), parallel.data());
	}
}
