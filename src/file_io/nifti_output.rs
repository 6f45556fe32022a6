use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::{VoxelResult, VoxelizeError};
use crate::voxel_grid::grid::Grid;
use crate::voxel_grid::volume::Volume;

/// Size of a NIfTI-1 header
pub const HEADER_SIZE: usize = 348;
/// Image data starts after the header and the 4-byte extension flag
pub const VOX_OFFSET: usize = 352;

const DT_UINT8: i16 = 2;
const NIFTI_XFORM_SCANNER_ANAT: i16 = 1;
/// NIFTI_UNITS_MM | NIFTI_UNITS_SEC
const UNITS_MM_SEC: u8 = 10;

/// Fields of the NIfTI-1 header this writer sets; everything else is zero.
///
/// NIfTI world space is RAS while mesh coordinates are LPS, so X and Y of the
/// origin are negated and the quaternion encodes a 180 degree turn about Z.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
	pub dims: [usize; 3],
	pub spacing: f64,
	pub origin: [f64; 3],
}

impl NiftiHeader {
	/// Fails with `InvalidInput` when a dimension does not fit the header's `i16` fields.
	pub fn new(grid: &Grid) -> io::Result<Self> {
		let dims = grid.dims();
		if let Some(&len) = dims.iter().find(|&&len| len > i16::MAX as usize) {
			return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!(
					"NIfTI-1 dimensions are limited to {} voxels per axis, grid is {} x {} x {} (dimension {})",
					i16::MAX,
					dims[0],
					dims[1],
					dims[2],
					len
				),
			));
		}
		Ok(Self {
			dims,
			spacing: grid.spacing,
			origin: grid.origin,
		})
	}

	/// Serialize to the little-endian on-disk layout
	pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
		let mut buf = [0u8; HEADER_SIZE];
		let s = self.spacing as f32;
		let [ox, oy, oz] = self.origin.map(|c| c as f32);

		put_i32(&mut buf, 0, HEADER_SIZE as i32);
		buf[38] = b'r';
		let dim = [3, self.dims[0], self.dims[1], self.dims[2], 1, 1, 1, 1];
		for (n, &d) in dim.iter().enumerate() {
			put_i16(&mut buf, 40 + 2 * n, d as i16);
		}
		put_i16(&mut buf, 70, DT_UINT8);
		put_i16(&mut buf, 72, 8);
		for (n, &p) in [1.0, s, s, s].iter().enumerate() {
			put_f32(&mut buf, 76 + 4 * n, p);
		}
		put_f32(&mut buf, 108, VOX_OFFSET as f32);
		put_f32(&mut buf, 112, 1.0);
		buf[123] = UNITS_MM_SEC;

		put_i16(&mut buf, 252, NIFTI_XFORM_SCANNER_ANAT);
		put_i16(&mut buf, 254, NIFTI_XFORM_SCANNER_ANAT);
		for (n, &v) in [0.0, 0.0, 1.0, -ox, -oy, oz].iter().enumerate() {
			put_f32(&mut buf, 256 + 4 * n, v);
		}
		let srow = [[-s, 0.0, 0.0, -ox], [0.0, -s, 0.0, -oy], [0.0, 0.0, s, oz]];
		for (r, row) in srow.iter().enumerate() {
			for (c, &v) in row.iter().enumerate() {
				put_f32(&mut buf, 280 + 16 * r + 4 * c, v);
			}
		}
		buf[344..348].copy_from_slice(b"n+1\0");
		buf
	}
}

fn put_i16(buf: &mut [u8], at: usize, value: i16) {
	buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_i32(buf: &mut [u8], at: usize, value: i32) {
	buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_f32(buf: &mut [u8], at: usize, value: f32) {
	buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Write a gzip-compressed single-file NIfTI-1 image to `path`.
pub fn write_nifti_gz(volume: &Volume, path: &Path) -> VoxelResult<()> {
	let start_time = Instant::now();
	NiftiHeader::new(volume.grid())
		.and_then(|header| encode(&header, volume.data(), path))
		.map_err(|source| VoxelizeError::UnwritableVolume {
			path: path.to_path_buf(),
			source,
		})?;
	log::info!("NIfTI file saved: {}", path.display());
	log::info!("Save Time: {:.3} seconds", start_time.elapsed().as_secs_f64());
	Ok(())
}

fn encode(header: &NiftiHeader, data: &[u8], path: &Path) -> io::Result<()> {
	let file = File::create(path)?;
	let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
	encoder.write_all(&header.to_bytes())?;
	encoder.write_all(&[0u8; VOX_OFFSET - HEADER_SIZE])?;
	encoder.write_all(data)?;
	encoder.finish()?.flush()
}
