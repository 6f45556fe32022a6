use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::error::{VoxelResult, VoxelizeError};
use crate::voxel_grid::grid::Grid;
use crate::voxel_grid::volume::Volume;

/// MetaImage (`.mhd`) header describing a detached `uint8` data file
#[derive(Debug, Clone, PartialEq)]
pub struct MetaImageHeader {
	pub dims: [usize; 3],
	pub spacing: f64,
	pub offset: [f64; 3],
	/// Size of the zlib stream when the data file is compressed
	pub compressed_size: Option<usize>,
	/// Data file name relative to the header
	pub data_file: String,
}

impl MetaImageHeader {
	pub fn new(grid: &Grid, data_file: String, compressed_size: Option<usize>) -> Self {
		Self {
			dims: grid.dims(),
			spacing: grid.spacing,
			offset: grid.origin,
			compressed_size,
			data_file,
		}
	}

	/// Write the header as `key = value` lines
	pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
		writeln!(out, "ObjectType = Image")?;
		writeln!(out, "NDims = 3")?;
		writeln!(out, "BinaryData = True")?;
		writeln!(out, "BinaryDataByteOrderMSB = False")?;
		match self.compressed_size {
			Some(size) => {
				writeln!(out, "CompressedData = True")?;
				writeln!(out, "CompressedDataSize = {}", size)?;
			}
			None => writeln!(out, "CompressedData = False")?,
		}
		writeln!(out, "TransformMatrix = 1 0 0 0 1 0 0 0 1")?;
		writeln!(out, "Offset = {} {} {}", self.offset[0], self.offset[1], self.offset[2])?;
		writeln!(out, "CenterOfRotation = 0 0 0")?;
		writeln!(out, "AnatomicalOrientation = RAI")?;
		writeln!(out, "ElementSpacing = {} {} {}", self.spacing, self.spacing, self.spacing)?;
		writeln!(out, "DimSize = {} {} {}", self.dims[0], self.dims[1], self.dims[2])?;
		writeln!(out, "ElementType = MET_UCHAR")?;
		writeln!(out, "ElementDataFile = {}", self.data_file)?;
		Ok(())
	}
}

/// Save the volume as `path` (header) plus a sibling `.zraw` or `.raw` data file.
/// Returns both written paths, header first.
pub fn write_metaimage(volume: &Volume, path: &Path, compress: bool) -> VoxelResult<Vec<PathBuf>> {
	let start_time = Instant::now();
	let data_path = path.with_extension(if compress { "zraw" } else { "raw" });
	let data_name = data_path
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default();

	let payload = if compress {
		let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
		encoder
			.write_all(volume.data())
			.and_then(|_| encoder.finish())
			.map_err(|source| unwritable(&data_path, source))?
	} else {
		volume.data().to_vec()
	};
	let header = MetaImageHeader::new(volume.grid(), data_name, compress.then_some(payload.len()));

	write_file(&data_path, |out| out.write_all(&payload))?;
	write_file(path, |out| header.write_to(out))?;

	log::info!("MetaImage file saved: {}", path.display());
	log::info!("Save Time: {:.3} seconds", start_time.elapsed().as_secs_f64());
	Ok(vec![path.to_path_buf(), data_path])
}

fn write_file<F>(path: &Path, body: F) -> VoxelResult<()>
where
	F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
	let result = File::create(path).and_then(|file| {
		let mut out = BufWriter::new(file);
		body(&mut out)?;
		out.flush()
	});
	result.map_err(|source| unwritable(path, source))
}

fn unwritable(path: &Path, source: io::Error) -> VoxelizeError {
	VoxelizeError::UnwritableVolume {
		path: path.to_path_buf(),
		source,
	}
}
