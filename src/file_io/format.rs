//! File-extension dispatch for mesh readers and volume writers.

use std::path::{Path, PathBuf};

use crate::error::{VoxelResult, VoxelizeError};
use crate::file_io::mhd_output::write_metaimage;
use crate::file_io::nifti_output::write_nifti_gz;
use crate::file_io::stl::load_stl;
use crate::file_io::vtp::load_vtp;
use crate::voxel_grid::mesh::Mesh;
use crate::voxel_grid::volume::Volume;

pub(crate) const MESH_EXTENSIONS: &str = ".stl or .vtp";
pub(crate) const IMAGE_EXTENSIONS: &str = ".mhd, .nii or .nii.gz";

/// Supported mesh inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
	Stl,
	Vtp,
}

impl MeshFormat {
	pub fn from_path(path: &Path) -> VoxelResult<Self> {
		match lowercase_name(path) {
			name if name.ends_with(".stl") => Ok(Self::Stl),
			name if name.ends_with(".vtp") => Ok(Self::Vtp),
			_ => Err(VoxelizeError::UnsupportedFormat {
				path: path.to_path_buf(),
				expected: MESH_EXTENSIONS,
			}),
		}
	}

	pub fn load(self, path: &Path) -> VoxelResult<Mesh> {
		let parsed = match self {
			Self::Stl => load_stl(path),
			Self::Vtp => load_vtp(path),
		};
		parsed.map_err(|source| VoxelizeError::UnreadableMesh {
			path: path.to_path_buf(),
			source,
		})
	}
}

/// Writer settings that do not affect the voxels themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
	/// Store MetaImage data as zlib `.zraw` instead of plain `.raw`
	pub compress: bool,
}

impl Default for WriteOptions {
	fn default() -> Self {
		Self { compress: true }
	}
}

/// Supported volume outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageFormat {
	MetaImage { compress: bool },
	/// NIfTI is always gzip-compressed; `target` is where the file really goes
	Nifti { target: PathBuf },
}

impl ImageFormat {
	/// A bare `.nii` path is written to `<path>.gz`.
	pub fn from_path(path: &Path, options: &WriteOptions) -> VoxelResult<Self> {
		match lowercase_name(path) {
			name if name.ends_with(".mhd") => Ok(Self::MetaImage {
				compress: options.compress,
			}),
			name if name.ends_with(".nii.gz") => Ok(Self::Nifti {
				target: path.to_path_buf(),
			}),
			name if name.ends_with(".nii") => {
				let mut target = path.as_os_str().to_owned();
				target.push(".gz");
				Ok(Self::Nifti {
					target: PathBuf::from(target),
				})
			}
			_ => Err(VoxelizeError::UnsupportedFormat {
				path: path.to_path_buf(),
				expected: IMAGE_EXTENSIONS,
			}),
		}
	}

	/// Write `volume` and return every file created.
	pub fn write(&self, volume: &Volume, path: &Path) -> VoxelResult<Vec<PathBuf>> {
		match self {
			Self::MetaImage { compress } => write_metaimage(volume, path, *compress),
			Self::Nifti { target } => {
				if target.as_path() != path {
					log::info!("NIfTI output is gzip-compressed, writing {}", target.display());
				}
				write_nifti_gz(volume, target)?;
				Ok(vec![target.clone()])
			}
		}
	}
}

fn lowercase_name(path: &Path) -> String {
	path.file_name()
		.map(|name| name.to_string_lossy().to_ascii_lowercase())
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mesh_extensions_are_case_insensitive() {
		assert_eq!(MeshFormat::from_path(Path::new("a/Part.STL")).unwrap(), MeshFormat::Stl);
		assert_eq!(MeshFormat::from_path(Path::new("part.vtp")).unwrap(), MeshFormat::Vtp);
		assert!(matches!(
			MeshFormat::from_path(Path::new("part.obj")),
			Err(VoxelizeError::UnsupportedFormat { .. })
		));
	}

	#[test]
	fn nii_gains_gz_suffix() {
		let options = WriteOptions::default();
		assert_eq!(
			ImageFormat::from_path(Path::new("out/seg.nii"), &options).unwrap(),
			ImageFormat::Nifti {
				target: PathBuf::from("out/seg.nii.gz")
			}
		);
		assert_eq!(
			ImageFormat::from_path(Path::new("seg.nii.gz"), &options).unwrap(),
			ImageFormat::Nifti {
				target: PathBuf::from("seg.nii.gz")
			}
		);
	}

	#[test]
	fn mhd_follows_compress_option() {
		let plain = WriteOptions { compress: false };
		assert_eq!(
			ImageFormat::from_path(Path::new("seg.MHD"), &plain).unwrap(),
			ImageFormat::MetaImage { compress: false }
		);
		assert!(ImageFormat::from_path(Path::new("seg.png"), &plain).is_err());
		assert!(ImageFormat::from_path(Path::new("seg"), &plain).is_err());
	}
}
