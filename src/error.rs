//! Error types for voxelization and the file collaborators around it.

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the crate.
pub type VoxelResult<T> = Result<T, VoxelizeError>;

/// Fatal errors of a voxelization run.
#[derive(Debug, Error)]
pub enum VoxelizeError {
	/// Voxel size was zero, negative or not a finite number.
	#[error("invalid voxel size {0}: must be a finite value > 0 mm")]
	InvalidVoxelSize(f64),

	/// The mesh has no triangles, a zero-extent bounding box, or bad indices.
	#[error("degenerate mesh: {0}")]
	DegenerateMesh(String),

	/// The requested grid does not fit in memory addressing.
	#[error("grid of {len_i} x {len_j} x {len_k} voxels is too large")]
	GridTooLarge {
		len_i: usize,
		len_j: usize,
		len_k: usize,
	},

	/// Rows with an odd crossing count were found while running in strict mode.
	#[error("surface is not closed: {rows} rows had an odd number of crossings")]
	NonClosedSurface { rows: usize },

	/// File extension not handled by any loader or writer.
	#[error("unsupported format for {path}: expected {expected}")]
	UnsupportedFormat {
		path: PathBuf,
		expected: &'static str,
	},

	/// The mesh file could not be opened or parsed.
	#[error("cannot read mesh {path}: {source}")]
	UnreadableMesh {
		path: PathBuf,
		#[source]
		source: MeshParseError,
	},

	/// The volume could not be written.
	#[error("cannot write volume {path}: {source}")]
	UnwritableVolume {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Parse failures reported by the mesh loaders.
#[derive(Debug, Error)]
pub enum MeshParseError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid file content: {0}")]
	InvalidContent(String),

	#[error("XML error: {0}")]
	Xml(#[from] quick_xml::Error),

	#[error("base64 error: {0}")]
	Base64(#[from] base64::DecodeError),

	#[error("float parsing error: {0}")]
	ParseFloat(#[from] std::num::ParseFloatError),

	#[error("unsupported data encoding: {0}")]
	UnsupportedEncoding(String),
}

impl MeshParseError {
	pub fn invalid_content(message: impl Into<String>) -> Self {
		Self::InvalidContent(message.into())
	}
}
