//! STL loader, ASCII and binary.
//!
//! Binary layout: 80-byte header, `u32` triangle count, then per triangle a
//! normal and three vertices as little-endian `f32` followed by a `u16`
//! attribute count. Stored normals are ignored; orientation comes from the
//! vertex order.

use std::fs;
use std::path::Path;

use crate::error::MeshParseError;
use crate::voxel_grid::mesh::Mesh;

/// STL binary header size in bytes.
const HEADER_SIZE: usize = 80;

/// Size of one triangle record in binary STL.
const TRIANGLE_SIZE: usize = 50;

/// Load an STL file and weld its corners into an indexed mesh.
pub fn load_stl(path: &Path) -> Result<Mesh, MeshParseError> {
	let bytes = fs::read(path)?;
	parse_stl(&bytes)
}

/// Parse STL content, detecting ASCII vs binary.
pub fn parse_stl(bytes: &[u8]) -> Result<Mesh, MeshParseError> {
	let soup = if is_binary(bytes) {
		read_binary(bytes)?
	} else {
		let text = std::str::from_utf8(bytes)
			.map_err(|e| MeshParseError::invalid_content(format!("ASCII STL is not UTF-8: {e}")))?;
		read_ascii(text)?
	};
	if soup.is_empty() {
		return Err(MeshParseError::invalid_content("STL contains no triangles"));
	}
	Mesh::from_triangle_soup(&soup).map_err(|e| MeshParseError::invalid_content(e.to_string()))
}

/// Binary unless the content starts with "solid" and its size does not match
/// a binary record count (some binary exporters also write "solid" into the header).
fn is_binary(bytes: &[u8]) -> bool {
	if bytes.len() >= HEADER_SIZE + 4 {
		let count = u32::from_le_bytes([
			bytes[HEADER_SIZE],
			bytes[HEADER_SIZE + 1],
			bytes[HEADER_SIZE + 2],
			bytes[HEADER_SIZE + 3],
		]) as usize;
		if count.checked_mul(TRIANGLE_SIZE).map(|n| n + HEADER_SIZE + 4) == Some(bytes.len()) {
			return true;
		}
	}
	let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
	!bytes[start..].starts_with(b"solid")
}

fn read_binary(bytes: &[u8]) -> Result<Vec<[[f64; 3]; 3]>, MeshParseError> {
	if bytes.len() < HEADER_SIZE + 4 {
		return Err(MeshParseError::invalid_content(format!(
			"binary STL needs at least {} bytes, got {}",
			HEADER_SIZE + 4,
			bytes.len()
		)));
	}
	let count = u32::from_le_bytes([
		bytes[HEADER_SIZE],
		bytes[HEADER_SIZE + 1],
		bytes[HEADER_SIZE + 2],
		bytes[HEADER_SIZE + 3],
	]) as usize;
	let records = &bytes[HEADER_SIZE + 4..];
	if records.len() / TRIANGLE_SIZE < count {
		return Err(MeshParseError::invalid_content(format!(
			"binary STL declares {} triangles but holds {}",
			count,
			records.len() / TRIANGLE_SIZE
		)));
	}

	Ok(records
		.chunks_exact(TRIANGLE_SIZE)
		.take(count)
		.map(|record| {
			// skip the 12-byte normal
			[
				read_vertex(&record[12..24]),
				read_vertex(&record[24..36]),
				read_vertex(&record[36..48]),
			]
		})
		.collect())
}

fn read_vertex(buf: &[u8]) -> [f64; 3] {
	let x = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
	let y = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
	let z = f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
	[f64::from(x), f64::from(y), f64::from(z)]
}

fn read_ascii(text: &str) -> Result<Vec<[[f64; 3]; 3]>, MeshParseError> {
	let mut soup = Vec::new();
	let mut corners: Vec<[f64; 3]> = Vec::with_capacity(3);
	let mut in_loop = false;

	for (line_no, line) in text.lines().enumerate() {
		let parts: Vec<&str> = line.split_whitespace().collect();
		let Some(keyword) = parts.first() else {
			continue;
		};
		match keyword.to_ascii_lowercase().as_str() {
			"outer" => {
				in_loop = true;
				corners.clear();
			}
			"vertex" if in_loop => {
				if parts.len() < 4 {
					return Err(MeshParseError::invalid_content(format!(
						"line {}: vertex needs three coordinates",
						line_no + 1
					)));
				}
				corners.push([parts[1].parse()?, parts[2].parse()?, parts[3].parse()?]);
			}
			"endloop" => {
				in_loop = false;
				match corners.len() {
					3 => soup.push([corners[0], corners[1], corners[2]]),
					n => {
						return Err(MeshParseError::invalid_content(format!(
							"line {}: facet has {} vertices, expected 3",
							line_no + 1,
							n
						)));
					}
				}
			}
			"endsolid" => break,
			_ => {}
		}
	}
	Ok(soup)
}
