//! VTK XML PolyData (`.vtp`) loader.
//!
//! Reads `Points`, `Polys` and `Strips` of every `Piece`. Data arrays may be
//! `ascii`, inline `binary` (base64) or `appended`, where the array points at
//! an `offset` into the trailing `<AppendedData>` block (`raw` bytes or
//! `base64`). Binary data may be split into zlib-compressed blocks as written
//! by `vtkZLibDataCompressor`.

use std::fs;
use std::io::Read;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::ZlibDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::MeshParseError;
use crate::voxel_grid::mesh::Mesh;

/// Load a `.vtp` file.
pub fn load_vtp(path: &Path) -> Result<Mesh, MeshParseError> {
	let content = fs::read(path)?;
	parse_vtp_bytes(&content)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
	Int8,
	UInt8,
	Int16,
	UInt16,
	Int32,
	UInt32,
	Int64,
	UInt64,
	Float32,
	Float64,
}

impl ScalarType {
	fn parse(name: &str) -> Result<Self, MeshParseError> {
		Ok(match name {
			"Int8" | "Char" => Self::Int8,
			"UInt8" | "UChar" => Self::UInt8,
			"Int16" => Self::Int16,
			"UInt16" => Self::UInt16,
			"Int32" => Self::Int32,
			"UInt32" => Self::UInt32,
			"Int64" | "vtkIdType" => Self::Int64,
			"UInt64" => Self::UInt64,
			"Float32" => Self::Float32,
			"Float64" => Self::Float64,
			other => {
				return Err(MeshParseError::UnsupportedEncoding(format!(
					"data array type {other}"
				)));
			}
		})
	}

	fn size(self) -> usize {
		match self {
			Self::Int8 | Self::UInt8 => 1,
			Self::Int16 | Self::UInt16 => 2,
			Self::Int32 | Self::UInt32 | Self::Float32 => 4,
			Self::Int64 | Self::UInt64 | Self::Float64 => 8,
		}
	}

	fn read(self, raw: &[u8], big_endian: bool) -> f64 {
		let mut buf = [0u8; 8];
		let n = self.size();
		buf[..n].copy_from_slice(&raw[..n]);
		if big_endian {
			buf[..n].reverse();
		}
		let b2 = [buf[0], buf[1]];
		let b4 = [buf[0], buf[1], buf[2], buf[3]];
		match self {
			Self::Int8 => f64::from(buf[0] as i8),
			Self::UInt8 => f64::from(buf[0]),
			Self::Int16 => f64::from(i16::from_le_bytes(b2)),
			Self::UInt16 => f64::from(u16::from_le_bytes(b2)),
			Self::Int32 => f64::from(i32::from_le_bytes(b4)),
			Self::UInt32 => f64::from(u32::from_le_bytes(b4)),
			Self::Int64 => i64::from_le_bytes(buf) as f64,
			Self::UInt64 => u64::from_le_bytes(buf) as f64,
			Self::Float32 => f64::from(f32::from_le_bytes(b4)),
			Self::Float64 => f64::from_le_bytes(buf),
		}
	}
}

/// File-wide encoding parameters from the `VTKFile` element
#[derive(Debug, Clone, Copy, Default)]
struct Layout {
	big_endian: bool,
	header_u64: bool,
	compressed: bool,
}

impl Layout {
	/// Bytes per binary header word
	fn word(self) -> usize {
		if self.header_u64 { 8 } else { 4 }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppendedEncoding {
	Raw,
	Base64,
}

/// Content of the `<AppendedData>` element after its `_` marker
#[derive(Debug, Clone, Copy)]
struct Appended<'a> {
	encoding: AppendedEncoding,
	data: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayFormat {
	Ascii,
	Binary,
	/// Byte (raw) or character (base64) offset into the appended block
	Appended(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
	Points,
	Polys,
	Strips,
	Other,
}

#[derive(Debug)]
struct ArrayHeader {
	scalar: ScalarType,
	name: String,
	format: ArrayFormat,
	components: usize,
}

/// Arrays collected for the current `Piece`
#[derive(Debug, Default)]
struct Piece {
	points: Option<Vec<f64>>,
	poly_connectivity: Vec<f64>,
	poly_offsets: Vec<f64>,
	strip_connectivity: Vec<f64>,
	strip_offsets: Vec<f64>,
}

/// Parse VTP XML content into a mesh.
pub fn parse_vtp(content: &str) -> Result<Mesh, MeshParseError> {
	parse_vtp_bytes(content.as_bytes())
}

/// Parse a whole `.vtp` file, including a raw appended block that is not valid text.
pub fn parse_vtp_bytes(content: &[u8]) -> Result<Mesh, MeshParseError> {
	let (xml, appended) = split_appended(content)?;
	let mut reader = Reader::from_str(&xml);
	reader.config_mut().trim_text(true);

	let mut layout = Layout::default();
	let mut section = Section::Other;
	let mut piece = Piece::default();
	let mut array: Option<ArrayHeader> = None;
	let mut text = String::new();
	let mut vertices: Vec<[f64; 3]> = Vec::new();
	let mut triangles: Vec<[usize; 3]> = Vec::new();
	let mut seen_root = false;

	let mut buf = Vec::new();
	loop {
		match reader.read_event_into(&mut buf)? {
			Event::Start(ref e) => match e.local_name().as_ref() {
				b"VTKFile" => {
					layout = parse_root(e)?;
					seen_root = true;
				}
				b"Piece" => piece = Piece::default(),
				b"Points" => section = Section::Points,
				b"Polys" => section = Section::Polys,
				b"Strips" => section = Section::Strips,
				b"Verts" | b"Lines" | b"PointData" | b"CellData" | b"FieldData" => section = Section::Other,
				b"DataArray" => {
					array = Some(parse_array_header(e)?);
					text.clear();
				}
				_ => {}
			},
			Event::Empty(ref e) => {
				if e.local_name().as_ref() == b"DataArray" {
					let header = parse_array_header(e)?;
					let values = decode_array(&header, "", layout, appended)?;
					store_array(&mut piece, section, &header, values)?;
				}
			}
			Event::Text(ref e) => {
				if array.is_some() {
					text.push_str(&e.unescape()?);
				}
			}
			Event::CData(ref e) => {
				if array.is_some() {
					text.push_str(&String::from_utf8_lossy(e));
				}
			}
			Event::End(ref e) => match e.local_name().as_ref() {
				b"DataArray" => {
					if let Some(header) = array.take() {
						let values = decode_array(&header, &text, layout, appended)?;
						store_array(&mut piece, section, &header, values)?;
					}
				}
				b"Points" | b"Polys" | b"Strips" | b"Verts" | b"Lines" | b"PointData" | b"CellData"
				| b"FieldData" => section = Section::Other,
				b"Piece" => {
					append_piece(&std::mem::take(&mut piece), &mut vertices, &mut triangles)?;
				}
				_ => {}
			},
			Event::Eof => break,
			_ => {}
		}
		buf.clear();
	}

	if !seen_root {
		return Err(MeshParseError::invalid_content("missing VTKFile element"));
	}
	if triangles.is_empty() {
		return Err(MeshParseError::invalid_content("PolyData contains no polygons"));
	}
	Mesh::new(vertices, triangles).map_err(|e| MeshParseError::invalid_content(e.to_string()))
}

const APPENDED_OPEN: &[u8] = b"<AppendedData";
const APPENDED_CLOSE: &[u8] = b"</AppendedData>";

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|w| w == needle)
}

fn utf8(bytes: &[u8]) -> Result<&str, MeshParseError> {
	std::str::from_utf8(bytes).map_err(|e| MeshParseError::invalid_content(format!("XML is not UTF-8: {e}")))
}

/// Cut the `<AppendedData>` element out of the document.
///
/// Returns the remaining XML and the appended payload, which starts right after
/// the `_` marker and runs to the last closing tag.
fn split_appended(content: &[u8]) -> Result<(String, Option<Appended<'_>>), MeshParseError> {
	let Some(open) = find(content, APPENDED_OPEN) else {
		return Ok((utf8(content)?.to_string(), None));
	};
	let tag_end = content[open..]
		.iter()
		.position(|&b| b == b'>')
		.map(|n| open + n + 1)
		.ok_or_else(|| MeshParseError::invalid_content("unterminated AppendedData tag"))?;
	let encoding = appended_encoding(utf8(&content[open..tag_end])?)?;
	let start = content[tag_end..]
		.iter()
		.position(|&b| b == b'_')
		.map(|n| tag_end + n + 1)
		.ok_or_else(|| MeshParseError::invalid_content("AppendedData has no '_' marker"))?;
	let close = content
		.windows(APPENDED_CLOSE.len())
		.rposition(|w| w == APPENDED_CLOSE)
		.filter(|&close| close >= start)
		.ok_or_else(|| MeshParseError::invalid_content("AppendedData is not closed"))?;

	let mut xml = utf8(&content[..open])?.to_string();
	xml.push_str(utf8(&content[close + APPENDED_CLOSE.len()..])?);
	Ok((
		xml,
		Some(Appended {
			encoding,
			data: &content[start..close],
		}),
	))
}

fn appended_encoding(tag: &str) -> Result<AppendedEncoding, MeshParseError> {
	let mut reader = Reader::from_str(tag);
	let encoding = match reader.read_event()? {
		Event::Start(ref e) | Event::Empty(ref e) => attribute(e, b"encoding")?,
		_ => None,
	};
	match encoding.as_deref() {
		Some("raw") => Ok(AppendedEncoding::Raw),
		Some("base64") => Ok(AppendedEncoding::Base64),
		Some(other) => Err(MeshParseError::UnsupportedEncoding(format!("appended {other} data"))),
		None => Err(MeshParseError::invalid_content("AppendedData has no encoding")),
	}
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, MeshParseError> {
	for attr in e.attributes().flatten() {
		if attr.key.local_name().as_ref() == key {
			let value = std::str::from_utf8(&attr.value)
				.map_err(|err| MeshParseError::invalid_content(format!("invalid UTF-8 in attribute: {err}")))?;
			return Ok(Some(value.to_string()));
		}
	}
	Ok(None)
}

fn parse_root(e: &BytesStart<'_>) -> Result<Layout, MeshParseError> {
	if let Some(kind) = attribute(e, b"type")? {
		if kind != "PolyData" {
			return Err(MeshParseError::invalid_content(format!("expected PolyData, found {kind}")));
		}
	}
	let big_endian = attribute(e, b"byte_order")?.as_deref() == Some("BigEndian");
	let header_u64 = match attribute(e, b"header_type")?.as_deref() {
		None | Some("UInt32") => false,
		Some("UInt64") => true,
		Some(other) => {
			return Err(MeshParseError::UnsupportedEncoding(format!("header type {other}")));
		}
	};
	let compressed = match attribute(e, b"compressor")?.as_deref() {
		None | Some("") => false,
		Some("vtkZLibDataCompressor") => true,
		Some(other) => {
			return Err(MeshParseError::UnsupportedEncoding(format!("compressor {other}")));
		}
	};
	Ok(Layout {
		big_endian,
		header_u64,
		compressed,
	})
}

fn parse_array_header(e: &BytesStart<'_>) -> Result<ArrayHeader, MeshParseError> {
	let scalar = ScalarType::parse(&attribute(e, b"type")?.unwrap_or_default())?;
	let format = match attribute(e, b"format")?.as_deref() {
		None | Some("ascii") => ArrayFormat::Ascii,
		Some("binary") => ArrayFormat::Binary,
		Some("appended") => {
			let offset = attribute(e, b"offset")?.unwrap_or_default();
			ArrayFormat::Appended(
				offset
					.trim()
					.parse()
					.map_err(|_| MeshParseError::invalid_content(format!("bad appended offset {offset:?}")))?,
			)
		}
		Some(other) => {
			return Err(MeshParseError::UnsupportedEncoding(format!("{other} data array")));
		}
	};
	let components = match attribute(e, b"NumberOfComponents")? {
		Some(n) => n
			.trim()
			.parse()
			.map_err(|_| MeshParseError::invalid_content(format!("bad NumberOfComponents {n}")))?,
		None => 1,
	};
	Ok(ArrayHeader {
		scalar,
		name: attribute(e, b"Name")?.unwrap_or_default(),
		format,
		components,
	})
}

fn store_array(
	piece: &mut Piece,
	section: Section,
	header: &ArrayHeader,
	values: Vec<f64>,
) -> Result<(), MeshParseError> {
	match (section, header.name.as_str()) {
		(Section::Points, _) => {
			if header.components != 3 {
				return Err(MeshParseError::invalid_content(format!(
					"points need 3 components, found {}",
					header.components
				)));
			}
			piece.points = Some(values);
		}
		(Section::Polys, "connectivity") => piece.poly_connectivity = values,
		(Section::Polys, "offsets") => piece.poly_offsets = values,
		(Section::Strips, "connectivity") => piece.strip_connectivity = values,
		(Section::Strips, "offsets") => piece.strip_offsets = values,
		_ => {}
	}
	Ok(())
}

fn decode_ascii(text: &str) -> Result<Vec<f64>, MeshParseError> {
	text.split_ascii_whitespace()
		.map(|token| token.parse::<f64>().map_err(MeshParseError::from))
		.collect()
}

fn read_header_word(bytes: &[u8], index: usize, layout: Layout) -> Result<usize, MeshParseError> {
	let scalar = if layout.header_u64 {
		ScalarType::UInt64
	} else {
		ScalarType::UInt32
	};
	let size = scalar.size();
	let raw = bytes
		.get(index * size..(index + 1) * size)
		.ok_or_else(|| MeshParseError::invalid_content("binary data header is truncated"))?;
	Ok(scalar.read(raw, layout.big_endian) as usize)
}

/// Characters of base64 text needed to encode `bytes` bytes
fn base64_len(bytes: usize) -> usize {
	bytes.div_ceil(3) * 4
}

/// Size in bytes of a compressed-data header with `blocks` blocks
fn compressed_header_len(blocks: usize, layout: Layout) -> Result<usize, MeshParseError> {
	blocks
		.checked_add(3)
		.and_then(|n| n.checked_mul(layout.word()))
		.ok_or_else(|| MeshParseError::invalid_content(format!("{blocks} compressed blocks")))
}

fn decode_array(
	header: &ArrayHeader,
	text: &str,
	layout: Layout,
	appended: Option<Appended<'_>>,
) -> Result<Vec<f64>, MeshParseError> {
	match header.format {
		ArrayFormat::Ascii => decode_ascii(text),
		ArrayFormat::Binary => decode_base64(text, header.scalar, layout),
		ArrayFormat::Appended(offset) => {
			let appended = appended
				.ok_or_else(|| MeshParseError::invalid_content("appended array without AppendedData"))?;
			let data = appended
				.data
				.get(offset..)
				.ok_or_else(|| MeshParseError::invalid_content(format!("appended offset {offset} is past the data")))?;
			match appended.encoding {
				AppendedEncoding::Raw => decode_stream(data, header.scalar, layout),
				AppendedEncoding::Base64 => decode_base64(utf8(data)?, header.scalar, layout),
			}
		}
	}
}

/// Decode one base64 array, ignoring whatever text follows it.
///
/// Uncompressed arrays encode header and values as one stream; compressed
/// arrays encode the block header and the blocks separately.
fn decode_base64(text: &str, scalar: ScalarType, layout: Layout) -> Result<Vec<f64>, MeshParseError> {
	let text: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
	if text.is_empty() {
		return Ok(Vec::new());
	}
	let truncated = || MeshParseError::invalid_content("base64 data is truncated");
	let word = layout.word();

	let stream = if layout.compressed {
		let prefix = text.get(..base64_len(3 * word)).ok_or_else(truncated)?;
		let blocks = read_header_word(&STANDARD.decode(prefix)?, 0, layout)?;
		let header_chars = base64_len(compressed_header_len(blocks, layout)?);
		let mut stream = STANDARD.decode(text.get(..header_chars).ok_or_else(truncated)?)?;
		let total = (0..blocks)
			.map(|block| read_header_word(&stream, 3 + block, layout))
			.sum::<Result<usize, _>>()?;
		let payload = text
			.get(header_chars..header_chars + base64_len(total))
			.ok_or_else(truncated)?;
		stream.extend(STANDARD.decode(payload)?);
		stream
	} else {
		let prefix = text.get(..base64_len(word).min(text.len())).ok_or_else(truncated)?;
		let len = read_header_word(&STANDARD.decode(prefix)?, 0, layout)?;
		let chars = word.checked_add(len).map(base64_len).ok_or_else(truncated)?;
		STANDARD.decode(text.get(..chars).ok_or_else(truncated)?)?
	};
	decode_stream(&stream, scalar, layout)
}

/// Decode a binary array stream: size header followed by values, or block
/// header followed by zlib blocks. Trailing bytes belong to later arrays.
fn decode_stream(bytes: &[u8], scalar: ScalarType, layout: Layout) -> Result<Vec<f64>, MeshParseError> {
	let word = layout.word();
	let raw = if layout.compressed {
		let blocks = read_header_word(bytes, 0, layout)?;
		let mut offset = compressed_header_len(blocks, layout)?;
		let mut raw = Vec::new();
		for block in 0..blocks {
			let size = read_header_word(bytes, 3 + block, layout)?;
			let chunk = bytes
				.get(offset..offset.saturating_add(size))
				.ok_or_else(|| MeshParseError::invalid_content("compressed block is truncated"))?;
			ZlibDecoder::new(chunk).read_to_end(&mut raw)?;
			offset += size;
		}
		raw
	} else {
		let len = read_header_word(bytes, 0, layout)?;
		bytes
			.get(word..word.saturating_add(len))
			.ok_or_else(|| MeshParseError::invalid_content("binary data is shorter than its header"))?
			.to_vec()
	};

	if raw.len() % scalar.size() != 0 {
		return Err(MeshParseError::invalid_content(format!(
			"{} bytes is not a whole number of {:?} values",
			raw.len(),
			scalar
		)));
	}
	Ok(raw
		.chunks_exact(scalar.size())
		.map(|chunk| scalar.read(chunk, layout.big_endian))
		.collect())
}

fn to_index(value: f64, limit: usize) -> Result<usize, MeshParseError> {
	if value < 0.0 || value.fract() != 0.0 || value >= limit as f64 {
		return Err(MeshParseError::invalid_content(format!(
			"index {value} outside 0..{limit}"
		)));
	}
	Ok(value as usize)
}

/// Cells as index lists, from a connectivity/offsets pair
fn cells(connectivity: &[f64], offsets: &[f64], points: usize) -> Result<Vec<Vec<usize>>, MeshParseError> {
	let mut out = Vec::with_capacity(offsets.len());
	let mut start = 0usize;
	for &end in offsets {
		let end = to_index(end, connectivity.len() + 1)?;
		if end < start {
			return Err(MeshParseError::invalid_content("cell offsets decrease"));
		}
		let cell = connectivity[start..end]
			.iter()
			.map(|&v| to_index(v, points))
			.collect::<Result<Vec<_>, _>>()?;
		out.push(cell);
		start = end;
	}
	Ok(out)
}

fn append_piece(
	piece: &Piece,
	vertices: &mut Vec<[f64; 3]>,
	triangles: &mut Vec<[usize; 3]>,
) -> Result<(), MeshParseError> {
	let Some(points) = piece.points.as_ref() else {
		return Ok(());
	};
	let count = points.len() / 3;
	let base = vertices.len();
	vertices.extend(points.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));

	// polygons are fanned from their first corner
	for poly in cells(&piece.poly_connectivity, &piece.poly_offsets, count)? {
		for w in 1..poly.len().saturating_sub(1) {
			triangles.push([base + poly[0], base + poly[w], base + poly[w + 1]]);
		}
	}
	// strips alternate winding every other triangle
	for strip in cells(&piece.strip_connectivity, &piece.strip_offsets, count)? {
		for n in 0..strip.len().saturating_sub(2) {
			let tri = if n % 2 == 0 {
				[strip[n], strip[n + 1], strip[n + 2]]
			} else {
				[strip[n + 1], strip[n], strip[n + 2]]
			};
			triangles.push(tri.map(|v| base + v));
		}
	}
	Ok(())
}
