use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::{GzDecoder, ZlibDecoder};
use tempfile::tempdir;

use mesh2volume::file_io::format::WriteOptions;
use mesh2volume::file_io::nifti_output::VOX_OFFSET;
use mesh2volume::voxel_grid::mesh::Mesh;
use mesh2volume::voxel_grid::pipeline::{convert_file, VoxelizeOptions};
use mesh2volume::VoxelizeError;

fn write_ascii_stl(mesh: &Mesh, path: &Path) {
	let mut text = String::from("solid cube\n");
	for t in 0..mesh.triangle_count() {
		text.push_str("  facet normal 0 0 0\n    outer loop\n");
		for [x, y, z] in mesh.corners(t) {
			text.push_str(&format!("      vertex {x} {y} {z}\n"));
		}
		text.push_str("    endloop\n  endfacet\n");
	}
	text.push_str("endsolid cube\n");
	fs::write(path, text).unwrap();
}

const UNIT_CUBE_VTP: &str = r#"<?xml version="1.0"?>
<VTKFile type="PolyData" version="0.1" byte_order="LittleEndian">
  <PolyData>
    <Piece NumberOfPoints="8" NumberOfPolys="6">
      <Points>
        <DataArray type="Float32" NumberOfComponents="3" format="ascii">
          0 0 0  10 0 0  0 10 0  10 10 0  0 0 10  10 0 10  0 10 10  10 10 10
        </DataArray>
      </Points>
      <Polys>
        <DataArray type="Int32" Name="connectivity" format="ascii">
          0 2 3 1  4 5 7 6  0 1 5 4  2 6 7 3  0 4 6 2  1 3 7 5
        </DataArray>
        <DataArray type="Int32" Name="offsets" format="ascii">4 8 12 16 20 24</DataArray>
      </Polys>
    </Piece>
  </PolyData>
</VTKFile>
"#;

fn header_value<'a>(header: &'a str, key: &str) -> &'a str {
	header
		.lines()
		.find_map(|line| line.strip_prefix(key).and_then(|rest| rest.strip_prefix(" = ")))
		.unwrap_or_else(|| panic!("missing {key}"))
}

#[test]
fn stl_to_compressed_metaimage() {
	let dir = tempdir().unwrap();
	let input = dir.path().join("cube.stl");
	let output = dir.path().join("cube.mhd");
	write_ascii_stl(&Mesh::cuboid([0.0; 3], [10.0; 3]), &input);

	let summary = convert_file(&input, &output, &VoxelizeOptions::new(1.0), &WriteOptions::default()).unwrap();
	assert_eq!(summary.filled_voxels, 1000);
	assert_eq!(summary.written, vec![output.clone(), dir.path().join("cube.zraw")]);

	let header = fs::read_to_string(&output).unwrap();
	assert_eq!(header_value(&header, "DimSize"), "11 11 11");
	assert_eq!(header_value(&header, "ElementSpacing"), "1 1 1");
	assert_eq!(header_value(&header, "Offset"), "0.5 0.5 0.5");
	assert_eq!(header_value(&header, "ElementType"), "MET_UCHAR");
	assert_eq!(header_value(&header, "ElementDataFile"), "cube.zraw");

	let compressed = fs::read(dir.path().join("cube.zraw")).unwrap();
	assert_eq!(header_value(&header, "CompressedDataSize"), compressed.len().to_string());
	let mut data = Vec::new();
	ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut data).unwrap();
	assert_eq!(data.len(), 11 * 11 * 11);
	assert_eq!(data.iter().filter(|&&v| v == 255).count(), 1000);
	assert!(data.iter().all(|&v| v == 0 || v == 255));
}

#[test]
fn vtp_to_raw_metaimage() {
	let dir = tempdir().unwrap();
	let input = dir.path().join("cube.vtp");
	let output = dir.path().join("cube.mhd");
	fs::write(&input, UNIT_CUBE_VTP).unwrap();

	let write_options = WriteOptions { compress: false };
	convert_file(&input, &output, &VoxelizeOptions::new(1.0), &write_options).unwrap();

	let header = fs::read_to_string(&output).unwrap();
	assert_eq!(header_value(&header, "CompressedData"), "False");
	assert_eq!(header_value(&header, "ElementDataFile"), "cube.raw");
	let data = fs::read(dir.path().join("cube.raw")).unwrap();
	assert_eq!(data.len(), 1331);
	assert_eq!(data.iter().filter(|&&v| v == 255).count(), 1000);
	// voxel (0, 0, 0) is inside, voxel (10, 0, 0) is margin
	assert_eq!(data[0], 255);
	assert_eq!(data[10], 0);
}

#[test]
fn nii_output_is_gzipped_next_to_requested_path() {
	let dir = tempdir().unwrap();
	let input = dir.path().join("cube.stl");
	let output = dir.path().join("cube.nii");
	write_ascii_stl(&Mesh::cuboid([0.0; 3], [10.0; 3]), &input);

	let summary = convert_file(&input, &output, &VoxelizeOptions::new(1.0), &WriteOptions::default()).unwrap();
	let target = dir.path().join("cube.nii.gz");
	assert_eq!(summary.written, vec![target.clone()]);
	assert!(!output.exists());

	let mut bytes = Vec::new();
	GzDecoder::new(fs::File::open(&target).unwrap()).read_to_end(&mut bytes).unwrap();
	assert_eq!(bytes.len(), VOX_OFFSET + 1331);
	assert_eq!(&bytes[344..348], b"n+1\0");
	assert_eq!(bytes[VOX_OFFSET..].iter().filter(|&&v| v == 255).count(), 1000);
}

#[test]
fn unsupported_extensions_fail_before_writing() {
	let dir = tempdir().unwrap();
	let input = dir.path().join("cube.stl");
	write_ascii_stl(&Mesh::cuboid([0.0; 3], [1.0; 3]), &input);

	let options = VoxelizeOptions::new(0.5);
	let bad_output = dir.path().join("cube.png");
	assert!(matches!(
		convert_file(&input, &bad_output, &options, &WriteOptions::default()),
		Err(VoxelizeError::UnsupportedFormat { .. })
	));
	assert!(!bad_output.exists());

	let bad_input = dir.path().join("cube.obj");
	assert!(matches!(
		convert_file(&bad_input, &dir.path().join("cube.mhd"), &options, &WriteOptions::default()),
		Err(VoxelizeError::UnsupportedFormat { .. })
	));
}

#[test]
fn missing_or_broken_mesh_is_unreadable() {
	let dir = tempdir().unwrap();
	let output = dir.path().join("out.mhd");
	let options = VoxelizeOptions::new(1.0);

	let missing = dir.path().join("missing.stl");
	assert!(matches!(
		convert_file(&missing, &output, &options, &WriteOptions::default()),
		Err(VoxelizeError::UnreadableMesh { .. })
	));

	let broken = dir.path().join("broken.vtp");
	fs::write(&broken, "<VTKFile type=\"PolyData\"><PolyData><Piece>").unwrap();
	assert!(matches!(
		convert_file(&broken, &output, &options, &WriteOptions::default()),
		Err(VoxelizeError::UnreadableMesh { .. })
	));
	assert!(!output.exists());
}

#[test]
fn unwritable_destination_is_reported() {
	let dir = tempdir().unwrap();
	let input = dir.path().join("cube.stl");
	write_ascii_stl(&Mesh::cuboid([0.0; 3], [1.0; 3]), &input);
	let output = dir.path().join("no_such_dir").join("cube.mhd");
	assert!(matches!(
		convert_file(&input, &output, &VoxelizeOptions::new(0.5), &WriteOptions::default()),
		Err(VoxelizeError::UnwritableVolume { .. })
	));
}
