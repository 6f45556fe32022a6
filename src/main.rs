use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use mesh2volume::file_io::format::WriteOptions;
use mesh2volume::voxel_grid::grid::DEFAULT_MARGIN;
use mesh2volume::voxel_grid::info;
use mesh2volume::voxel_grid::pipeline::{convert_file, VoxelizeOptions};

/// Convert a closed triangle mesh into a binary voxel volume
#[derive(Parser, Debug)]
#[command(name = "mesh2volume", version)]
struct Cli {
	/// Input mesh (.stl or .vtp)
	input_mesh: PathBuf,

	/// Isotropic voxel edge length in mm
	#[arg(allow_negative_numbers = true)]
	iso_voxel_size: f64,

	/// Output volume (.mhd, .nii or .nii.gz)
	output_image: PathBuf,

	/// Blank margin as a fraction of each bounding-box coordinate
	#[arg(long, default_value_t = DEFAULT_MARGIN)]
	margin: f64,

	/// Worker threads (0 = one per core)
	#[arg(long, default_value_t = 0)]
	threads: usize,

	/// Write MetaImage data uncompressed (.raw instead of .zraw)
	#[arg(long)]
	no_compress: bool,

	/// Fail when the surface is not closed instead of leaving open rows empty
	#[arg(long)]
	strict: bool,

	/// Only log warnings and errors, hide progress bars
	#[arg(short, long)]
	quiet: bool,

	/// Log debug details
	#[arg(short, long)]
	verbose: bool,
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	let level = if cli.quiet {
		"warn"
	} else if cli.verbose {
		"debug"
	} else {
		"info"
	};
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

	match run(&cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			eprintln!("Error: {:#}", err);
			ExitCode::FAILURE
		}
	}
}

fn run(cli: &Cli) -> Result<()> {
	if !cli.quiet {
		info::print_banner();
	}

	let options = VoxelizeOptions {
		margin: cli.margin,
		threads: cli.threads,
		progress: !cli.quiet,
		strict: cli.strict,
		..VoxelizeOptions::new(cli.iso_voxel_size)
	};
	let write_options = WriteOptions {
		compress: !cli.no_compress,
	};

	let summary = convert_file(&cli.input_mesh, &cli.output_image, &options, &write_options)
		.with_context(|| format!("converting {}", cli.input_mesh.display()))?;

	if !cli.quiet {
		println!("Filled voxels: {}", summary.filled_voxels);
		for path in &summary.written {
			println!("Wrote {}", path.display());
		}
	}
	Ok(())
}
