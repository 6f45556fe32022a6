use std::sync::Once;
use std::thread;

use crate::file_io::format::{IMAGE_EXTENSIONS, MESH_EXTENSIONS};

/// Startup banner: version, build stamp, formats and default worker count
pub fn banner_lines() -> Vec<String> {
	let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
	vec![
		format!(
			"{} {} (built {} {})",
			env!("CARGO_PKG_NAME"),
			env!("CARGO_PKG_VERSION"),
			env!("COMPILE_DATE"),
			env!("COMPILE_TIME")
		),
		format!("Mesh input: {}", MESH_EXTENSIONS),
		format!("Volume output: {} (MetaImage data as .zraw, or .raw uncompressed)", IMAGE_EXTENSIONS),
		format!("Default workers: {}", cores),
	]
}

/// Print the banner to stderr (only prints once)
pub fn print_banner() {
	static PRINT_BANNER_ONCE: Once = Once::new();
	PRINT_BANNER_ONCE.call_once(|| {
		for line in banner_lines() {
			eprintln!("{}", line);
		}
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn banner_names_program_and_formats() {
		let lines = banner_lines();
		assert!(lines[0].starts_with(&format!("mesh2volume {}", env!("CARGO_PKG_VERSION"))));
		assert!(lines.iter().any(|l| l.contains(".vtp")));
		assert!(lines.iter().any(|l| l.contains(".nii.gz")));
	}
}
