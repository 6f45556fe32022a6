use std::process::Command;

fn date_field(format: &str) -> String {
	Command::new("date")
		.arg(format)
		.output()
		.ok()
		.map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
		.filter(|value| !value.is_empty())
		.unwrap_or_else(|| "unknown".to_string())
}

fn main() {
	println!("cargo:rustc-env=COMPILE_DATE={}", date_field("+%Y-%m-%d"));
	println!("cargo:rustc-env=COMPILE_TIME={}", date_field("+%H:%M:%S"));
	println!("cargo:rerun-if-changed=build.rs");
}
