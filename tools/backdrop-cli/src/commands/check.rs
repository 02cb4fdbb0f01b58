//! Check system capabilities.

use backdrop_common::config::{config_file_path, AppConfig};
use backdrop_render_engine::ffmpeg::command_exists;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Backdrop System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;
    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found");
        } else {
            println!("[MISSING] {binary} not found on PATH");
            all_ok = false;
        }
    }

    let path = config_file_path();
    if path.exists() {
        println!("[OK] Config: {}", path.display());
    } else {
        println!("[INFO] Config: {} (not present, using defaults)", path.display());
    }
    println!("[INFO] Output dir: {}", config.output_dir.display());

    println!();
    if all_ok {
        println!("All required tools are available. Backdrop is ready.");
    } else {
        println!("Install ffmpeg (which ships ffprobe) to render.");
    }

    Ok(())
}
