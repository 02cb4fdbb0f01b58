//! Backdrop CLI: render a clip centered over a blurred copy of itself.
//!
//! Usage:
//!   backdrop render <INPUT>    Run the three-stage pipeline
//!   backdrop plan <INPUT>      Print layer geometry without rendering
//!   backdrop info <INPUT>      Show media information
//!   backdrop check             Check for ffmpeg and ffprobe

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use backdrop_common::config::{AppConfig, RenderDefaults};
use backdrop_media_model::Size;

mod commands;

#[derive(Parser)]
#[command(
    name = "backdrop",
    about = "Center a video over a blurred, full-frame copy of itself",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output geometry; unset values come from the config file.
#[derive(Args, Debug, Clone)]
struct TargetArgs {
    /// Output width in pixels (even)
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels (even)
    #[arg(long)]
    height: Option<u32>,

    /// Foreground scale inside the output area
    #[arg(long)]
    scale: Option<f64>,
}

impl TargetArgs {
    fn resolve(&self, defaults: &RenderDefaults) -> (Size, f64) {
        let width = self.width.unwrap_or(defaults.target_width);
        let height = self.height.unwrap_or(defaults.target_height);
        let scale = self.scale.unwrap_or(defaults.overlay_scale);
        (Size::new(f64::from(width), f64::from(height)), scale)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render INPUT over its blurred background
    Render {
        /// Source video
        input: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Directory for intermediate and final files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Print the layer plans and transforms as JSON
    Plan {
        /// Source video
        input: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show duration, resolution and orientation
    Info {
        /// Source video
        input: PathBuf,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    backdrop_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Render {
            input,
            target,
            output_dir,
        } => {
            let (area, scale) = target.resolve(&config.render);
            let dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            commands::render::run(input, area, scale, dir, &config.render).await
        }
        Commands::Plan { input, target } => {
            let (area, scale) = target.resolve(&config.render);
            commands::plan::run(input, area, scale, &config)
        }
        Commands::Info { input } => commands::info::run(input),
        Commands::Check => commands::check::run(&config),
    }
}
