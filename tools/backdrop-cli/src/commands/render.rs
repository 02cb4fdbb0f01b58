//! Run the three-stage pipeline on one source.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use backdrop_common::config::RenderDefaults;
use backdrop_media_model::Size;
use backdrop_render_engine::{
    BlurredBackgroundPipeline, ExportBackend, FfmpegBackend, OutputLayout, PipelineRequest,
    ProgressObserver,
};

pub async fn run(
    input: PathBuf,
    area: Size,
    scale: f64,
    output_dir: PathBuf,
    defaults: &RenderDefaults,
) -> anyhow::Result<()> {
    let backend = FfmpegBackend::new();
    if !backend.is_available() {
        return Err(anyhow::anyhow!(
            "ffmpeg and ffprobe must be on PATH. Run `backdrop check` for details."
        ));
    }

    tracing::info!(source = %input.display(), backend = backend.name(), "Starting render");
    println!("Rendering: {}", input.display());
    println!("  Target: {}x{}", area.width, area.height);
    println!("  Overlay scale: {scale}");
    println!("  Output dir: {}", output_dir.display());

    let pipeline = BlurredBackgroundPipeline::with_defaults(
        Arc::new(backend),
        OutputLayout::new(&output_dir),
        defaults,
    );

    let observer: ProgressObserver = Arc::new(|value| {
        let percent = (f64::from(value) * 10_000.0).round() / 100.0;
        print!("\r  Progress: {percent:.2} %  ");
        let _ = std::io::stdout().flush();
    });

    match pipeline
        .run(PipelineRequest::new(input, area, scale), Some(observer))
        .await
    {
        Ok(output) => {
            println!("\nRender complete: {}", output.display());
            Ok(())
        }
        Err(e) => {
            println!("\nRender failed: {e}");
            Err(e.into())
        }
    }
}
