//! Print the layer geometry of the composition stages without rendering.

use std::path::PathBuf;

use serde_json::json;

use backdrop_common::config::AppConfig;
use backdrop_media_model::{AffineTransform, AssetTrack, MediaAsset, MediaKind, Size, TimeRange};
use backdrop_render_engine::probe::probe_media;
use backdrop_render_engine::{CompositionBuilder, OutputLayout, PipelineRequest, PipelineStage};

pub fn run(input: PathBuf, area: Size, scale: f64, config: &AppConfig) -> anyhow::Result<()> {
    PipelineRequest::new(&input, area, scale).validate()?;

    let source = probe_media(&input)?;
    let builder = CompositionBuilder::new(area)
        .with_frame_rate(config.render.frame_rate)
        .with_blur_radius(config.render.blur_radius);

    let center = builder.center_stage(&source)?;

    // Stand-in for the blur stage output, which is always target-sized.
    let layout = OutputLayout::new(&config.output_dir);
    let blurred = MediaAsset {
        path: layout.stage_output(PipelineStage::Blur),
        duration_secs: source.duration_secs,
        asset_transform: AffineTransform::IDENTITY,
        video: Some(AssetTrack {
            kind: MediaKind::Video,
            stream_index: 0,
            natural_size: area,
            preferred_transform: AffineTransform::IDENTITY,
            time_range: TimeRange::from_zero(source.duration_secs),
        }),
        audio: None,
    };
    let overlay = builder.overlay_stage(&source, &blurred, scale)?;

    let report = json!({
        "source": source.path,
        "target": area,
        "overlay_scale": scale,
        "center": {
            "layers": center.plans,
            "instructions": center.video_composition.instructions,
        },
        "overlay": {
            "layers": overlay.plans,
            "instructions": overlay.video_composition.instructions,
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
