//! Stage compositions for the blurred-background pipeline.
//!
//! Stage 0 and Stage 2 are layered track compositions with one instruction
//! each. Stage 1 is a per-frame filter over Stage 0's output and is built as
//! a [`ExportInput::Filtered`] instead.

use serde::Serialize;

use backdrop_common::error::BackdropResult;
use backdrop_layout::{
    compose_transform, plan, resolve_orientation, FitMode, GeometryPlan, Orientation,
};
use backdrop_media_model::{
    AffineTransform, Composition, CompositionInstruction, LayerInstruction, MediaAsset, MediaKind,
    Size, TimeRange, TrackId, VideoComposition,
};

use crate::export::{ExportInput, FrameFilterSpec};

/// Frame rate used by every stage unless configured otherwise.
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Blur radius of the background stage unless configured otherwise.
pub const DEFAULT_BLUR_RADIUS: f64 = 10.0;

/// Role a layer plays in its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    /// Source centered and cropped to fill the target area.
    Centered,
    /// Blurred fill behind the foreground.
    Background,
    /// Source shrunk to fit inside the target area.
    Foreground,
}

/// How one layer was placed, kept for logging and reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerPlan {
    pub track: TrackId,
    pub role: LayerRole,
    /// Absent for pass-through layers.
    pub orientation: Option<Orientation>,
    pub geometry: Option<GeometryPlan>,
    pub transform: AffineTransform,
}

/// A built track composition plus its render instructions.
#[derive(Debug, Clone, Serialize)]
pub struct StagePlan {
    pub composition: Composition,
    pub video_composition: VideoComposition,
    pub plans: Vec<LayerPlan>,
}

impl StagePlan {
    pub fn into_export_input(self) -> ExportInput {
        ExportInput::Composition {
            composition: self.composition,
            video_composition: Some(self.video_composition),
        }
    }
}

/// Builds the per-stage inputs for one target area.
#[derive(Debug, Clone, Copy)]
pub struct CompositionBuilder {
    target: Size,
    frame_rate: u32,
    blur_radius: f64,
}

impl CompositionBuilder {
    pub fn new(target: Size) -> Self {
        Self {
            target,
            frame_rate: DEFAULT_FRAME_RATE,
            blur_radius: DEFAULT_BLUR_RADIUS,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate.max(1);
        self
    }

    pub fn with_blur_radius(mut self, radius: f64) -> Self {
        self.blur_radius = radius;
        self
    }

    pub fn target(&self) -> Size {
        self.target
    }

    /// Stage 0: the source centered and aspect-filled into the target area.
    ///
    /// Missing tracks are omitted. Video goes in at the composition's
    /// current end, audio at zero.
    pub fn center_stage(&self, source: &MediaAsset) -> BackdropResult<StagePlan> {
        let mut composition = Composition::new();
        let mut layers = Vec::new();
        let mut plans = Vec::new();

        if let Some(video) = &source.video {
            let track = composition.add_track(MediaKind::Video);
            let at = composition.duration_secs();
            composition.insert_time_range(track, video.time_range, source, at)?;

            let layer =
                self.placed_layer(source, track, LayerRole::Centered, FitMode::AspectFill, 1.0);
            layers.push(LayerInstruction {
                track,
                transform: layer.transform,
                start_secs: 0.0,
            });
            plans.push(layer);
        }

        if let Some(audio) = &source.audio {
            let track = composition.add_track(MediaKind::Audio);
            composition.insert_time_range(track, audio.time_range, source, 0.0)?;
        }

        let instruction = CompositionInstruction {
            time_range: TimeRange::from_zero(composition.duration_secs()),
            layer_instructions: layers,
        };

        Ok(StagePlan {
            video_composition: self.video_composition(instruction),
            composition,
            plans,
        })
    }

    /// Stage 1: every frame of the centered clip blurred at the target size.
    pub fn blur_stage_input(&self, centered: &MediaAsset) -> ExportInput {
        ExportInput::Filtered {
            asset: centered.clone(),
            filter: FrameFilterSpec::GaussianBlur {
                radius: self.blur_radius,
            },
            render_size: self.target,
            frame_rate: self.frame_rate,
        }
    }

    /// Stage 2: the source aspect-fit at `overlay_scale` over the blurred
    /// background.
    ///
    /// Audio is taken from the source only.
    pub fn overlay_stage(
        &self,
        source: &MediaAsset,
        blurred: &MediaAsset,
        overlay_scale: f64,
    ) -> BackdropResult<StagePlan> {
        let mut composition = Composition::new();
        let mut layers = Vec::new();
        let mut plans = Vec::new();

        if blurred.video.is_some() {
            let track = composition.add_track(MediaKind::Video);
            composition.insert_time_range(track, blurred.time_range(), blurred, 0.0)?;
            layers.push(LayerInstruction::identity(track));
            plans.push(LayerPlan {
                track,
                role: LayerRole::Background,
                orientation: None,
                geometry: None,
                transform: AffineTransform::IDENTITY,
            });
        }

        if source.video.is_some() {
            let track = composition.add_track(MediaKind::Video);
            composition.insert_time_range(track, source.time_range(), source, 0.0)?;

            let layer = self.placed_layer(
                source,
                track,
                LayerRole::Foreground,
                FitMode::AspectFit,
                overlay_scale,
            );
            layers.push(LayerInstruction {
                track,
                transform: layer.transform,
                start_secs: 0.0,
            });
            plans.push(layer);
        }

        if source.audio.is_some() {
            let track = composition.add_track(MediaKind::Audio);
            composition.insert_time_range(track, source.time_range(), source, 0.0)?;
        }

        let instruction = CompositionInstruction {
            time_range: source.time_range(),
            layer_instructions: layers,
        };

        Ok(StagePlan {
            video_composition: self.video_composition(instruction),
            composition,
            plans,
        })
    }

    fn placed_layer(
        &self,
        source: &MediaAsset,
        track: TrackId,
        role: LayerRole,
        mode: FitMode,
        scale: f64,
    ) -> LayerPlan {
        // The track transform only classifies; each orientation branch
        // supplies its own rotation on top of the movie-level transform.
        let orientation = resolve_orientation(&source.preferred_transform());
        let asset_size = source.oriented_size();
        let geometry = plan(asset_size, self.target, mode, scale);
        let transform = compose_transform(
            orientation,
            asset_size,
            &source.asset_transform,
            &geometry,
            self.target,
        );

        tracing::debug!(
            role = ?role,
            orientation = orientation.as_str(),
            scale_x = geometry.scale_x,
            scale_y = geometry.scale_y,
            position_x = geometry.position_x,
            position_y = geometry.position_y,
            "Placed layer"
        );

        LayerPlan {
            track,
            role,
            orientation: Some(orientation),
            geometry: Some(geometry),
            transform,
        }
    }

    fn video_composition(&self, instruction: CompositionInstruction) -> VideoComposition {
        VideoComposition {
            instructions: vec![instruction],
            frame_rate: self.frame_rate,
            render_size: self.target,
        }
    }
}
