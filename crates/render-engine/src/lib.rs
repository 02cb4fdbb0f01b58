//! Backdrop Render Engine
//!
//! Renders a clip centered over a blurred, full-frame copy of itself, in
//! three exports that each read the previous one's output.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source.mp4 ──┬── Stage 0: aspect fill into target area ──▶ center.mov
//!              │                                                 │
//!              │   Stage 1: gaussian blur, frame by frame ◀──────┘
//!              │          │
//!              │          ▼
//!              │     blurred.mov (background)
//!              │          │
//!              └──────────┴── Stage 2: aspect fit over background
//!                                        │
//!                                        ▼
//!                                    final.mov
//! ```
//!
//! Geometry comes from `backdrop-layout`; encoding goes through an
//! [`ExportBackend`], normally [`FfmpegBackend`].

pub mod blur;
pub mod compositor;
pub mod export;
pub mod ffmpeg;
pub mod pipeline;
pub mod probe;
pub mod progress;

pub use blur::{FrameFilter, GaussianBlur};
pub use compositor::{CompositionBuilder, LayerPlan, LayerRole, StagePlan};
pub use export::*;
pub use ffmpeg::FfmpegBackend;
pub use pipeline::{
    BlurredBackgroundPipeline, CompletionCallback, OutputLayout, PipelineRequest, PipelineStep,
};
pub use progress::{
    overall_progress, PipelineStage, PipelineState, ProgressObserver, ProgressReporter,
    ReporterOutcome,
};
