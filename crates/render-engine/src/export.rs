//! Export jobs and the backend seam.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use backdrop_common::error::BackdropResult;
use backdrop_media_model::{Composition, MediaAsset, Size, VideoComposition};

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFileType {
    QuickTimeMovie,
}

impl OutputFileType {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFileType::QuickTimeMovie => "mov",
        }
    }

    /// Muxer name passed to ffmpeg's `-f`.
    pub fn muxer(self) -> &'static str {
        match self {
            OutputFileType::QuickTimeMovie => "mov",
        }
    }
}

/// Quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportPreset {
    HighestQuality,
}

/// Per-frame filter applied on the frame-processing path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameFilterSpec {
    GaussianBlur { radius: f64 },
}

/// What a job renders.
#[derive(Debug, Clone)]
pub enum ExportInput {
    /// Layered track composition, optionally with render instructions.
    Composition {
        composition: Composition,
        video_composition: Option<VideoComposition>,
    },

    /// Every frame of `asset`, scaled to `render_size`, run through `filter`.
    Filtered {
        asset: MediaAsset,
        filter: FrameFilterSpec,
        render_size: Size,
        frame_rate: u32,
    },
}

impl ExportInput {
    /// Length of the rendered output in seconds.
    pub fn duration_secs(&self) -> f64 {
        match self {
            ExportInput::Composition { composition, .. } => composition.duration_secs(),
            ExportInput::Filtered { asset, .. } => asset.duration_secs,
        }
    }
}

/// Shared handle to a job's local progress in `[0, 1]`.
///
/// Clones observe the same value. Writes are clamped and never move the
/// value backwards.
#[derive(Debug, Clone, Default)]
pub struct JobProgress {
    bits: Arc<AtomicU32>,
}

impl JobProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fraction(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn set(&self, fraction: f32) {
        // Also rejects -0.0, whose bit pattern would win the max below.
        if fraction.is_nan() || fraction <= 0.0 {
            return;
        }
        // Positive f32 bit patterns order the same way as the values.
        let clamped = fraction.min(1.0);
        self.bits.fetch_max(clamped.to_bits(), Ordering::AcqRel);
    }

    pub fn complete(&self) {
        self.set(1.0);
    }
}

/// An export job ready to be handed to a backend.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub input: ExportInput,

    /// Output file path.
    pub output_path: PathBuf,

    pub file_type: OutputFileType,

    pub preset: ExportPreset,

    /// Move the index to the front of the file for progressive playback.
    pub optimize_for_network: bool,

    pub progress: JobProgress,
}

impl ExportJob {
    pub fn new(input: ExportInput, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input,
            output_path: output_path.into(),
            file_type: OutputFileType::QuickTimeMovie,
            preset: ExportPreset::HighestQuality,
            optimize_for_network: false,
            progress: JobProgress::new(),
        }
    }

    pub fn optimized_for_network(mut self, enabled: bool) -> Self {
        self.optimize_for_network = enabled;
        self
    }
}

/// Trait for render backends.
///
/// Calls block until the work is done; the pipeline runs them on the
/// blocking thread pool.
pub trait ExportBackend: Send + Sync {
    /// Load a media file's tracks and metadata.
    fn probe(&self, path: &Path) -> BackdropResult<MediaAsset>;

    /// Render the job to `job.output_path`, updating `job.progress`.
    fn export(&self, job: &ExportJob) -> BackdropResult<()>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}
