//! Probed media files and their tracks.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::geometry::Size;
use crate::time::TimeRange;
use crate::transform::AffineTransform;

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

/// One track inside a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetTrack {
    pub kind: MediaKind,

    /// Index of the stream inside the container, counted per kind
    /// (the `N` in an ffmpeg `v:N` / `a:N` specifier).
    pub stream_index: usize,

    /// Stored frame size before orientation is applied. Zero for audio.
    pub natural_size: Size,

    /// Transform that displays the stored frames upright.
    pub preferred_transform: AffineTransform,

    pub time_range: TimeRange,
}

/// A media file reference with its tracks. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub duration_secs: f64,

    /// Movie-level transform, prepended to every placed layer. Separate from
    /// the video track's `preferred_transform`, which only drives orientation
    /// and oriented size.
    #[serde(default)]
    pub asset_transform: AffineTransform,

    pub video: Option<AssetTrack>,
    pub audio: Option<AssetTrack>,
}

impl MediaAsset {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn track(&self, kind: MediaKind) -> Option<&AssetTrack> {
        match kind {
            MediaKind::Video => self.video.as_ref(),
            MediaKind::Audio => self.audio.as_ref(),
        }
    }

    /// Full time range of the asset, starting at zero.
    pub fn time_range(&self) -> TimeRange {
        TimeRange::from_zero(self.duration_secs)
    }

    /// Stored frame size of the video track, zero when there is none.
    pub fn natural_size(&self) -> Size {
        self.video
            .as_ref()
            .map(|t| t.natural_size)
            .unwrap_or(Size::ZERO)
    }

    /// Preferred transform of the video track, identity when there is none.
    pub fn preferred_transform(&self) -> AffineTransform {
        self.video
            .as_ref()
            .map(|t| t.preferred_transform)
            .unwrap_or(AffineTransform::IDENTITY)
    }

    /// Displayed frame size: the natural size run through the native
    /// transform, absolute per axis.
    pub fn oriented_size(&self) -> Size {
        self.natural_size()
            .applying(&self.preferred_transform())
            .abs()
    }

    /// Displayed width over height, `0.0` without a video track.
    pub fn aspect_ratio(&self) -> f64 {
        if self.video.is_none() {
            return 0.0;
        }
        self.oriented_size().aspect_ratio()
    }
}
