//! Track assemblies and layer instructions.
//!
//! A [`Composition`] says *which* media plays *when*; a
//! [`VideoComposition`] says *how* the video tracks are layered into each
//! rendered frame. The two are built together but exported as separate
//! inputs, so a composition can also be rendered without instructions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use backdrop_common::error::{BackdropError, BackdropResult};

use crate::asset::{MediaAsset, MediaKind};
use crate::geometry::Size;
use crate::time::TimeRange;
use crate::transform::AffineTransform;

/// Identifier of a track inside one composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u32);

/// A time range of a source track placed on a composition track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    /// Source file.
    pub source: PathBuf,

    /// Per-kind stream index inside the source.
    pub stream_index: usize,

    /// Stored frame size of the source track. Zero for audio.
    pub natural_size: Size,

    /// Portion of the source track that is used.
    pub source_range: TimeRange,

    /// Composition time at which the segment starts.
    pub at_secs: f64,
}

impl TrackSegment {
    pub fn end_secs(&self) -> f64 {
        self.at_secs + self.source_range.duration_secs
    }
}

/// A composition track and the segments inserted into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionTrack {
    pub id: TrackId,
    pub kind: MediaKind,
    pub segments: Vec<TrackSegment>,
}

/// Ordered collection of tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    tracks: Vec<CompositionTrack>,
}

impl Composition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty track and return its id.
    pub fn add_track(&mut self, kind: MediaKind) -> TrackId {
        let id = TrackId(self.tracks.len() as u32 + 1);
        self.tracks.push(CompositionTrack {
            id,
            kind,
            segments: Vec::new(),
        });
        id
    }

    /// Insert `range` of `asset`'s track of the same kind as `track` at
    /// composition time `at_secs`.
    pub fn insert_time_range(
        &mut self,
        track: TrackId,
        range: TimeRange,
        asset: &MediaAsset,
        at_secs: f64,
    ) -> BackdropResult<()> {
        let target = self
            .tracks
            .iter_mut()
            .find(|t| t.id == track)
            .ok_or_else(|| {
                BackdropError::composition(format!("Unknown composition track {:?}", track))
            })?;

        let source_track = asset.track(target.kind).ok_or_else(|| {
            BackdropError::composition(format!(
                "{} has no {} track",
                asset.path.display(),
                target.kind.as_str()
            ))
        })?;

        target.segments.push(TrackSegment {
            source: asset.path.clone(),
            stream_index: source_track.stream_index,
            natural_size: source_track.natural_size,
            source_range: range,
            at_secs,
        });
        Ok(())
    }

    pub fn tracks(&self) -> &[CompositionTrack] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&CompositionTrack> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn tracks_of(&self, kind: MediaKind) -> impl Iterator<Item = &CompositionTrack> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }

    /// Furthest end of any inserted segment.
    pub fn duration_secs(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.segments.iter())
            .map(TrackSegment::end_secs)
            .fold(0.0, f64::max)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(|t| t.segments.is_empty())
    }
}

/// Transform applied to one track from `start_secs` onward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInstruction {
    pub track: TrackId,
    pub transform: AffineTransform,
    pub start_secs: f64,
}

impl LayerInstruction {
    /// Pass-through instruction for a track.
    pub fn identity(track: TrackId) -> Self {
        Self {
            track,
            transform: AffineTransform::IDENTITY,
            start_secs: 0.0,
        }
    }
}

/// Layer instructions active during a time range.
///
/// `layer_instructions` is ordered back-to-front: later entries paint over
/// earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionInstruction {
    pub time_range: TimeRange,
    pub layer_instructions: Vec<LayerInstruction>,
}

/// Render instructions for a composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoComposition {
    pub instructions: Vec<CompositionInstruction>,
    pub frame_rate: u32,
    pub render_size: Size,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetTrack;

    fn video_only(path: &str, duration: f64) -> MediaAsset {
        MediaAsset {
            path: PathBuf::from(path),
            duration_secs: duration,
            asset_transform: AffineTransform::IDENTITY,
            video: Some(AssetTrack {
                kind: MediaKind::Video,
                stream_index: 0,
                natural_size: Size::new(640.0, 480.0),
                preferred_transform: AffineTransform::IDENTITY,
                time_range: TimeRange::from_zero(duration),
            }),
            audio: None,
        }
    }

    #[test]
    fn test_track_ids_are_sequential() {
        let mut composition = Composition::new();
        let a = composition.add_track(MediaKind::Video);
        let b = composition.add_track(MediaKind::Audio);
        assert_ne!(a, b);
        assert_eq!(composition.tracks().len(), 2);
        assert_eq!(composition.tracks_of(MediaKind::Audio).count(), 1);
    }

    #[test]
    fn test_duration_follows_segments() {
        let asset = video_only("clip.mp4", 3.0);
        let mut composition = Composition::new();
        let track = composition.add_track(MediaKind::Video);
        assert!(composition.is_empty());

        composition
            .insert_time_range(track, asset.time_range(), &asset, 0.0)
            .unwrap();
        composition
            .insert_time_range(track, asset.time_range(), &asset, composition.duration_secs())
            .unwrap();

        assert!((composition.duration_secs() - 6.0).abs() < 1e-12);
        assert_eq!(composition.track(track).unwrap().segments.len(), 2);
    }

    #[test]
    fn test_insert_missing_kind_fails() {
        let asset = video_only("clip.mp4", 1.0);
        let mut composition = Composition::new();
        let audio = composition.add_track(MediaKind::Audio);
        let err = composition
            .insert_time_range(audio, asset.time_range(), &asset, 0.0)
            .unwrap_err();
        assert!(matches!(err, BackdropError::Composition { .. }));
    }
}
