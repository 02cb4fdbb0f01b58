//! Backdrop Media Model
//!
//! Value types shared by the layout and render crates:
//! - [`geometry`]: sizes and points in pixel space
//! - [`transform`]: 2×3 affine transforms with ordered concatenation
//! - [`time`]: media time ranges in seconds
//! - [`asset`]: probed media files and their tracks
//! - [`composition`]: track assemblies and layer instructions

pub mod asset;
pub mod composition;
pub mod geometry;
pub mod time;
pub mod transform;

pub use asset::{AssetTrack, MediaAsset, MediaKind};
pub use composition::{
    Composition, CompositionInstruction, CompositionTrack, LayerInstruction, TrackId,
    TrackSegment, VideoComposition,
};
pub use geometry::{Point, Size};
pub use time::TimeRange;
pub use transform::AffineTransform;
