//! Backdrop Layout
//!
//! Pure geometry used to place a clip inside a render area:
//!
//! ```text
//! preferred transform ──► orientation ──┐
//!                                       ├──► layer transform
//! asset size + area ──► geometry plan ──┘
//! ```
//!
//! Everything here is a pure function of its inputs.

pub mod composer;
pub mod orientation;
pub mod planner;

pub use composer::compose_transform;
pub use orientation::{resolve_orientation, Orientation};
pub use planner::{aspect_fill_size, aspect_fit_size, plan, FitMode, GeometryPlan};
