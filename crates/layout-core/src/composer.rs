//! Layer transform synthesis.
//!
//! Each orientation has its own concatenation order. The orders differ on
//! purpose (`Up` scales before rotating, `Down`/`Left` scale last) and the
//! rendered output depends on them, so they must not be normalized.

use std::f64::consts::{FRAC_PI_2, PI};

use backdrop_media_model::{AffineTransform, Size};

use crate::orientation::Orientation;
use crate::planner::GeometryPlan;

/// Final transform for a video layer.
///
/// * `asset_size` is the track's oriented size.
/// * `native` is the asset's movie-level transform, normally identity. The
///   track's own rotation is supplied by the orientation branch, so passing it
///   here would rotate the frame twice.
/// * `target` is the render area of the stage.
pub fn compose_transform(
    orientation: Orientation,
    asset_size: Size,
    native: &AffineTransform,
    plan: &GeometryPlan,
    target: Size,
) -> AffineTransform {
    match orientation {
        Orientation::Right => right(plan),
        Orientation::Down => down(asset_size, native, plan, target),
        Orientation::Left => left(asset_size, native, plan, target),
        Orientation::Up | Orientation::Other => up(asset_size, native, plan, target),
    }
}

fn right(plan: &GeometryPlan) -> AffineTransform {
    let translate = AffineTransform::translation(plan.position_x, plan.position_y);
    plan.scale_transform().concatenating(&translate)
}

fn down(
    asset: Size,
    native: &AffineTransform,
    plan: &GeometryPlan,
    target: Size,
) -> AffineTransform {
    let rotate = AffineTransform::rotation(-FRAC_PI_2);

    let mut ytranslation = asset.height;
    let mut xtranslation = 0.0;
    if plan.position_y == 0.0 {
        xtranslation = -(asset.width - target_corrected_width(asset, target)) / 2.0;
    } else {
        ytranslation = asset.height - (asset.height - target_corrected_height(asset, target)) / 2.0;
    }
    let translate = AffineTransform::translation(xtranslation, ytranslation);

    native
        .concatenating(&rotate)
        .concatenating(&translate)
        .concatenating(&plan.scale_transform())
}

fn left(
    asset: Size,
    native: &AffineTransform,
    plan: &GeometryPlan,
    target: Size,
) -> AffineTransform {
    let rotate = AffineTransform::rotation(-PI);

    let mut ytranslation = asset.height;
    let mut xtranslation = asset.width;
    if plan.position_y == 0.0 {
        xtranslation = asset.width - (asset.width - target_corrected_width(asset, target)) / 2.0;
    } else {
        ytranslation = asset.height - (asset.height - target_corrected_height(asset, target)) / 2.0;
    }
    let translate = AffineTransform::translation(xtranslation, ytranslation);

    native
        .concatenating(&rotate)
        .concatenating(&translate)
        .concatenating(&plan.scale_transform())
}

fn up(
    asset: Size,
    native: &AffineTransform,
    plan: &GeometryPlan,
    target: Size,
) -> AffineTransform {
    let rotate = AffineTransform::rotation(FRAC_PI_2);

    let scaled_width = asset.width * plan.scale_x;
    let ytranslation = (target.height - asset.height * plan.scale_y) / 2.0;
    let xtranslation = scaled_width + (target.width - scaled_width) / 2.0;
    let translate = AffineTransform::translation(xtranslation, ytranslation);

    native
        .concatenating(&plan.scale_transform())
        .concatenating(&rotate)
        .concatenating(&translate)
}

/// Asset width at the target's aspect ratio, keeping the asset height.
fn target_corrected_width(asset: Size, target: Size) -> f64 {
    (target.width / target.height) * asset.height
}

/// Asset height at the target's aspect ratio, keeping the asset width.
fn target_corrected_height(asset: Size, target: Size) -> f64 {
    (target.height / target.width) * asset.width
}
