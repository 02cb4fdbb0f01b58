//! Show media information for a source file.

use std::path::PathBuf;

use backdrop_layout::resolve_orientation;
use backdrop_media_model::AssetTrack;
use backdrop_render_engine::probe::probe_media;

pub fn run(input: PathBuf) -> anyhow::Result<()> {
    let asset = probe_media(&input)?;
    let oriented = asset.oriented_size();

    println!("Media: {}", asset.path.display());
    println!("  Duration: {:.2}s", asset.duration_secs);
    println!("  Resolution: {}x{}", oriented.width, oriented.height);
    println!("  Aspect ratio: {:.4}", asset.aspect_ratio());
    println!(
        "  Orientation: {} ({:.0}°)",
        resolve_orientation(&asset.preferred_transform()).as_str(),
        asset.preferred_transform().rotation_degrees()
    );
    println!();

    println!("Tracks:");
    print_track("Video", asset.video.as_ref());
    print_track("Audio", asset.audio.as_ref());

    Ok(())
}

fn print_track(label: &str, track: Option<&AssetTrack>) {
    match track {
        Some(t) if t.natural_size.width > 0.0 => println!(
            "  {label}: stream {} ({:.2}s, {}x{} stored)",
            t.stream_index, t.time_range.duration_secs, t.natural_size.width, t.natural_size.height
        ),
        Some(t) => println!(
            "  {label}: stream {} ({:.2}s)",
            t.stream_index, t.time_range.duration_secs
        ),
        None => println!("  {label}: none"),
    }
}
