//! Media probing through `ffprobe`.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use backdrop_common::error::{BackdropError, BackdropResult};
use backdrop_media_model::{AffineTransform, AssetTrack, MediaAsset, MediaKind, Size, TimeRange};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    disposition: HashMap<String, i64>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    side_data_type: Option<String>,
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

impl FfprobeStream {
    fn kind(&self) -> Option<MediaKind> {
        match self.codec_type.as_deref() {
            Some("video") => Some(MediaKind::Video),
            Some("audio") => Some(MediaKind::Audio),
            _ => None,
        }
    }

    /// Cover art shows up as a one-frame video stream.
    fn is_attached_picture(&self) -> bool {
        self.disposition.get("attached_pic").copied().unwrap_or(0) != 0
    }

    fn duration_secs(&self) -> Option<f64> {
        parse_secs(self.duration.as_deref())
    }

    /// Clockwise display rotation in degrees.
    ///
    /// The display matrix reports a counter-clockwise angle; the legacy
    /// `rotate` tag is already clockwise.
    fn display_rotation(&self) -> f64 {
        let matrix = self.side_data_list.iter().find_map(|side| {
            let is_matrix = side
                .side_data_type
                .as_deref()
                .map(|t| t.eq_ignore_ascii_case("Display Matrix"))
                .unwrap_or(false);
            if is_matrix {
                side.rotation
            } else {
                None
            }
        });

        match matrix {
            Some(ccw) => -ccw,
            None => self
                .tags
                .get("rotate")
                .and_then(|r| r.trim().parse::<f64>().ok())
                .unwrap_or(0.0),
        }
    }
}

fn parse_secs(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Build a [`MediaAsset`] from `ffprobe -show_streams -show_format -of json`
/// output.
///
/// The first non-cover-art video stream and the first audio stream become
/// the asset's tracks. Either may be missing.
pub fn parse_probe_output(json: &str, path: &Path) -> BackdropResult<MediaAsset> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| BackdropError::probe(format!("Invalid ffprobe output: {e}")))?;

    let format_duration = output
        .format
        .as_ref()
        .and_then(|f| parse_secs(f.duration.as_deref()));
    let duration_secs = format_duration
        .or_else(|| {
            output
                .streams
                .iter()
                .filter_map(FfprobeStream::duration_secs)
                .reduce(f64::max)
        })
        .unwrap_or(0.0);

    let mut video = None;
    let mut audio = None;
    let mut video_index = 0usize;
    let mut audio_index = 0usize;

    for stream in &output.streams {
        match stream.kind() {
            Some(MediaKind::Video) => {
                let stream_index = video_index;
                video_index += 1;
                if video.is_some() || stream.is_attached_picture() {
                    continue;
                }
                let (Some(width), Some(height)) = (stream.width, stream.height) else {
                    continue;
                };
                let natural_size = Size::new(f64::from(width), f64::from(height));
                let rotation = stream.display_rotation();
                video = Some(AssetTrack {
                    kind: MediaKind::Video,
                    stream_index,
                    natural_size,
                    preferred_transform: AffineTransform::from_display_rotation(
                        rotation,
                        natural_size,
                    ),
                    time_range: TimeRange::from_zero(
                        stream.duration_secs().unwrap_or(duration_secs),
                    ),
                });
            }
            Some(MediaKind::Audio) => {
                let stream_index = audio_index;
                audio_index += 1;
                if audio.is_some() {
                    continue;
                }
                audio = Some(AssetTrack {
                    kind: MediaKind::Audio,
                    stream_index,
                    natural_size: Size::ZERO,
                    preferred_transform: AffineTransform::IDENTITY,
                    time_range: TimeRange::from_zero(
                        stream.duration_secs().unwrap_or(duration_secs),
                    ),
                });
            }
            None => {}
        }
    }

    Ok(MediaAsset {
        path: path.to_path_buf(),
        duration_secs,
        // ffprobe only reports per-stream rotation; the movie matrix is not exposed.
        asset_transform: AffineTransform::IDENTITY,
        video,
        audio,
    })
}

/// Run `ffprobe` on `path` and parse the result.
pub fn probe_media(path: &Path) -> BackdropResult<MediaAsset> {
    if !path.exists() {
        return Err(BackdropError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let start = std::time::Instant::now();
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| BackdropError::probe(format!("Failed to start ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(BackdropError::probe(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let json = String::from_utf8_lossy(&output.stdout);
    let asset = parse_probe_output(&json, path)?;

    let oriented = asset.oriented_size();
    tracing::info!(
        path = %path.display(),
        duration_secs = asset.duration_secs,
        width = oriented.width,
        height = oriented.height,
        has_video = asset.video.is_some(),
        has_audio = asset.audio.is_some(),
        elapsed_ms = start.elapsed().as_millis(),
        "Probe completed"
    );

    Ok(asset)
}
