//! ffmpeg-backed export.
//!
//! Compositions become a single `-filter_complex` graph: a black canvas of
//! the render size with each layer transformed and overlaid on top in
//! instruction order. Filtered inputs are decoded to raw RGBA, run through
//! the frame filter in-process and piped into a second ffmpeg for encoding.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use image::RgbaImage;

use backdrop_common::error::{BackdropError, BackdropResult};
use backdrop_media_model::{
    AffineTransform, Composition, MediaAsset, MediaKind, Size, TrackSegment, VideoComposition,
};

use crate::blur::FrameFilter;
use crate::export::{
    ExportBackend, ExportInput, ExportJob, ExportPreset, FrameFilterSpec, JobProgress,
};
use crate::probe::probe_media;

/// Matrix entries closer to zero than this are treated as zero.
const AXIS_EPSILON: f64 = 1e-6;

/// Backend that shells out to `ffmpeg` and `ffprobe`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ExportBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> BackdropResult<MediaAsset> {
        probe_media(path)
    }

    fn export(&self, job: &ExportJob) -> BackdropResult<()> {
        let started = std::time::Instant::now();
        match &job.input {
            ExportInput::Composition {
                composition,
                video_composition,
            } => {
                let args = composition_args(job, composition, video_composition.as_ref())?;
                run_ffmpeg(&args, composition.duration_secs(), &job.progress)?;
            }
            ExportInput::Filtered {
                asset,
                filter,
                render_size,
                frame_rate,
            } => {
                run_frame_filter(job, asset, filter, *render_size, *frame_rate)?;
            }
        }

        tracing::info!(
            output = %job.output_path.display(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Export finished"
        );
        Ok(())
    }

    fn is_available(&self) -> bool {
        command_exists("ffmpeg") && command_exists("ffprobe")
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Where and how one transformed layer lands on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPlacement {
    /// Filters turning the stored frame into the placed frame.
    pub filters: Vec<String>,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Map an affine layer transform to ffmpeg filters plus an overlay origin.
///
/// Axis-aligned transforms (scales, flips and quarter turns) are exact.
/// Anything else is rotated with `rotate` and scaled to its bounding box.
pub fn layer_placement(transform: &AffineTransform, natural: Size) -> LayerPlacement {
    let (min, max) = transform.bounding_box(natural);
    let width = (max.x - min.x).round().max(1.0) as u32;
    let height = (max.y - min.y).round().max(1.0) as u32;
    let mut filters = Vec::new();

    let near_zero = |v: f64| v.abs() < AXIS_EPSILON;
    if near_zero(transform.b) && near_zero(transform.c) {
        if transform.a < 0.0 {
            filters.push("hflip".to_string());
        }
        if transform.d < 0.0 {
            filters.push("vflip".to_string());
        }
    } else if near_zero(transform.a) && near_zero(transform.d) {
        // Swap axes first: output x follows input y and vice versa.
        filters.push("transpose=cclock_flip".to_string());
        if transform.c < 0.0 {
            filters.push("hflip".to_string());
        }
        if transform.b < 0.0 {
            filters.push("vflip".to_string());
        }
    } else {
        let angle = transform.b.atan2(transform.a);
        filters.push("format=rgba".to_string());
        filters.push(format!(
            "rotate={angle:.6}:ow=rotw({angle:.6}):oh=roth({angle:.6}):c=none"
        ));
    }

    let natural_w = natural.width.round() as u32;
    let natural_h = natural.height.round() as u32;
    let swapped = filters.iter().any(|f| f.starts_with("transpose"));
    let (after_w, after_h) = if swapped {
        (natural_h, natural_w)
    } else {
        (natural_w, natural_h)
    };
    let rotated = filters.iter().any(|f| f.starts_with("rotate"));
    if rotated || after_w != width || after_h != height {
        filters.push(format!("scale={width}:{height}"));
    }

    LayerPlacement {
        filters,
        x: min.x.round() as i64,
        y: min.y.round() as i64,
        width,
        height,
    }
}

/// Unique source files of a composition, in first-use order.
fn collect_inputs(composition: &Composition) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = Vec::new();
    for segment in composition.tracks().iter().flat_map(|t| t.segments.iter()) {
        if !inputs.contains(&segment.source) {
            inputs.push(segment.source.clone());
        }
    }
    inputs
}

fn segment_video_chain(
    input: usize,
    segment: &TrackSegment,
    transform: &AffineTransform,
    label: &str,
) -> (String, LayerPlacement) {
    let placement = layer_placement(transform, segment.natural_size);
    let mut chain = vec![
        format!(
            "trim=start={:.6}:duration={:.6}",
            segment.source_range.start_secs, segment.source_range.duration_secs
        ),
        format!("setpts=PTS-STARTPTS+{:.6}/TB", segment.at_secs),
    ];
    chain.extend(placement.filters.iter().cloned());
    (
        format!(
            "[{input}:v:{}]{}[{label}]",
            segment.stream_index,
            chain.join(",")
        ),
        placement,
    )
}

/// Build the full ffmpeg argument list for a composition export.
pub fn composition_args(
    job: &ExportJob,
    composition: &Composition,
    video_composition: Option<&VideoComposition>,
) -> BackdropResult<Vec<String>> {
    let first_video = composition
        .tracks_of(MediaKind::Video)
        .find_map(|t| t.segments.first())
        .ok_or_else(|| BackdropError::render("Composition has no video track to render"))?;

    let inputs = collect_inputs(composition);
    let input_index: HashMap<&Path, usize> = inputs
        .iter()
        .enumerate()
        .map(|(i, p)| (p.as_path(), i))
        .collect();

    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
    ];
    for input in &inputs {
        args.push("-noautorotate".to_string());
        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());
    }

    let duration = composition.duration_secs();
    let mut graph = Vec::new();
    let video_out: String;

    match video_composition {
        Some(vc) => {
            let (w, h) = (
                vc.render_size.width.round() as u32,
                vc.render_size.height.round() as u32,
            );
            graph.push(format!(
                "color=c=black:s={w}x{h}:r={}:d={duration:.6}[base0]",
                vc.frame_rate.max(1)
            ));

            let mut current = "base0".to_string();
            let mut layer_count = 0usize;
            for instruction in &vc.instructions {
                let start = instruction.time_range.start_secs;
                let end = instruction.time_range.end_secs();
                for layer in &instruction.layer_instructions {
                    let Some(track) = composition.track(layer.track) else {
                        continue;
                    };
                    if layer.transform.determinant().abs() < AXIS_EPSILON {
                        return Err(BackdropError::unsupported(format!(
                            "Layer transform for track {} collapses the frame",
                            layer.track.0
                        )));
                    }
                    for segment in &track.segments {
                        let input = input_index
                            .get(segment.source.as_path())
                            .copied()
                            .ok_or_else(|| {
                                BackdropError::render(format!(
                                    "Segment source {} is not an input",
                                    segment.source.display()
                                ))
                            })?;
                        layer_count += 1;
                        let label = format!("layer{layer_count}");
                        let (chain, placement) =
                            segment_video_chain(input, segment, &layer.transform, &label);
                        graph.push(chain);

                        let next = format!("base{layer_count}");
                        graph.push(format!(
                            "[{current}][{label}]overlay=x={}:y={}:eof_action=pass:enable='between(t,{start:.6},{end:.6})'[{next}]",
                            placement.x, placement.y
                        ));
                        current = next;
                    }
                }
            }
            graph.push(format!("[{current}]format=yuv420p[vout]"));
            video_out = "[vout]".to_string();
        }
        None => {
            let input = input_index
                .get(first_video.source.as_path())
                .copied()
                .unwrap_or(0);
            video_out = format!("{input}:v:{}", first_video.stream_index);
        }
    }

    let audio_segment = composition
        .tracks_of(MediaKind::Audio)
        .find_map(|t| t.segments.first());
    let audio_out = match audio_segment {
        Some(segment) => {
            let input = input_index
                .get(segment.source.as_path())
                .copied()
                .unwrap_or(0);
            let mut chain = vec![
                format!(
                    "atrim=start={:.6}:duration={:.6}",
                    segment.source_range.start_secs, segment.source_range.duration_secs
                ),
                "asetpts=PTS-STARTPTS".to_string(),
            ];
            if segment.at_secs > 0.0 {
                let delay_ms = (segment.at_secs * 1000.0).round() as u64;
                chain.push(format!("adelay={delay_ms}:all=1"));
            }
            graph.push(format!(
                "[{input}:a:{}]{}[aout]",
                segment.stream_index,
                chain.join(",")
            ));
            Some("[aout]".to_string())
        }
        None => None,
    };

    if !graph.is_empty() {
        args.push("-filter_complex".to_string());
        args.push(graph.join(";"));
    }

    args.push("-map".to_string());
    args.push(video_out);
    match audio_out {
        Some(label) => {
            args.push("-map".to_string());
            args.push(label);
        }
        None => args.push("-an".to_string()),
    }

    if let Some(vc) = video_composition {
        args.push("-r".to_string());
        args.push(vc.frame_rate.max(1).to_string());
    }
    args.push("-t".to_string());
    args.push(format!("{duration:.6}"));

    args.extend(codec_args(job.preset, audio_segment.is_some()));
    args.extend(container_args(job));
    args.push(job.output_path.to_string_lossy().to_string());

    Ok(args)
}

fn codec_args(preset: ExportPreset, with_audio: bool) -> Vec<String> {
    let mut args = match preset {
        ExportPreset::HighestQuality => vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "slow".to_string(),
            "-crf".to_string(),
            "18".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ],
    };
    if with_audio {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
        ]);
    }
    args
}

fn container_args(job: &ExportJob) -> Vec<String> {
    let mut args = Vec::new();
    if job.optimize_for_network {
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
    }
    args.push("-f".to_string());
    args.push(job.file_type.muxer().to_string());
    args
}

fn spawn_stderr_drain(
    child: &mut Child,
    tool: &'static str,
) -> Option<std::thread::JoinHandle<String>> {
    let stderr = child.stderr.take()?;
    // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
    Some(std::thread::spawn(move || -> String {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read {tool} stderr: {err}>"),
        }
    }))
}

fn join_stderr(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle
        .map(|h| {
            h.join()
                .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
        })
        .unwrap_or_default()
}

fn run_ffmpeg(
    args: &[String],
    expected_duration_secs: f64,
    progress: &JobProgress,
) -> BackdropResult<()> {
    tracing::debug!(args = ?args, "Running ffmpeg");
    let start = std::time::Instant::now();
    let mut child = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BackdropError::render(format!("Failed to start ffmpeg: {e}")))?;

    tracing::info!(
        pid = child.id(),
        args_len = args.len(),
        expected_duration_secs,
        "ffmpeg process started"
    );

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BackdropError::render("Failed to capture ffmpeg stdout"))?;
    let stderr_task = spawn_stderr_drain(&mut child, "ffmpeg");

    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    let mut latest = ProgressState::default();
    let mut last_progress_secs = 0.0f64;
    let mut last_progress_wall = std::time::Instant::now();
    loop {
        line.clear();
        let bytes = reader
            .read_line(&mut line)
            .map_err(|e| BackdropError::render(format!("Failed reading ffmpeg progress: {e}")))?;
        if bytes == 0 {
            break;
        }

        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        latest.update(key, value);
        if key != "progress" {
            continue;
        }

        if latest.out_time_secs > last_progress_secs + 0.001 {
            last_progress_secs = latest.out_time_secs;
            last_progress_wall = std::time::Instant::now();
        }
        progress.set(latest.fraction(expected_duration_secs));
        if last_progress_wall.elapsed().as_secs() >= 10 {
            tracing::warn!(
                out_time_secs = latest.out_time_secs,
                elapsed_secs = start.elapsed().as_secs_f64(),
                "No ffmpeg progress advancement for 10s"
            );
            last_progress_wall = std::time::Instant::now();
        }
    }

    let status = child
        .wait()
        .map_err(|e| BackdropError::render(format!("Failed to wait on ffmpeg: {e}")))?;
    let stderr_output = join_stderr(stderr_task);

    if !status.success() {
        return Err(BackdropError::render(format!(
            "ffmpeg export failed (status {}): {}",
            status,
            stderr_output.trim()
        )));
    }

    progress.complete();
    Ok(())
}

/// Decode `asset` to raw frames, filter each one and encode the result.
fn run_frame_filter(
    job: &ExportJob,
    asset: &MediaAsset,
    spec: &FrameFilterSpec,
    render_size: Size,
    frame_rate: u32,
) -> BackdropResult<()> {
    if asset.video.is_none() {
        return Err(BackdropError::render(format!(
            "{} has no video track to filter",
            asset.path.display()
        )));
    }

    let width = render_size.width.round() as u32;
    let height = render_size.height.round() as u32;
    let fps = frame_rate.max(1);
    let filter = spec.build();
    let total_frames = ((asset.duration_secs * f64::from(fps)).ceil() as u64).max(1);
    let frame_len = width as usize * height as usize * 4;
    let source = asset.path.to_string_lossy().to_string();

    tracing::info!(
        filter = filter.name(),
        source = %source,
        width,
        height,
        fps,
        total_frames,
        "Starting frame filter export"
    );

    let mut decoder = Command::new("ffmpeg")
        .args(["-hide_banner", "-v", "error", "-i", source.as_str()])
        .args([
            "-map".to_string(),
            "0:v:0".to_string(),
            "-vf".to_string(),
            format!("scale={width}:{height},fps={fps}"),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
            "pipe:1".to_string(),
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BackdropError::render(format!("Failed to start ffmpeg decoder: {e}")))?;

    let mut encoder_args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{width}x{height}"),
        "-r".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
    ];
    let with_audio = asset.audio.is_some();
    if with_audio {
        encoder_args.extend(["-i".to_string(), source.clone()]);
        encoder_args.extend([
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-shortest".to_string(),
        ]);
    }
    encoder_args.extend(codec_args(job.preset, with_audio));
    encoder_args.extend(container_args(job));
    encoder_args.push(job.output_path.to_string_lossy().to_string());

    let mut encoder = match Command::new("ffmpeg")
        .args(&encoder_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            let _ = decoder.kill();
            let _ = decoder.wait();
            return Err(BackdropError::render(format!(
                "Failed to start ffmpeg encoder: {e}"
            )));
        }
    };

    let decoder_stderr = spawn_stderr_drain(&mut decoder, "ffmpeg decoder");
    let encoder_stderr = spawn_stderr_drain(&mut encoder, "ffmpeg encoder");

    let pumped = pump_frames(
        &mut decoder,
        &mut encoder,
        filter.as_ref(),
        (width, height),
        frame_len,
        total_frames,
        &job.progress,
    );
    if pumped.is_err() {
        let _ = decoder.kill();
    }

    let decoder_status = decoder
        .wait()
        .map_err(|e| BackdropError::render(format!("Failed to wait on ffmpeg decoder: {e}")))?;
    let encoder_status = encoder
        .wait()
        .map_err(|e| BackdropError::render(format!("Failed to wait on ffmpeg encoder: {e}")))?;
    let decoder_log = join_stderr(decoder_stderr);
    let encoder_log = join_stderr(encoder_stderr);

    let frames = pumped.map_err(|e| {
        if encoder_status.success() {
            e
        } else {
            BackdropError::render(format!("{e}; encoder: {}", encoder_log.trim()))
        }
    })?;
    if !decoder_status.success() {
        return Err(BackdropError::render(format!(
            "ffmpeg decoder failed (status {decoder_status}): {}",
            decoder_log.trim()
        )));
    }
    if !encoder_status.success() {
        return Err(BackdropError::render(format!(
            "ffmpeg encoder failed (status {encoder_status}): {}",
            encoder_log.trim()
        )));
    }
    if frames == 0 {
        return Err(BackdropError::render(format!(
            "No frames decoded from {}",
            asset.path.display()
        )));
    }

    tracing::debug!(frames, "Frame filter export complete");
    job.progress.complete();
    Ok(())
}

fn pump_frames(
    decoder: &mut Child,
    encoder: &mut Child,
    filter: &dyn FrameFilter,
    (width, height): (u32, u32),
    frame_len: usize,
    total_frames: u64,
    progress: &JobProgress,
) -> BackdropResult<u64> {
    let mut frames_in = decoder
        .stdout
        .take()
        .ok_or_else(|| BackdropError::render("Failed to capture ffmpeg decoder stdout"))?;
    // Dropped at the end of this function, which closes the encoder's input.
    let mut frames_out = encoder
        .stdin
        .take()
        .ok_or_else(|| BackdropError::render("Failed to capture ffmpeg encoder stdin"))?;

    let mut buffer = vec![0u8; frame_len];
    let mut frames = 0u64;
    loop {
        match frames_in.read_exact(&mut buffer) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                return Err(BackdropError::render(format!(
                    "Failed reading decoded frame: {e}"
                )))
            }
        }

        let frame = RgbaImage::from_raw(width, height, std::mem::take(&mut buffer))
            .ok_or_else(|| BackdropError::render("Decoded frame has the wrong size"))?;
        let filtered = filter.apply(&frame);
        frames_out
            .write_all(filtered.as_raw())
            .map_err(|e| BackdropError::render(format!("Failed writing filtered frame: {e}")))?;
        buffer = frame.into_raw();

        frames += 1;
        // Held below 1.0 until the encoder has finished.
        progress.set((frames as f32 / total_frames as f32).min(0.99));
    }

    frames_out
        .flush()
        .map_err(|e| BackdropError::render(format!("Failed flushing encoder input: {e}")))?;
    Ok(frames)
}

/// Report whether `binary` is on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Latest values from ffmpeg's `-progress` key/value stream.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, ffmpeg reports microseconds here too.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_duration_secs: f64) -> f32 {
        if self.complete {
            return 1.0;
        }
        if expected_duration_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / expected_duration_secs).clamp(0.0, 1.0) as f32
    }
}
