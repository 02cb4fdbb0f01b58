use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backdrop_common::config::RenderDefaults;
use backdrop_common::error::{BackdropError, BackdropResult};
use backdrop_media_model::{AffineTransform, AssetTrack, MediaAsset, MediaKind, Size, TimeRange};
use backdrop_render_engine::{
    BlurredBackgroundPipeline, ExportBackend, ExportInput, ExportJob, OutputLayout,
    PipelineRequest, ProgressObserver,
};

const SOURCE: &str = "/fixtures/landscape.mp4";

#[derive(Debug, Clone)]
struct RecordedJob {
    stem: String,
    kind: &'static str,
    inputs_present: bool,
    optimize_for_network: bool,
    video_tracks: usize,
    audio_tracks: usize,
}

/// Backend that writes placeholder files instead of encoding.
struct FakeBackend {
    source: MediaAsset,
    fail_stem: Option<&'static str>,
    step_delay: Duration,
    jobs: Mutex<Vec<RecordedJob>>,
}

impl FakeBackend {
    fn new(source: MediaAsset) -> Self {
        Self {
            source,
            fail_stem: None,
            step_delay: Duration::from_millis(2),
            jobs: Mutex::new(Vec::new()),
        }
    }

    fn failing_at(mut self, stem: &'static str) -> Self {
        self.fail_stem = Some(stem);
        self
    }

    fn stems(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|j| j.stem.clone())
            .collect()
    }

    fn jobs(&self) -> Vec<RecordedJob> {
        self.jobs.lock().unwrap().clone()
    }

    fn intermediate(&self, path: &Path) -> MediaAsset {
        let natural = Size::new(1080.0, 720.0);
        MediaAsset {
            path: path.to_path_buf(),
            duration_secs: self.source.duration_secs,
            asset_transform: AffineTransform::IDENTITY,
            video: Some(AssetTrack {
                kind: MediaKind::Video,
                stream_index: 0,
                natural_size: natural,
                preferred_transform: AffineTransform::IDENTITY,
                time_range: TimeRange::from_zero(self.source.duration_secs),
            }),
            audio: self.source.audio.clone(),
        }
    }
}

impl ExportBackend for FakeBackend {
    fn probe(&self, path: &Path) -> BackdropResult<MediaAsset> {
        if path == self.source.path {
            return Ok(self.source.clone());
        }
        if !path.exists() {
            return Err(BackdropError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(self.intermediate(path))
    }

    fn export(&self, job: &ExportJob) -> BackdropResult<()> {
        let stem = job
            .output_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let record = match &job.input {
            ExportInput::Composition { composition, .. } => RecordedJob {
                stem: stem.clone(),
                kind: "composition",
                inputs_present: composition
                    .tracks()
                    .iter()
                    .flat_map(|t| t.segments.iter())
                    .all(|s| s.source == self.source.path || s.source.exists()),
                optimize_for_network: job.optimize_for_network,
                video_tracks: composition.tracks_of(MediaKind::Video).count(),
                audio_tracks: composition.tracks_of(MediaKind::Audio).count(),
            },
            ExportInput::Filtered { asset, .. } => RecordedJob {
                stem: stem.clone(),
                kind: "filtered",
                inputs_present: asset.path.exists(),
                optimize_for_network: job.optimize_for_network,
                video_tracks: usize::from(asset.video.is_some()),
                audio_tracks: usize::from(asset.audio.is_some()),
            },
        };
        self.jobs.lock().unwrap().push(record);

        for quarter in 1..=4 {
            job.progress.set(quarter as f32 / 4.0);
            std::thread::sleep(self.step_delay);
        }

        if self.fail_stem == Some(stem.as_str()) {
            return Err(BackdropError::render(format!("simulated {stem} failure")));
        }
        std::fs::write(&job.output_path, stem.as_bytes())?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fake"
    }
}

fn source_asset(with_audio: bool) -> MediaAsset {
    let natural = Size::new(1920.0, 1080.0);
    MediaAsset {
        path: PathBuf::from(SOURCE),
        duration_secs: 2.0,
        asset_transform: AffineTransform::IDENTITY,
        video: Some(AssetTrack {
            kind: MediaKind::Video,
            stream_index: 0,
            natural_size: natural,
            preferred_transform: AffineTransform::IDENTITY,
            time_range: TimeRange::from_zero(2.0),
        }),
        audio: with_audio.then(|| AssetTrack {
            kind: MediaKind::Audio,
            stream_index: 0,
            natural_size: Size::ZERO,
            preferred_transform: AffineTransform::IDENTITY,
            time_range: TimeRange::from_zero(2.0),
        }),
    }
}

fn request() -> PipelineRequest {
    PipelineRequest::new(SOURCE, Size::new(1080.0, 720.0), 0.5)
}

fn pipeline_with(backend: Arc<FakeBackend>, dir: &Path) -> BlurredBackgroundPipeline {
    let defaults = RenderDefaults {
        progress_interval_ms: 1,
        ..RenderDefaults::default()
    };
    BlurredBackgroundPipeline::with_defaults(backend, OutputLayout::new(dir), &defaults)
}

fn recorder() -> (ProgressObserver, Arc<Mutex<Vec<f32>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: ProgressObserver = Arc::new(move |v| sink.lock().unwrap().push(v));
    (observer, seen)
}

#[tokio::test]
async fn stages_run_in_order_and_chain_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(source_asset(true)));
    let pipeline = pipeline_with(Arc::clone(&backend), dir.path());

    let output = pipeline.run(request(), None).await.unwrap();

    assert_eq!(output, dir.path().join("final.mov"));
    assert!(output.exists());
    assert_eq!(backend.stems(), vec!["center", "blurred", "final"]);

    let jobs = backend.jobs();
    assert!(jobs.iter().all(|j| j.inputs_present), "{jobs:?}");
    assert_eq!(jobs[1].kind, "filtered");
    assert_eq!(
        jobs.iter().map(|j| j.optimize_for_network).collect::<Vec<_>>(),
        vec![true, false, true]
    );
    assert_eq!(jobs[2].video_tracks, 2);
    assert_eq!(jobs[2].audio_tracks, 1);
    assert!(!pipeline.is_running());
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_one() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(source_asset(true)));
    let pipeline = pipeline_with(backend, dir.path());
    let (observer, seen) = recorder();

    pipeline.run(request(), Some(observer)).await.unwrap();

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|v| (0.0..=1.0).contains(v)));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(*seen.last().unwrap(), 1.0);
    assert_eq!(seen.iter().filter(|v| **v == 1.0).count(), 1);
}

#[tokio::test]
async fn source_without_audio_still_reaches_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(source_asset(false)));
    let pipeline = pipeline_with(Arc::clone(&backend), dir.path());

    pipeline.run(request(), None).await.unwrap();

    let jobs = backend.jobs();
    assert_eq!(jobs[0].video_tracks, 1);
    assert_eq!(jobs[0].audio_tracks, 0);
    assert_eq!(jobs[2].stem, "final");
    assert_eq!(jobs[2].audio_tracks, 0);
}

#[tokio::test]
async fn blur_failure_stops_before_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(source_asset(true)).failing_at("blurred"));
    let pipeline = pipeline_with(Arc::clone(&backend), dir.path());
    let (observer, seen) = recorder();

    let err = pipeline.run(request(), Some(observer)).await.unwrap_err();

    assert!(matches!(err, BackdropError::Render { .. }));
    assert!(err.to_string().contains("simulated blurred failure"));
    assert_eq!(backend.stems(), vec!["center", "blurred"]);
    assert!(!dir.path().join("final.mov").exists());
    assert!(seen.lock().unwrap().iter().all(|v| *v < 1.0));
    assert!(!pipeline.is_running());
}

#[tokio::test]
async fn stale_output_is_removed_before_stage_runs() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("blurred.mov");
    std::fs::write(&stale, b"from an earlier run").unwrap();

    let backend = Arc::new(FakeBackend::new(source_asset(true)).failing_at("blurred"));
    let pipeline = pipeline_with(backend, dir.path());

    assert!(pipeline.run(request(), None).await.is_err());
    assert!(!stale.exists());
    assert!(dir.path().join("center.mov").exists());
}

#[tokio::test]
async fn concurrent_run_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(source_asset(true)));
    let pipeline = pipeline_with(backend, dir.path());

    let (first, second) = tokio::join!(
        pipeline.run(request(), None),
        pipeline.run(request(), None)
    );

    assert!(first.is_ok());
    let err = second.unwrap_err();
    assert!(matches!(err, BackdropError::Pipeline { .. }));
    assert!(err.to_string().contains("pipeline already running"));

    // the instance is free again afterwards
    pipeline.run(request(), None).await.unwrap();
}

#[tokio::test]
async fn start_delivers_completion_once() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(source_asset(true)));
    let pipeline = Arc::new(pipeline_with(backend, dir.path()));
    let results: Arc<Mutex<Vec<BackdropResult<PathBuf>>>> = Arc::default();
    let sink = Arc::clone(&results);

    pipeline
        .start(
            request(),
            None,
            Box::new(move |result| sink.lock().unwrap().push(result)),
        )
        .await
        .unwrap();

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap(), &dir.path().join("final.mov"));
}

#[tokio::test]
async fn invalid_request_fails_before_any_export() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(source_asset(true)));
    let pipeline = pipeline_with(Arc::clone(&backend), dir.path());

    let odd = PipelineRequest::new(SOURCE, Size::new(1079.0, 720.0), 0.5);
    let err = pipeline.run(odd, None).await.unwrap_err();

    assert!(matches!(err, BackdropError::Config { .. }));
    assert!(backend.stems().is_empty());
}

#[tokio::test]
async fn missing_source_surfaces_probe_error() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(source_asset(true)));
    let pipeline = pipeline_with(Arc::clone(&backend), dir.path());

    let missing = PipelineRequest::new("/nowhere/clip.mp4", Size::new(1080.0, 720.0), 0.5);
    let err = pipeline.run(missing, None).await.unwrap_err();

    assert!(matches!(err, BackdropError::FileNotFound { .. }));
    assert!(backend.stems().is_empty());
}
