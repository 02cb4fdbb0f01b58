//! Three-stage orchestration.
//!
//! Each stage's output file is the next stage's input; the overlay stage
//! also reads the original source. A failed stage ends the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use backdrop_common::config::RenderDefaults;
use backdrop_common::error::{BackdropError, BackdropResult};
use backdrop_media_model::{MediaAsset, Size};

use crate::compositor::CompositionBuilder;
use crate::export::{ExportBackend, ExportJob, OutputFileType};
use crate::progress::{
    PipelineStage, ProgressObserver, ProgressReporter, ReporterOutcome, SharedPipelineState,
};

/// Callback receiving the outcome of a [`BlurredBackgroundPipeline::start`]
/// run.
pub type CompletionCallback = Box<dyn FnOnce(BackdropResult<PathBuf>) + Send>;

/// Deterministic per-stage output paths inside one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    dir: PathBuf,
}

impl OutputLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stage_output(&self, stage: PipelineStage) -> PathBuf {
        self.dir.join(format!(
            "{}.{}",
            stage.output_stem(),
            OutputFileType::QuickTimeMovie.extension()
        ))
    }

    /// Create the output directory if it is missing.
    pub fn prepare(&self) -> BackdropResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}

/// Remove a previous output at `path`. Failures are logged and ignored.
pub fn remove_stale_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed previous output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "Failed to remove previous output")
        }
    }
}

/// Inputs of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub source: PathBuf,
    /// Render size of every stage.
    pub target_area: Size,
    /// Foreground shrink factor in the overlay stage.
    pub overlay_scale: f64,
}

impl PipelineRequest {
    pub fn new(source: impl Into<PathBuf>, target_area: Size, overlay_scale: f64) -> Self {
        Self {
            source: source.into(),
            target_area,
            overlay_scale,
        }
    }

    pub fn validate(&self) -> BackdropResult<()> {
        if !self.target_area.is_renderable() {
            return Err(BackdropError::config(format!(
                "target area must have positive size, got {}x{}",
                self.target_area.width, self.target_area.height
            )));
        }
        for (axis, value) in [
            ("width", self.target_area.width),
            ("height", self.target_area.height),
        ] {
            // yuv420p needs even dimensions.
            if value.fract() != 0.0 || value % 2.0 != 0.0 {
                return Err(BackdropError::config(format!(
                    "target {axis} must be a positive even number of pixels, got {value}"
                )));
            }
        }
        if !self.overlay_scale.is_finite() || self.overlay_scale <= 0.0 {
            return Err(BackdropError::config(format!(
                "overlay scale must be a positive number, got {}",
                self.overlay_scale
            )));
        }
        Ok(())
    }
}

/// Where a run is in the stage chain.
#[derive(Debug)]
pub enum PipelineStep {
    Center,
    Blur { centered: PathBuf },
    Overlay { blurred: PathBuf },
    Done(PathBuf),
    Failed(BackdropError),
}

impl PipelineStep {
    /// Stage to run next, `None` once finished.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PipelineStep::Center => Some(PipelineStage::Center),
            PipelineStep::Blur { .. } => Some(PipelineStage::Blur),
            PipelineStep::Overlay { .. } => Some(PipelineStage::Overlay),
            PipelineStep::Done(_) | PipelineStep::Failed(_) => None,
        }
    }

    /// Transition on the result of the current stage.
    pub fn advance(self, result: BackdropResult<PathBuf>) -> PipelineStep {
        match (self, result) {
            (step @ (PipelineStep::Done(_) | PipelineStep::Failed(_)), _) => step,
            (_, Err(err)) => PipelineStep::Failed(err),
            (PipelineStep::Center, Ok(centered)) => PipelineStep::Blur { centered },
            (PipelineStep::Blur { .. }, Ok(blurred)) => PipelineStep::Overlay { blurred },
            (PipelineStep::Overlay { .. }, Ok(output)) => PipelineStep::Done(output),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_none()
    }
}

/// Releases the pipeline state when a run ends, including when the run
/// future is dropped early.
struct RunGuard {
    state: SharedPipelineState,
}

impl RunGuard {
    fn acquire(state: &SharedPipelineState) -> BackdropResult<Self> {
        let mut guard = state
            .lock()
            .map_err(|_| BackdropError::pipeline("pipeline state is poisoned"))?;
        guard.begin_run()?;
        Ok(Self {
            state: Arc::clone(state),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.finish_run();
        }
    }
}

/// Renders a clip centered over a blurred copy of itself.
///
/// One run at a time per instance; a second run while one is active is
/// rejected.
pub struct BlurredBackgroundPipeline {
    backend: Arc<dyn ExportBackend>,
    layout: OutputLayout,
    frame_rate: u32,
    blur_radius: f64,
    progress_interval: Duration,
    state: SharedPipelineState,
}

impl BlurredBackgroundPipeline {
    pub fn new(backend: Arc<dyn ExportBackend>, layout: OutputLayout) -> Self {
        Self::with_defaults(backend, layout, &RenderDefaults::default())
    }

    /// Build a pipeline using frame rate, blur radius and progress cadence
    /// from `defaults`.
    pub fn with_defaults(
        backend: Arc<dyn ExportBackend>,
        layout: OutputLayout,
        defaults: &RenderDefaults,
    ) -> Self {
        Self {
            backend,
            layout,
            frame_rate: defaults.frame_rate.max(1),
            blur_radius: defaults.blur_radius,
            progress_interval: Duration::from_millis(defaults.progress_interval_ms.max(1)),
            state: SharedPipelineState::default(),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().map(|s| s.is_running()).unwrap_or(false)
    }

    /// Run all three stages and return the final output path.
    pub async fn run(
        &self,
        request: PipelineRequest,
        observer: Option<ProgressObserver>,
    ) -> BackdropResult<PathBuf> {
        request.validate()?;
        let _run = RunGuard::acquire(&self.state)?;

        tracing::info!(
            source = %request.source.display(),
            width = request.target_area.width,
            height = request.target_area.height,
            overlay_scale = request.overlay_scale,
            backend = self.backend.name(),
            output_dir = %self.layout.dir().display(),
            "Starting blurred background pipeline"
        );

        self.layout.prepare()?;
        let source = self.probe(&request.source).await?;
        let builder = CompositionBuilder::new(request.target_area)
            .with_frame_rate(self.frame_rate)
            .with_blur_radius(self.blur_radius);

        let reporter = observer.map(|observer| {
            ProgressReporter::start(Arc::clone(&self.state), observer, self.progress_interval)
        });

        let mut step = PipelineStep::Center;
        while let Some(stage) = step.stage() {
            let result = self.run_stage(stage, &step, &builder, &source, &request).await;
            if let Err(err) = &result {
                tracing::error!(stage = ?stage, error = %err, "Stage failed");
            }
            step = step.advance(result);
        }

        let outcome = match step {
            PipelineStep::Done(output) => Ok(output),
            PipelineStep::Failed(err) => Err(err),
            other => Err(BackdropError::pipeline(format!(
                "pipeline stopped in non-terminal step {other:?}"
            ))),
        };

        if let Some(reporter) = reporter {
            let reported = if outcome.is_ok() {
                ReporterOutcome::Completed
            } else {
                ReporterOutcome::Failed
            };
            reporter.stop(reported).await;
        }

        if let Ok(output) = &outcome {
            tracing::info!(output = %output.display(), "Pipeline finished");
        }
        outcome
    }

    /// Spawn [`run`](Self::run) on the tokio runtime and hand its result to
    /// `completion` exactly once.
    pub fn start(
        self: &Arc<Self>,
        request: PipelineRequest,
        observer: Option<ProgressObserver>,
        completion: CompletionCallback,
    ) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let result = pipeline.run(request, observer).await;
            completion(result);
        })
    }

    async fn run_stage(
        &self,
        stage: PipelineStage,
        step: &PipelineStep,
        builder: &CompositionBuilder,
        source: &MediaAsset,
        request: &PipelineRequest,
    ) -> BackdropResult<PathBuf> {
        let (input, optimize_for_network) = match step {
            PipelineStep::Center => (builder.center_stage(source)?.into_export_input(), true),
            PipelineStep::Blur { centered } => {
                let centered = self.probe(centered).await?;
                // Frame-path exports skip the network layout.
                (builder.blur_stage_input(&centered), false)
            }
            PipelineStep::Overlay { blurred } => {
                let blurred = self.probe(blurred).await?;
                let plan = builder.overlay_stage(source, &blurred, request.overlay_scale)?;
                (plan.into_export_input(), true)
            }
            PipelineStep::Done(_) | PipelineStep::Failed(_) => {
                return Err(BackdropError::pipeline("no stage left to run"));
            }
        };

        let output = self.layout.stage_output(stage);
        remove_stale_output(&output);

        let job =
            ExportJob::new(input, output.clone()).optimized_for_network(optimize_for_network);
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| BackdropError::pipeline("pipeline state is poisoned"))?;
            state.enter_stage(stage, job.progress.clone())?;
        }

        tracing::info!(stage = ?stage, output = %output.display(), "Stage export started");
        self.export(job).await?;

        if !output.exists() {
            return Err(BackdropError::render(format!(
                "{} stage finished without writing {}",
                stage.output_stem(),
                output.display()
            )));
        }
        tracing::info!(stage = ?stage, output = %output.display(), "Stage export finished");
        Ok(output)
    }

    async fn probe(&self, path: &Path) -> BackdropResult<MediaAsset> {
        let backend = Arc::clone(&self.backend);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || backend.probe(&path))
            .await
            .map_err(|e| BackdropError::pipeline(format!("Probe task failed: {e}")))?
    }

    async fn export(&self, job: ExportJob) -> BackdropResult<()> {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || backend.export(&job))
            .await
            .map_err(|e| BackdropError::pipeline(format!("Export task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_advance_in_order() {
        let step = PipelineStep::Center;
        let step = step.advance(Ok(PathBuf::from("/out/center.mov")));
        assert!(matches!(
            &step,
            PipelineStep::Blur { centered } if centered == Path::new("/out/center.mov")
        ));

        let step = step.advance(Ok(PathBuf::from("/out/blurred.mov")));
        assert!(matches!(
            &step,
            PipelineStep::Overlay { blurred } if blurred == Path::new("/out/blurred.mov")
        ));
        assert_eq!(step.stage(), Some(PipelineStage::Overlay));

        let step = step.advance(Ok(PathBuf::from("/out/final.mov")));
        assert!(matches!(
            &step,
            PipelineStep::Done(path) if path == Path::new("/out/final.mov")
        ));
        assert!(step.is_terminal());
    }

    #[test]
    fn test_error_fails_from_any_stage() {
        let step = PipelineStep::Blur {
            centered: PathBuf::from("c.mov"),
        }
        .advance(Err(BackdropError::render("boom")));
        assert!(matches!(step, PipelineStep::Failed(BackdropError::Render { .. })));
        assert_eq!(step.stage(), None);
    }

    #[test]
    fn test_terminal_steps_do_not_move() {
        let done =
            PipelineStep::Done(PathBuf::from("f.mov")).advance(Err(BackdropError::render("late")));
        assert!(matches!(done, PipelineStep::Done(_)));

        let failed = PipelineStep::Failed(BackdropError::render("first"))
            .advance(Ok(PathBuf::from("f.mov")));
        match failed {
            PipelineStep::Failed(err) => assert!(err.to_string().contains("first")),
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn test_layout_names_stage_outputs() {
        let layout = OutputLayout::new("/renders");
        let names: Vec<_> = [
            PipelineStage::Center,
            PipelineStage::Blur,
            PipelineStage::Overlay,
        ]
        .into_iter()
        .map(|stage| layout.stage_output(stage))
        .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("/renders/center.mov"),
                PathBuf::from("/renders/blurred.mov"),
                PathBuf::from("/renders/final.mov"),
            ]
        );
    }

    #[test]
    fn test_request_validation() {
        let ok = PipelineRequest::new("in.mp4", Size::new(1080.0, 720.0), 0.5);
        assert!(ok.validate().is_ok());

        for bad in [
            PipelineRequest::new("in.mp4", Size::new(1081.0, 720.0), 0.5),
            PipelineRequest::new("in.mp4", Size::new(0.0, 720.0), 0.5),
            PipelineRequest::new("in.mp4", Size::new(-1080.0, 720.0), 0.5),
            PipelineRequest::new("in.mp4", Size::new(f64::INFINITY, 720.0), 0.5),
            PipelineRequest::new("in.mp4", Size::new(1080.0, 720.5), 0.5),
            PipelineRequest::new("in.mp4", Size::new(1080.0, 720.0), 0.0),
            PipelineRequest::new("in.mp4", Size::new(1080.0, 720.0), f64::NAN),
        ] {
            assert!(matches!(bad.validate(), Err(BackdropError::Config { .. })), "{bad:?}");
        }
    }

    #[test]
    fn test_remove_stale_output_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final.mov");
        remove_stale_output(&path);

        std::fs::write(&path, b"old").unwrap();
        remove_stale_output(&path);
        assert!(!path.exists());
    }
}
