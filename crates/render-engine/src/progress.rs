//! Pipeline state and aggregate progress reporting.
//!
//! The orchestrator owns a [`PipelineState`] behind a mutex and records the
//! active stage and its job there. A [`ProgressReporter`] task samples that
//! state on a fixed tick and publishes the overall fraction to an observer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use backdrop_common::error::{BackdropError, BackdropResult};

use crate::export::JobProgress;

/// Number of stages in one pipeline run.
pub const STAGE_COUNT: usize = 3;

/// Highest value published while a run is still in flight.
const IN_FLIGHT_CEILING: f32 = 0.999;

/// Observer receiving overall progress in `[0, 1]`.
pub type ProgressObserver = Arc<dyn Fn(f32) + Send + Sync>;

/// Shared handle to a pipeline's state.
pub type SharedPipelineState = Arc<Mutex<PipelineState>>;

/// The three export stages, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Center,
    Blur,
    Overlay,
}

impl PipelineStage {
    pub fn index(self) -> usize {
        match self {
            PipelineStage::Center => 0,
            PipelineStage::Blur => 1,
            PipelineStage::Overlay => 2,
        }
    }

    /// File stem of the stage's output.
    pub fn output_stem(self) -> &'static str {
        match self {
            PipelineStage::Center => "center",
            PipelineStage::Blur => "blurred",
            PipelineStage::Overlay => "final",
        }
    }
}

/// What the orchestrator is doing right now.
#[derive(Debug, Default)]
pub struct PipelineState {
    running: bool,
    stage: Option<PipelineStage>,
    active_job: Option<JobProgress>,
}

impl PipelineState {
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stage(&self) -> Option<PipelineStage> {
        self.stage
    }

    /// Claim the state for a new run.
    pub fn begin_run(&mut self) -> BackdropResult<()> {
        if self.running {
            return Err(BackdropError::pipeline("pipeline already running"));
        }
        self.running = true;
        self.stage = None;
        self.active_job = None;
        Ok(())
    }

    /// Make `stage` current with `job` as its active export.
    ///
    /// Stages only move forward within a run.
    pub fn enter_stage(&mut self, stage: PipelineStage, job: JobProgress) -> BackdropResult<()> {
        if let Some(current) = self.stage {
            if stage <= current {
                return Err(BackdropError::pipeline(format!(
                    "stage {stage:?} cannot follow {current:?}"
                )));
            }
        }
        self.stage = Some(stage);
        self.active_job = Some(job);
        Ok(())
    }

    pub fn finish_run(&mut self) {
        self.running = false;
        self.stage = None;
        self.active_job = None;
    }

    /// Overall progress of the active job, if there is one.
    pub fn sample(&self) -> Option<f32> {
        let stage = self.stage?;
        let job = self.active_job.as_ref()?;
        Some(overall_progress(stage, job.fraction()))
    }
}

/// `stage/3 + local/3`, clamped to `[0, 1]`.
pub fn overall_progress(stage: PipelineStage, local: f32) -> f32 {
    let total = STAGE_COUNT as f32;
    (stage.index() as f32 / total + local.clamp(0.0, 1.0) / total).clamp(0.0, 1.0)
}

/// How a run ended, as far as the reporter cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterOutcome {
    Completed,
    Failed,
}

/// Background task publishing overall progress.
pub struct ProgressReporter {
    stop_tx: oneshot::Sender<ReporterOutcome>,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    /// Spawn the sampling task on the current tokio runtime.
    pub fn start(
        state: SharedPipelineState,
        observer: ProgressObserver,
        interval: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<ReporterOutcome>();
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut published = HighWaterMark::default();

            loop {
                tokio::select! {
                    outcome = &mut stop_rx => {
                        // A dropped sender means the run was abandoned.
                        if let Ok(ReporterOutcome::Completed) = outcome {
                            published.publish(1.0, observer.as_ref());
                        }
                        break;
                    }
                    _ = ticker.tick() => {
                        let sample = state.lock().ok().and_then(|s| s.sample());
                        if let Some(value) = sample {
                            published.publish(value.min(IN_FLIGHT_CEILING), observer.as_ref());
                        }
                    }
                }
            }
            tracing::debug!(last = ?published.last, "Progress reporter stopped");
        });

        Self { stop_tx, handle }
    }

    /// Stop the task and wait for it to exit.
    ///
    /// `Completed` publishes a final `1.0`; `Failed` publishes nothing more.
    pub async fn stop(self, outcome: ReporterOutcome) {
        let _ = self.stop_tx.send(outcome);
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "Progress reporter task ended abnormally");
        }
    }
}

#[derive(Debug, Default)]
struct HighWaterMark {
    last: Option<f32>,
}

impl HighWaterMark {
    fn publish(&mut self, value: f32, observer: &(dyn Fn(f32) + Send + Sync)) {
        if self.last.map_or(true, |last| value > last) {
            self.last = Some(value);
            observer(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (ProgressObserver, Arc<Mutex<Vec<f32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: ProgressObserver = Arc::new(move |v| sink.lock().unwrap().push(v));
        (observer, seen)
    }

    #[test]
    fn test_overall_progress_thirds() {
        assert_eq!(overall_progress(PipelineStage::Center, 0.0), 0.0);
        assert!((overall_progress(PipelineStage::Blur, 0.5) - 0.5).abs() < 1e-6);
        assert!((overall_progress(PipelineStage::Overlay, 1.0) - 1.0).abs() < 1e-6);
        assert!(overall_progress(PipelineStage::Overlay, 7.0) <= 1.0);
    }

    #[test]
    fn test_stage_only_moves_forward() {
        let mut state = PipelineState::default();
        state.begin_run().unwrap();
        state.enter_stage(PipelineStage::Center, JobProgress::new()).unwrap();
        state.enter_stage(PipelineStage::Blur, JobProgress::new()).unwrap();
        assert!(state.enter_stage(PipelineStage::Center, JobProgress::new()).is_err());
        assert!(state.enter_stage(PipelineStage::Blur, JobProgress::new()).is_err());
        assert_eq!(state.stage(), Some(PipelineStage::Blur));
    }

    #[test]
    fn test_second_run_is_rejected_until_finished() {
        let mut state = PipelineState::default();
        state.begin_run().unwrap();
        let err = state.begin_run().unwrap_err();
        assert!(err.to_string().contains("pipeline already running"));
        state.finish_run();
        state.begin_run().unwrap();
    }

    #[test]
    fn test_sample_requires_active_job() {
        let mut state = PipelineState::default();
        assert_eq!(state.sample(), None);
        state.begin_run().unwrap();
        let job = JobProgress::new();
        state.enter_stage(PipelineStage::Blur, job.clone()).unwrap();
        job.set(0.25);
        let sample = state.sample().unwrap();
        assert!((sample - (1.0 / 3.0 + 0.25 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn test_high_water_mark_skips_regressions() {
        let (observer, seen) = recorder();
        let mut mark = HighWaterMark::default();
        for v in [0.1, 0.1, 0.3, 0.2, 0.4] {
            mark.publish(v, observer.as_ref());
        }
        assert_eq!(*seen.lock().unwrap(), vec![0.1, 0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_reporter_publishes_and_completes() {
        let state: SharedPipelineState = Arc::default();
        let job = JobProgress::new();
        {
            let mut guard = state.lock().unwrap();
            guard.begin_run().unwrap();
            guard.enter_stage(PipelineStage::Blur, job.clone()).unwrap();
        }
        job.set(0.5);

        let (observer, seen) = recorder();
        let reporter =
            ProgressReporter::start(Arc::clone(&state), observer, Duration::from_millis(1));

        for _ in 0..200 {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        reporter.stop(ReporterOutcome::Completed).await;

        let seen = seen.lock().unwrap();
        assert!((seen[0] - 0.5).abs() < 1e-6);
        assert_eq!(*seen.last().unwrap(), 1.0);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_failed_stop_publishes_nothing_more() {
        let state: SharedPipelineState = Arc::default();
        let (observer, seen) = recorder();
        let reporter = ProgressReporter::start(state, observer, Duration::from_millis(1));
        reporter.stop(ReporterOutcome::Failed).await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
