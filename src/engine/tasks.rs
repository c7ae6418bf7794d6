// src/engine/tasks.rs
//
// Background execution of the draw+encode step.
// A job is self-contained (shared raster, preset, encoder, policy) so it can be
// shipped to a worker thread and, if the worker gives up, rerun inline.

use crate::engine::budget::{encode_to_fit, EncodeAttempt, EncodeResult, SizeFitConfig};
use crate::engine::common::{panic_message, CancelToken, EngineResult};
use crate::engine::encoder::RasterEncoder;
use crate::engine::fitter::FitRect;
use crate::engine::pool;
use crate::engine::progress::{ProgressEvent, ProgressObserver};
use crate::error::PhotoFitError;
use crate::ops::Preset;
use async_trait::async_trait;
use image::DynamicImage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Everything the size-fitter needs, cheap to clone.
#[derive(Clone)]
pub struct EncodeJob {
    pub image: Arc<DynamicImage>,
    pub rect: FitRect,
    pub preset: Preset,
    pub encoder: Arc<dyn RasterEncoder>,
    pub config: SizeFitConfig,
    pub cancel: Option<CancelToken>,
    pub observer: Option<Arc<dyn ProgressObserver>>,
}

impl std::fmt::Debug for EncodeJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeJob")
            .field("image", &(self.image.width(), self.image.height()))
            .field("rect", &self.rect)
            .field("preset", &self.preset)
            .field("mime", &self.encoder.mime())
            .finish_non_exhaustive()
    }
}

impl EncodeJob {
    /// Run the job on the current thread.
    pub fn run(&self) -> EngineResult<EncodeResult> {
        let observer = self.observer.as_deref();
        let mut on_attempt = |attempt: &EncodeAttempt| {
            if let Some(observer) = observer {
                observer.on_event(&ProgressEvent::EncodeAttempt(*attempt));
            }
        };
        encode_to_fit(
            &self.image,
            self.rect,
            &self.preset,
            self.encoder.as_ref(),
            &self.config,
            self.cancel.as_ref(),
            &mut on_attempt,
        )
    }
}

/// What a worker made of a job.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// The job ran; its own result (success or encode error) is final.
    Completed(EngineResult<EncodeResult>),
    /// The worker could not take the job.
    Unavailable(String),
    /// The worker took the job but did not finish it (panic, lost channel).
    /// Carries a `WorkerFailed` error.
    Failed(PhotoFitError),
}

/// Seam for off-thread draw+encode.
#[async_trait]
pub trait EncodeWorker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checked once per run, when the execution strategy is chosen.
    fn is_available(&self) -> bool;

    async fn run(&self, job: EncodeJob) -> WorkerOutcome;
}

/// Runs jobs on the global rayon pool and hands the result back over a
/// oneshot channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct RayonWorker;

#[async_trait]
impl EncodeWorker for RayonWorker {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn is_available(&self) -> bool {
        pool::is_available()
    }

    async fn run(&self, job: EncodeJob) -> WorkerOutcome {
        let Some(pool) = pool::get_pool() else {
            return WorkerOutcome::Unavailable("worker pool unavailable".to_string());
        };

        let (tx, rx) = oneshot::channel();
        pool.spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| job.run()));
            // Receiver gone means the caller stopped waiting
            let _ = tx.send(result);
        });

        match rx.await {
            Ok(Ok(result)) => WorkerOutcome::Completed(result),
            Ok(Err(payload)) => WorkerOutcome::Failed(PhotoFitError::worker_failed(format!(
                "worker panicked: {}",
                panic_message(payload.as_ref())
            ))),
            Err(_) => WorkerOutcome::Failed(PhotoFitError::worker_failed("worker dropped the job")),
        }
    }
}
