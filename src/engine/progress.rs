// src/engine/progress.rs
//
// Progress reporting for a pipeline run.

use crate::engine::budget::EncodeAttempt;
use crate::error::Stage;

/// Something observable happened during a run.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// The run entered a new stage.
    Stage(Stage),
    /// One encode finished.
    EncodeAttempt(EncodeAttempt),
    /// The background worker could not finish the job; it is being redone inline.
    WorkerFallback { reason: String },
    /// The run stopped in this stage.
    Failed(Stage),
}

/// Receives [`ProgressEvent`]s. Called on whichever thread produced the
/// event, so implementations must be cheap and thread-safe.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}
