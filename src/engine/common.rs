// src/engine/common.rs
//
// Common utilities shared across engine modules: panic containment around
// codec calls and the cooperative cancellation token.

use crate::error::PhotoFitError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type EngineResult<T> = std::result::Result<T, PhotoFitError>;

/// Run a codec call and convert any panic into `InternalPanic`.
///
/// Native codecs (mozjpeg, libwebp) and the pure-Rust decoders have all been
/// seen to panic on adversarial input; a panic must never cross the pipeline.
pub fn run_with_panic_policy<T, F>(label: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            tracing::warn!(target: "photo_fit::panic", %label, %detail, "codec panicked");
            Err(PhotoFitError::internal_panic(format!("{label}: {detail}")))
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Cooperative cancellation signal, checked at every suspension point.
///
/// Clones share the same flag; cancelling any clone cancels them all.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(PhotoFitError::cancelled())
        } else {
            Ok(())
        }
    }
}

/// Check an optional token.
pub(crate) fn check_cancelled(token: Option<&CancelToken>) -> EngineResult<()> {
    token.map_or(Ok(()), CancelToken::check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_is_contained() {
        let result: EngineResult<()> = run_with_panic_policy("test", || panic!("boom"));
        match result {
            Err(PhotoFitError::InternalPanic { message }) => {
                assert!(message.contains("test: boom"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ok_and_err_pass_through() {
        assert_eq!(run_with_panic_policy("ok", || Ok(7)).unwrap(), 7);
        let err = run_with_panic_policy::<(), _>("err", || Err(PhotoFitError::cancelled()));
        assert!(matches!(err, Err(PhotoFitError::Cancelled)));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(check_cancelled(Some(&token)).is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(
            check_cancelled(Some(&token)),
            Err(PhotoFitError::Cancelled)
        ));
        assert!(check_cancelled(None).is_ok());
    }
}
