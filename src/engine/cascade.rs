// src/engine/cascade.rs
//
// The decode cascade: walk the strategies against the original bytes, then
// against a repaired copy, each under its own timeout. First non-empty raster
// wins.

use crate::engine::common::{check_cancelled, CancelToken, EngineResult};
use crate::engine::decoder::{
    check_dimensions, detect_exif_orientation, detect_format, BitmapStrategy, DataUriStrategy,
    DecodeStrategy, DecodedImage, DecoderConfig, DirectStrategy,
};
use crate::engine::io::InputFile;
use crate::engine::raster::apply_orientation;
use crate::error::{PhotoFitError, StrategyFailure};
use image::DynamicImage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ordered decode strategies plus the policy to run them under.
#[derive(Clone)]
pub struct DecodeCascade {
    strategies: Vec<Arc<dyn DecodeStrategy>>,
    config: DecoderConfig,
}

impl std::fmt::Debug for DecodeCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("DecodeCascade")
            .field("strategies", &names)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for DecodeCascade {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

/// How one attempt ended, short of success.
enum AttemptOutcome {
    Decoded(DynamicImage),
    Failed(String),
    Abort(PhotoFitError),
}

impl DecodeCascade {
    /// The standard direct -> data-uri -> bitmap cascade.
    pub fn new(config: DecoderConfig) -> Self {
        Self::with_strategies(
            config,
            vec![
                Arc::new(DirectStrategy),
                Arc::new(DataUriStrategy),
                Arc::new(BitmapStrategy),
            ],
        )
    }

    pub fn with_strategies(
        config: DecoderConfig,
        strategies: Vec<Arc<dyn DecodeStrategy>>,
    ) -> Self {
        Self { strategies, config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Decode `file`, or fail with `DecodeFailed { reason: "unusable input" }`
    /// listing every attempt.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn decode(
        &self,
        file: &InputFile,
        cancel: Option<&CancelToken>,
    ) -> EngineResult<DecodedImage> {
        check_cancelled(cancel)?;

        if file.len() < self.config.min_input_bytes {
            return Err(PhotoFitError::input_too_small(
                file.len(),
                self.config.min_input_bytes,
            ));
        }

        let mut failures = Vec::new();

        if let Some(decoded) = self.run_pass(file, false, cancel, &mut failures).await? {
            return self.finish(file, decoded);
        }

        if self.config.rebuild_and_retry {
            let rebuilt = file.rebuild();
            tracing::debug!(
                target: "photo_fit::decode",
                original_len = file.len(),
                rebuilt_len = rebuilt.len(),
                mime = ?rebuilt.declared_mime(),
                "retrying against rebuilt buffer"
            );
            if let Some(decoded) = self.run_pass(&rebuilt, true, cancel, &mut failures).await? {
                return self.finish(&rebuilt, decoded);
            }
        }

        tracing::warn!(
            target: "photo_fit::decode",
            attempts = failures.len(),
            "all decode strategies failed"
        );
        Err(PhotoFitError::unusable_input(failures))
    }

    async fn run_pass(
        &self,
        source: &InputFile,
        rebuilt: bool,
        cancel: Option<&CancelToken>,
        failures: &mut Vec<StrategyFailure>,
    ) -> EngineResult<Option<DecodedImage>> {
        for strategy in &self.strategies {
            check_cancelled(cancel)?;

            let name = strategy.name();
            let started = Instant::now();
            match self.attempt(source, Arc::clone(strategy)).await {
                AttemptOutcome::Decoded(image) => {
                    tracing::debug!(
                        target: "photo_fit::decode",
                        strategy = name,
                        rebuilt,
                        width = image.width(),
                        height = image.height(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "decoded"
                    );
                    return Ok(Some(DecodedImage {
                        image,
                        format: detect_format(source.as_bytes()),
                        strategy: name,
                        rebuilt,
                    }));
                }
                AttemptOutcome::Failed(message) => {
                    tracing::debug!(
                        target: "photo_fit::decode",
                        strategy = name,
                        rebuilt,
                        %message,
                        "strategy failed"
                    );
                    failures.push(StrategyFailure {
                        strategy: name,
                        rebuilt,
                        message,
                    });
                }
                AttemptOutcome::Abort(err) => {
                    tracing::warn!(
                        target: "photo_fit::decode",
                        strategy = name,
                        error = %err,
                        "resource limit hit, aborting cascade"
                    );
                    return Err(err);
                }
            }
        }
        Ok(None)
    }

    async fn attempt(
        &self,
        source: &InputFile,
        strategy: Arc<dyn DecodeStrategy>,
    ) -> AttemptOutcome {
        let name = strategy.name();
        let handle = source.handle();
        let timeout = Duration::from_millis(self.config.strategy_timeout_ms);

        // The handle moves into the task so it is released when the strategy
        // returns, even if we stopped waiting for it.
        let task = tokio::task::spawn_blocking(move || {
            let result = strategy.decode(&handle);
            drop(handle);
            result
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(image))) if image.width() == 0 || image.height() == 0 => {
                AttemptOutcome::Failed("produced an empty surface".to_string())
            }
            Ok(Ok(Ok(image))) => AttemptOutcome::Decoded(image),
            Ok(Ok(Err(err))) if is_resource_limit(&err) => AttemptOutcome::Abort(err),
            Ok(Ok(Err(err))) => AttemptOutcome::Failed(err.to_string()),
            Ok(Err(join_err)) => {
                AttemptOutcome::Failed(format!("strategy task failed: {join_err}"))
            }
            Err(_) => AttemptOutcome::Failed(
                PhotoFitError::strategy_timed_out(name, self.config.strategy_timeout_ms)
                    .to_string(),
            ),
        }
    }

    fn finish(&self, source: &InputFile, mut decoded: DecodedImage) -> EngineResult<DecodedImage> {
        check_dimensions(decoded.width(), decoded.height())?;
        if self.config.auto_orient {
            if let Some(orientation) = detect_exif_orientation(source.as_bytes()) {
                if orientation != 1 {
                    tracing::debug!(
                        target: "photo_fit::decode",
                        orientation,
                        "applying exif orientation"
                    );
                    decoded.image = apply_orientation(decoded.image, orientation);
                }
            }
        }
        Ok(decoded)
    }
}

fn is_resource_limit(err: &PhotoFitError) -> bool {
    matches!(
        err,
        PhotoFitError::DimensionExceedsLimit { .. } | PhotoFitError::PixelCountExceedsLimit { .. }
    )
}
