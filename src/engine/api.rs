// src/engine/api.rs
//
// PhotoPipeline: the public entry point.
// Firewall -> decode cascade -> orientation/fit -> draw+encode, one stage at a
// time, with the draw+encode step optionally offloaded to a worker.

use crate::config::PipelineConfig;
use crate::engine::budget::EncodeResult;
use crate::engine::cascade::DecodeCascade;
use crate::engine::common::{check_cancelled, run_with_panic_policy, CancelToken};
use crate::engine::encoder::{encoder_for, RasterEncoder};
use crate::engine::fitter::{fit, Dimensions, FitMode, FitRect};
use crate::engine::io::InputFile;
use crate::engine::progress::{ProgressEvent, ProgressObserver};
use crate::engine::raster::apply_transform;
use crate::engine::tasks::{EncodeJob, EncodeWorker, RayonWorker, WorkerOutcome};
use crate::error::{PhotoFitError, PipelineError, Result, Stage};
use crate::ops::{PresetSelector, Transform};
use std::sync::Arc;
use std::time::Instant;

/// Per-invocation options.
#[derive(Clone)]
pub struct ProcessOptions {
    /// Offload draw+encode to the worker pool when it is available.
    pub use_background_worker: bool,
    /// Manual crop in oriented-image coordinates. Replaces cover fitting.
    pub crop: Option<FitRect>,
    /// Applied after EXIF orientation, before fitting.
    pub transform: Transform,
    pub cancel: Option<CancelToken>,
    pub observer: Option<Arc<dyn ProgressObserver>>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            use_background_worker: true,
            crop: None,
            transform: Transform::default(),
            cancel: None,
            observer: None,
        }
    }
}

impl std::fmt::Debug for ProcessOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessOptions")
            .field("use_background_worker", &self.use_background_worker)
            .field("crop", &self.crop)
            .field("transform", &self.transform)
            .field("cancel", &self.cancel)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn background_worker(mut self, enabled: bool) -> Self {
        self.use_background_worker = enabled;
        self
    }

    pub fn crop(mut self, rect: FitRect) -> Self {
        self.crop = Some(rect);
        self
    }

    pub fn rotate(mut self, degrees: i32) -> Self {
        self.transform.rotate = degrees;
        self
    }

    pub fn flip_horizontal(mut self) -> Self {
        self.transform.flip_h = !self.transform.flip_h;
        self
    }

    pub fn flip_vertical(mut self) -> Self {
        self.transform.flip_v = !self.transform.flip_v;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }
}

/// How draw+encode runs for one invocation. Chosen once, at entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Execution {
    Background,
    Inline,
}

/// Tracks the stage of one run and reports transitions.
struct RunState<'a> {
    stage: Stage,
    observer: Option<&'a dyn ProgressObserver>,
}

impl<'a> RunState<'a> {
    fn new(observer: Option<&'a dyn ProgressObserver>) -> Self {
        Self {
            stage: Stage::Idle,
            observer,
        }
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!(target: "photo_fit::pipeline", from = %self.stage, to = %stage, "stage");
        self.stage = stage;
        self.emit(ProgressEvent::Stage(stage));
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(observer) = self.observer {
            observer.on_event(&event);
        }
    }

    fn fail(&self, cause: PhotoFitError) -> PipelineError {
        tracing::debug!(
            target: "photo_fit::pipeline",
            stage = %self.stage,
            error = %cause,
            "run failed"
        );
        self.emit(ProgressEvent::Failed(self.stage));
        PipelineError::new(self.stage, cause)
    }
}

/// Decode, fit and size-fit photos against presets.
///
/// Holds only immutable configuration; one pipeline can serve any number of
/// concurrent runs.
#[derive(Clone)]
pub struct PhotoPipeline {
    config: Arc<PipelineConfig>,
    cascade: DecodeCascade,
    worker: Arc<dyn EncodeWorker>,
    encoder: Option<Arc<dyn RasterEncoder>>,
}

impl std::fmt::Debug for PhotoPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoPipeline")
            .field("config", &self.config)
            .field("cascade", &self.cascade)
            .field("worker", &self.worker.name())
            .finish_non_exhaustive()
    }
}

impl Default for PhotoPipeline {
    fn default() -> Self {
        Self::from_valid_config(PipelineConfig::default())
    }
}

impl PhotoPipeline {
    /// Build a pipeline, rejecting invalid configuration up front.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: PipelineConfig) -> Self {
        Self {
            cascade: DecodeCascade::new(config.decoder.clone()),
            config: Arc::new(config),
            worker: Arc::new(RayonWorker),
            encoder: None,
        }
    }

    /// Replace the background worker.
    pub fn with_worker(mut self, worker: Arc<dyn EncodeWorker>) -> Self {
        self.worker = worker;
        self
    }

    /// Replace the decode cascade.
    pub fn with_cascade(mut self, cascade: DecodeCascade) -> Self {
        self.cascade = cascade;
        self
    }

    /// Use `encoder` for every preset instead of the one matching its MIME type.
    pub fn with_encoder(mut self, encoder: Arc<dyn RasterEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline for one upload.
    pub async fn process(
        &self,
        file: InputFile,
        preset: impl Into<PresetSelector>,
        options: ProcessOptions,
    ) -> std::result::Result<EncodeResult, PipelineError> {
        let started = Instant::now();
        let selector = preset.into();
        let mut run = RunState::new(options.observer.as_deref());
        let cancel = options.cancel.as_ref();
        let firewall = &self.config.firewall;

        let preset = self
            .config
            .resolve_preset(&selector)
            .map_err(|e| run.fail(e))?;
        let execution = if options.use_background_worker && self.worker.is_available() {
            Execution::Background
        } else {
            Execution::Inline
        };
        tracing::debug!(
            target: "photo_fit::pipeline",
            preset = selector.key(),
            input_len = file.len(),
            mime = ?file.declared_mime(),
            ?execution,
            "starting run"
        );

        // Decoding
        run.enter(Stage::Decoding);
        let decoded = async {
            check_cancelled(cancel)?;
            firewall.inspect(&file)?;
            let decoded = self.cascade.decode(&file, cancel).await?;
            firewall.enforce_pixels(decoded.width(), decoded.height())?;
            firewall.enforce_timeout(started, "decoding")?;
            Ok::<_, PhotoFitError>(decoded)
        }
        .await
        .map_err(|e| run.fail(e))?;

        // Fitting
        run.enter(Stage::Fitting);
        let (image, rect) = (|| {
            check_cancelled(cancel)?;
            let image = if options.transform.is_identity() {
                decoded.image
            } else {
                apply_transform(decoded.image, &options.transform)?
            };
            let rect = match options.crop {
                Some(rect) => {
                    rect.validate_within(image.width(), image.height())?;
                    rect
                }
                None => fit(
                    Dimensions::new(image.width(), image.height()),
                    Dimensions::new(preset.target_width, preset.target_height),
                    FitMode::Cover,
                )?,
            };
            firewall.enforce_timeout(started, "fitting")?;
            Ok::<_, PhotoFitError>((image, rect))
        })()
        .map_err(|e| run.fail(e))?;

        // Encoding
        run.enter(Stage::Encoding);
        let job = EncodeJob {
            image: Arc::new(image),
            rect,
            preset,
            encoder: self
                .encoder
                .clone()
                .unwrap_or_else(|| encoder_for(preset.mime)),
            config: self.config.size_fit.clone(),
            cancel: options.cancel.clone(),
            observer: options.observer.clone(),
        };
        let result = self
            .execute(job, execution, &run)
            .await
            .map_err(|e| run.fail(e))?;

        run.enter(Stage::Done);
        tracing::debug!(
            target: "photo_fit::pipeline",
            preset = selector.key(),
            width = result.width(),
            height = result.height(),
            size = result.size_bytes(),
            quality = result.quality(),
            over_budget = result.over_budget(),
            attempts = result.attempts(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run complete"
        );
        Ok(result)
    }

    async fn execute(
        &self,
        job: EncodeJob,
        execution: Execution,
        run: &RunState<'_>,
    ) -> Result<EncodeResult> {
        if execution == Execution::Inline {
            return run_with_panic_policy("encode:inline", || job.run());
        }

        let reason = match self.worker.run(job.clone()).await {
            WorkerOutcome::Completed(result) => return result,
            WorkerOutcome::Unavailable(reason) => reason,
            WorkerOutcome::Failed(err) => err.to_string(),
        };

        // A cancelled run must not be restarted inline
        check_cancelled(job.cancel.as_ref())?;
        tracing::warn!(
            target: "photo_fit::pipeline",
            worker = self.worker.name(),
            %reason,
            "worker did not finish, encoding inline"
        );
        run.emit(ProgressEvent::WorkerFallback { reason });
        run_with_panic_policy("encode:inline", || job.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Preset;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
        buf
    }

    fn recorder() -> (Arc<Mutex<Vec<ProgressEvent>>>, impl ProgressObserver + 'static) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |event: &ProgressEvent| {
            sink.lock().unwrap().push(event.clone())
        })
    }

    #[tokio::test]
    async fn stages_are_reported_in_order() {
        let (events, observer) = recorder();
        let result = PhotoPipeline::default()
            .process(
                InputFile::new(jpeg_bytes(300, 200)),
                "uti",
                ProcessOptions::new().background_worker(false).observer(observer),
            )
            .await
            .unwrap();
        assert_eq!((result.width(), result.height()), (213, 213));

        let stages: Vec<Stage> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Stage(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![Stage::Decoding, Stage::Fitting, Stage::Encoding, Stage::Done]
        );
    }

    #[tokio::test]
    async fn unknown_preset_fails_before_decoding() {
        let err = PhotoPipeline::default()
            .process(InputFile::new(jpeg_bytes(50, 50)), "visa", ProcessOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Idle);
        assert!(matches!(err.source, PhotoFitError::InvalidPreset { .. }));
    }

    #[tokio::test]
    async fn disallowed_mime_fails_in_decoding() {
        let file = InputFile::new(jpeg_bytes(50, 50)).with_mime("image/gif");
        let err = PhotoPipeline::default()
            .process(file, "nsdl", ProcessOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Decoding);
        assert!(matches!(err.source, PhotoFitError::UnsupportedMimeType { .. }));
    }

    #[tokio::test]
    async fn manual_crop_is_validated() {
        let err = PhotoPipeline::default()
            .process(
                InputFile::new(jpeg_bytes(100, 100)),
                Preset::custom(50, 50),
                ProcessOptions::new().crop(FitRect::new(60, 0, 50, 50)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Fitting);
        assert!(matches!(err.source, PhotoFitError::InvalidCropRect { .. }));
    }

    #[tokio::test]
    async fn rotation_is_applied_before_fitting() {
        // 200x100 rotated to 100x200; a crop only valid in rotated coordinates
        let result = PhotoPipeline::default()
            .process(
                InputFile::new(jpeg_bytes(200, 100)),
                Preset::custom(40, 80),
                ProcessOptions::new()
                    .rotate(90)
                    .crop(FitRect::new(0, 0, 100, 200)),
            )
            .await
            .unwrap();
        assert_eq!((result.width(), result.height()), (40, 80));

        let err = PhotoPipeline::default()
            .process(
                InputFile::new(jpeg_bytes(200, 100)),
                Preset::custom(40, 80),
                ProcessOptions::new().rotate(45),
            )
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Fitting);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.size_fit.quality_step = -1.0;
        assert!(PhotoPipeline::new(config).is_err());
    }
}
