// src/engine/budget.rs
//
// Size-fitting: draw the fit region at the target size, then re-encode at
// falling quality until the output fits the byte budget. A single proportional
// downscale is the last resort. Never loops unboundedly.

use crate::engine::common::{check_cancelled, CancelToken, EngineResult};
use crate::engine::encoder::RasterEncoder;
use crate::engine::fitter::{Dimensions, FitRect};
use crate::engine::raster::draw_region;
use crate::error::PhotoFitError;
use crate::ops::{OutputMime, Preset};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Quality reported for lossless output.
const LOSSLESS_QUALITY: f32 = 1.0;

/// Size-fitting policy. Defaults are the canonical values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizeFitConfig {
    /// First encode quality.
    pub initial_quality: f32,
    /// Linear decrement per attempt.
    pub quality_step: f32,
    /// Quality never goes below this.
    pub min_quality: f32,
    /// Maximum number of quality reductions after the first encode.
    pub max_quality_steps: u32,
    /// Multiplier on the proportional downscale factor.
    pub safety_margin: f32,
    /// Upper bound on the quality used for the downscaled encode.
    pub degrade_quality: f32,
    /// Allow the downscale step at all.
    pub allow_downscale: bool,
}

impl Default for SizeFitConfig {
    fn default() -> Self {
        Self {
            initial_quality: 0.92,
            quality_step: 0.08,
            min_quality: 0.08,
            max_quality_steps: 12,
            safety_margin: 0.95,
            degrade_quality: 0.5,
            allow_downscale: true,
        }
    }
}

impl SizeFitConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let unit = |field: &'static str, v: f32| -> EngineResult<()> {
            if v.is_finite() && v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(PhotoFitError::invalid_config(
                    field,
                    format!("{v} is outside (0, 1]"),
                ))
            }
        };
        unit("size_fit.initial_quality", self.initial_quality)?;
        unit("size_fit.quality_step", self.quality_step)?;
        unit("size_fit.min_quality", self.min_quality)?;
        unit("size_fit.safety_margin", self.safety_margin)?;
        unit("size_fit.degrade_quality", self.degrade_quality)?;
        if self.min_quality > self.initial_quality {
            return Err(PhotoFitError::invalid_config(
                "size_fit.min_quality",
                "must not exceed initial_quality",
            ));
        }
        Ok(())
    }

    /// Quality for the n-th attempt (0 = first encode).
    pub fn quality_at(&self, step: u32) -> f32 {
        (self.initial_quality - self.quality_step * step as f32).max(self.min_quality)
    }
}

/// The terminal artifact of a run.
///
/// Fields are private so `size_bytes()` always equals the buffer length.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeResult {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    quality: f32,
    over_budget: bool,
    attempts: u32,
    mime: OutputMime,
}

impl EncodeResult {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Quality of the returned encode, in [0, 1].
    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// The budget could not be met; this is the smallest attempt.
    pub fn over_budget(&self) -> bool {
        self.over_budget
    }

    /// Total encodes performed, including the downscaled one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn mime(&self) -> OutputMime {
        self.mime
    }

    /// Download name such as `nsdl-pan.jpg`.
    pub fn suggested_file_name(&self, key: &str) -> String {
        let key = key.trim();
        let key = if key.is_empty() { "photo" } else { key };
        format!("{}-pan.{}", key.to_lowercase(), self.mime.extension())
    }
}

/// One encode attempt, reported to observers as it happens.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EncodeAttempt {
    /// 1-based attempt number.
    pub index: u32,
    pub quality: f32,
    pub size_bytes: usize,
    pub width: u32,
    pub height: u32,
    /// Produced by the downscale fallback.
    pub downscaled: bool,
}

/// Draw, encode and shrink until the output fits `preset.max_bytes`.
///
/// Only encoder failures are errors; a missed budget comes back as a result
/// flagged `over_budget`.
pub fn encode_to_fit(
    img: &DynamicImage,
    rect: FitRect,
    preset: &Preset,
    encoder: &dyn RasterEncoder,
    config: &SizeFitConfig,
    cancel: Option<&CancelToken>,
    on_attempt: &mut dyn FnMut(&EncodeAttempt),
) -> EngineResult<EncodeResult> {
    preset.validate()?;
    let target = Dimensions::new(preset.target_width, preset.target_height);
    let max_bytes = preset.max_bytes as usize;
    let mime = encoder.mime();

    let canvas = draw_region(img, rect, target.width, target.height)?;

    let attempts = Cell::new(0u32);
    let mut encode = |surface: &DynamicImage,
                      quality: f32,
                      downscaled: bool|
     -> EngineResult<Vec<u8>> {
        check_cancelled(cancel)?;
        let bytes = encoder.encode(surface, quality)?;
        attempts.set(attempts.get() + 1);
        let attempt = EncodeAttempt {
            index: attempts.get(),
            quality,
            size_bytes: bytes.len(),
            width: surface.width(),
            height: surface.height(),
            downscaled,
        };
        tracing::trace!(
            target: "photo_fit::budget",
            attempt = attempt.index,
            quality,
            size = attempt.size_bytes,
            max_bytes,
            downscaled,
            "encoded"
        );
        on_attempt(&attempt);
        Ok(bytes)
    };

    let lossy = mime.is_lossy();
    let mut quality = if lossy {
        config.quality_at(0)
    } else {
        LOSSLESS_QUALITY
    };
    let mut bytes = encode(&canvas, quality, false)?;

    if lossy {
        let mut step = 0;
        // Stop once the floor has been encoded; further steps would repeat it
        while bytes.len() > max_bytes
            && step < config.max_quality_steps
            && quality > config.min_quality
        {
            step += 1;
            quality = config.quality_at(step);
            bytes = encode(&canvas, quality, false)?;
        }
    }

    if bytes.len() <= max_bytes {
        tracing::debug!(
            target: "photo_fit::budget",
            size = bytes.len(),
            max_bytes,
            quality,
            "fit within budget"
        );
        return Ok(EncodeResult {
            bytes,
            width: target.width,
            height: target.height,
            quality,
            over_budget: false,
            attempts: attempts.get(),
            mime,
        });
    }

    let mut best = EncodeResult {
        bytes,
        width: target.width,
        height: target.height,
        quality,
        over_budget: true,
        attempts: attempts.get(),
        mime,
    };

    if config.allow_downscale {
        let factor =
            (max_bytes as f64 / best.bytes.len() as f64).sqrt() * config.safety_margin as f64;
        let small = Dimensions::new(
            ((target.width as f64 * factor).floor() as u32).max(1),
            ((target.height as f64 * factor).floor() as u32).max(1),
        );
        if small != target {
            let degraded_quality = if lossy {
                quality.min(config.degrade_quality)
            } else {
                LOSSLESS_QUALITY
            };
            let full = FitRect::full(target.width, target.height);
            let surface = draw_region(&canvas, full, small.width, small.height)?;
            let small_bytes = encode(&surface, degraded_quality, true)?;
            tracing::debug!(
                target: "photo_fit::budget",
                width = small.width,
                height = small.height,
                size = small_bytes.len(),
                max_bytes,
                "downscaled"
            );
            if small_bytes.len() <= best.bytes.len() {
                best = EncodeResult {
                    over_budget: small_bytes.len() > max_bytes,
                    bytes: small_bytes,
                    width: small.width,
                    height: small.height,
                    quality: degraded_quality,
                    attempts: attempts.get(),
                    mime,
                };
            }
        }
    }

    best.attempts = attempts.get();
    if best.over_budget {
        tracing::warn!(
            target: "photo_fit::budget",
            size = best.bytes.len(),
            max_bytes,
            attempts = best.attempts,
            "byte budget not met, returning smallest attempt"
        );
    }
    Ok(best)
}
