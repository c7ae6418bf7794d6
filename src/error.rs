// src/error.rs
//
// Unified error handling for photo-fit
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input, recoverable
// - CodecError: Format/encoding issues
// - ResourceLimit: Memory/time/dimension limits
// - InternalBug: Library bugs (should not happen)
//
// "Over budget" is deliberately absent: a result that misses its byte budget is
// a successful EncodeResult carrying a flag, never an error.

use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Error taxonomy used by callers to pick user-facing feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Memory/time/dimension limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }

    /// Stable PHOTO_FIT_* code string for this category
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "PHOTO_FIT_USER_ERROR",
            ErrorCategory::CodecError => "PHOTO_FIT_CODEC_ERROR",
            ErrorCategory::ResourceLimit => "PHOTO_FIT_RESOURCE_LIMIT",
            ErrorCategory::InternalBug => "PHOTO_FIT_INTERNAL_BUG",
        }
    }
}

/// One failed decode strategy, kept for diagnostics in [`PhotoFitError::DecodeFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub rebuilt: bool,
    pub message: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pass = if self.rebuilt { "rebuilt" } else { "original" };
        write!(f, "{}[{}]: {}", self.strategy, pass, self.message)
    }
}

/// photo-fit error types
#[derive(Debug, Clone, Error)]
pub enum PhotoFitError {
    // Input firewall
    #[error("Input is {len} bytes, above the {max} byte upload limit")]
    InputTooLarge { len: usize, max: usize },

    #[error("Unsupported file type '{mime}'. Use JPG, PNG or WebP")]
    UnsupportedMimeType { mime: Cow<'static, str> },

    // Decode
    #[error("Failed to decode image: {reason}")]
    DecodeFailed {
        reason: Cow<'static, str>,
        attempts: Vec<StrategyFailure>,
    },

    #[error("Decode strategy '{strategy}' timed out after {timeout_ms}ms")]
    StrategyTimedOut {
        strategy: &'static str,
        timeout_ms: u64,
    },

    // Size limits
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Geometry / options
    #[error("Invalid dimensions: width={width}, height={height}. Both must be positive")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Crop rectangle ({x}+{width}, {y}+{height}) exceeds image dimensions ({img_width}x{img_height})")]
    InvalidCropRect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },

    #[error("Unsupported rotation angle: {degrees}. Only multiples of 90 are supported")]
    InvalidRotation { degrees: i32 },

    // Encode
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Configuration
    #[error("Unknown preset: '{name}'")]
    InvalidPreset { name: Cow<'static, str> },

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig {
        field: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Execution
    #[error("Processing was cancelled")]
    Cancelled,

    #[error("Background worker failed: {message}")]
    WorkerFailed { message: Cow<'static, str> },

    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

// Constructor Helpers
impl PhotoFitError {
    pub fn input_too_large(len: usize, max: usize) -> Self {
        Self::InputTooLarge { len, max }
    }

    pub fn unsupported_mime_type(mime: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedMimeType { mime: mime.into() }
    }

    /// A single decoder failure with no cascade context.
    pub fn decode_failed(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            reason: reason.into(),
            attempts: Vec::new(),
        }
    }

    /// Too few bytes to be any supported image; no strategy is tried.
    pub fn input_too_small(len: usize, min: usize) -> Self {
        Self::DecodeFailed {
            reason: Cow::Owned(format!("input too small ({len} bytes, minimum {min})")),
            attempts: Vec::new(),
        }
    }

    /// Terminal cascade failure: every strategy was exhausted.
    pub fn unusable_input(attempts: Vec<StrategyFailure>) -> Self {
        Self::DecodeFailed {
            reason: Cow::Borrowed("unusable input"),
            attempts,
        }
    }

    pub fn strategy_timed_out(strategy: &'static str, timeout_ms: u64) -> Self {
        Self::StrategyTimedOut {
            strategy,
            timeout_ms,
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn invalid_dimensions(width: u32, height: u32) -> Self {
        Self::InvalidDimensions { width, height }
    }

    pub fn invalid_crop_rect(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    ) -> Self {
        Self::InvalidCropRect {
            x,
            y,
            width,
            height,
            img_width,
            img_height,
        }
    }

    pub fn invalid_rotation(degrees: i32) -> Self {
        Self::InvalidRotation { degrees }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn invalid_preset(name: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidPreset { name: name.into() }
    }

    pub fn invalid_config(
        field: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    pub fn worker_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::WorkerFailed {
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it)
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedMimeType { .. }
            | Self::InvalidDimensions { .. }
            | Self::InvalidCropRect { .. }
            | Self::InvalidRotation { .. }
            | Self::InvalidPreset { .. }
            | Self::InvalidConfig { .. }
            | Self::Cancelled => ErrorCategory::UserError,

            Self::DecodeFailed { .. } | Self::EncodeFailed { .. } => ErrorCategory::CodecError,

            Self::InputTooLarge { .. }
            | Self::StrategyTimedOut { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorCategory::ResourceLimit,

            Self::WorkerFailed { .. } | Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

/// Pipeline stage, used both for progress reporting and to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Decoding,
    Fitting,
    Encoding,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Decoding => "decoding",
            Stage::Fitting => "fitting",
            Stage::Encoding => "encoding",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage failure surfaced by the orchestrator. The cause is passed through
/// unchanged so callers can give stage-specific feedback.
#[derive(Debug, Clone, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: PhotoFitError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: PhotoFitError) -> Self {
        Self { stage, source }
    }

    pub fn cause(&self) -> &PhotoFitError {
        &self.source
    }

    pub fn category(&self) -> ErrorCategory {
        self.source.category()
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, PhotoFitError>;
