// src/ops.rs
//
// Presets and output formats.
// These are cheap, immutable values supplied per invocation.

use crate::error::{PhotoFitError, Result};
use serde::{Deserialize, Serialize};

/// Output MIME type for the encoded result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMime {
    #[default]
    Jpeg,
    Png,
}

impl OutputMime {
    pub fn from_str(format: &str) -> Result<Self> {
        match format.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" | "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            "png" | "image/png" => Ok(Self::Png),
            other => Err(PhotoFitError::unsupported_mime_type(other.to_string())),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Whether the encoder honours a quality parameter.
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Jpeg)
    }
}

// =============================================================================
// PRESETS - document-photo specifications
// =============================================================================

/// Byte budget used by [`Preset::custom`] when the caller gives none.
pub const DEFAULT_CUSTOM_MAX_BYTES: u32 = 200 * 1024;

/// Target pixel dimensions plus the byte ceiling of a real-world photo spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub target_width: u32,
    pub target_height: u32,
    pub max_bytes: u32,
    #[serde(default)]
    pub mime: OutputMime,
}

impl Preset {
    pub fn new(target_width: u32, target_height: u32, max_bytes: u32, mime: OutputMime) -> Self {
        Self {
            target_width,
            target_height,
            max_bytes,
            mime,
        }
    }

    /// Custom JPEG preset with the default 200 KiB budget.
    pub fn custom(target_width: u32, target_height: u32) -> Self {
        Self::new(
            target_width,
            target_height,
            DEFAULT_CUSTOM_MAX_BYTES,
            OutputMime::Jpeg,
        )
    }

    pub fn with_max_bytes(mut self, max_bytes: u32) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_mime(mut self, mime: OutputMime) -> Self {
        self.mime = mime;
        self
    }

    /// Get the built-in preset by name
    pub fn builtin(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "nsdl" => Some(Self::nsdl()),
            "uti" => Some(Self::uti()),
            _ => None,
        }
    }

    /// NSDL PAN card photo: 276x394, 50 KiB, JPEG
    pub fn nsdl() -> Self {
        Self::new(276, 394, 51_200, OutputMime::Jpeg)
    }

    /// UTIITSL PAN card photo: 213x213, 30 KiB, JPEG
    pub fn uti() -> Self {
        Self::new(213, 213, 30_720, OutputMime::Jpeg)
    }

    /// Reject presets with any non-positive field.
    pub fn validate(&self) -> Result<()> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(PhotoFitError::invalid_dimensions(
                self.target_width,
                self.target_height,
            ));
        }
        if self.max_bytes == 0 {
            return Err(PhotoFitError::invalid_config(
                "max_bytes",
                "byte budget must be positive",
            ));
        }
        Ok(())
    }
}

/// Names of the built-in presets, in display order.
pub const BUILTIN_PRESETS: &[&str] = &["nsdl", "uti"];

/// How the caller picks a preset: by name or by value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresetSelector {
    Named(String),
    Custom(Preset),
}

impl PresetSelector {
    /// Short key used for logging and suggested file names.
    pub fn key(&self) -> &str {
        match self {
            Self::Named(name) => name.as_str(),
            Self::Custom(_) => "custom",
        }
    }
}

impl From<&str> for PresetSelector {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for PresetSelector {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Preset> for PresetSelector {
    fn from(preset: Preset) -> Self {
        Self::Custom(preset)
    }
}

/// Caller-requested orientation change applied before fitting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Transform {
    /// Clockwise degrees, any multiple of 90 (negatives turn counter-clockwise)
    pub rotate: i32,
    pub flip_h: bool,
    pub flip_v: bool,
}

impl Transform {
    pub fn is_identity(&self) -> bool {
        self.rotate.rem_euclid(360) == 0 && !self.flip_h && !self.flip_v
    }
}
