// src/engine/firewall.rs
//
// Input firewall: cheap checks run before any decoder sees the bytes, plus the
// post-decode pixel ceiling and an optional wall-clock deadline per run.

use crate::engine::io::InputFile;
use crate::error::PhotoFitError;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const STANDARD_MAX_BYTES: u64 = 10 * 1024 * 1024; // 10 MiB upload cap
const LENIENT_MAX_BYTES: u64 = 32 * 1024 * 1024;
const STANDARD_MAX_PIXELS: u64 = 50_000_000; // below the global MAX_PIXELS
const LENIENT_MAX_PIXELS: u64 = 75_000_000;

fn default_allowed_mime_types() -> Vec<String> {
    ["image/jpeg", "image/jpg", "image/png", "image/webp"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FirewallConfig {
    pub enabled: bool,
    /// Upper bound on input length.
    pub max_bytes: Option<u64>,
    /// Upper bound on decoded width * height.
    pub max_pixels: Option<u64>,
    /// Declared MIME types accepted. An absent declaration is always accepted
    /// and left to sniffing. Empty list accepts everything.
    pub allowed_mime_types: Vec<String>,
    /// Wall-clock limit for a whole run, checked at stage boundaries.
    pub timeout_ms: Option<u64>,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl FirewallConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_bytes: None,
            max_pixels: None,
            allowed_mime_types: Vec::new(),
            timeout_ms: None,
        }
    }

    /// The upload rules of the photo tool: 10 MiB, JPEG/PNG/WebP.
    pub fn standard() -> Self {
        Self {
            enabled: true,
            max_bytes: Some(STANDARD_MAX_BYTES),
            max_pixels: Some(STANDARD_MAX_PIXELS),
            allowed_mime_types: default_allowed_mime_types(),
            timeout_ms: None,
        }
    }

    /// Larger inputs, any declared type.
    pub fn lenient() -> Self {
        Self {
            enabled: true,
            max_bytes: Some(LENIENT_MAX_BYTES),
            max_pixels: Some(LENIENT_MAX_PIXELS),
            allowed_mime_types: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn validate(&self) -> Result<(), PhotoFitError> {
        if self.max_bytes == Some(0) {
            return Err(PhotoFitError::invalid_config(
                "firewall.max_bytes",
                "must be positive",
            ));
        }
        if self.max_pixels == Some(0) {
            return Err(PhotoFitError::invalid_config(
                "firewall.max_pixels",
                "must be positive",
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(PhotoFitError::invalid_config(
                "firewall.timeout_ms",
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Pre-decode checks on the raw input.
    pub fn inspect(&self, file: &InputFile) -> Result<(), PhotoFitError> {
        self.enforce_source_len(file.len())?;
        self.enforce_mime(file.declared_mime())
    }

    pub fn enforce_source_len(&self, len: usize) -> Result<(), PhotoFitError> {
        if !self.enabled {
            return Ok(());
        }
        match self.max_bytes {
            Some(limit) if len as u64 > limit => {
                Err(PhotoFitError::input_too_large(len, limit as usize))
            }
            _ => Ok(()),
        }
    }

    pub fn enforce_mime(&self, declared: Option<&str>) -> Result<(), PhotoFitError> {
        if !self.enabled || self.allowed_mime_types.is_empty() {
            return Ok(());
        }
        let Some(mime) = declared.map(str::trim).filter(|m| !m.is_empty()) else {
            return Ok(());
        };
        if self
            .allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime))
        {
            Ok(())
        } else {
            Err(PhotoFitError::unsupported_mime_type(mime.to_ascii_lowercase()))
        }
    }

    pub fn enforce_pixels(&self, width: u32, height: u32) -> Result<(), PhotoFitError> {
        if !self.enabled {
            return Ok(());
        }
        let pixels = width as u64 * height as u64;
        match self.max_pixels {
            Some(limit) if pixels > limit => {
                Err(PhotoFitError::pixel_count_exceeds_limit(pixels, limit))
            }
            _ => Ok(()),
        }
    }

    pub fn enforce_timeout(
        &self,
        started_at: Instant,
        stage: &'static str,
    ) -> Result<(), PhotoFitError> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(limit_ms) = self.timeout_ms {
            let elapsed_ms = started_at.elapsed().as_millis() as u64;
            if elapsed_ms > limit_ms {
                tracing::warn!(
                    target: "photo_fit::firewall",
                    stage,
                    elapsed_ms,
                    limit_ms,
                    "run deadline exceeded"
                );
                return Err(PhotoFitError::strategy_timed_out(stage, limit_ms));
            }
        }
        Ok(())
    }
}
