// src/config.rs
//
// Pipeline configuration. Every policy constant the engine uses lives here so a
// deployment can retune it from TOML without touching code.

use crate::engine::{DecoderConfig, FirewallConfig, SizeFitConfig};
use crate::error::{PhotoFitError, Result};
use crate::ops::{Preset, PresetSelector, BUILTIN_PRESETS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level configuration for a [`crate::PhotoPipeline`].
///
/// ```toml
/// [size_fit]
/// quality_step = 0.05
///
/// [decoder]
/// strategy_timeout_ms = 8000
///
/// [presets.passport]
/// target_width = 413
/// target_height = 531
/// max_bytes = 102400
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub firewall: FirewallConfig,
    pub decoder: DecoderConfig,
    pub size_fit: SizeFitConfig,
    /// Extra named presets. Built-in names cannot be overridden.
    pub presets: BTreeMap<String, Preset>,
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| PhotoFitError::invalid_config("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PhotoFitError::invalid_config(path.display().to_string(), e.to_string())
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.firewall.validate()?;
        self.decoder.validate()?;
        self.size_fit.validate()?;
        for (name, preset) in &self.presets {
            if BUILTIN_PRESETS.contains(&name.to_lowercase().as_str()) {
                return Err(PhotoFitError::invalid_config(
                    format!("presets.{name}"),
                    "built-in presets cannot be redefined",
                ));
            }
            preset.validate().map_err(|e| {
                PhotoFitError::invalid_config(format!("presets.{name}"), e.to_string())
            })?;
        }
        Ok(())
    }

    /// Resolve a selector against the built-in and configured presets.
    pub fn resolve_preset(&self, selector: &PresetSelector) -> Result<Preset> {
        let preset = match selector {
            PresetSelector::Custom(preset) => *preset,
            PresetSelector::Named(name) => Preset::builtin(name)
                .or_else(|| self.presets.get(name.trim()).copied())
                .ok_or_else(|| PhotoFitError::invalid_preset(name.clone()))?,
        };
        preset.validate()?;
        Ok(preset)
    }
}
