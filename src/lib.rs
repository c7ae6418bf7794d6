// lib.rs
//
// photo-fit: resize and compress photos to document-photo specifications
//
// Design goals:
// - Exact target resolution, centered cover crop
// - Output at or under a hard byte ceiling, bounded effort
// - Tolerate the broken files people actually upload
// - Non-blocking async API

//! Fit photos to ID-card photo specifications.
//!
//! ```no_run
//! # async fn run(bytes: Vec<u8>) -> Result<(), photo_fit::PipelineError> {
//! use photo_fit::{InputFile, ProcessOptions};
//!
//! let file = InputFile::new(bytes).with_mime("image/jpeg");
//! let result = photo_fit::process(file, "nsdl", ProcessOptions::default()).await?;
//! assert_eq!((result.width(), result.height()), (276, 394));
//! assert!(result.size_bytes() <= 51_200 || result.over_budget());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod ops;

use image::ImageReader;
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::Path;

pub use config::PipelineConfig;
pub use engine::{
    CancelToken, Dimensions, EncodeResult, FitMode, FitRect, InputFile, PhotoPipeline,
    ProcessOptions, ProgressEvent, ProgressObserver,
};
pub use error::{ErrorCategory, PhotoFitError, PipelineError, Result, Stage};
pub use ops::{OutputMime, Preset, PresetSelector, Transform, BUILTIN_PRESETS};

/// Run one upload through a pipeline with the default configuration.
///
/// Must be awaited inside a tokio runtime.
pub async fn process(
    file: InputFile,
    preset: impl Into<PresetSelector>,
    options: ProcessOptions,
) -> std::result::Result<EncodeResult, PipelineError> {
    PhotoPipeline::default().process(file, preset, options).await
}

/// Header-only probe: dimensions and format without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
}

fn read_inspect_metadata<R: BufRead + Seek>(reader: R) -> Result<InspectMetadata> {
    let reader = ImageReader::new(reader)
        .with_guessed_format()
        .map_err(|e| PhotoFitError::decode_failed(format!("failed to read image header: {e}")))?;

    let format = reader.format().map(|f| format!("{:?}", f).to_lowercase());
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| PhotoFitError::decode_failed(format!("failed to read dimensions: {e}")))?;

    Ok(InspectMetadata {
        width,
        height,
        format,
    })
}

pub fn inspect_header_from_bytes(data: &[u8]) -> Result<InspectMetadata> {
    read_inspect_metadata(Cursor::new(data))
}

pub fn inspect_header_from_path(path: impl AsRef<Path>) -> Result<InspectMetadata> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| {
        PhotoFitError::decode_failed(format!("failed to open {}: {e}", path.display()))
    })?;
    read_inspect_metadata(BufReader::new(file))
}

/// Library version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Input formats the decode cascade understands.
pub fn supported_input_formats() -> &'static [&'static str] {
    &["jpeg", "png", "webp"]
}

/// Output formats presets can request.
pub fn supported_output_formats() -> &'static [&'static str] {
    &["jpeg", "png"]
}
