// src/engine.rs
//
// The core of photo-fit. A per-upload pipeline that:
// 1. Screens the raw bytes (firewall)
// 2. Decodes through a cascade of strategies, each under a timeout
// 3. Orients and fits the raster onto the preset's target size
// 4. Re-encodes until the output fits the byte budget
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod api;
mod budget;
mod cascade;
mod common;
mod decoder;
mod encoder;
mod firewall;
mod fitter;
mod io;
mod pool;
mod progress;
mod raster;
mod tasks;

pub use api::{PhotoPipeline, ProcessOptions};
pub use budget::{encode_to_fit, EncodeAttempt, EncodeResult, SizeFitConfig};
pub use cascade::DecodeCascade;
pub use common::{run_with_panic_policy, CancelToken, EngineResult};
pub use decoder::{
    check_dimensions, decode_image, detect_exif_orientation, detect_format, BitmapStrategy,
    DataUriStrategy, DecodeStrategy, DecodedImage, DecoderConfig, DirectStrategy,
};
pub use encoder::{encoder_for, quality_to_percent, JpegEncoder, PngEncoder, RasterEncoder};
pub use firewall::FirewallConfig;
pub use fitter::{fit, letterbox_placement, Dimensions, FitMode, FitRect};
pub use io::{format_from_mime, parse_data_uri, sniff_mime, InputFile, SourceHandle};
pub use pool::{get_pool, THREADS_ENV};
pub use progress::{ProgressEvent, ProgressObserver};
pub use raster::{apply_orientation, apply_transform, draw_region, flatten_alpha};
pub use tasks::{EncodeJob, EncodeWorker, RayonWorker, WorkerOutcome};
