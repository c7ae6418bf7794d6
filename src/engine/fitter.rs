// src/engine/fitter.rs
//
// Geometric fitting: map an arbitrary source aspect ratio onto a fixed target
// size. Pure integer math so the same arguments always give the same rectangle.

use crate::error::{PhotoFitError, Result};
use serde::{Deserialize, Serialize};

/// Width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    fn ensure_positive(&self) -> Result<()> {
        if self.is_empty() {
            Err(PhotoFitError::invalid_dimensions(self.width, self.height))
        } else {
            Ok(())
        }
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Source sub-rectangle to draw onto the target canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FitRect {
    pub sx: u32,
    pub sy: u32,
    pub sw: u32,
    pub sh: u32,
}

impl FitRect {
    pub fn new(sx: u32, sy: u32, sw: u32, sh: u32) -> Self {
        Self { sx, sy, sw, sh }
    }

    /// The whole of an image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Non-empty and fully inside a `width x height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.sw > 0
            && self.sh > 0
            && (self.sx as u64 + self.sw as u64) <= width as u64
            && (self.sy as u64 + self.sh as u64) <= height as u64
    }

    /// Error out unless the rectangle lies inside the image.
    pub fn validate_within(&self, width: u32, height: u32) -> Result<()> {
        if self.fits_within(width, height) {
            Ok(())
        } else {
            Err(PhotoFitError::invalid_crop_rect(
                self.sx, self.sy, self.sw, self.sh, width, height,
            ))
        }
    }
}

/// How the source is mapped onto the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Crop the source to the target aspect ratio, centered. Fills the canvas.
    #[default]
    Cover,
    /// Keep the whole source; see [`letterbox_placement`] for where it lands.
    Letterbox,
}

/// Compute the source rectangle for `source -> target` under `mode`.
pub fn fit(source: Dimensions, target: Dimensions, mode: FitMode) -> Result<FitRect> {
    source.ensure_positive()?;
    target.ensure_positive()?;

    let rect = match mode {
        FitMode::Cover => cover(source, target),
        FitMode::Letterbox => FitRect::full(source.width, source.height),
    };
    tracing::trace!(
        target: "photo_fit::fitter",
        ?source, ?target, ?mode, ?rect,
        "computed fit rect"
    );
    Ok(rect)
}

fn cover(source: Dimensions, target: Dimensions) -> FitRect {
    let (w, h) = (source.width as u64, source.height as u64);
    let (tw, th) = (target.width as u64, target.height as u64);

    if w * th > tw * h {
        // Wider than the target: full height, trim the sides
        let sw = (h * tw / th).clamp(1, w);
        FitRect::new(((w - sw) / 2) as u32, 0, sw as u32, source.height)
    } else {
        let sh = (w * th / tw).clamp(1, h);
        FitRect::new(0, ((h - sh) / 2) as u32, source.width, sh as u32)
    }
}

/// Destination rectangle (x, y, width, height) that letterboxes `source`
/// centered inside a `target` canvas.
pub fn letterbox_placement(source: Dimensions, target: Dimensions) -> Result<FitRect> {
    source.ensure_positive()?;
    target.ensure_positive()?;

    let (w, h) = (source.width as u64, source.height as u64);
    let (tw, th) = (target.width as u64, target.height as u64);

    let (dw, dh) = if w * th > tw * h {
        (tw, (h * tw / w).clamp(1, th))
    } else {
        ((w * th / h).clamp(1, tw), th)
    };
    Ok(FitRect::new(
        ((tw - dw) / 2) as u32,
        ((th - dh) / 2) as u32,
        dw as u32,
        dh as u32,
    ))
}
