// src/engine/io.rs
//
// I/O types: the caller's input blob, transient handles onto it, data: URI
// round-tripping and the rebuild/repair step used by the decode cascade.

use crate::error::PhotoFitError;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::ImageFormat;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// How far into a buffer we look for a JPEG SOI marker hidden behind junk.
const SOI_SCAN_WINDOW: usize = 1024;

const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Raw file bytes plus the MIME type and name the caller declared.
///
/// Cloning is cheap: the bytes are shared. Every clone, and every buffer
/// produced by [`InputFile::rebuild`], shares one handle ledger so leaked
/// [`SourceHandle`]s can be detected with [`InputFile::outstanding_handles`].
#[derive(Clone, Debug)]
pub struct InputFile {
    bytes: Arc<[u8]>,
    declared_mime: Option<Arc<str>>,
    name: Option<Arc<str>>,
    handles: Arc<AtomicUsize>,
}

impl InputFile {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            bytes: Arc::from(bytes),
            declared_mime: None,
            name: None,
            handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_mime(mut self, mime: impl AsRef<str>) -> Self {
        let mime = mime.as_ref().trim();
        self.declared_mime = (!mime.is_empty()).then(|| Arc::from(mime.to_ascii_lowercase()));
        self
    }

    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Some(Arc::from(name.as_ref()));
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn declared_mime(&self) -> Option<&str> {
        self.declared_mime.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Declared MIME type, or the sniffed one when the caller gave none.
    pub fn effective_mime(&self) -> Option<String> {
        self.declared_mime
            .as_deref()
            .map(str::to_string)
            .or_else(|| sniff_mime(&self.bytes).map(str::to_string))
    }

    /// Take a transient reference for one decode attempt. Released on drop.
    pub fn handle(&self) -> SourceHandle {
        self.handles.fetch_add(1, Ordering::SeqCst);
        SourceHandle {
            bytes: Arc::clone(&self.bytes),
            mime: self.declared_mime.clone(),
            ledger: Arc::clone(&self.handles),
        }
    }

    /// Number of handles taken from this file (or its rebuilds) and not yet dropped.
    pub fn outstanding_handles(&self) -> usize {
        self.handles.load(Ordering::SeqCst)
    }

    /// Copy the bytes into a fresh buffer with an explicit MIME type.
    ///
    /// JPEG input is also repaired: junk before the SOI marker is dropped and a
    /// missing EOI marker is appended, which is what truncated mobile uploads
    /// usually need.
    pub fn rebuild(&self) -> InputFile {
        let mut data = self.bytes.to_vec();
        let sniffed = sniff_mime(&data);

        if let Some(offset) = find_jpeg_soi(&data) {
            if offset > 0 {
                data.drain(..offset);
            }
            if !data.ends_with(&JPEG_EOI) {
                // Trailing zero fill is common on truncated uploads
                while data.last() == Some(&0) {
                    data.pop();
                }
                if !data.ends_with(&JPEG_EOI) {
                    data.extend_from_slice(&JPEG_EOI);
                }
            }
        }

        let mime = sniff_mime(&data)
            .or(sniffed)
            .map(str::to_string)
            .or_else(|| self.declared_mime.as_deref().map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        InputFile {
            bytes: Arc::from(data),
            declared_mime: Some(Arc::from(mime)),
            name: self.name.clone(),
            handles: Arc::clone(&self.handles),
        }
    }
}

impl From<Vec<u8>> for InputFile {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// A transient reference onto an [`InputFile`]'s bytes, held by one decode
/// strategy for the duration of its attempt.
#[derive(Debug)]
pub struct SourceHandle {
    bytes: Arc<[u8]>,
    mime: Option<Arc<str>>,
    ledger: Arc<AtomicUsize>,
}

impl SourceHandle {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    /// Encode the bytes as a `data:` URI using the declared (or sniffed) MIME type.
    pub fn to_data_uri(&self) -> String {
        let mime = self
            .mime()
            .or_else(|| sniff_mime(&self.bytes))
            .unwrap_or("application/octet-stream");
        format!("data:{mime};base64,{}", STANDARD.encode(&self.bytes))
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.ledger.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Parse a base64 `data:` URI into its MIME type and payload.
pub fn parse_data_uri(uri: &str) -> Result<(String, Vec<u8>), PhotoFitError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| PhotoFitError::decode_failed("data uri: missing 'data:' scheme"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| PhotoFitError::decode_failed("data uri: missing ',' separator"))?;
    let mime = header.strip_suffix(";base64").ok_or_else(|| {
        PhotoFitError::decode_failed("data uri: only base64 payloads are supported")
    })?;
    let data = STANDARD
        .decode(payload)
        .map_err(|e| PhotoFitError::decode_failed(format!("data uri: invalid base64: {e}")))?;
    Ok((mime.to_ascii_lowercase(), data))
}

/// Sniff the MIME type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::WebP => Some("image/webp"),
        other => Some(other.to_mime_type()),
    }
}

/// Map a MIME type onto an image format. `image/jpg` is accepted as an alias.
pub fn format_from_mime(mime: &str) -> Option<ImageFormat> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
        other => ImageFormat::from_mime_type(other),
    }
}

fn find_jpeg_soi(data: &[u8]) -> Option<usize> {
    let window = &data[..data.len().min(SOI_SCAN_WINDOW)];
    window.windows(JPEG_SOI.len()).position(|w| w == JPEG_SOI)
}
