//! # Static Image Decoder
//!
//! Decodes a single uploaded image through the same decode primitive the
//! live loop uses. Independent of any camera stream.
//!
//! The image is decoded and converted to RGBA on the blocking pool; the
//! intermediate bitmap is dropped inside that call whether a code was found
//! or not.

use std::path::Path;
use std::sync::Arc;

use scan_decode::DecodePrimitive;
use tracing::{debug, info};

use crate::error::{ScannerError, ScannerResult};
use crate::payload::DecodedPayload;

/// A user-supplied image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    /// MIME type reported by the uploader, if any.
    pub mime: Option<String>,
    pub name: Option<String>,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, mime: Option<String>) -> Self {
        Self {
            bytes,
            mime,
            name: None,
        }
    }

    /// Reads an image file, guessing its MIME type from the extension.
    pub fn from_path(path: &Path) -> ScannerResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| ScannerError::io("read uploaded image", e).with_path(path.display().to_string()))?;
        let mime = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension)
            .map(str::to_string);
        Ok(Self {
            bytes,
            mime,
            name: path.file_name().map(|name| name.to_string_lossy().into_owned()),
        })
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Decodes uploaded images.
#[derive(Clone)]
pub struct StaticImageDecoder {
    decoder: Arc<dyn DecodePrimitive>,
}

impl StaticImageDecoder {
    pub fn new(decoder: Arc<dyn DecodePrimitive>) -> Self {
        Self { decoder }
    }

    /// Decodes a code from an uploaded image.
    ///
    /// Fails with `unreadable_image` for non-image uploads or corrupt files,
    /// and `no_code_found` when the image holds no readable code.
    pub async fn decode_image(&self, upload: UploadedImage) -> ScannerResult<DecodedPayload> {
        if let Some(mime) = upload.mime.as_deref() {
            if !mime.starts_with("image/") {
                return Err(ScannerError::unreadable_image(format!("unsupported media type '{mime}'")));
            }
        }
        if upload.bytes.is_empty() {
            return Err(ScannerError::unreadable_image("file is empty"));
        }

        let decoder = Arc::clone(&self.decoder);
        let bytes = upload.bytes;
        let decoded = tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes)
                .map_err(|e| ScannerError::unreadable_image(e.to_string()))?;
            let rgba = image.into_rgba8();
            debug!(width = rgba.width(), height = rgba.height(), "Decoding uploaded image");
            Ok::<_, ScannerError>(decoder.decode(rgba.as_raw(), rgba.width(), rgba.height()))
        })
        .await??;

        match decoded {
            Some(code) => {
                info!(name = ?upload.name, payload_len = code.data.len(), "Code found in uploaded image");
                Ok(DecodedPayload::uploaded(code))
            }
            None => Err(ScannerError::no_code_found()),
        }
    }
}

impl std::fmt::Debug for StaticImageDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticImageDecoder").finish_non_exhaustive()
    }
}
