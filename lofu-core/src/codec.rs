//! Conversions between encoded image representations.
//!
//! The backend and the browser exchange images as base64 data URLs
//! (`data:image/png;base64,...`), while rendering and object uploads work on
//! raw bytes. [`EncodedImage`] is the single owned representation used by
//! the rest of the crate.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{LofuError, Result};

/// MIME type assumed when a data URL does not declare one.
pub const DEFAULT_MIME: &str = "image/png";

/// An encoded bitmap (PNG, JPEG, ...) with its MIME type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    /// Wrap raw bytes, sniffing the MIME type from the magic number.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime = sniff_mime(&bytes).unwrap_or("application/octet-stream");
        Self::new(bytes, mime)
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    ///
    /// A bare base64 payload without the `data:` header is accepted and
    /// treated as PNG.
    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let data_url = data_url.trim();
        let (mime, payload) = match data_url.strip_prefix("data:") {
            Some(rest) => {
                let (head, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| LofuError::Codec("data URL has no payload".into()))?;
                let mime = head
                    .strip_suffix(";base64")
                    .ok_or_else(|| LofuError::Codec("only base64 data URLs are supported".into()))?;
                let mime = if mime.is_empty() { DEFAULT_MIME } else { mime };
                (mime, payload)
            }
            None => (DEFAULT_MIME, data_url),
        };

        let bytes = BASE64
            .decode(payload)
            .map_err(|e| LofuError::Codec(format!("Invalid base64 payload: {e}")))?;

        Ok(Self::new(bytes, mime))
    }

    /// Encode as a `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }

    /// File extension matching the MIME type, used when naming stored objects.
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "png",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Intrinsic pixel size, read from the header without decoding pixels.
    #[cfg(feature = "overlay")]
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        image::ImageReader::new(std::io::Cursor::new(&self.bytes))
            .with_guessed_format()
            .map_err(|e| LofuError::Decode(format!("Failed to read image header: {e}")))?
            .into_dimensions()
            .map_err(|e| LofuError::Decode(format!("Failed to read image dimensions: {e}")))
    }
}

#[cfg(feature = "overlay")]
fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

#[cfg(not(feature = "overlay"))]
fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

/// Where an image reference points, for embedding into a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Inline data URL that can be embedded as-is.
    Embedded(String),
    /// Remote URL the report service fetches itself.
    Remote(String),
    /// Blob handles and other local references that cannot be sent.
    Unresolved,
}

impl ImageRef {
    pub fn resolve(src: &str) -> Self {
        let src = src.trim();
        if src.starts_with("data:image/") {
            Self::Embedded(src.to_string())
        } else if has_prefix_ignore_case(src, "http://") || has_prefix_ignore_case(src, "https://") {
            Self::Remote(src.to_string())
        } else {
            Self::Unresolved
        }
    }
}

fn has_prefix_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        && s.len() > prefix.len()
}
