//! Decoded artifacts and the decoder that validates fetched payloads.
//!
//! Decoding here means "prove the bytes are the expected kind of artifact".
//! A payload that fails this check is a definitive, non-retryable outcome:
//! fetching the same bytes again cannot change the answer.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Image container formats recognised by [`ImageDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
    Bmp,
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactFormat::Png => "png",
            ArtifactFormat::Jpeg => "jpeg",
            ArtifactFormat::Gif => "gif",
            ArtifactFormat::WebP => "webp",
            ArtifactFormat::Bmp => "bmp",
        };
        f.write_str(name)
    }
}

/// A validated artifact. Cloning shares the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub format: ArtifactFormat,
    pub data: Arc<[u8]>,
}

impl Artifact {
    pub fn new(format: ArtifactFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            format,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Payload is structurally not the expected artifact type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

/// Turns raw bytes into an [`Artifact`].
pub trait ArtifactDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Artifact, DecodeError>;
}

/// Recognises common raster image containers by their leading signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl ImageDecoder {
    pub fn sniff(bytes: &[u8]) -> Option<ArtifactFormat> {
        const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
        if bytes.starts_with(PNG) {
            return Some(ArtifactFormat::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ArtifactFormat::Jpeg);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(ArtifactFormat::Gif);
        }
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return Some(ArtifactFormat::WebP);
        }
        if bytes.len() >= 14 && bytes.starts_with(b"BM") {
            return Some(ArtifactFormat::Bmp);
        }
        None
    }
}

impl ArtifactDecoder for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Artifact, DecodeError> {
        match Self::sniff(bytes) {
            Some(format) => Ok(Artifact::new(format, bytes)),
            None => {
                let head: Vec<u8> = bytes.iter().take(8).copied().collect();
                Err(DecodeError(format!(
                    "unrecognised image signature {} ({} bytes)",
                    hex::encode(head),
                    bytes.len()
                )))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Smallest byte string [`super::ImageDecoder`] accepts as a PNG.
    pub fn png(tag: &[u8]) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(tag);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_known_signatures() {
        assert_eq!(ImageDecoder::sniff(&fixtures::png(b"x")), Some(ArtifactFormat::Png));
        assert_eq!(ImageDecoder::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ArtifactFormat::Jpeg));
        assert_eq!(ImageDecoder::sniff(b"GIF89a....."), Some(ArtifactFormat::Gif));
        assert_eq!(ImageDecoder::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ArtifactFormat::WebP));
        assert_eq!(ImageDecoder::sniff(b"BM\0\0\0\0\0\0\0\0\0\0\0\0"), Some(ArtifactFormat::Bmp));
    }

    #[test]
    fn html_error_page_is_not_an_image() {
        let err = ImageDecoder
            .decode(b"<!doctype html><title>404</title>")
            .unwrap_err();
        assert!(err.0.contains("unrecognised image signature"));
    }

    #[test]
    fn decoded_artifact_keeps_payload() {
        let bytes = fixtures::png(b"payload");
        let artifact = ImageDecoder.decode(&bytes).unwrap();
        assert_eq!(artifact.format, ArtifactFormat::Png);
        assert_eq!(&artifact.data[..], &bytes[..]);
        assert_eq!(artifact.len(), bytes.len());
    }
}
