//! Content sniffing and best-effort image re-encoding.

use bytes::Bytes;
use image::{
    DynamicImage, GenericImageView, ImageFormat, codecs::jpeg::JpegEncoder, imageops::FilterType,
};
use std::io::Cursor;
use tracing::{debug, warn};

/// Sniffs and optionally re-encodes upload payloads.
///
/// Both operations are synchronous CPU work; the pipeline runs them on a
/// blocking worker.
pub trait ContentValidator: Send + Sync {
    /// Content type detected from the bytes, `None` when nothing is recognized.
    fn sniff(&self, bytes: &[u8]) -> Option<String>;

    /// Re-encode an image within size/quality bounds.
    ///
    /// Never fails: on any error the original bytes come back unchanged.
    fn reencode(&self, bytes: Bytes, declared_mime: &str) -> Bytes;

    /// Whether `declared_mime` goes through `reencode` at all.
    fn should_reencode(&self, declared_mime: &str) -> bool;
}

/// Whether a sniffed type is consistent with what the client declared.
pub fn mime_compatible(declared: &str, detected: Option<&str>) -> bool {
    let Some(detected) = detected else {
        return true;
    };
    let declared = essence(declared);
    let detected = essence(detected);
    if declared == detected || declared == "application/octet-stream" {
        return true;
    }
    if is_xml_type(&declared)
        && matches!(
            detected.as_str(),
            "text/xml" | "application/xml" | "text/plain"
        )
    {
        return true;
    }
    if detected == "text/plain" {
        return declared.starts_with("text/")
            || matches!(
                declared.as_str(),
                "application/json" | "application/xml" | "application/javascript"
            );
    }
    matches!(
        (declared.as_str(), detected.as_str()),
        ("image/jpg", "image/jpeg")
            | ("audio/wav", "audio/x-wav")
            | ("audio/x-wav", "audio/wav")
            | ("audio/ogg", "video/ogg")
            | ("application/x-zip-compressed", "application/zip")
    )
}

/// XML documents and XML-based formats such as SVG.
fn is_xml_type(mime: &str) -> bool {
    matches!(mime, "application/xml" | "text/xml") || mime.ends_with("+xml")
}

/// Lowercased type/subtype without parameters.
fn essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy)]
pub struct ReencodeLimits {
    /// Images are scaled down to fit inside `max_dimension`².
    pub max_dimension: u32,
    /// JPEG quality, 1–100.
    pub jpeg_quality: u8,
}

impl Default for ReencodeLimits {
    fn default() -> Self {
        Self {
            max_dimension: 2048,
            jpeg_quality: 80,
        }
    }
}

/// Magic-byte sniffing with the `infer` crate and single-format
/// re-encoding with the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct MagicValidator {
    limits: ReencodeLimits,
}

impl MagicValidator {
    pub fn new(limits: ReencodeLimits) -> Self {
        Self { limits }
    }

    fn target_format(declared_mime: &str) -> Option<ImageFormat> {
        match essence(declared_mime).as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    fn try_reencode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
    ) -> Result<(Vec<u8>, bool), image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        let (width, height) = img.dimensions();
        let max = self.limits.max_dimension;
        let resized = width > max || height > max;
        let img = if resized {
            img.resize(max, max, FilterType::Lanczos3)
        } else {
            img
        };

        let mut out = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                let encoder =
                    JpegEncoder::new_with_quality(&mut out, self.limits.jpeg_quality.clamp(1, 100));
                rgb.write_with_encoder(encoder)?;
            }
            other => img.write_to(&mut Cursor::new(&mut out), other)?,
        }
        Ok((out, resized))
    }
}

impl ContentValidator for MagicValidator {
    fn sniff(&self, bytes: &[u8]) -> Option<String> {
        if let Some(kind) = infer::get(bytes) {
            return Some(kind.mime_type().to_string());
        }
        // Plain text has no magic bytes: accept UTF-8 without NULs.
        if std::str::from_utf8(bytes).is_ok() && !bytes.contains(&0) {
            return Some("text/plain".to_string());
        }
        None
    }

    fn should_reencode(&self, declared_mime: &str) -> bool {
        Self::target_format(declared_mime).is_some()
    }

    fn reencode(&self, bytes: Bytes, declared_mime: &str) -> Bytes {
        let Some(format) = Self::target_format(declared_mime) else {
            return bytes;
        };
        match self.try_reencode(&bytes, format) {
            Ok((out, resized)) if resized || out.len() < bytes.len() => {
                debug!(
                    original = bytes.len(),
                    reencoded = out.len(),
                    resized,
                    "re-encoded image"
                );
                Bytes::from(out)
            }
            Ok(_) => bytes,
            Err(err) => {
                warn!(
                    error = %err,
                    mime = declared_mime,
                    "image re-encoding failed, keeping original"
                );
                bytes
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn sniffs_text_and_binary() {
        let v = MagicValidator::default();
        assert_eq!(v.sniff(b"hello world").as_deref(), Some("text/plain"));
        assert_eq!(v.sniff(b"%PDF-1.7\n...").as_deref(), Some("application/pdf"));
        assert_eq!(v.sniff(&png(2, 2)).as_deref(), Some("image/png"));
        assert_eq!(v.sniff(&[0u8, 159, 146, 150]), None);
    }

    #[test]
    fn compatibility_rules() {
        assert!(mime_compatible("text/plain", Some("text/plain")));
        assert!(mime_compatible("text/csv", Some("text/plain")));
        assert!(mime_compatible("application/json; charset=utf-8", Some("text/plain")));
        assert!(mime_compatible("image/jpg", Some("image/jpeg")));
        assert!(mime_compatible("application/octet-stream", None));
        assert!(mime_compatible("application/octet-stream", Some("application/pdf")));
        assert!(!mime_compatible("image/png", Some("application/pdf")));
        assert!(!mime_compatible("image/png", Some("text/plain")));
        assert!(mime_compatible("image/svg+xml", Some("text/xml")));
        assert!(mime_compatible("image/svg+xml", Some("text/plain")));
        assert!(mime_compatible("application/xml", Some("text/xml")));
        assert!(mime_compatible("text/xml", Some("application/xml")));
        assert!(mime_compatible("application/atom+xml", Some("text/xml")));
        assert!(!mime_compatible("image/svg+xml", Some("image/png")));
        assert!(!mime_compatible("image/png", Some("text/xml")));
    }

    #[test]
    fn xml_documents_match_their_declared_types() {
        let v = MagicValidator::default();
        let prolog_svg: &[u8] =
            br#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg"/>"#;
        let bare_svg: &[u8] = br#"<svg xmlns="http://www.w3.org/2000/svg"><rect/></svg>"#;
        let feed: &[u8] = br#"<?xml version="1.0"?><feed/>"#;

        for svg in [prolog_svg, bare_svg] {
            assert!(mime_compatible("image/svg+xml", v.sniff(svg).as_deref()));
        }
        assert!(mime_compatible("application/xml", v.sniff(feed).as_deref()));
        assert!(mime_compatible("text/xml", v.sniff(feed).as_deref()));
    }

    #[test]
    fn reencode_downscales_large_images() {
        let v = MagicValidator::new(ReencodeLimits {
            max_dimension: 16,
            jpeg_quality: 80,
        });
        let out = v.reencode(Bytes::from(png(64, 32)), "image/png");
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.dimensions(), (16, 8));
    }

    #[test]
    fn reencode_failure_returns_original() {
        let v = MagicValidator::default();
        let garbage = Bytes::from_static(b"\x89PNG\r\n\x1a\nnot really a png");
        assert_eq!(v.reencode(garbage.clone(), "image/png"), garbage);
    }

    #[test]
    fn exempt_types_pass_through() {
        let v = MagicValidator::default();
        assert!(!v.should_reencode("image/gif"));
        assert!(!v.should_reencode("image/svg+xml"));
        assert!(v.should_reencode("image/jpeg"));
        let gif = Bytes::from_static(b"GIF89a....");
        assert_eq!(v.reencode(gif.clone(), "image/gif"), gif);
    }
}
