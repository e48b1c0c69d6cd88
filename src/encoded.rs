use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local};
use image::ImageFormat;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Encoded still image (JPEG/PNG bytes) shared by reference.
///
/// The bytes are never mutated after construction; replacing an image in the
/// session means swapping in a new handle.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    id: u64,
    bytes: Arc<[u8]>,
    mime: &'static str,
    created_at: DateTime<Local>,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime: &'static str) -> Self {
        Self {
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            bytes: Arc::from(bytes),
            mime,
            created_at: Local::now(),
        }
    }

    /// Wrap bytes whose format is unknown, sniffing the mime type from the header.
    pub fn sniffed(bytes: Vec<u8>) -> Self {
        let mime = match image::guess_format(&bytes) {
            Ok(ImageFormat::Png) => "image/png",
            Ok(ImageFormat::WebP) => "image/webp",
            Ok(ImageFormat::Gif) => "image/gif",
            Ok(ImageFormat::Bmp) => "image/bmp",
            _ => "image/jpeg",
        };
        Self::new(bytes, mime)
    }

    /// Process-unique identity, used to key display textures.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// Decode either a bare base-64 string or a data URI.
    pub fn from_base64(text: &str) -> Result<Self, base64::DecodeError> {
        let payload = match text.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
            None => text,
        };
        let bytes = STANDARD.decode(payload.trim())?;
        Ok(Self::sniffed(bytes))
    }

    pub fn decode(&self) -> image::ImageResult<image::DynamicImage> {
        image::load_from_memory(&self.bytes)
    }

    /// Same bytes, same identity.
    pub fn same_as(&self, other: &EncodedImage) -> bool {
        self.id == other.id
    }
}

impl PartialEq for EncodedImage {
    fn eq(&self, other: &Self) -> bool {
        self.mime == other.mime && self.bytes == other.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    #[test]
    fn test_data_uri_prefix() {
        let img = EncodedImage::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg");
        assert_eq!(img.to_data_uri(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_from_base64_accepts_data_uri_and_bare() {
        let bare = EncodedImage::from_base64("/9j/").unwrap();
        let uri = EncodedImage::from_base64("data:image/jpeg;base64,/9j/").unwrap();
        assert_eq!(bare.bytes(), &[0xFF, 0xD8, 0xFF]);
        assert_eq!(bare, uri);
        assert!(!bare.same_as(&uri));
    }

    #[test]
    fn test_sniffs_png() {
        let encoded = STANDARD.encode(PNG_MAGIC);
        let img = EncodedImage::from_base64(&encoded).unwrap();
        assert_eq!(img.mime(), "image/png");
    }

    #[test]
    fn test_rejects_invalid_base64() {
        assert!(EncodedImage::from_base64("not base64 at all!").is_err());
    }
}
