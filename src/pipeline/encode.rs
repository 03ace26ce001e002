//! Image encoding: `DynamicImage` → baseline JPEG bytes → `ImageData`.
//!
//! Every page is re-encoded to one fixed format no matter what was uploaded,
//! so a 12 MB PNG screenshot and a rendered PDF page cost the model call
//! roughly the same. JPEG keeps multi-page requests small; the alpha channel
//! is dropped because JPEG has none.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// The raster format an [`EncodedImage`] is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// Baseline JPEG.
    Jpeg,
}

impl ImageEncoding {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "image/jpeg",
        }
    }
}

/// One page, encoded and ready to ship to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// 1-indexed page number within the upload.
    pub page: usize,
    pub encoding: ImageEncoding,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 payload for a data URI.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Wrap as an attachment for a vision chat message.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.to_base64(), self.encoding.mime_type()).with_detail("high")
    }
}

/// Encode a page image as JPEG at the given quality.
pub fn encode_page(
    page: usize,
    img: &DynamicImage,
    quality: u8,
) -> Result<EncodedImage, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut bytes = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))?;
    debug!("Encoded page {} → {} bytes JPEG", page, bytes.len());

    Ok(EncodedImage {
        page,
        encoding: ImageEncoding::Jpeg,
        bytes,
    })
}
