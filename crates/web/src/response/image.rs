use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageResult};

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Bitmap format of an image response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Jpeg { quality: u8 },
    Png,
}

impl ImageEncoding {
    /// JPEG at [`DEFAULT_JPEG_QUALITY`].
    pub const fn jpeg() -> Self {
        Self::Jpeg { quality: DEFAULT_JPEG_QUALITY }
    }

    pub const fn png() -> Self {
        Self::Png
    }

    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub(crate) fn encode(&self, image: &DynamicImage) -> ImageResult<Vec<u8>> {
        let mut buf = Vec::new();
        match *self {
            Self::Jpeg { quality } => {
                // jpeg has no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
            }
            Self::Png => image.write_with_encoder(PngEncoder::new(&mut buf))?,
        }
        Ok(buf)
    }
}

impl Default for ImageEncoding {
    fn default() -> Self {
        Self::jpeg()
    }
}
