//! Image encoder for surface export
//!
//! Supports PNG, JPEG and GIF via the image crate. Unknown MIME types fall
//! back to PNG instead of failing.

use std::io::Cursor;

use base64::Engine as _;
use image::{DynamicImage, ImageFormat as ImgFormat, RgbaImage};

use crate::CanvasError;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    /// Exact MIME match, `None` for unsupported types
    pub fn parse_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" | "image/x-png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// MIME lookup with PNG fallback
    pub fn from_mime(mime: &str) -> Self {
        Self::parse_mime(mime).unwrap_or_else(|| {
            tracing::debug!(mime, "unsupported export format, using image/png");
            Self::Png
        })
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
        }
    }

    fn to_image_format(self) -> ImgFormat {
        match self {
            Self::Png => ImgFormat::Png,
            Self::Jpeg => ImgFormat::Jpeg,
            Self::Gif => ImgFormat::Gif,
        }
    }
}

/// An encoded surface snapshot
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    /// Encode straight-alpha RGBA pixels
    pub fn encode(
        rgba: Vec<u8>,
        width: u32,
        height: u32,
        format: ImageFormat,
    ) -> Result<Self, CanvasError> {
        if width == 0 || height == 0 {
            return Err(CanvasError::EmptySurface { width, height });
        }
        let expected = (width as usize) * (height as usize) * 4;
        let actual = rgba.len();
        let buffer = RgbaImage::from_raw(width, height, rgba)
            .ok_or(CanvasError::InvalidDataLength { expected, actual })?;

        // JPEG has no alpha channel
        let image = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(buffer).to_rgb8()),
            ImageFormat::Png | ImageFormat::Gif => DynamicImage::ImageRgba8(buffer),
        };

        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format.to_image_format())?;
        tracing::trace!(width, height, format = format.mime_type(), size = bytes.len(), "encoded surface");

        Ok(Self {
            format,
            width,
            height,
            bytes,
        })
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// `data:` URL carrying the format actually produced
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}
