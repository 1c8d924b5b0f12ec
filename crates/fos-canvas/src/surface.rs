//! Canvas surface
//!
//! Mutable pixel buffer behind a canvas-like element. A surface is mutated
//! by one context at a time; other threads read it through
//! [`SharedSurface`] once the producer has handed it off.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GraphicsBackend, RasterBackend, SurfaceBuffer};
use crate::encode::{EncodedImage, ImageFormat};
use crate::image_data::ImageData;
use crate::{CanvasError, MAX_AREA, MAX_DIMENSION};

/// Surface handle shared across contexts
pub type SharedSurface = Arc<Mutex<CanvasSurface>>;

/// Reject sizes beyond [`MAX_DIMENSION`] per side or [`MAX_AREA`] in total.
/// Zero-area sizes are valid.
pub fn check_size(width: u32, height: u32) -> Result<(), CanvasError> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION || u64::from(width) * u64::from(height) > MAX_AREA {
        return Err(CanvasError::InvalidSize { width, height });
    }
    Ok(())
}

/// Pixel buffer with canvas resize semantics
pub struct CanvasSurface {
    backend: Arc<dyn GraphicsBackend>,
    buffer: Box<dyn SurfaceBuffer>,
}

impl CanvasSurface {
    pub fn new(backend: Arc<dyn GraphicsBackend>, width: u32, height: u32) -> Result<Self, CanvasError> {
        let buffer = backend.create_buffer(width, height)?;
        Ok(Self { backend, buffer })
    }

    /// Surface on the default tiny-skia raster backend
    pub fn raster(width: u32, height: u32) -> Result<Self, CanvasError> {
        Self::new(Arc::new(RasterBackend), width, height)
    }

    pub fn into_shared(self) -> SharedSurface {
        Arc::new(Mutex::new(self))
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Reallocate, keeping old content at the origin. Growth pads with
    /// transparent black, shrinking crops. A rejected size leaves the
    /// surface untouched.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), CanvasError> {
        let mut buffer = self.backend.create_buffer(width, height)?;
        let keep_w = width.min(self.width());
        let keep_h = height.min(self.height());
        let kept = self.buffer.read_rgba(0, 0, keep_w, keep_h);
        buffer.write_rgba(0, 0, keep_w, keep_h, &kept);
        tracing::trace!(
            from_w = self.width(),
            from_h = self.height(),
            to_w = width,
            to_h = height,
            "resized surface"
        );
        self.buffer = buffer;
        Ok(())
    }

    /// Resize only when the width actually changes
    pub fn set_width(&mut self, width: u32) -> Result<(), CanvasError> {
        if width == self.width() {
            return Ok(());
        }
        self.resize(width, self.height())
    }

    /// Resize only when the height actually changes
    pub fn set_height(&mut self, height: u32) -> Result<(), CanvasError> {
        if height == self.height() {
            return Ok(());
        }
        self.resize(self.width(), height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let px = self.buffer.read_rgba(x, y, 1, 1);
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        self.buffer.write_rgba(x, y, 1, 1, &rgba);
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, rgba: [u8; 4]) {
        self.buffer.fill_rect(x, y, width, height, rgba);
    }

    pub fn clear_rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.buffer.clear_rect(x, y, width, height);
    }

    /// Snapshot a region; pixels outside the surface are transparent. The
    /// region obeys the same limits as a surface.
    pub fn image_data(&self, x: u32, y: u32, width: u32, height: u32) -> Result<ImageData, CanvasError> {
        check_size(width, height)?;
        ImageData::from_data(self.buffer.read_rgba(x, y, width, height), width, height)
    }

    /// Copy of the whole surface
    pub fn snapshot(&self) -> Result<ImageData, CanvasError> {
        self.image_data(0, 0, self.width(), self.height())
    }

    /// Reset every pixel to transparent black
    pub fn clear(&mut self) {
        let (width, height) = (self.width() as f32, self.height() as f32);
        self.buffer.clear_rect(0.0, 0.0, width, height);
    }

    /// Write an ImageData at (x, y), clipped to the surface
    pub fn put_image_data(&mut self, data: &ImageData, x: u32, y: u32) {
        self.buffer
            .write_rgba(x, y, data.width(), data.height(), data.data());
    }

    /// Composite an ImageData source-over at (x, y); unlike
    /// [`put_image_data`](Self::put_image_data) transparent source pixels
    /// keep what is underneath
    pub fn draw_image(&mut self, data: &ImageData, x: i32, y: i32) {
        self.buffer
            .draw_rgba(x, y, data.width(), data.height(), data.data());
    }

    /// Backend-native pixel bytes, by reference
    pub fn data(&self) -> &[u8] {
        self.buffer.raw_bytes()
    }

    /// Encode the whole surface; unknown MIME types produce PNG
    pub fn to_encoded_image(&self, mime: &str) -> Result<EncodedImage, CanvasError> {
        let format = ImageFormat::from_mime(mime);
        let (width, height) = (self.width(), self.height());
        if width == 0 || height == 0 {
            return Err(CanvasError::EmptySurface { width, height });
        }
        EncodedImage::encode(self.buffer.read_rgba(0, 0, width, height), width, height, format)
    }

    pub fn to_data_url(&self, mime: &str) -> Result<String, CanvasError> {
        Ok(self.to_encoded_image(mime)?.to_data_url())
    }
}

impl std::fmt::Debug for CanvasSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasSurface")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("backend", &self.backend.name())
            .finish()
    }
}
