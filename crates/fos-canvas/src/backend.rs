//! Graphics backend
//!
//! The surface only needs buffer creation, pixel read/write and solid fills
//! from a backend. The default raster backend stores a tiny-skia `Pixmap`
//! (premultiplied) and speaks straight-alpha RGBA at this interface.

use tiny_skia::{BlendMode, ColorU8, Paint, Pixmap, PixmapPaint, Rect, Transform};

use crate::surface::check_size;
use crate::CanvasError;

/// Pixel storage created by a [`GraphicsBackend`]
pub trait SurfaceBuffer: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Straight-alpha RGBA for a region; pixels outside the buffer read as
    /// transparent black. Always returns `width * height * 4` bytes.
    fn read_rgba(&self, x: u32, y: u32, width: u32, height: u32) -> Vec<u8>;

    /// Write straight-alpha RGBA into a region, clipped to the buffer
    fn write_rgba(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: &[u8]);

    /// Source-over composite of straight-alpha RGBA at (x, y)
    fn draw_rgba(&mut self, x: i32, y: i32, width: u32, height: u32, rgba: &[u8]);

    /// Source-over fill of a rectangle with a solid colour
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: [u8; 4]);

    /// Reset a rectangle to transparent black
    fn clear_rect(&mut self, x: f32, y: f32, width: f32, height: f32);

    /// Backend-native pixel storage
    fn raw_bytes(&self) -> &[u8];
}

/// Creates pixel buffers for canvas surfaces
pub trait GraphicsBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Allocate a transparent buffer. Sizes beyond the canvas limits are
    /// rejected before any allocation.
    fn create_buffer(&self, width: u32, height: u32) -> Result<Box<dyn SurfaceBuffer>, CanvasError>;
}

/// CPU raster backend on tiny-skia
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterBackend;

impl GraphicsBackend for RasterBackend {
    fn name(&self) -> &str {
        "tiny-skia"
    }

    fn create_buffer(&self, width: u32, height: u32) -> Result<Box<dyn SurfaceBuffer>, CanvasError> {
        check_size(width, height)?;
        // tiny-skia refuses zero-area pixmaps
        let pixmap = if width == 0 || height == 0 {
            None
        } else {
            Some(Pixmap::new(width, height).ok_or(CanvasError::InvalidSize { width, height })?)
        };
        Ok(Box::new(PixmapBuffer { width, height, pixmap }))
    }
}

struct PixmapBuffer {
    width: u32,
    height: u32,
    pixmap: Option<Pixmap>,
}

impl PixmapBuffer {
    fn paint_rect(&mut self, x: f32, y: f32, width: f32, height: f32, paint: &Paint) {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        if let Some(rect) = Rect::from_xywh(x, y, width, height) {
            pixmap.fill_rect(rect, paint, Transform::identity(), None);
        }
    }
}

impl SurfaceBuffer for PixmapBuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn read_rgba(&self, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
        let (width, height) = (width as usize, height as usize);
        let mut out = vec![0u8; width * height * 4];
        let Some(pixmap) = &self.pixmap else {
            return out;
        };
        let (x, y) = (x as usize, y as usize);
        let (buf_width, buf_height) = (self.width as usize, self.height as usize);
        let pixels = pixmap.pixels();
        for dy in 0..height {
            let sy = y + dy;
            if sy >= buf_height {
                break;
            }
            for dx in 0..width {
                let sx = x + dx;
                if sx >= buf_width {
                    break;
                }
                let color = pixels[sy * buf_width + sx].demultiply();
                let o = (dy * width + dx) * 4;
                out[o..o + 4].copy_from_slice(&[
                    color.red(),
                    color.green(),
                    color.blue(),
                    color.alpha(),
                ]);
            }
        }
        out
    }

    fn write_rgba(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: &[u8]) {
        let (buf_width, buf_height) = (self.width as usize, self.height as usize);
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        let (x, y, width, height) = (x as usize, y as usize, width as usize, height as usize);
        let pixels = pixmap.pixels_mut();
        for dy in 0..height {
            let ty = y + dy;
            if ty >= buf_height {
                break;
            }
            for dx in 0..width {
                let tx = x + dx;
                if tx >= buf_width {
                    break;
                }
                let i = (dy * width + dx) * 4;
                let Some(px) = rgba.get(i..i + 4) else {
                    return;
                };
                pixels[ty * buf_width + tx] = ColorU8::from_rgba(px[0], px[1], px[2], px[3]).premultiply();
            }
        }
    }

    fn draw_rgba(&mut self, x: i32, y: i32, width: u32, height: u32, rgba: &[u8]) {
        let Some(target) = self.pixmap.as_mut() else {
            return;
        };
        let Some(mut source) = Pixmap::new(width, height) else {
            return;
        };
        for (pixel, px) in source.pixels_mut().iter_mut().zip(rgba.chunks_exact(4)) {
            *pixel = ColorU8::from_rgba(px[0], px[1], px[2], px[3]).premultiply();
        }
        target.draw_pixmap(x, y, source.as_ref(), &PixmapPaint::default(), Transform::identity(), None);
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: [u8; 4]) {
        let mut paint = Paint::default();
        paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
        paint.anti_alias = false;
        self.paint_rect(x, y, width, height, &paint);
    }

    fn clear_rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let mut paint = Paint::default();
        paint.blend_mode = BlendMode::Clear;
        paint.anti_alias = false;
        self.paint_rect(x, y, width, height, &paint);
    }

    fn raw_bytes(&self) -> &[u8] {
        self.pixmap.as_ref().map(|p| p.data()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_read() {
        let mut buf = RasterBackend.create_buffer(4, 4).unwrap();
        buf.fill_rect(1.0, 1.0, 2.0, 2.0, [255, 0, 0, 255]);
        assert_eq!(buf.read_rgba(1, 1, 1, 1), vec![255, 0, 0, 255]);
        assert_eq!(buf.read_rgba(0, 0, 1, 1), vec![0, 0, 0, 0]);
        assert_eq!(buf.raw_bytes().len(), 4 * 4 * 4);
    }

    #[test]
    fn test_read_outside_is_transparent() {
        let buf = RasterBackend.create_buffer(2, 2).unwrap();
        let region = buf.read_rgba(1, 1, 3, 3);
        assert_eq!(region.len(), 3 * 3 * 4);
        assert!(region.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_clips() {
        let mut buf = RasterBackend.create_buffer(2, 2).unwrap();
        let opaque: Vec<u8> = [9, 9, 9, 255].repeat(4);
        buf.write_rgba(1, 1, 2, 2, &opaque);
        assert_eq!(buf.read_rgba(1, 1, 1, 1), vec![9, 9, 9, 255]);
        assert_eq!(buf.read_rgba(0, 0, 1, 1), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_clear_rect() {
        let mut buf = RasterBackend.create_buffer(2, 2).unwrap();
        buf.fill_rect(0.0, 0.0, 2.0, 2.0, [0, 0, 255, 255]);
        buf.clear_rect(0.0, 0.0, 1.0, 1.0);
        assert_eq!(buf.read_rgba(0, 0, 1, 1), vec![0, 0, 0, 0]);
        assert_eq!(buf.read_rgba(1, 1, 1, 1), vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_zero_area_buffer() {
        let mut buf = RasterBackend.create_buffer(0, 10).unwrap();
        buf.fill_rect(0.0, 0.0, 5.0, 5.0, [1, 2, 3, 4]);
        assert!(buf.raw_bytes().is_empty());
        assert_eq!(buf.width(), 0);
        assert_eq!(buf.height(), 10);
    }

    #[test]
    fn test_oversized_buffer_rejected() {
        assert!(matches!(
            RasterBackend.create_buffer(100_000, 100_000),
            Err(CanvasError::InvalidSize { width: 100_000, height: 100_000 })
        ));
        assert!(RasterBackend.create_buffer(crate::MAX_DIMENSION, 1).is_ok());
    }

    #[test]
    fn test_draw_blends_over() {
        let mut buf = RasterBackend.create_buffer(3, 1).unwrap();
        buf.fill_rect(0.0, 0.0, 3.0, 1.0, [0, 0, 255, 255]);
        let mut patch = [255, 0, 0, 255].repeat(2);
        patch[4..8].copy_from_slice(&[0, 0, 0, 0]);
        buf.draw_rgba(1, 0, 2, 1, &patch);
        assert_eq!(buf.read_rgba(0, 0, 3, 1), [[0, 0, 255, 255], [255, 0, 0, 255], [0, 0, 255, 255]].concat());
        // Off-canvas origins clip
        buf.draw_rgba(-1, 0, 2, 1, &[255, 255, 255, 255].repeat(2));
        assert_eq!(buf.read_rgba(0, 0, 1, 1), vec![255, 255, 255, 255]);
    }
}
