//! fOS Canvas
//!
//! Pixel surfaces behind canvas-like elements, independent of any script
//! context.
//!
//! Features:
//! - `CanvasSurface` with crop/pad resize semantics
//! - Pluggable `GraphicsBackend` (tiny-skia raster by default)
//! - PNG/JPEG/GIF export and data URLs

mod backend;
mod encode;
mod image_data;
mod surface;

pub use backend::{GraphicsBackend, RasterBackend, SurfaceBuffer};
pub use encode::{EncodedImage, ImageFormat};
pub use image_data::ImageData;
pub use surface::{check_size, CanvasSurface, SharedSurface};

/// Default canvas width when none is given
pub const DEFAULT_WIDTH: u32 = 300;

/// Default canvas height when none is given
pub const DEFAULT_HEIGHT: u32 = 150;

/// Largest accepted width or height, in pixels
pub const MAX_DIMENSION: u32 = 32_767;

/// Largest accepted area, in pixels (256 MiB of RGBA)
pub const MAX_AREA: u64 = 1 << 26;

/// Canvas error
#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("Invalid state: cannot export a {width}x{height} surface")]
    EmptySurface { width: u32, height: u32 },

    #[error("Invalid size: {width}x{height} exceeds the canvas limits")]
    InvalidSize { width: u32, height: u32 },

    #[error("Invalid data length: expected {expected}, got {actual}")]
    InvalidDataLength { expected: usize, actual: usize },

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}
