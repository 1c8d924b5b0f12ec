//! ImageData
//!
//! Straight-alpha RGBA snapshot of a surface region.

use crate::surface::check_size;
use crate::CanvasError;

/// ImageData - raw pixel data, row-major RGBA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageData {
    /// Transparent black ImageData, within the canvas size limits
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        check_size(width, height)?;
        Ok(Self {
            data: vec![0u8; byte_len(width, height)],
            width,
            height,
        })
    }

    /// Wrap existing RGBA bytes
    pub fn from_data(data: Vec<u8>, width: u32, height: u32) -> Result<Self, CanvasError> {
        check_size(width, height)?;
        let expected = byte_len(width, height);
        if data.len() != expected {
            return Err(CanvasError::InvalidDataLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = self.index(x, y);
        let px = self.data.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Set pixel at (x, y); out-of-range writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.data[idx..idx + 4].copy_from_slice(&rgba);
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }
}

/// RGBA byte count of a size already within the limits
fn byte_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}
