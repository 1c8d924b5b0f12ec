//! Surface export and resize tests for fos-canvas

use std::io::Cursor;
use std::thread;

use fos_canvas::*;

// ============================================================================
// RESIZE
// ============================================================================

#[test]
fn test_resize_preserves_overlap_region() {
    let mut surface = CanvasSurface::raster(100, 50).unwrap();
    for y in 0..50 {
        for x in 0..100 {
            surface.set_pixel(x, y, [(x * 2) as u8, (y * 5) as u8, 7, 255]);
        }
    }
    let before = surface.image_data(0, 0, 50, 50).unwrap();

    surface.resize(50, 50).unwrap();
    assert_eq!(surface.image_data(0, 0, 50, 50).unwrap(), before);
}

#[test]
fn test_default_dimensions() {
    let surface = CanvasSurface::raster(DEFAULT_WIDTH, DEFAULT_HEIGHT).unwrap();
    assert_eq!((surface.width(), surface.height()), (300, 150));
    assert_eq!(surface.backend_name(), "tiny-skia");
}

// ============================================================================
// LIMITS
// ============================================================================

#[test]
fn test_oversized_sizes_are_errors() {
    assert!(matches!(
        CanvasSurface::raster(100_000, 100_000),
        Err(CanvasError::InvalidSize { width: 100_000, height: 100_000 })
    ));

    let mut surface = CanvasSurface::raster(10, 10).unwrap();
    assert!(surface.resize(100_000, 100_000).is_err());
    assert!(surface.set_height(MAX_DIMENSION + 1).is_err());
    assert!(surface.image_data(0, 0, 70_000, 70_000).is_err());
    assert_eq!((surface.width(), surface.height()), (10, 10));
}

#[test]
fn test_largest_side_accepted() {
    let mut surface = CanvasSurface::raster(1, 1).unwrap();
    surface.resize(MAX_DIMENSION, 2).unwrap();
    assert_eq!(surface.width(), MAX_DIMENSION);
    assert_eq!(surface.pixel(MAX_DIMENSION - 1, 1), Some([0, 0, 0, 0]));
}

#[test]
fn test_zero_width_is_a_valid_size() {
    let mut surface = CanvasSurface::raster(4, 4).unwrap();
    surface.set_width(0).unwrap();
    assert_eq!((surface.width(), surface.height()), (0, 4));
    assert_eq!(surface.pixel(0, 0), None);
    assert!(matches!(
        surface.to_encoded_image("image/png"),
        Err(CanvasError::EmptySurface { .. })
    ));
}

// ============================================================================
// EXPORT
// ============================================================================

#[test]
fn test_png_export_decodes_to_same_pixels() {
    let mut surface = CanvasSurface::raster(8, 4).unwrap();
    surface.fill_rect(0.0, 0.0, 4.0, 4.0, [255, 0, 0, 255]);
    surface.fill_rect(4.0, 0.0, 4.0, 4.0, [0, 0, 255, 255]);

    let image = surface.to_encoded_image("image/png").unwrap();
    assert_eq!((image.width, image.height), (8, 4));

    let decoder = png::Decoder::new(Cursor::new(image.bytes));
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).unwrap();
    assert_eq!((info.width, info.height), (8, 4));
    assert_eq!(info.color_type, png::ColorType::Rgba);
    assert_eq!(&buf[0..4], &[255, 0, 0, 255]);
    let right = (4 * 4) as usize;
    assert_eq!(&buf[right..right + 4], &[0, 0, 255, 255]);
}

#[test]
fn test_jpeg_and_gif_export() {
    let surface = CanvasSurface::raster(16, 16).unwrap();
    assert_eq!(surface.to_encoded_image("image/jpeg").unwrap().format, ImageFormat::Jpeg);
    assert_eq!(surface.to_encoded_image("image/gif").unwrap().format, ImageFormat::Gif);
}

// ============================================================================
// HAND-OFF
// ============================================================================

#[test]
fn test_surface_painted_on_other_thread() {
    let shared = CanvasSurface::raster(10, 10).unwrap().into_shared();
    let producer = {
        let shared = shared.clone();
        thread::spawn(move || {
            shared.lock().fill_rect(0.0, 0.0, 10.0, 10.0, [1, 2, 3, 255]);
        })
    };
    producer.join().unwrap();
    assert_eq!(shared.lock().pixel(9, 9), Some([1, 2, 3, 255]));
}
