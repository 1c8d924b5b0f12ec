//! Canvas bindings
//!
//! Canvas elements get a surface through the document's element factory;
//! `OffscreenCanvas` creates one directly. Scripts address both by surface
//! id.

use std::sync::{Arc, Weak};

use fos_canvas::{CanvasSurface, GraphicsBackend, ImageData, SharedSurface};
use fos_dom::{ElementFactory, Presentation};

use serde_json::json;

use super::{ids_to_js, unknown_op, upgrade, Args};
use crate::context::{ContextShared, HandleTable};
use crate::engine_trait::NativeFunction;
use crate::{JsError, JsValue};

/// Presentation state of a `<canvas>` element
pub(crate) struct CanvasPresentation {
    pub(crate) surface_id: u32,
    pub(crate) surface: SharedSurface,
}

/// Gives every `<canvas>` a surface registered with its context
pub(crate) struct CanvasElementFactory {
    graphics: Arc<dyn GraphicsBackend>,
    surfaces: Arc<HandleTable<SharedSurface>>,
    default: (u32, u32),
}

impl CanvasElementFactory {
    pub(crate) fn new(
        graphics: Arc<dyn GraphicsBackend>,
        surfaces: Arc<HandleTable<SharedSurface>>,
        default: (u32, u32),
    ) -> Self {
        Self { graphics, surfaces, default }
    }
}

impl ElementFactory for CanvasElementFactory {
    fn presentation_for(&self, tag: &str) -> Option<Presentation> {
        if tag != "canvas" {
            return None;
        }
        let (width, height) = self.default;
        let surface = match CanvasSurface::new(Arc::clone(&self.graphics), width, height) {
            Ok(surface) => surface.into_shared(),
            Err(err) => {
                tracing::warn!(width, height, "canvas element without surface: {err}");
                return None;
            }
        };
        let surface_id = self.surfaces.insert(Arc::clone(&surface));
        tracing::trace!(surface = surface_id, width, height, "canvas element surface");
        Some(Box::new(CanvasPresentation { surface_id, surface }))
    }
}

/// `__fos_canvas(op, ...)`: surface ops take the surface id first, bitmap
/// ops the bitmap id
pub(super) fn host(shared: &Weak<ContextShared>) -> NativeFunction {
    let shared = shared.clone();
    Arc::new(move |args| {
        let shared = upgrade(&shared)?;
        call(&shared, &Args(args))
    })
}

fn call(shared: &ContextShared, args: &Args<'_>) -> Result<JsValue, JsError> {
    match args.str(0)? {
        "create" => {
            let (width, height) = (args.size(1)?, args.size(2)?);
            let graphics = match shared.env.upgrade() {
                Some(env) => Arc::clone(env.graphics()),
                None => return Err(JsError::Stopped(shared.name.clone())),
            };
            let surface = CanvasSurface::new(graphics, width, height)?.into_shared();
            Ok(shared.surfaces.insert(surface).into())
        }
        "bitmapFromData" => {
            let (width, height) = (args.size(1)?, args.size(2)?);
            let data = ImageData::from_data(bytes(args, 3)?, width, height)?;
            Ok(insert_bitmap(shared, data))
        }
        "bitmapCopy" => {
            let data = bitmap(shared, args.u32(1)?)?;
            Ok(insert_bitmap(shared, ImageData::clone(&data)))
        }
        "closeBitmap" => Ok(shared.bitmaps.remove(args.u32(1)?).is_some().into()),
        op => surface_op(shared, op, args),
    }
}

fn surface_op(shared: &ContextShared, op: &str, args: &Args<'_>) -> Result<JsValue, JsError> {
    let id = args.u32(1)?;
    let surface = surface_by_id(shared, id)?;

    match op {
        "size" => {
            let surface = surface.lock();
            Ok(ids_to_js([surface.width(), surface.height()]))
        }
        "setWidth" => {
            surface.lock().set_width(args.size(2)?)?;
            Ok(JsValue::Undefined)
        }
        "setHeight" => {
            surface.lock().set_height(args.size(2)?)?;
            Ok(JsValue::Undefined)
        }
        "fill" => {
            let [x, y, w, h] = rect(args, 2)?;
            let rgba = [args.u32(6)?, args.u32(7)?, args.u32(8)?, args.u32(9)?].map(|c| c.min(255) as u8);
            surface.lock().fill_rect(x, y, w, h, rgba);
            Ok(JsValue::Undefined)
        }
        "clear" => {
            let [x, y, w, h] = rect(args, 2)?;
            surface.lock().clear_rect(x, y, w, h);
            Ok(JsValue::Undefined)
        }
        "read" => {
            let (x, y) = (args.u32(2)?, args.u32(3)?);
            let (w, h) = (args.size(4)?, args.size(5)?);
            let data = surface.lock().image_data(x, y, w, h)?;
            Ok(ids_to_js(data.into_data().into_iter().map(u32::from)))
        }
        "put" => {
            let (x, y) = (args.u32(2)?, args.u32(3)?);
            let (w, h) = (args.size(4)?, args.size(5)?);
            let data = ImageData::from_data(bytes(args, 6)?, w, h)?;
            surface.lock().put_image_data(&data, x, y);
            Ok(JsValue::Undefined)
        }
        "draw" => {
            let source = match args.str(2)? {
                "bitmap" => bitmap(shared, args.u32(3)?)?,
                // Snapshot first; the source may be the target itself
                "surface" => Arc::new(surface_by_id(shared, args.u32(3)?)?.lock().snapshot()?),
                other => return Err(JsError::TypeError(format!("cannot draw a {other}"))),
            };
            let (dx, dy) = (args.f64(4)?, args.f64(5)?);
            if dx.is_finite() && dy.is_finite() {
                surface.lock().draw_image(&source, dx as i32, dy as i32);
            }
            Ok(JsValue::Undefined)
        }
        "dataUrl" => {
            let mime = args.text(2);
            Ok(surface.lock().to_data_url(&mime)?.into())
        }
        "blob" => {
            let blob = encode_blob(&surface.lock(), &args.text(2))?;
            Ok(JsValue::Json(blob))
        }
        "blobAsync" => {
            let callback = args.u32(3)?;
            let blob = encode_blob(&surface.lock(), &args.text(2))?;
            shared
                .handle
                .queue_task(move |scope| scope.resolve_callback(callback, blob));
            Ok(JsValue::Undefined)
        }
        "bitmap" => {
            let data = {
                let mut surface = surface.lock();
                let data = surface.snapshot()?;
                // Transfer leaves the canvas blank at the same size
                if args.bool(2) {
                    surface.clear();
                }
                data
            };
            Ok(insert_bitmap(shared, data))
        }
        op => Err(unknown_op("canvas", op)),
    }
}

fn surface_by_id(shared: &ContextShared, id: u32) -> Result<SharedSurface, JsError> {
    shared
        .surfaces
        .get(id)
        .ok_or_else(|| JsError::TypeError(format!("unknown canvas surface {id}")))
}

fn bitmap(shared: &ContextShared, id: u32) -> Result<Arc<ImageData>, JsError> {
    shared
        .bitmaps
        .get(id)
        .ok_or_else(|| JsError::TypeError(format!("image bitmap {id} is closed")))
}

/// Register a bitmap; scripts get `[id, width, height]`
fn insert_bitmap(shared: &ContextShared, data: ImageData) -> JsValue {
    let (width, height) = (data.width(), data.height());
    let id = shared.bitmaps.insert(Arc::new(data));
    ids_to_js([id, width, height])
}

/// Encoded surface as `{ type, bytes }`
fn encode_blob(surface: &CanvasSurface, mime: &str) -> Result<serde_json::Value, JsError> {
    let image = surface.to_encoded_image(mime)?;
    Ok(json!({ "type": image.mime_type(), "bytes": image.bytes }))
}

fn bytes(args: &Args<'_>, i: usize) -> Result<Vec<u8>, JsError> {
    match args.json(i) {
        serde_json::Value::Array(values) => Ok(values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0).clamp(0.0, 255.0) as u8)
            .collect()),
        _ => Err(JsError::TypeError("expected an array of pixel bytes".into())),
    }
}

fn rect(args: &Args<'_>, from: usize) -> Result<[f32; 4], JsError> {
    Ok([
        args.f64(from)? as f32,
        args.f64(from + 1)? as f32,
        args.f64(from + 2)? as f32,
        args.f64(from + 3)? as f32,
    ])
}
