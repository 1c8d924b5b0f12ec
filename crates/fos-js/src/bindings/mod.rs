//! Host Bindings
//!
//! The script-visible API is a JS prelude layered over a handful of host
//! dispatcher functions (`__fos_console`, `__fos_timer`, `__fos_port`,
//! `__fos_worker`, `__fos_dom`, `__fos_canvas`). Host functions never call
//! back into the engine; anything that must reach script code later is
//! queued as a task and delivered through `__fosDispatch`.

mod canvas;
mod console;
mod dom;
mod ports;
mod timers;
mod workers;

use std::sync::{Arc, Weak};

pub(crate) use canvas::{CanvasElementFactory, CanvasPresentation};

use crate::context::ContextShared;
use crate::engine_trait::ScriptEngine;
use crate::{JsError, JsValue};

const PRELUDE: &str = include_str!("prelude.js");

static UNDEFINED: JsValue = JsValue::Undefined;

/// Install host functions and the prelude into a fresh engine
pub(crate) fn install(engine: &mut dyn ScriptEngine, shared: &Arc<ContextShared>) -> Result<(), JsError> {
    let weak = Arc::downgrade(shared);
    engine.install_value("__fos_kind", JsValue::from(shared.kind.script_name()))?;
    engine.install_function("__fos_console", console::host(&weak))?;
    engine.install_function("__fos_timer", timers::host(&weak))?;
    engine.install_function("__fos_port", ports::host(&weak))?;
    engine.install_function("__fos_worker", workers::host(&weak))?;
    engine.install_function("__fos_dom", dom::host(&weak))?;
    engine.install_function("__fos_canvas", canvas::host(&weak))?;
    engine.eval(PRELUDE, "fos:prelude")?;
    Ok(())
}

fn upgrade(shared: &Weak<ContextShared>) -> Result<Arc<ContextShared>, JsError> {
    shared
        .upgrade()
        .ok_or_else(|| JsError::Stopped("context is gone".into()))
}

/// Positional argument access for host functions
pub(crate) struct Args<'a>(pub(crate) &'a [JsValue]);

impl<'a> Args<'a> {
    fn get(&self, i: usize) -> &'a JsValue {
        self.0.get(i).unwrap_or(&UNDEFINED)
    }

    pub(crate) fn rest(&self, from: usize) -> &'a [JsValue] {
        self.0.get(from..).unwrap_or(&[])
    }

    pub(crate) fn str(&self, i: usize) -> Result<&'a str, JsError> {
        self.get(i)
            .as_str()
            .ok_or_else(|| JsError::TypeError(format!("argument {i} must be a string")))
    }

    /// String argument, numbers and booleans stringified
    pub(crate) fn text(&self, i: usize) -> String {
        match self.get(i) {
            JsValue::String(s) => s.clone(),
            JsValue::Undefined | JsValue::Null => String::new(),
            JsValue::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            JsValue::Number(n) => n.to_string(),
            JsValue::Bool(b) => b.to_string(),
            JsValue::Json(json) => json.to_string(),
        }
    }

    pub(crate) fn f64(&self, i: usize) -> Result<f64, JsError> {
        self.get(i)
            .as_f64()
            .ok_or_else(|| JsError::TypeError(format!("argument {i} must be a number")))
    }

    /// Non-negative integer; fractions truncate, negatives and NaN clamp to 0
    pub(crate) fn u32(&self, i: usize) -> Result<u32, JsError> {
        let n = self.f64(i)?;
        Ok(if n.is_nan() || n <= 0.0 { 0 } else { n.min(u32::MAX as f64) as u32 })
    }

    /// Pixel dimension: NaN, infinite and negative values are rejected,
    /// fractions truncate
    pub(crate) fn size(&self, i: usize) -> Result<u32, JsError> {
        let n = self.f64(i)?;
        if !n.is_finite() || n < 0.0 {
            return Err(JsError::TypeError(format!("argument {i} is not a valid size: {n}")));
        }
        Ok(n.min(u32::MAX as f64) as u32)
    }

    pub(crate) fn opt_u32(&self, i: usize) -> Result<Option<u32>, JsError> {
        if self.get(i).is_nullish() {
            Ok(None)
        } else {
            self.u32(i).map(Some)
        }
    }

    pub(crate) fn bool(&self, i: usize) -> bool {
        match self.get(i) {
            JsValue::Bool(b) => *b,
            JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
            JsValue::String(s) => !s.is_empty(),
            JsValue::Json(_) => true,
            JsValue::Undefined | JsValue::Null => false,
        }
    }

    pub(crate) fn json(&self, i: usize) -> serde_json::Value {
        self.get(i).to_json()
    }
}

pub(crate) fn unknown_op(binding: &str, op: &str) -> JsError {
    JsError::TypeError(format!("{binding}: unknown operation '{op}'"))
}

pub(crate) fn ids_to_js(ids: impl IntoIterator<Item = u32>) -> JsValue {
    JsValue::Json(serde_json::Value::Array(ids.into_iter().map(serde_json::Value::from).collect()))
}

pub(crate) fn opt_id_to_js(id: Option<u32>) -> JsValue {
    id.map(JsValue::from).unwrap_or(JsValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_access() {
        let values = [JsValue::from("op"), JsValue::Number(3.7), JsValue::Null, JsValue::Number(-2.0)];
        let args = Args(&values);
        assert_eq!(args.str(0).unwrap(), "op");
        assert_eq!(args.u32(1).unwrap(), 3);
        assert_eq!(args.opt_u32(2).unwrap(), None);
        assert_eq!(args.u32(3).unwrap(), 0);
        assert!(matches!(args.str(1), Err(JsError::TypeError(_))));
        assert_eq!(args.text(1), "3.7");
        assert!(args.rest(4).is_empty());
        assert!(!args.bool(9));
    }

    #[test]
    fn test_size_rejects_nonsense() {
        let values = [
            JsValue::Number(12.9),
            JsValue::Number(-1.0),
            JsValue::Number(f64::NAN),
            JsValue::Number(f64::INFINITY),
            JsValue::Number(1e12),
        ];
        let args = Args(&values);
        assert_eq!(args.size(0).unwrap(), 12);
        assert!(matches!(args.size(1), Err(JsError::TypeError(_))));
        assert!(matches!(args.size(2), Err(JsError::TypeError(_))));
        assert!(matches!(args.size(3), Err(JsError::TypeError(_))));
        assert_eq!(args.size(4).unwrap(), u32::MAX);
    }

    #[test]
    fn test_id_helpers() {
        assert_eq!(opt_id_to_js(None), JsValue::Null);
        assert_eq!(opt_id_to_js(Some(4)), JsValue::Number(4.0));
        assert_eq!(ids_to_js([1, 2]), JsValue::Json(serde_json::json!([1, 2])));
    }
}
