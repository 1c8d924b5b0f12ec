//! Console API
//!
//! `console.log/info/warn/error/debug` routed to tracing with a `[JS]`
//! prefix.

use std::fmt::Write;
use std::sync::Weak;

use super::{upgrade, Args};
use crate::context::ContextShared;
use crate::engine_trait::NativeFunction;
use crate::JsValue;

/// `__fos_console(level, ...values)`
pub(super) fn host(shared: &Weak<ContextShared>) -> NativeFunction {
    let shared = shared.clone();
    std::sync::Arc::new(move |args| {
        let shared = upgrade(&shared)?;
        let args = Args(args);
        let level = args.str(0)?;
        log_with_level(&shared.name, level, args.rest(1));
        Ok(JsValue::Undefined)
    })
}

fn log_with_level(context: &str, level: &str, values: &[JsValue]) {
    let mut output = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        format_value(&mut output, value);
    }

    match level {
        "error" => tracing::error!(context, "[JS] {}", output),
        "warn" => tracing::warn!(context, "[JS] {}", output),
        "debug" => tracing::debug!(context, "[JS] {}", output),
        _ => tracing::info!(context, "[JS] {}", output),
    }
}

/// Format a script value for logging
fn format_value(out: &mut String, value: &JsValue) {
    match value {
        JsValue::Undefined => out.push_str("undefined"),
        JsValue::Null => out.push_str("null"),
        JsValue::Bool(b) => {
            write!(out, "{b}").ok();
        }
        JsValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
            write!(out, "{}", *n as i64).ok();
        }
        JsValue::Number(n) => {
            write!(out, "{n}").ok();
        }
        JsValue::String(s) => out.push_str(s),
        JsValue::Json(json) => {
            write!(out, "{json}").ok();
        }
    }
}
