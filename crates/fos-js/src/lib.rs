//! fOS Script Runtime
//!
//! Execution contexts for visual scripts. Each context owns one script
//! engine, one event loop thread, one Document and its canvas surfaces.
//! Contexts talk to each other only through message ports.
//!
//! Features:
//! - FIFO event loops, one dedicated thread per context
//! - Timers (setTimeout, setInterval) enqueued onto the owning loop
//! - MessagePort / MessageChannel with queue-until-ready delivery
//! - Worker and SharedWorker lifecycles
//! - QuickJS engine via rquickjs (feature `quickjs`)

mod bindings;
mod config;
mod context;
mod engine_trait;
mod env;
mod event_loop;
mod loader;
mod message_port;
#[cfg(feature = "quickjs")]
mod quickjs;
mod timers;
mod worker;

pub use config::RuntimeConfig;
pub use context::{ContextKind, ContextScope, ExecutionContext, Port};
pub use engine_trait::{EngineFactory, EngineOptions, NativeFunction, ScriptEngine};
pub use env::{RuntimeEnv, RuntimeEnvBuilder};
pub use event_loop::{EventLoop, LoopHandle, LoopState, Pending, Task};
pub use loader::{FileLoader, MemoryLoader, ScriptLoader};
pub use message_port::{MessageEvent, MessageHandler, MessagePort, PortId, PortState};
#[cfg(feature = "quickjs")]
pub use quickjs::{QuickJsEngine, QuickJsFactory};
pub use timers::{TimerId, TimerScheduler};
pub use worker::{SharedWorker, SharedWorkerRegistry, Worker};

/// Value crossing the engine boundary
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Objects and arrays, structured-clone approximation
    Json(serde_json::Value),
}

impl JsValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    /// JSON view of any value; undefined maps to null
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            JsValue::Undefined | JsValue::Null => serde_json::Value::Null,
            JsValue::Bool(b) => serde_json::Value::Bool(*b),
            JsValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            JsValue::String(s) => serde_json::Value::String(s.clone()),
            JsValue::Json(v) => v.clone(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => JsValue::Null,
            serde_json::Value::Bool(b) => JsValue::Bool(b),
            serde_json::Value::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => JsValue::String(s),
            other => JsValue::Json(other),
        }
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::String(s.to_string())
    }
}

impl From<String> for JsValue {
    fn from(s: String) -> Self {
        JsValue::String(s)
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::Number(n)
    }
}

impl From<u32> for JsValue {
    fn from(n: u32) -> Self {
        JsValue::Number(n as f64)
    }
}

impl From<u64> for JsValue {
    fn from(n: u64) -> Self {
        JsValue::Number(n as f64)
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Bool(b)
    }
}

/// JavaScript error
#[derive(Debug, thiserror::Error)]
pub enum JsError {
    /// Exception escaping a script or callback
    #[error("JavaScript error: {0}")]
    Runtime(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error(transparent)]
    Dom(#[from] fos_dom::DomError),

    #[error(transparent)]
    Canvas(#[from] fos_canvas::CanvasError),

    #[error("failed to load script {identity}: {reason}")]
    Load { identity: String, reason: String },

    #[error("script engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The target context has been torn down
    #[error("context stopped: {0}")]
    Stopped(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_value_json_view() {
        assert_eq!(JsValue::Undefined.to_json(), serde_json::Value::Null);
        assert_eq!(JsValue::from("ping").to_json(), serde_json::json!("ping"));
        assert_eq!(JsValue::from(2.5).to_json(), serde_json::json!(2.5));
        assert_eq!(JsValue::Number(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_js_value_from_json() {
        assert_eq!(JsValue::from_json(serde_json::json!(true)), JsValue::Bool(true));
        assert_eq!(JsValue::from_json(serde_json::json!(3)), JsValue::Number(3.0));
        assert_eq!(
            JsValue::from_json(serde_json::json!([1, 2])),
            JsValue::Json(serde_json::json!([1, 2]))
        );
        assert!(JsValue::from_json(serde_json::Value::Null).is_nullish());
    }
}
