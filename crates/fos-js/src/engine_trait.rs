//! Script Engine Trait
//!
//! Capability interface between a context and its interpreter. The context
//! never branches on which interpreter is active; it installs host
//! functions, evaluates source and invokes global handlers through this
//! trait only. Engines are thread-affine and live on their loop thread.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::{JsError, JsValue};

/// Callback type for native functions exposed to scripts.
pub type NativeFunction = Arc<dyn Fn(&[JsValue]) -> Result<JsValue, JsError> + Send + Sync>;

/// One interpreter instance bound to one context.
pub trait ScriptEngine {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Set a global value.
    fn install_value(&mut self, name: &str, value: JsValue) -> Result<(), JsError>;

    /// Register a native function as a global.
    fn install_function(&mut self, name: &str, func: NativeFunction) -> Result<(), JsError>;

    /// Evaluate source in global scope. `origin` names the source in errors.
    fn eval(&mut self, source: &str, origin: &str) -> Result<JsValue, JsError>;

    /// Call the global function `name` with one argument.
    fn invoke(&mut self, name: &str, arg: JsValue) -> Result<JsValue, JsError>;

    /// Run queued microtasks (promise reactions).
    fn run_pending_jobs(&mut self) -> Result<(), JsError>;

    /// Release interpreter resources; later calls fail.
    fn close(&mut self);
}

/// Settings for a new engine instance
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub context_name: String,
    /// Heap limit in bytes
    pub memory_limit: usize,
    /// Raised by `terminate()`; a running script aborts at its next check
    pub interrupt: Arc<AtomicBool>,
}

impl EngineOptions {
    pub fn new(context_name: impl Into<String>, memory_limit: usize) -> Self {
        Self {
            context_name: context_name.into(),
            memory_limit,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Creates engines for new contexts, called on the context's own thread.
pub trait EngineFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self, options: &EngineOptions) -> Result<Box<dyn ScriptEngine>, JsError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_engine_options_fresh_interrupt() {
        let a = EngineOptions::new("main", 1024);
        let b = a.clone();
        let c = EngineOptions::new("other", 1024);
        a.interrupt.store(true, Ordering::SeqCst);
        assert!(b.interrupt.load(Ordering::SeqCst));
        assert!(!c.interrupt.load(Ordering::SeqCst));
        assert_eq!(a.memory_limit, 1024);
    }

    #[test]
    fn test_native_function_signature() {
        let sum: NativeFunction = Arc::new(|args| {
            let total: f64 = args.iter().filter_map(JsValue::as_f64).sum();
            Ok(JsValue::Number(total))
        });
        let result = sum(&[JsValue::Number(1.0), JsValue::Number(2.0)]).unwrap();
        assert_eq!(result, JsValue::Number(3.0));
    }
}
