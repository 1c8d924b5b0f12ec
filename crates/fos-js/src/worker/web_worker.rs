//! Dedicated Worker
//!
//! A background context plus one entangled port pair: the outer end stays
//! with the creator, the inner end is the worker's inbound channel
//! (`self.onmessage` / `postMessage` inside the worker).

use std::sync::Arc;

use crate::context::{ContextKind, ContextScope, ExecutionContext, Port, PARENT_PORT};
use crate::env::RuntimeEnv;
use crate::message_port::MessageEvent;
use crate::JsError;

/// Handle to a dedicated worker. Clones share the worker; dropping the
/// last one terminates it.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    identity: String,
    context: ExecutionContext,
    port: Port,
}

impl Worker {
    /// Start a worker context and load `identity` into it
    pub fn spawn(env: &Arc<RuntimeEnv>, identity: &str) -> Result<Self, JsError> {
        let kind = ContextKind::Worker {
            identity: identity.to_string(),
        };
        let context = ExecutionContext::new(env, kind)?;

        let (outer, inner) = Port::pair();
        inner.set_owner(context.handle());
        inner.set_on_message(|scope: &mut ContextScope, event: MessageEvent| {
            scope.dispatch_message(PARENT_PORT, event.data);
        });
        context.set_parent_port(inner.clone());

        // Queued ahead of any drain, so early messages see a loaded script
        let script = identity.to_string();
        context.handle().queue_task(move |scope| {
            if let Err(err) = scope.load_script(&script) {
                tracing::error!(context = %scope.name(), identity = %script, "worker script failed to load: {err}");
            }
        });
        inner.start();

        tracing::debug!(context = %context.name(), identity, "worker spawned");
        Ok(Self {
            inner: Arc::new(WorkerInner {
                identity: identity.to_string(),
                context,
                port: outer,
            }),
        })
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.inner.context
    }

    /// Creator-side port
    pub fn port(&self) -> &Port {
        &self.inner.port
    }

    pub fn post_message(&self, data: serde_json::Value) -> bool {
        self.inner.port.post_message(data)
    }

    /// Stop the worker without waiting for its script
    pub fn terminate(&self) {
        self.inner.context.terminate();
        self.inner.port.close();
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.context.is_terminated()
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("identity", &self.inner.identity)
            .field("context", &self.inner.context.name())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(all(test, feature = "quickjs"))]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn env() -> Arc<RuntimeEnv> {
        RuntimeEnv::builder()
            .loader(
                MemoryLoader::new()
                    .with_script("echo.js", "onmessage = e => postMessage(e.data);")
                    .with_script("broken.js", "this is not javascript"),
            )
            .build()
            .unwrap()
    }

    fn observe(port: &Port, host: &ExecutionContext) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        port.set_owner(host.handle());
        port.set_on_message(move |_scope: &mut ContextScope, event: MessageEvent| {
            let _ = tx.lock().send(event.data);
        });
        port.start();
        rx
    }

    #[test]
    fn test_echo_worker() {
        let env = env();
        let host = env.main_context().unwrap();
        let worker = Worker::spawn(&env, "echo.js").unwrap();
        let replies = observe(worker.port(), &host);

        assert!(worker.post_message(json!("ping")));
        assert_eq!(replies.recv_timeout(WAIT).unwrap(), json!("ping"));
        assert_eq!(worker.identity(), "echo.js");
    }

    #[test]
    fn test_failed_load_is_silent() {
        let env = env();
        let host = env.main_context().unwrap();
        let worker = Worker::spawn(&env, "broken.js").unwrap();
        let replies = observe(worker.port(), &host);

        assert!(worker.post_message(json!("hello?")));
        assert!(worker.context().flush(WAIT));
        assert!(replies.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(!worker.is_terminated());
        let failed = worker.context().run(|scope| scope.load_failed()).wait_timeout(WAIT).unwrap();
        assert!(failed);
    }

    #[test]
    fn test_terminate_closes_channel() {
        let env = env();
        let worker = Worker::spawn(&env, "echo.js").unwrap();
        worker.terminate();
        assert!(worker.is_terminated());
        assert!(!worker.post_message(json!(1)));
    }
}
