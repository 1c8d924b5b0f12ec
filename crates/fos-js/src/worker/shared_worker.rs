//! Shared Worker
//!
//! One worker context per script identity, connectable by any number of
//! callers. Every connection gets its own entangled port pair; the worker
//! side is handed to the script's `onconnect` once the script has loaded,
//! in connection order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::{ContextKind, ContextShared, ExecutionContext, Port};
use crate::env::RuntimeEnv;
use crate::JsError;

#[derive(Default)]
struct Connections {
    loaded: bool,
    failed: bool,
    /// Worker-side ports waiting for the script to load
    pending: Vec<Port>,
    /// Worker-side ports of open connections
    live: Vec<Port>,
}

/// A running shared worker
pub struct SharedWorker {
    identity: String,
    context: ExecutionContext,
    connections: Mutex<Connections>,
}

impl SharedWorker {
    fn spawn(env: &Arc<RuntimeEnv>, identity: &str) -> Result<Arc<Self>, JsError> {
        let kind = ContextKind::SharedWorker {
            identity: identity.to_string(),
        };
        let worker = Arc::new(Self {
            identity: identity.to_string(),
            context: ExecutionContext::new(env, kind)?,
            connections: Mutex::new(Connections::default()),
        });

        let weak = Arc::downgrade(&worker);
        let script = identity.to_string();
        worker.context.handle().queue_task(move |scope| {
            let outcome = scope.load_script(&script);
            let Some(worker) = weak.upgrade() else {
                return;
            };
            let pending = worker.finish_loading(outcome.is_ok());
            match outcome {
                Ok(()) => {
                    for port in pending {
                        scope.accept_connection(port);
                    }
                }
                Err(err) => {
                    tracing::error!(context = %scope.name(), identity = %script, "shared worker script failed to load: {err}");
                }
            }
        });
        Ok(worker)
    }

    /// Mark the load outcome and take the connections queued so far
    fn finish_loading(&self, ok: bool) -> Vec<Port> {
        let mut connections = self.connections.lock();
        connections.loaded = ok;
        connections.failed = !ok;
        std::mem::take(&mut connections.pending)
    }

    /// New connection; the returned caller-side port is already started
    fn connect(&self) -> Port {
        let (caller, inner) = Port::pair();
        caller.start();

        let mut connections = self.connections.lock();
        connections.live.retain(is_open);
        connections.live.push(inner.clone());
        if connections.failed {
            tracing::trace!(identity = %self.identity, "connection to failed shared worker parked");
        } else if connections.loaded {
            drop(connections);
            self.context
                .handle()
                .queue_task(move |scope| scope.accept_connection(inner));
        } else {
            connections.pending.push(inner);
        }
        caller
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Connections whose ports are still entangled
    pub fn connection_count(&self) -> usize {
        self.connections.lock().live.iter().filter(|port| is_open(port)).count()
    }

    pub fn is_loaded(&self) -> bool {
        self.connections.lock().loaded
    }

    pub fn load_failed(&self) -> bool {
        self.connections.lock().failed
    }

    pub fn terminate(&self) {
        self.context.terminate();
        let live = std::mem::take(&mut self.connections.lock().live);
        for port in live {
            port.close();
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.context.is_terminated()
    }
}

fn is_open(port: &Port) -> bool {
    !port.is_closed() && port.is_entangled()
}

impl std::fmt::Debug for SharedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedWorker")
            .field("identity", &self.identity)
            .field("context", &self.context.name())
            .field("connections", &self.connection_count())
            .finish()
    }
}

/// Script identity -> the single shared worker for it
#[derive(Default)]
pub struct SharedWorkerRegistry {
    workers: Mutex<HashMap<String, Arc<SharedWorker>>>,
}

impl SharedWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the worker for `identity` and open a connection to
    /// it. Creation happens under the registry lock, so concurrent callers
    /// always share one instance.
    pub fn connect(&self, env: &Arc<RuntimeEnv>, identity: &str) -> Result<Port, JsError> {
        let worker = {
            let mut workers = self.workers.lock();
            match workers.get(identity) {
                Some(worker) if !worker.is_terminated() => Arc::clone(worker),
                _ => {
                    let worker = SharedWorker::spawn(env, identity)?;
                    workers.insert(identity.to_string(), Arc::clone(&worker));
                    tracing::info!(identity, "shared worker created");
                    worker
                }
            }
        };
        Ok(worker.connect())
    }

    pub fn get(&self, identity: &str) -> Option<Arc<SharedWorker>> {
        self.workers.lock().get(identity).cloned()
    }

    /// Active worker count
    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }

    /// Unregister without terminating
    pub fn remove(&self, identity: &str) -> Option<Arc<SharedWorker>> {
        self.workers.lock().remove(identity)
    }

    /// Unregister `identity` only if it still maps to this context
    pub(crate) fn remove_context(&self, identity: &str, context: &Arc<ContextShared>) -> Option<Arc<SharedWorker>> {
        let mut workers = self.workers.lock();
        let matches = workers
            .get(identity)
            .is_some_and(|worker| Arc::ptr_eq(worker.context.shared(), context));
        if matches { workers.remove(identity) } else { None }
    }

    /// Terminate every worker and clear the map
    pub fn terminate_all(&self) {
        let workers: Vec<_> = self.workers.lock().drain().map(|(_, worker)| worker).collect();
        for worker in &workers {
            worker.terminate();
        }
        if !workers.is_empty() {
            tracing::info!(count = workers.len(), "shared workers terminated");
        }
    }

    pub(crate) fn contexts(&self) -> Vec<Arc<ContextShared>> {
        self.workers
            .lock()
            .values()
            .map(|worker| Arc::clone(worker.context.shared()))
            .collect()
    }
}

impl std::fmt::Debug for SharedWorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let workers = self.workers.lock();
        f.debug_struct("SharedWorkerRegistry")
            .field("identities", &workers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(all(test, feature = "quickjs"))]
mod tests {
    use super::*;
    use crate::context::ContextScope;
    use crate::loader::MemoryLoader;
    use crate::message_port::MessageEvent;
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    const COUNTER: &str = r#"
        var connections = 0;
        onconnect = e => {
            connections += 1;
            const port = e.ports[0];
            const mine = connections;
            port.onmessage = m => port.postMessage({ connection: mine, echo: m.data });
        };
    "#;

    fn env() -> Arc<RuntimeEnv> {
        RuntimeEnv::builder()
            .loader(MemoryLoader::new().with_script("counter.js", COUNTER))
            .build()
            .unwrap()
    }

    fn observe(port: &Port, host: &ExecutionContext) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        port.set_owner(host.handle());
        port.set_on_message(move |_scope: &mut ContextScope, event: MessageEvent| {
            let _ = tx.lock().send(event.data);
        });
        rx
    }

    #[test]
    fn test_connections_share_one_instance() {
        let env = env();
        let host = env.main_context().unwrap();
        let a = env.connect_shared_worker("counter.js").unwrap();
        let b = env.connect_shared_worker("counter.js").unwrap();
        assert_eq!(env.shared_workers().len(), 1);
        assert!(a.is_started() && b.is_started());
        assert_ne!(a, b);

        let from_a = observe(&a, &host);
        let from_b = observe(&b, &host);
        a.post_message(json!("a"));
        b.post_message(json!("b"));
        assert_eq!(from_a.recv_timeout(WAIT).unwrap(), json!({ "connection": 1, "echo": "a" }));
        assert_eq!(from_b.recv_timeout(WAIT).unwrap(), json!({ "connection": 2, "echo": "b" }));

        let worker = env.shared_workers().get("counter.js").unwrap();
        assert_eq!(worker.connection_count(), 2);
        assert!(worker.is_loaded());
    }

    #[test]
    fn test_failed_load_never_dispatches() {
        let env = env();
        let host = env.main_context().unwrap();
        let port = env.connect_shared_worker("missing.js").unwrap();
        let replies = observe(&port, &host);
        let worker = env.shared_workers().get("missing.js").unwrap();
        assert!(worker.context().flush(WAIT));
        assert!(worker.load_failed());

        port.post_message(json!("anyone?"));
        assert!(replies.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_terminate_all_clears_registry() {
        let env = env();
        let port = env.connect_shared_worker("counter.js").unwrap();
        let worker = env.shared_workers().get("counter.js").unwrap();
        env.shutdown();
        assert!(env.shared_workers().is_empty());
        assert!(worker.is_terminated());
        assert!(!port.post_message(json!(1)));

        env.connect_shared_worker("counter.js").unwrap();
        assert_eq!(env.shared_workers().len(), 1);
    }

    #[test]
    fn test_closed_connection_is_dropped() {
        let env = env();
        let a = env.connect_shared_worker("counter.js").unwrap();
        let _b = env.connect_shared_worker("counter.js").unwrap();
        let worker = env.shared_workers().get("counter.js").unwrap();
        assert_eq!(worker.connection_count(), 2);

        a.close();
        assert_eq!(worker.connection_count(), 1);
        let _c = env.connect_shared_worker("counter.js").unwrap();
        assert_eq!(worker.connection_count(), 2);
        assert_eq!(worker.connections.lock().live.len(), 2);
    }
}
