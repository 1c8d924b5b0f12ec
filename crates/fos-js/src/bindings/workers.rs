//! Worker bindings
//!
//! `new Worker(url)`, `new SharedWorker(url)` and the worker-side
//! `close()`.

use std::sync::{Arc, Weak};

use serde_json::json;

use super::{unknown_op, upgrade, Args};
use crate::context::{ContextKind, ContextShared};
use crate::engine_trait::NativeFunction;
use crate::env::RuntimeEnv;
use crate::worker::Worker;
use crate::{JsError, JsValue};

/// `__fos_worker(op, ...)`
pub(super) fn host(shared: &Weak<ContextShared>) -> NativeFunction {
    let shared = shared.clone();
    Arc::new(move |args| {
        let shared = upgrade(&shared)?;
        let args = Args(args);
        match args.str(0)? {
            "spawn" => {
                let env = env(&shared)?;
                let worker = Worker::spawn(&env, args.str(1)?)?;
                let port = shared.insert_port(worker.port().clone());
                let id = shared.workers.insert(worker);
                Ok(JsValue::Json(json!({ "worker": id, "port": port })))
            }
            "terminate" => {
                if let Some(worker) = shared.workers.remove(args.u32(1)?) {
                    let port = worker.port().id();
                    worker.terminate();
                    shared.ports.retain(|p| p.id() != port);
                }
                Ok(JsValue::Undefined)
            }
            "connect" => {
                let env = env(&shared)?;
                let port = env.connect_shared_worker(args.str(1)?)?;
                Ok(shared.insert_port(port).into())
            }
            "close" => {
                close_self(&shared);
                Ok(JsValue::Undefined)
            }
            op => Err(unknown_op("worker", op)),
        }
    })
}

fn env(shared: &ContextShared) -> Result<Arc<RuntimeEnv>, JsError> {
    shared
        .env
        .upgrade()
        .ok_or_else(|| JsError::Stopped(shared.name.clone()))
}

/// Worker-scope `close()`: the current task finishes, nothing after it
/// runs. A shared worker also leaves the registry so the next connect
/// starts a fresh instance.
fn close_self(shared: &Arc<ContextShared>) {
    match &shared.kind {
        ContextKind::Main => {
            tracing::debug!(context = %shared.name, "close() ignored outside a worker");
        }
        ContextKind::Worker { .. } => shared.shutdown_loop(),
        ContextKind::SharedWorker { identity } => {
            shared.shutdown_loop();
            let removed = shared
                .env
                .upgrade()
                .and_then(|env| env.shared_workers().remove_context(identity, shared));
            drop(removed);
        }
    }
}
