//! Execution Context
//!
//! One script program bound to one thread: an event loop, the engine that
//! lives on it, a timer scheduler, a Document and the canvas surfaces,
//! ports and workers the program created. All engine calls happen on the
//! loop thread; other threads reach the context through [`LoopHandle`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use fos_canvas::{ImageData, SharedSurface};
use fos_dom::{Document, NodeId, SharedDocument};
use parking_lot::Mutex;
use serde_json::json;

use crate::bindings::{self, CanvasElementFactory, CanvasPresentation};
use crate::engine_trait::{EngineOptions, ScriptEngine};
use crate::env::RuntimeEnv;
use crate::event_loop::{EventLoop, LoopHandle, Pending};
use crate::message_port::MessagePort;
use crate::timers::TimerScheduler;
use crate::worker::Worker;
use crate::{JsError, JsValue};

/// Message port whose handlers run inside a context
pub type Port = MessagePort<ContextScope>;

/// Global the prelude installs to receive host events
const DISPATCH_FN: &str = "__fosDispatch";

/// Port id scripts use for the worker's own inbound channel
pub(crate) const PARENT_PORT: u32 = 0;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// What kind of program a context runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKind {
    Main,
    Worker { identity: String },
    SharedWorker { identity: String },
}

impl ContextKind {
    /// Value of the `__fos_kind` global
    pub fn script_name(&self) -> &'static str {
        match self {
            ContextKind::Main => "main",
            ContextKind::Worker { .. } => "worker",
            ContextKind::SharedWorker { .. } => "shared",
        }
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            ContextKind::Main => None,
            ContextKind::Worker { identity } | ContextKind::SharedWorker { identity } => Some(identity),
        }
    }
}

/// Numbered handles handed to scripts
pub(crate) struct HandleTable<T> {
    entries: Mutex<HashMap<u32, T>>,
    next: AtomicU32,
}

impl<T: Clone> HandleTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            // 0 is reserved for the parent port
            next: AtomicU32::new(1),
        }
    }

    pub(crate) fn insert(&self, value: T) -> u32 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(id, value);
        id
    }

    pub(crate) fn get(&self, id: u32) -> Option<T> {
        self.entries.lock().get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: u32) -> Option<T> {
        self.entries.lock().remove(&id)
    }

    pub(crate) fn entries(&self) -> Vec<(u32, T)> {
        let mut entries: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(id, value)| (*id, value.clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    pub(crate) fn retain(&self, mut keep: impl FnMut(&T) -> bool) {
        self.entries.lock().retain(|_, value| keep(value));
    }

    pub(crate) fn drain(&self) -> Vec<T> {
        self.entries.lock().drain().map(|(_, value)| value).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// State shared between a context's loop thread, its host handle and the
/// host functions installed in its engine
pub(crate) struct ContextShared {
    pub(crate) name: String,
    pub(crate) kind: ContextKind,
    pub(crate) env: Weak<RuntimeEnv>,
    pub(crate) handle: LoopHandle<ContextScope>,
    pub(crate) timers: TimerScheduler<ContextScope>,
    pub(crate) document: SharedDocument,
    pub(crate) surfaces: Arc<HandleTable<SharedSurface>>,
    /// `ImageBitmap` snapshots, released by `close()`
    pub(crate) bitmaps: HandleTable<Arc<ImageData>>,
    pub(crate) ports: HandleTable<Port>,
    pub(crate) workers: HandleTable<Worker>,
    pub(crate) parent_port: Mutex<Option<Port>>,
    pub(crate) interrupt: Arc<AtomicBool>,
}

impl ContextShared {
    /// Stop the loop, cancel timers, close every port and terminate child
    /// workers. A task already running may finish.
    pub(crate) fn terminate(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
        self.shutdown_loop();
    }

    /// Teardown without interrupting the running task (script `close()`)
    pub(crate) fn shutdown_loop(&self) {
        self.handle.stop();
        self.timers.shutdown();
        if let Some(port) = self.parent_port.lock().take() {
            port.close();
        }
        for port in self.ports.drain() {
            port.close();
        }
        for worker in self.workers.drain() {
            worker.terminate();
        }
        tracing::debug!(context = %self.name, "context terminated");
    }

    /// Register a port for scripts, dropping ports that can no longer carry
    /// messages
    pub(crate) fn insert_port(&self, port: Port) -> u32 {
        self.prune_ports();
        self.ports.insert(port)
    }

    /// Forget closed ports and ports whose peer is gone
    pub(crate) fn prune_ports(&self) {
        self.ports.retain(|port| !port.is_closed() && port.is_entangled());
    }

    /// This context, its dedicated workers (recursively) and, from the
    /// root call, every shared worker of the environment
    fn context_tree(self: &Arc<Self>, include_shared: bool) -> Vec<Arc<ContextShared>> {
        let mut out = vec![Arc::clone(self)];
        for (_, worker) in self.workers.entries() {
            out.extend(worker.context().shared.context_tree(false));
        }
        if include_shared {
            if let Some(env) = self.env.upgrade() {
                for shared in env.shared_workers.contexts() {
                    out.extend(shared.context_tree(false));
                }
            }
        }
        let mut seen = Vec::new();
        out.retain(|ctx| {
            let ptr = Arc::as_ptr(ctx);
            if seen.contains(&ptr) {
                false
            } else {
                seen.push(ptr);
                true
            }
        });
        out
    }
}

/// Loop-local state of a context: the engine plus the shared handles.
/// Tasks queued on a context receive `&mut ContextScope`.
pub struct ContextScope {
    engine: Option<Box<dyn ScriptEngine>>,
    shared: Arc<ContextShared>,
    load_failed: bool,
}

impl ContextScope {
    /// Runs on the loop thread
    fn boot(shared: Arc<ContextShared>, options: EngineOptions) -> Self {
        let engine = match shared.env.upgrade() {
            Some(env) => env.engines.create(&options),
            None => Err(JsError::Stopped(shared.name.clone())),
        };
        let engine = engine.and_then(|mut engine| {
            bindings::install(engine.as_mut(), &shared)?;
            Ok(engine)
        });
        let engine = match engine {
            Ok(engine) => {
                tracing::debug!(context = %shared.name, engine = engine.name(), "context ready");
                Some(engine)
            }
            Err(err) => {
                tracing::error!(context = %shared.name, "failed to start script engine: {err}");
                None
            }
        };
        Self {
            engine,
            shared,
            load_failed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn kind(&self) -> &ContextKind {
        &self.shared.kind
    }

    pub fn document(&self) -> SharedDocument {
        Arc::clone(&self.shared.document)
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Whether this context's script failed to load
    pub fn load_failed(&self) -> bool {
        self.load_failed
    }

    fn engine(&mut self) -> Result<&mut (dyn ScriptEngine + 'static), JsError> {
        match self.engine.as_deref_mut() {
            Some(engine) => Ok(engine),
            None => Err(JsError::EngineUnavailable(self.shared.name.clone())),
        }
    }

    pub fn eval(&mut self, source: &str) -> Result<JsValue, JsError> {
        self.eval_named(source, "<eval>")
    }

    /// Evaluate `source`, then run microtasks it queued
    pub fn eval_named(&mut self, source: &str, origin: &str) -> Result<JsValue, JsError> {
        let result = self.engine()?.eval(source, origin);
        self.run_jobs();
        result
    }

    /// Fetch a script through the environment's loader and run it. A worker
    /// whose script fails to load stays alive but never dispatches; a main
    /// context keeps serving its other scripts.
    pub fn load_script(&mut self, identity: &str) -> Result<(), JsError> {
        let source = self
            .shared
            .env
            .upgrade()
            .ok_or_else(|| JsError::Stopped(self.shared.name.clone()))
            .and_then(|env| env.loader.load(identity));
        let outcome = source.and_then(|source| self.eval_named(&source, identity));
        match outcome {
            Ok(_) => {
                tracing::debug!(context = %self.shared.name, identity, "script loaded");
                Ok(())
            }
            Err(err) => {
                if self.shared.kind != ContextKind::Main {
                    self.load_failed = true;
                }
                Err(err)
            }
        }
    }

    fn run_jobs(&mut self) {
        let Some(engine) = self.engine.as_deref_mut() else {
            return;
        };
        if let Err(err) = engine.run_pending_jobs() {
            tracing::error!(context = %self.shared.name, "[JS] uncaught in job: {err}");
        }
    }

    /// Hand a host event to the script. Faults are logged here and go no
    /// further.
    pub(crate) fn dispatch(&mut self, event: serde_json::Value) {
        if self.load_failed {
            tracing::trace!(context = %self.shared.name, "dropping event for failed script");
            return;
        }
        let Some(engine) = self.engine.as_deref_mut() else {
            return;
        };
        if let Err(err) = engine.invoke(DISPATCH_FN, JsValue::Json(event)) {
            tracing::error!(context = %self.shared.name, "[JS] uncaught: {err}");
        }
        self.run_jobs();
    }

    pub(crate) fn invoke_callback(&mut self, id: u32, once: bool) {
        self.dispatch(json!({ "kind": "callback", "id": id, "once": once }));
    }

    /// Complete a one-shot callback with a host-produced value
    pub(crate) fn resolve_callback(&mut self, id: u32, value: serde_json::Value) {
        self.dispatch(json!({ "kind": "resolve", "id": id, "value": value }));
    }

    pub(crate) fn release_callback(&mut self, id: u32) {
        self.dispatch(json!({ "kind": "release", "id": id }));
    }

    pub(crate) fn dispatch_message(&mut self, port: u32, data: serde_json::Value) {
        self.dispatch(json!({ "kind": "message", "port": port, "data": data }));
    }

    /// Register a shared worker connection and fire `onconnect`
    pub(crate) fn accept_connection(&mut self, port: Port) {
        let id = self.shared.insert_port(port);
        tracing::trace!(context = %self.shared.name, port = id, "connection accepted");
        self.dispatch(json!({ "kind": "connect", "port": id }));
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.as_deref_mut() {
            engine.close();
        }
    }
}

/// A running execution context
pub struct ExecutionContext {
    shared: Arc<ContextShared>,
    event_loop: EventLoop<ContextScope>,
}

impl ExecutionContext {
    /// Create a context and start its loop thread
    pub fn new(env: &Arc<RuntimeEnv>, kind: ContextKind) -> Result<Self, JsError> {
        let serial = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
        let label = match &kind {
            ContextKind::Main => format!("main-{serial}"),
            ContextKind::Worker { .. } => format!("worker-{serial}"),
            ContextKind::SharedWorker { .. } => format!("shared-{serial}"),
        };
        let name = env.config.thread_name(&label);

        let event_loop = EventLoop::new(name.clone());
        let timers = TimerScheduler::new(name.clone(), event_loop.handle())?;
        let surfaces = Arc::new(HandleTable::new());

        let url = kind.identity().unwrap_or("about:blank").to_string();
        let document = match kind {
            ContextKind::Main => {
                let factory = CanvasElementFactory::new(
                    Arc::clone(&env.graphics),
                    Arc::clone(&surfaces),
                    (env.config.canvas_width, env.config.canvas_height),
                );
                Document::with_factory(&url, Some(Arc::new(factory)))
            }
            ContextKind::Worker { .. } | ContextKind::SharedWorker { .. } => Document::empty(&url),
        };

        let options = EngineOptions::new(name.clone(), env.config.memory_limit);
        let shared = Arc::new(ContextShared {
            name,
            kind,
            env: Arc::downgrade(env),
            handle: event_loop.handle(),
            timers,
            document: document.into_shared(),
            surfaces,
            bitmaps: HandleTable::new(),
            ports: HandleTable::new(),
            workers: HandleTable::new(),
            parent_port: Mutex::new(None),
            interrupt: Arc::clone(&options.interrupt),
        });

        let boot = Arc::clone(&shared);
        event_loop.start_with(move || ContextScope::boot(boot, options))?;
        tracing::info!(context = %shared.name, kind = shared.kind.script_name(), "context started");

        Ok(Self { shared, event_loop })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn kind(&self) -> &ContextKind {
        &self.shared.kind
    }

    pub fn handle(&self) -> LoopHandle<ContextScope> {
        self.event_loop.handle()
    }

    pub fn document(&self) -> SharedDocument {
        Arc::clone(&self.shared.document)
    }

    /// Load and run a script by identity
    pub fn load_script(&self, identity: &str) -> Pending<Result<(), JsError>> {
        let identity = identity.to_string();
        self.run(move |scope| scope.load_script(&identity))
    }

    /// Evaluate source on the context thread
    pub fn eval(&self, source: &str) -> Pending<Result<JsValue, JsError>> {
        let source = source.to_string();
        self.run(move |scope| scope.eval(&source))
    }

    /// Run `f` on the context thread with access to the scope
    pub fn run<R, F>(&self, f: F) -> Pending<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut ContextScope) -> R + Send + 'static,
    {
        self.event_loop.handle().run(f)
    }

    /// Wait until every task queued so far has run
    pub fn flush(&self, timeout: Duration) -> bool {
        self.event_loop.handle().flush(timeout)
    }

    /// Wait until this context, its workers and the environment's shared
    /// workers are idle with no live timers. Returns `false` on timeout,
    /// e.g. while an interval is still active.
    pub fn settle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let contexts: Vec<_> = self
                .shared
                .context_tree(true)
                .into_iter()
                .filter(|ctx| !ctx.handle.is_stopped())
                .collect();

            let marks = completion_marks(&contexts, deadline)
                .and_then(|first| Ok((first, completion_marks(&contexts, deadline)?)));
            let (first, second) = match marks {
                Ok(marks) => marks,
                // A context stopped between marks (worker `close()`); look again
                Err(JsError::Stopped(_)) if Instant::now() < deadline => continue,
                Err(_) => return false,
            };
            // Only the first marker ran in between
            let quiet = first.iter().zip(&second).all(|(a, b)| *b == *a + 1);
            if !quiet {
                continue;
            }

            let next_due = contexts.iter().filter_map(|ctx| ctx.timers.next_due()).min();
            match next_due {
                None => return true,
                Some(due) if due > deadline => return false,
                Some(due) => std::thread::sleep(due.saturating_duration_since(Instant::now())),
            }
        }
    }

    /// Surface registered under `id` (OffscreenCanvas or canvas element)
    pub fn surface(&self, id: u32) -> Option<SharedSurface> {
        self.shared.surfaces.get(id)
    }

    /// Surface of the canvas element with this id attribute
    pub fn canvas_by_element_id(&self, id: &str) -> Option<SharedSurface> {
        let document = self.shared.document.lock();
        let node = document.get_element_by_id(id)?;
        canvas_surface(&document, node)
    }

    /// Every surface this context created, in creation order
    pub fn canvas_surfaces(&self) -> Vec<(u32, SharedSurface)> {
        self.shared.surfaces.entries()
    }

    /// Dedicated workers spawned by this context's script
    /// Ports scripts in this context can still use
    pub fn port_count(&self) -> usize {
        self.shared.prune_ports();
        self.shared.ports.len()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.workers.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.event_loop.handle().is_stopped()
    }

    /// Non-cooperative teardown: interrupt the running script, stop the
    /// loop, cancel timers, close ports and terminate child workers
    pub fn terminate(&self) {
        self.shared.terminate();
    }

    /// Install the inbound channel of a dedicated worker
    pub(crate) fn set_parent_port(&self, port: Port) {
        *self.shared.parent_port.lock() = Some(port);
    }

    pub(crate) fn shared(&self) -> &Arc<ContextShared> {
        &self.shared
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if !self.event_loop.handle().is_stopped() {
            self.shared.terminate();
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.shared.name)
            .field("kind", &self.shared.kind)
            .field("state", &self.event_loop.state())
            .finish()
    }
}

/// Surface behind a canvas element node
pub(crate) fn canvas_surface(document: &Document, node: NodeId) -> Option<SharedSurface> {
    document
        .presentation::<CanvasPresentation>(node)
        .map(|presentation| Arc::clone(&presentation.surface))
}

/// Completed-task count seen from inside a marker task on each context
fn completion_marks(contexts: &[Arc<ContextShared>], deadline: Instant) -> Result<Vec<u64>, JsError> {
    let pending: Vec<_> = contexts
        .iter()
        .map(|ctx| {
            let handle = ctx.handle.clone();
            ctx.handle.run(move |_| handle.completed_tasks())
        })
        .collect();
    let mut marks = Vec::with_capacity(pending.len());
    for mark in pending {
        let remaining = deadline.saturating_duration_since(Instant::now());
        marks.push(mark.wait_timeout(remaining)?);
    }
    Ok(marks)
}
