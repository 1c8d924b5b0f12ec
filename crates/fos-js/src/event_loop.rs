//! Event Loop
//!
//! Single-consumer FIFO task queue drained by one dedicated thread. The
//! loop owns a piece of loop-local state `S` (the script engine for a
//! context) that is created on the loop thread and never leaves it. Every
//! task receives `&mut S`, so no two tasks of one loop ever overlap.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::JsError;

/// Deferred work bound to one loop
pub type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Loop lifecycle; `Stopped` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Created,
    Running,
    Stopped,
}

struct QueueState<S> {
    tasks: VecDeque<Task<S>>,
    status: LoopState,
    thread: Option<ThreadId>,
}

/// Shared queue behind a loop and all of its handles
struct TaskQueue<S> {
    name: String,
    state: Mutex<QueueState<S>>,
    condvar: Condvar,
    completed: AtomicU64,
}

impl<S> TaskQueue<S> {
    fn push(&self, task: Task<S>) -> bool {
        let mut state = self.state.lock();
        if state.status == LoopState::Stopped {
            return false;
        }
        state.tasks.push_back(task);
        self.condvar.notify_one();
        true
    }

    /// Block until a task is available; `None` once stopped
    fn next_task(&self) -> Option<Task<S>> {
        let mut state = self.state.lock();
        loop {
            if state.status == LoopState::Stopped {
                return None;
            }
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            self.condvar.wait(&mut state);
        }
    }

    fn stop(&self) {
        let discarded = {
            let mut state = self.state.lock();
            if state.status == LoopState::Stopped {
                return;
            }
            state.status = LoopState::Stopped;
            std::mem::take(&mut state.tasks)
        };
        self.condvar.notify_all();
        tracing::debug!(event_loop = %self.name, discarded = discarded.len(), "event loop stopped");
        // Tasks can own ports and handles; drop them outside the lock
        drop(discarded);
    }
}

/// A context's event loop
///
/// Dropping the loop stops it. The thread is never joined: a task that is
/// already running finishes on its own, queued tasks are discarded.
pub struct EventLoop<S> {
    queue: Arc<TaskQueue<S>>,
}

impl<S: 'static> EventLoop<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            queue: Arc::new(TaskQueue {
                name: name.into(),
                state: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    status: LoopState::Created,
                    thread: None,
                }),
                condvar: Condvar::new(),
                completed: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.queue.name
    }

    /// Spawn the loop thread; `init` builds the loop-local state on it.
    /// Calling this on a running or stopped loop does nothing.
    pub fn start_with<F>(&self, init: F) -> Result<(), JsError>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        {
            let mut state = self.queue.state.lock();
            if state.status != LoopState::Created {
                return Ok(());
            }
            state.status = LoopState::Running;
        }

        let queue = Arc::clone(&self.queue);
        let spawned = thread::Builder::new()
            .name(self.queue.name.clone())
            .spawn(move || run_loop(queue, init));

        if let Err(err) = spawned {
            self.queue.stop();
            return Err(JsError::Spawn(err));
        }
        tracing::debug!(event_loop = %self.queue.name, "event loop started");
        Ok(())
    }

    pub fn queue_task(&self, task: impl FnOnce(&mut S) + Send + 'static) -> bool {
        self.queue.push(Box::new(task))
    }

    pub fn stop(&self) {
        self.queue.stop();
    }

    pub fn state(&self) -> LoopState {
        self.queue.state.lock().status
    }

    pub fn is_loop_thread(&self) -> bool {
        self.handle().is_loop_thread()
    }

    pub fn completed_tasks(&self) -> u64 {
        self.queue.completed.load(Ordering::SeqCst)
    }

    /// Cloneable cross-thread sender for this loop
    pub fn handle(&self) -> LoopHandle<S> {
        LoopHandle {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl EventLoop<()> {
    /// Start a loop without loop-local state
    pub fn start(&self) -> Result<(), JsError> {
        self.start_with(|| ())
    }
}

impl<S> Drop for EventLoop<S> {
    fn drop(&mut self) {
        self.queue.stop();
    }
}

impl<S> std::fmt::Debug for EventLoop<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.queue.state.lock();
        f.debug_struct("EventLoop")
            .field("name", &self.queue.name)
            .field("status", &state.status)
            .field("pending", &state.tasks.len())
            .finish()
    }
}

/// Sender side of an [`EventLoop`], callable from any thread
pub struct LoopHandle<S> {
    queue: Arc<TaskQueue<S>>,
}

impl<S> Clone for LoopHandle<S> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<S: 'static> LoopHandle<S> {
    pub fn name(&self) -> &str {
        &self.queue.name
    }

    /// Enqueue a task; `false` once the loop has stopped
    pub fn queue_task(&self, task: impl FnOnce(&mut S) + Send + 'static) -> bool {
        self.queue.push(Box::new(task))
    }

    pub fn stop(&self) {
        self.queue.stop();
    }

    pub fn state(&self) -> LoopState {
        self.queue.state.lock().status
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == LoopState::Stopped
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.state.lock().tasks.len()
    }

    pub fn completed_tasks(&self) -> u64 {
        self.queue.completed.load(Ordering::SeqCst)
    }

    pub fn is_loop_thread(&self) -> bool {
        self.queue.state.lock().thread == Some(thread::current().id())
    }

    /// Run `f` on the loop and hand its result back as a single-assignment
    /// completion. Waiting on it from the loop's own thread deadlocks.
    pub fn run<R, F>(&self, f: F) -> Pending<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.queue_task(move |state| {
            let _ = tx.send(f(state));
        });
        Pending {
            rx,
            label: self.queue.name.clone(),
        }
    }

    /// Wait until every task queued before this call has run
    pub fn flush(&self, timeout: Duration) -> bool {
        self.run(|_| ()).wait_timeout(timeout).is_ok()
    }
}

impl<S> std::fmt::Debug for LoopHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("name", &self.queue.name)
            .finish()
    }
}

/// Result of work queued with [`LoopHandle::run`]
#[derive(Debug)]
pub struct Pending<T> {
    rx: mpsc::Receiver<T>,
    label: String,
}

impl<T> Pending<T> {
    pub fn wait(self) -> Result<T, JsError> {
        self.rx.recv().map_err(|_| JsError::Stopped(self.label))
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<T, JsError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            mpsc::RecvTimeoutError::Timeout => JsError::Timeout(timeout),
            mpsc::RecvTimeoutError::Disconnected => JsError::Stopped(self.label),
        })
    }
}

fn run_loop<S: 'static, F: FnOnce() -> S>(queue: Arc<TaskQueue<S>>, init: F) {
    queue.state.lock().thread = Some(thread::current().id());

    let mut local = match panic::catch_unwind(AssertUnwindSafe(init)) {
        Ok(local) => local,
        Err(payload) => {
            tracing::error!(
                event_loop = %queue.name,
                "loop initialization panicked: {}",
                panic_message(payload.as_ref())
            );
            queue.stop();
            return;
        }
    };

    while let Some(task) = queue.next_task() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(&mut local))) {
            tracing::error!(
                event_loop = %queue.name,
                "task panicked: {}",
                panic_message(payload.as_ref())
            );
        }
        queue.completed.fetch_add(1, Ordering::SeqCst);
    }

    tracing::trace!(event_loop = %queue.name, "loop thread exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
