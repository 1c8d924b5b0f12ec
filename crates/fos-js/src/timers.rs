//! Timer Scheduler
//!
//! setTimeout / setInterval for one context. A dedicated scheduler thread
//! sleeps until the earliest due timer; firing never runs the callback on
//! that thread, it enqueues a task on the owning event loop.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::event_loop::LoopHandle;
use crate::JsError;

/// Timer identifier, never 0
pub type TimerId = u32;

/// Shortest interval period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

type TimerCallback<S> = Arc<dyn Fn(&mut S) + Send + Sync>;

struct Timer<S> {
    callback: TimerCallback<S>,
    interval: Option<Duration>,
    due: Instant,
    /// Matches the live heap entry; older entries are stale
    seq: u64,
}

struct TimerTable<S> {
    timers: HashMap<TimerId, Timer<S>>,
    queue: BinaryHeap<Reverse<(Instant, u64, TimerId)>>,
    next_id: TimerId,
    next_seq: u64,
    shutdown: bool,
}

impl<S: 'static> TimerTable<S> {
    fn allocate_id(&mut self) -> TimerId {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.timers.contains_key(&id) {
                return id;
            }
        }
    }

    fn schedule(&mut self, id: TimerId, due: Instant) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse((due, seq, id)));
        seq
    }

    /// Enqueue the callback for `id`. Runs under the table lock, so a clear
    /// that wins the lock first always prevents the enqueue.
    fn fire(&mut self, id: TimerId, seq: u64, now: Instant, target: &LoopHandle<S>) {
        let Some(timer) = self.timers.get(&id) else {
            return;
        };
        if timer.seq != seq {
            return;
        }
        let callback = Arc::clone(&timer.callback);

        match timer.interval {
            Some(period) => {
                let due = now + period;
                let seq = self.schedule(id, due);
                if let Some(timer) = self.timers.get_mut(&id) {
                    timer.due = due;
                    timer.seq = seq;
                }
            }
            None => {
                self.timers.remove(&id);
            }
        }

        if !target.queue_task(move |state| callback(state)) {
            tracing::trace!(event_loop = %target.name(), timer = id, "timer fired after loop stopped");
        }
    }
}

struct TimerShared<S> {
    name: String,
    table: Mutex<TimerTable<S>>,
    condvar: Condvar,
    target: LoopHandle<S>,
}

/// Per-context timer scheduler
pub struct TimerScheduler<S> {
    shared: Arc<TimerShared<S>>,
}

impl<S: 'static> TimerScheduler<S> {
    /// Start the scheduler thread for timers targeting `target`
    pub fn new(name: impl Into<String>, target: LoopHandle<S>) -> Result<Self, JsError> {
        let shared = Arc::new(TimerShared {
            name: name.into(),
            table: Mutex::new(TimerTable {
                timers: HashMap::new(),
                queue: BinaryHeap::new(),
                next_id: 1,
                next_seq: 0,
                shutdown: false,
            }),
            condvar: Condvar::new(),
            target,
        });

        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("{}-timers", shared.name))
            .spawn(move || run_scheduler(worker))?;

        Ok(Self { shared })
    }

    /// Fire once after `delay`
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: Fn(&mut S) + Send + Sync + 'static,
    {
        self.insert(delay, None, Arc::new(callback))
    }

    /// Fire every `period` until cleared
    pub fn set_interval<F>(&self, period: Duration, callback: F) -> TimerId
    where
        F: Fn(&mut S) + Send + Sync + 'static,
    {
        let period = period.max(MIN_INTERVAL);
        self.insert(period, Some(period), Arc::new(callback))
    }

    fn insert(&self, delay: Duration, interval: Option<Duration>, callback: TimerCallback<S>) -> TimerId {
        let mut table = self.shared.table.lock();
        let id = table.allocate_id();
        if table.shutdown {
            return id;
        }
        let due = Instant::now() + delay;
        let seq = table.schedule(id, due);
        table.timers.insert(
            id,
            Timer {
                callback,
                interval,
                due,
                seq,
            },
        );
        self.shared.condvar.notify_one();
        tracing::trace!(scheduler = %self.shared.name, timer = id, ?delay, repeat = interval.is_some(), "timer set");
        id
    }

    /// Cancel future firings. Unknown and expired ids are ignored; a firing
    /// already enqueued on the loop still runs.
    pub fn clear(&self, id: TimerId) -> bool {
        self.shared.table.lock().timers.remove(&id).is_some()
    }

    pub fn clear_timeout(&self, id: TimerId) -> bool {
        self.clear(id)
    }

    pub fn clear_interval(&self, id: TimerId) -> bool {
        self.clear(id)
    }

    /// Number of live timers
    pub fn pending(&self) -> usize {
        self.shared.table.lock().timers.len()
    }

    /// Earliest due time among live timers
    pub fn next_due(&self) -> Option<Instant> {
        self.shared.table.lock().timers.values().map(|t| t.due).min()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.table.lock().shutdown
    }

    /// Drop every timer and end the scheduler thread
    pub fn shutdown(&self) {
        let dropped = {
            let mut table = self.shared.table.lock();
            if table.shutdown {
                return;
            }
            table.shutdown = true;
            table.queue.clear();
            std::mem::take(&mut table.timers)
        };
        self.shared.condvar.notify_all();
        tracing::debug!(scheduler = %self.shared.name, cancelled = dropped.len(), "timer scheduler shut down");
    }
}

impl<S> Drop for TimerScheduler<S> {
    fn drop(&mut self) {
        self.shared.table.lock().shutdown = true;
        self.shared.condvar.notify_all();
    }
}

impl<S> std::fmt::Debug for TimerScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("name", &self.shared.name)
            .field("pending", &self.shared.table.lock().timers.len())
            .finish()
    }
}

fn run_scheduler<S: 'static>(shared: Arc<TimerShared<S>>) {
    let mut table = shared.table.lock();
    loop {
        if table.shutdown {
            break;
        }
        let Some(Reverse((due, seq, id))) = table.queue.peek().copied() else {
            shared.condvar.wait(&mut table);
            continue;
        };
        let now = Instant::now();
        if due > now {
            shared.condvar.wait_until(&mut table, due);
            continue;
        }
        table.queue.pop();
        table.fire(id, seq, now, &shared.target);
    }
    table.timers.clear();
}
