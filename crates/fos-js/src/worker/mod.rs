//! Web Workers Module
//!
//! Dedicated workers and shared workers. Each worker is a full execution
//! context on its own thread, reachable only through message ports.

mod shared_worker;
mod web_worker;

pub use shared_worker::{SharedWorker, SharedWorkerRegistry};
pub use web_worker::Worker;
