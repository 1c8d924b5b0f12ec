//! Timer bindings
//!
//! The prelude keeps the JS callbacks; the host only schedules numbered
//! callback ids on the context's timer thread.

use std::sync::{Arc, Weak};
use std::time::Duration;

use super::{unknown_op, upgrade, Args};
use crate::context::ContextShared;
use crate::engine_trait::NativeFunction;
use crate::JsValue;

/// Longest delay honored, in milliseconds (about 24.8 days, as in browsers)
const MAX_DELAY_MS: f64 = 2_147_483_647.0;

/// `__fos_timer('set', callback, delayMs, repeat)` returns a timer id;
/// `__fos_timer('clear', timer, callback)` cancels it
pub(super) fn host(shared: &Weak<ContextShared>) -> NativeFunction {
    let shared = shared.clone();
    Arc::new(move |args| {
        let shared = upgrade(&shared)?;
        let args = Args(args);
        match args.str(0)? {
            "set" => {
                let callback = args.u32(1)?;
                let delay = delay(args.f64(2).unwrap_or(0.0));
                let id = if args.bool(3) {
                    shared
                        .timers
                        .set_interval(delay, move |scope| scope.invoke_callback(callback, false))
                } else {
                    shared
                        .timers
                        .set_timeout(delay, move |scope| scope.invoke_callback(callback, true))
                };
                Ok(JsValue::from(id))
            }
            "clear" => {
                let timer = args.u32(1)?;
                let cleared = shared.timers.clear(timer);
                // A fire already queued still runs; release the callback after it
                if let (true, Some(callback)) = (cleared, args.opt_u32(2)?) {
                    shared
                        .handle
                        .queue_task(move |scope| scope.release_callback(callback));
                }
                Ok(cleared.into())
            }
            op => Err(unknown_op("timer", op)),
        }
    })
}

fn delay(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms.min(MAX_DELAY_MS) / 1000.0)
    } else {
        Duration::ZERO
    }
}
