//! MessagePort bindings
//!
//! Port 0 is a dedicated worker's channel to its parent; every other id
//! indexes the context's port table.

use std::sync::{Arc, Weak};

use super::{ids_to_js, unknown_op, upgrade, Args};
use crate::context::{ContextShared, Port, PARENT_PORT};
use crate::engine_trait::NativeFunction;
use crate::JsValue;

/// `__fos_port(op, port, ...)`
pub(super) fn host(shared: &Weak<ContextShared>) -> NativeFunction {
    let shared = shared.clone();
    Arc::new(move |args| {
        let shared = upgrade(&shared)?;
        let args = Args(args);
        let op = args.str(0)?;
        if op == "channel" {
            let (first, second) = Port::pair();
            let ids = [shared.insert_port(first), shared.insert_port(second)];
            return Ok(ids_to_js(ids));
        }

        let id = args.u32(1)?;
        let port = if id == PARENT_PORT {
            shared.parent_port.lock().clone()
        } else {
            shared.ports.get(id)
        };
        let Some(port) = port else {
            tracing::trace!(context = %shared.name, port = id, op, "operation on unknown port");
            return Ok(JsValue::Bool(false));
        };

        match op {
            "post" => Ok(port.post_message(args.json(2)).into()),
            "listen" => {
                // The parent port's handler is installed when the worker spawns
                if id != PARENT_PORT {
                    port.set_owner(shared.handle.clone());
                    port.set_on_message(move |scope, event| scope.dispatch_message(id, event.data));
                }
                Ok(JsValue::Undefined)
            }
            "unlisten" => {
                if id != PARENT_PORT {
                    port.clear_on_message();
                }
                Ok(JsValue::Undefined)
            }
            "start" => {
                port.start();
                Ok(JsValue::Undefined)
            }
            "close" => {
                port.close();
                // Drops this port and its severed peer
                shared.prune_ports();
                Ok(JsValue::Undefined)
            }
            op => Err(unknown_op("port", op)),
        }
    })
}
