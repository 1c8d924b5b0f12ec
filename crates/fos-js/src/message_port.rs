//! MessagePort
//!
//! Bidirectional channel between contexts. Two ports are entangled; posting
//! appends to the peer's inbox and, when the peer is ready (started, has a
//! handler and an owning loop), schedules a drain task on the peer's loop.
//! Messages that arrive before the peer is ready wait in its inbox.
//!
//! Each port guards its own state with one lock. No code path ever holds
//! two port locks at once.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::event_loop::LoopHandle;

/// Process-unique port identifier
pub type PortId = u64;

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// A delivered message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub data: serde_json::Value,
    /// Port the message was delivered to
    pub target: PortId,
}

/// Message handler, invoked on the owning loop
pub type MessageHandler<S> = Arc<dyn Fn(&mut S, MessageEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Unentangled,
    Entangled,
    Started,
    Closed,
}

struct PortSlot<S> {
    peer: Option<Weak<PortInner<S>>>,
    inbox: VecDeque<MessageEvent>,
    started: bool,
    closed: bool,
    drain_scheduled: bool,
    handler: Option<MessageHandler<S>>,
    owner: Option<LoopHandle<S>>,
}

impl<S> PortSlot<S> {
    fn ready(&self) -> bool {
        self.started && !self.closed && self.handler.is_some() && self.owner.is_some()
    }

    fn live_peer(&self) -> Option<Arc<PortInner<S>>> {
        self.peer.as_ref().and_then(Weak::upgrade)
    }
}

struct PortInner<S> {
    id: PortId,
    state: Mutex<PortSlot<S>>,
}

impl<S: 'static> PortInner<S> {
    fn enqueue(self: &Arc<Self>, data: serde_json::Value) -> bool {
        let mut slot = self.state.lock();
        if slot.closed {
            return false;
        }
        slot.inbox.push_back(MessageEvent {
            data,
            target: self.id,
        });
        self.schedule_drain(&mut slot);
        true
    }

    /// Queue a drain task on the owner if ready and none is pending
    fn schedule_drain(self: &Arc<Self>, slot: &mut PortSlot<S>) {
        if slot.drain_scheduled || slot.inbox.is_empty() || !slot.ready() {
            return;
        }
        let Some(owner) = slot.owner.clone() else {
            return;
        };
        let port = Arc::clone(self);
        if owner.queue_task(move |state| port.drain(state)) {
            slot.drain_scheduled = true;
        } else {
            tracing::trace!(port = self.id, "owner loop stopped, messages stay queued");
        }
    }

    /// Deliver every message queued when the drain starts. Later arrivals
    /// wait for the next drain.
    fn drain(self: &Arc<Self>, state: &mut S) {
        let mut batch = {
            let mut slot = self.state.lock();
            slot.drain_scheduled = false;
            if !slot.ready() {
                return;
            }
            std::mem::take(&mut slot.inbox)
        };

        while let Some(event) = batch.pop_front() {
            // Re-check every time: a handler may close or unhook the port
            let handler = {
                let slot = self.state.lock();
                if slot.ready() { slot.handler.clone() } else { None }
            };
            let Some(handler) = handler else {
                let mut slot = self.state.lock();
                if !slot.closed {
                    batch.push_front(event);
                    while let Some(rest) = batch.pop_back() {
                        slot.inbox.push_front(rest);
                    }
                }
                return;
            };
            if panic::catch_unwind(AssertUnwindSafe(|| handler(state, event))).is_err() {
                tracing::error!(port = self.id, "message handler panicked");
            }
        }
    }

    /// Clear the peer link on this side and, if it points back, on the peer
    fn sever(self: &Arc<Self>) {
        let old = self.state.lock().peer.take().and_then(|weak| weak.upgrade());
        if let Some(old) = old {
            let mut slot = old.state.lock();
            let points_back = slot
                .peer
                .as_ref()
                .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(self)));
            if points_back {
                slot.peer = None;
            }
        }
    }
}

/// One end of a message channel
pub struct MessagePort<S> {
    inner: Arc<PortInner<S>>,
}

impl<S> Clone for MessagePort<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> PartialEq for MessagePort<S> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S> Eq for MessagePort<S> {}

impl<S: 'static> Default for MessagePort<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> MessagePort<S> {
    /// New unentangled port
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PortInner {
                id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(PortSlot {
                    peer: None,
                    inbox: VecDeque::new(),
                    started: false,
                    closed: false,
                    drain_scheduled: false,
                    handler: None,
                    owner: None,
                }),
            }),
        }
    }

    /// Entangled pair, the MessageChannel primitive
    pub fn pair() -> (Self, Self) {
        let a = Self::new();
        let b = Self::new();
        a.entangle(&b);
        (a, b)
    }

    pub fn id(&self) -> PortId {
        self.inner.id
    }

    /// Link both ports to each other, severing any previous links.
    /// Closed ports cannot be entangled.
    pub fn entangle(&self, other: &MessagePort<S>) {
        if self == other || self.is_closed() || other.is_closed() {
            return;
        }
        self.inner.sever();
        other.inner.sever();
        self.inner.state.lock().peer = Some(Arc::downgrade(&other.inner));
        other.inner.state.lock().peer = Some(Arc::downgrade(&self.inner));
        tracing::trace!(port = self.id(), peer = other.id(), "ports entangled");
    }

    /// Send to the peer. Posting on an unentangled or closed port is a
    /// silent no-op and returns `false`.
    pub fn post_message(&self, data: serde_json::Value) -> bool {
        let peer = {
            let slot = self.inner.state.lock();
            if slot.closed {
                None
            } else {
                slot.live_peer()
            }
        };
        match peer {
            Some(peer) => peer.enqueue(data),
            None => {
                tracing::trace!(port = self.id(), "post on severed port dropped");
                false
            }
        }
    }

    /// Install or replace the handler; drains if the port is now ready
    pub fn set_on_message<F>(&self, handler: F)
    where
        F: Fn(&mut S, MessageEvent) + Send + Sync + 'static,
    {
        self.set_handler(Arc::new(handler));
    }

    pub fn set_handler(&self, handler: MessageHandler<S>) {
        let mut slot = self.inner.state.lock();
        if slot.closed {
            return;
        }
        slot.handler = Some(handler);
        self.inner.schedule_drain(&mut slot);
    }

    pub fn clear_on_message(&self) {
        self.inner.state.lock().handler = None;
    }

    /// Bind the port to the loop its handler runs on
    pub fn set_owner(&self, owner: LoopHandle<S>) {
        let mut slot = self.inner.state.lock();
        if slot.closed {
            return;
        }
        slot.owner = Some(owner);
        self.inner.schedule_drain(&mut slot);
    }

    pub fn owner(&self) -> Option<LoopHandle<S>> {
        self.inner.state.lock().owner.clone()
    }

    pub fn start(&self) {
        let mut slot = self.inner.state.lock();
        if slot.closed {
            return;
        }
        slot.started = true;
        self.inner.schedule_drain(&mut slot);
    }

    /// Terminal. Drops queued messages, the handler and the owner, and
    /// severs the link in both directions.
    pub fn close(&self) {
        let discarded = {
            let mut slot = self.inner.state.lock();
            if slot.closed {
                return;
            }
            slot.closed = true;
            slot.started = false;
            slot.handler = None;
            slot.owner = None;
            std::mem::take(&mut slot.inbox)
        };
        self.inner.sever();
        tracing::trace!(port = self.id(), discarded = discarded.len(), "port closed");
    }

    pub fn state(&self) -> PortState {
        let slot = self.inner.state.lock();
        if slot.closed {
            PortState::Closed
        } else if slot.live_peer().is_none() {
            PortState::Unentangled
        } else if slot.started {
            PortState::Started
        } else {
            PortState::Entangled
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn is_entangled(&self) -> bool {
        self.inner.state.lock().live_peer().is_some()
    }

    pub fn is_started(&self) -> bool {
        self.inner.state.lock().started
    }

    /// Messages waiting in this port's inbox
    pub fn pending_messages(&self) -> usize {
        self.inner.state.lock().inbox.len()
    }
}

impl<S> std::fmt::Debug for MessagePort<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.inner.state.lock();
        f.debug_struct("MessagePort")
            .field("id", &self.inner.id)
            .field("entangled", &slot.peer.is_some())
            .field("started", &slot.started)
            .field("closed", &slot.closed)
            .field("queued", &slot.inbox.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use serde_json::{json, Value};
    use std::time::Duration;

    type Inbox = Vec<Value>;

    const WAIT: Duration = Duration::from_secs(5);

    fn inbox_loop() -> EventLoop<Inbox> {
        let event_loop = EventLoop::new("port-test");
        event_loop.start_with(Vec::new).unwrap();
        event_loop
    }

    fn received(event_loop: &EventLoop<Inbox>) -> Inbox {
        event_loop.handle().run(|inbox| inbox.clone()).wait_timeout(WAIT).unwrap()
    }

    fn listen(port: &MessagePort<Inbox>, event_loop: &EventLoop<Inbox>) {
        port.set_owner(event_loop.handle());
        port.set_on_message(|inbox: &mut Inbox, event| inbox.push(event.data));
        port.start();
    }

    #[test]
    fn test_messages_delivered_in_order_once() {
        let event_loop = inbox_loop();
        let (a, b) = MessagePort::pair();
        listen(&b, &event_loop);

        assert!(a.post_message(json!("m1")));
        assert!(a.post_message(json!("m2")));
        assert!(event_loop.handle().flush(WAIT));
        assert_eq!(received(&event_loop), vec![json!("m1"), json!("m2")]);
        assert_eq!(b.pending_messages(), 0);
    }

    #[test]
    fn test_queue_until_ready() {
        let event_loop = inbox_loop();
        let (a, b) = MessagePort::pair();
        a.post_message(json!(1));
        a.post_message(json!(2));
        assert_eq!(b.pending_messages(), 2);

        b.set_owner(event_loop.handle());
        b.set_on_message(|inbox: &mut Inbox, event| inbox.push(event.data));
        assert!(event_loop.handle().flush(WAIT));
        assert!(received(&event_loop).is_empty());

        b.start();
        assert!(event_loop.handle().flush(WAIT));
        assert_eq!(received(&event_loop), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_unentangled_post_is_noop() {
        let port: MessagePort<Inbox> = MessagePort::new();
        assert_eq!(port.state(), PortState::Unentangled);
        assert!(!port.post_message(json!("lost")));
    }

    #[test]
    fn test_close_severs_both_directions() {
        let (a, b): (MessagePort<Inbox>, _) = MessagePort::pair();
        assert_eq!(a.state(), PortState::Entangled);
        b.start();
        assert_eq!(b.state(), PortState::Started);

        a.close();
        assert_eq!(a.state(), PortState::Closed);
        assert_eq!(b.state(), PortState::Unentangled);
        assert!(!a.post_message(json!(1)));
        assert!(!b.post_message(json!(2)));

        a.start();
        assert!(!a.is_started());
    }

    #[test]
    fn test_close_discards_queue() {
        let (a, b): (MessagePort<Inbox>, _) = MessagePort::pair();
        a.post_message(json!("x"));
        assert_eq!(b.pending_messages(), 1);
        b.close();
        assert_eq!(b.pending_messages(), 0);
    }

    #[test]
    fn test_reentangle_replaces_old_peer() {
        let (a, b): (MessagePort<Inbox>, _) = MessagePort::pair();
        let c = MessagePort::new();
        a.entangle(&c);
        assert!(!b.is_entangled());
        assert!(a.post_message(json!("to-c")));
        assert_eq!(c.pending_messages(), 1);
        assert_eq!(b.pending_messages(), 0);
    }

    #[test]
    fn test_handler_unhooked_mid_drain_keeps_rest() {
        let event_loop = inbox_loop();
        let (a, b) = MessagePort::pair();
        for i in 0..3 {
            a.post_message(json!(i));
        }
        let me = b.clone();
        b.set_owner(event_loop.handle());
        b.set_on_message(move |inbox: &mut Inbox, event| {
            inbox.push(event.data);
            me.clear_on_message();
        });
        b.start();
        assert!(event_loop.handle().flush(WAIT));
        assert_eq!(received(&event_loop), vec![json!(0)]);
        assert_eq!(b.pending_messages(), 2);

        b.set_on_message(|inbox: &mut Inbox, event| inbox.push(event.data));
        assert!(event_loop.handle().flush(WAIT));
        assert_eq!(received(&event_loop), vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn test_port_ids_are_unique() {
        let (a, b): (MessagePort<Inbox>, _) = MessagePort::pair();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone(), a);
    }
}
