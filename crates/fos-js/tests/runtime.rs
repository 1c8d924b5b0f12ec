//! Event loop, message port and timer tests for fos-js
//!
//! These drive the engine-independent plumbing directly with plain Rust
//! loop state.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use fos_js::*;
use serde_json::{json, Value};

const WAIT: Duration = Duration::from_secs(5);

fn started<S: 'static>(name: &str, init: fn() -> S) -> EventLoop<S> {
    let event_loop = EventLoop::new(name);
    event_loop.start_with(init).unwrap();
    event_loop
}

// ============================================================================
// EVENT LOOP
// ============================================================================

#[test]
fn test_tasks_from_many_threads_keep_producer_order() {
    let event_loop: EventLoop<Vec<(usize, usize)>> = started("fifo", Vec::new);
    let handle = event_loop.handle();

    let producers: Vec<_> = (0..4)
        .map(|producer| {
            let handle = handle.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    handle.queue_task(move |log: &mut Vec<(usize, usize)>| log.push((producer, i)));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let log = handle.run(|log| log.clone()).wait_timeout(WAIT).unwrap();
    assert_eq!(log.len(), 400);
    for producer in 0..4 {
        let seen: Vec<usize> = log
            .iter()
            .filter(|(p, _)| *p == producer)
            .map(|(_, i)| *i)
            .collect();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}

#[test]
fn test_tasks_never_run_concurrently() {
    // (running, most seen at once)
    let event_loop: EventLoop<(u32, u32)> = started("exclusive", || (0, 0));
    let handle = event_loop.handle();
    for _ in 0..50 {
        handle.queue_task(|(running, peak): &mut (u32, u32)| {
            *running += 1;
            *peak = (*peak).max(*running);
            thread::sleep(Duration::from_micros(50));
            *running -= 1;
        });
    }
    let peak = handle.run(|(_, peak)| *peak).wait_timeout(WAIT).unwrap();
    assert_eq!(peak, 1);
    assert!(handle.completed_tasks() >= 50);
}

#[test]
fn test_stopped_loop_rejects_tasks() {
    let event_loop: EventLoop<()> = EventLoop::new("stopped");
    event_loop.start().unwrap();
    let handle = event_loop.handle();
    event_loop.stop();
    assert!(handle.is_stopped());
    assert!(!handle.queue_task(|_| {}));
    assert!(!handle.flush(Duration::from_millis(50)));
}

// ============================================================================
// MESSAGE PORTS
// ============================================================================

type Inbox = Vec<Value>;

fn listening(port: &MessagePort<Inbox>, handle: &LoopHandle<Inbox>) {
    port.set_owner(handle.clone());
    port.set_on_message(|inbox: &mut Inbox, event: MessageEvent| inbox.push(event.data));
}

#[test]
fn test_messages_queue_until_port_started() {
    let event_loop: EventLoop<Inbox> = started("ports", Vec::new);
    let handle = event_loop.handle();
    let (sender, receiver) = MessagePort::pair();

    for i in 0..5 {
        assert!(sender.post_message(json!(i)));
    }
    assert_eq!(receiver.pending_messages(), 5);

    listening(&receiver, &handle);
    assert!(handle.flush(WAIT));
    assert!(handle.run(|inbox| inbox.is_empty()).wait_timeout(WAIT).unwrap());

    receiver.start();
    assert_eq!(receiver.state(), PortState::Started);
    let inbox = handle.run(|inbox| inbox.clone()).wait_timeout(WAIT).unwrap();
    assert_eq!(inbox, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
    assert_eq!(receiver.pending_messages(), 0);
}

#[test]
fn test_port_order_across_senders_threads() {
    let event_loop: EventLoop<Inbox> = started("ports-order", Vec::new);
    let handle = event_loop.handle();
    let (sender, receiver) = MessagePort::pair();
    listening(&receiver, &handle);
    receiver.start();

    let poster = thread::spawn(move || {
        for i in 0..200 {
            sender.post_message(json!(i));
        }
        sender
    });
    let _sender = poster.join().unwrap();

    let deadline = std::time::Instant::now() + WAIT;
    loop {
        let inbox = handle.run(|inbox| inbox.clone()).wait_timeout(WAIT).unwrap();
        if inbox.len() == 200 {
            assert_eq!(inbox, (0..200).map(|i| json!(i)).collect::<Vec<_>>());
            break;
        }
        assert!(std::time::Instant::now() < deadline, "messages never arrived");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_closed_and_unentangled_posts_are_dropped() {
    let lone: MessagePort<Inbox> = MessagePort::new();
    assert_eq!(lone.state(), PortState::Unentangled);
    assert!(!lone.post_message(json!("nobody")));

    let (a, b) = MessagePort::<Inbox>::pair();
    assert!(a.is_entangled());
    b.close();
    assert_eq!(b.state(), PortState::Closed);
    assert!(!a.is_entangled());
    assert!(!a.post_message(json!("late")));
    assert!(!b.post_message(json!("late")));

    b.start();
    assert!(b.is_closed());
}

#[test]
fn test_reentangle_severs_previous_peer() {
    let (a, b) = MessagePort::<Inbox>::pair();
    let c = MessagePort::new();
    a.entangle(&c);
    assert!(!b.is_entangled());
    assert!(c.is_entangled());
    assert!(a.post_message(json!(1)));
    assert_eq!(c.pending_messages(), 1);
    assert_eq!(b.pending_messages(), 0);
}

// ============================================================================
// TIMERS
// ============================================================================

#[test]
fn test_timeouts_fire_in_due_order() {
    let event_loop: EventLoop<Vec<u32>> = started("timeouts", Vec::new);
    let timers = TimerScheduler::new("timeouts", event_loop.handle()).unwrap();
    timers.set_timeout(Duration::from_millis(40), |log: &mut Vec<u32>| log.push(2));
    timers.set_timeout(Duration::from_millis(5), |log: &mut Vec<u32>| log.push(1));

    thread::sleep(Duration::from_millis(120));
    let log = event_loop.handle().run(|log| log.clone()).wait_timeout(WAIT).unwrap();
    assert_eq!(log, vec![1, 2]);
    assert_eq!(timers.pending(), 0);
}

#[test]
fn test_clear_does_not_unfire_enqueued_callback() {
    let event_loop: EventLoop<Vec<u32>> = started("unfire", Vec::new);
    let handle = event_loop.handle();
    let timers = TimerScheduler::new("unfire", handle.clone()).unwrap();

    // Hold the loop so the interval's firings pile up in its queue
    let (release, gate) = mpsc::channel::<()>();
    handle.queue_task(move |_| {
        let _ = gate.recv_timeout(WAIT);
    });
    let id = timers.set_interval(Duration::from_millis(1), |log: &mut Vec<u32>| log.push(7));
    thread::sleep(Duration::from_millis(30));

    assert!(timers.clear_interval(id));
    assert!(!timers.clear_interval(id));
    release.send(()).unwrap();

    let fired = handle.run(|log| log.len()).wait_timeout(WAIT).unwrap();
    assert!(fired >= 1);

    thread::sleep(Duration::from_millis(30));
    let later = handle.run(|log| log.len()).wait_timeout(WAIT).unwrap();
    assert_eq!(later, fired);
}

#[test]
fn test_shutdown_cancels_everything() {
    let event_loop: EventLoop<Vec<u32>> = started("timer-shutdown", Vec::new);
    let timers = TimerScheduler::new("timer-shutdown", event_loop.handle()).unwrap();
    timers.set_timeout(Duration::from_millis(20), |log: &mut Vec<u32>| log.push(1));
    timers.shutdown();
    assert!(timers.is_shutdown());
    assert_eq!(timers.pending(), 0);

    thread::sleep(Duration::from_millis(50));
    let log = event_loop.handle().run(|log| log.clone()).wait_timeout(WAIT).unwrap();
    assert!(log.is_empty());
}
