//! Unit tests for `Dispatcher`
//!
//! Tests type routing, wildcard delivery, listener isolation and unsubscribe

use std::sync::Arc;

use parking_lot::Mutex;

use assistant_link::dispatch::{Dispatcher, Subscription, Topic};
use assistant_link::types::{EventKind, InboundEvent, StreamId};

fn pong() -> InboundEvent {
    InboundEvent::Pong { timestamp: None }
}

fn chunk(content: &str) -> InboundEvent {
    InboundEvent::StreamChunk {
        stream_id: StreamId::new("s1"),
        content: content.to_string(),
        chunk_index: None,
    }
}

#[test]
fn test_publish_reaches_kind_and_wildcard() {
    let dispatcher: Dispatcher<InboundEvent> = Dispatcher::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = Arc::clone(&seen);
    let _pong = dispatcher.subscribe(Topic::Kind(EventKind::Pong), move |_| {
        s.lock().push("pong");
    });
    let s = Arc::clone(&seen);
    let _chunk = dispatcher.subscribe(Topic::Kind(EventKind::StreamChunk), move |_| {
        s.lock().push("chunk");
    });
    let s = Arc::clone(&seen);
    let _all = dispatcher.subscribe_all(move |_| {
        s.lock().push("all");
    });

    assert_eq!(dispatcher.publish(&pong()), 2);
    assert_eq!(*seen.lock(), vec!["pong", "all"]);
}

#[test]
fn test_panicking_listener_does_not_block_siblings() {
    let dispatcher: Dispatcher<InboundEvent> = Dispatcher::new();
    let count = Arc::new(Mutex::new(0));

    let _bad = dispatcher.subscribe(Topic::Kind(EventKind::Pong), |_| {
        panic!("listener failure");
    });
    let c = Arc::clone(&count);
    let _good = dispatcher.subscribe(Topic::Kind(EventKind::Pong), move |_| {
        *c.lock() += 1;
    });
    let c = Arc::clone(&count);
    let _wildcard = dispatcher.subscribe_all(move |_| {
        *c.lock() += 10;
    });

    let delivered = dispatcher.publish(&pong());
    assert_eq!(delivered, 2);
    assert_eq!(*count.lock(), 11);
}

#[test]
fn test_unsubscribe_removes_exactly_one_listener() {
    let dispatcher: Dispatcher<InboundEvent> = Dispatcher::new();
    let topic = Topic::Kind(EventKind::Pong);

    let first = dispatcher.subscribe(topic, |_| {});
    let second = dispatcher.subscribe(topic, |_| {});
    assert_eq!(dispatcher.listener_count(topic), 2);

    assert!(first.unsubscribe());
    assert_eq!(dispatcher.listener_count(topic), 1);

    // Idempotent
    assert!(!first.unsubscribe());
    assert_eq!(dispatcher.listener_count(topic), 1);

    assert!(second.unsubscribe());
    assert_eq!(dispatcher.listener_count(topic), 0);
    assert_eq!(dispatcher.topic_count(), 0);
}

#[test]
fn test_delivery_order_matches_publish_order() {
    let dispatcher: Dispatcher<InboundEvent> = Dispatcher::new();
    let seen = Arc::new(Mutex::new(String::new()));

    let s = Arc::clone(&seen);
    let _sub = dispatcher.subscribe(Topic::Kind(EventKind::StreamChunk), move |event| {
        if let InboundEvent::StreamChunk { content, .. } = event {
            s.lock().push_str(content);
        }
    });

    for part in ["a", "b", "c", "d"] {
        dispatcher.publish(&chunk(part));
    }
    assert_eq!(*seen.lock(), "abcd");
}

#[test]
fn test_listener_may_unsubscribe_while_publishing() {
    let dispatcher: Dispatcher<InboundEvent> = Dispatcher::new();
    let slot: Arc<Mutex<Option<Subscription<InboundEvent>>>> = Arc::new(Mutex::new(None));
    let count = Arc::new(Mutex::new(0));

    let s = Arc::clone(&slot);
    let c = Arc::clone(&count);
    let subscription = dispatcher.subscribe(Topic::Kind(EventKind::Pong), move |_| {
        *c.lock() += 1;
        if let Some(subscription) = s.lock().take() {
            subscription.unsubscribe();
        }
    });
    *slot.lock() = Some(subscription);

    dispatcher.publish(&pong());
    dispatcher.publish(&pong());
    assert_eq!(*count.lock(), 1);
    assert_eq!(dispatcher.topic_count(), 0);
}

#[test]
fn test_unsubscribe_after_dispatcher_dropped() {
    let dispatcher: Dispatcher<InboundEvent> = Dispatcher::new();
    let subscription = dispatcher.subscribe_all(|_| {});
    drop(dispatcher);
    assert!(!subscription.unsubscribe());
}
