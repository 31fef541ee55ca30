//! Unit tests for `StreamCoordinator`
//!
//! Tests assembly of streamed responses, stream correlation and callbacks

use std::sync::Arc;

use parking_lot::Mutex;

use assistant_link::stream::{
    StreamCoordinator, StreamEvent, StreamHandlers, StreamOutcome, StreamPhase,
};
use assistant_link::types::{InboundEvent, Role, StreamId};

fn start(id: &str) -> StreamEvent {
    StreamEvent::Start {
        stream_id: StreamId::new(id),
        model: Some("gpt-4".to_string()),
        provider: Some("openai".to_string()),
    }
}

fn chunk(id: &str, content: &str) -> StreamEvent {
    StreamEvent::Chunk {
        stream_id: StreamId::new(id),
        content: content.to_string(),
    }
}

fn end(id: &str) -> StreamEvent {
    StreamEvent::End {
        stream_id: StreamId::new(id),
    }
}

fn error(id: Option<&str>, message: &str) -> StreamEvent {
    StreamEvent::Error {
        stream_id: id.map(StreamId::new),
        error: message.to_string(),
    }
}

/// Handlers that record every callback as a string
fn recording() -> (StreamHandlers, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (l1, l2, l3, l4) = (
        Arc::clone(&log),
        Arc::clone(&log),
        Arc::clone(&log),
        Arc::clone(&log),
    );
    let handlers = StreamHandlers::new()
        .on_start(move |m| l1.lock().push(format!("start:{}", m.content)))
        .on_update(move |m, delta| l2.lock().push(format!("update:{}:{delta}", m.content)))
        .on_complete(move |m| l3.lock().push(format!("complete:{}", m.content)))
        .on_error(move |f| l4.lock().push(format!("error:{}", f.error)));
    (handlers, log)
}

#[test]
fn test_hello_conversation() {
    let (handlers, log) = recording();
    let coordinator = StreamCoordinator::new(handlers);

    coordinator.push_user_message("Hello");
    assert_eq!(coordinator.apply(start("s1")), StreamOutcome::Started);
    assert!(coordinator.is_streaming());
    assert_eq!(coordinator.apply(chunk("s1", "Hi ")), StreamOutcome::Appended);
    assert_eq!(coordinator.apply(chunk("s1", "there")), StreamOutcome::Appended);

    let partial = coordinator.last_message().unwrap();
    assert_eq!(partial.content, "Hi there");
    assert!(partial.is_streaming);

    assert_eq!(coordinator.apply(end("s1")), StreamOutcome::Completed);
    assert_eq!(coordinator.phase(), StreamPhase::Idle);

    let messages = coordinator.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "Hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Hi there");
    assert!(!messages[1].is_streaming);
    assert_eq!(messages[1].error(), None);

    let metadata = messages[1].metadata.as_ref().unwrap();
    assert_eq!(metadata.model.as_deref(), Some("gpt-4"));
    assert_eq!(metadata.stream_id, Some(StreamId::new("s1")));

    assert_eq!(
        *log.lock(),
        vec![
            "start:".to_string(),
            "update:Hi :Hi ".to_string(),
            "update:Hi there:there".to_string(),
            "complete:Hi there".to_string(),
        ]
    );
}

#[test]
fn test_chunks_for_other_streams_are_discarded() {
    let coordinator = StreamCoordinator::new(StreamHandlers::new());

    assert_eq!(coordinator.apply(chunk("s1", "early")), StreamOutcome::Discarded);
    coordinator.apply(start("s1"));
    assert_eq!(coordinator.apply(chunk("s2", "stray")), StreamOutcome::Discarded);
    assert_eq!(coordinator.apply(end("s2")), StreamOutcome::Discarded);
    assert_eq!(coordinator.apply(chunk("s1", "kept")), StreamOutcome::Appended);

    assert!(coordinator.is_streaming());
    assert_eq!(coordinator.last_message().unwrap().content, "kept");
}

#[test]
fn test_at_most_one_active_stream() {
    let coordinator = StreamCoordinator::new(StreamHandlers::new());

    assert_eq!(coordinator.apply(start("s1")), StreamOutcome::Started);
    assert_eq!(coordinator.apply(start("s2")), StreamOutcome::Discarded);
    assert_eq!(
        coordinator.active_stream().unwrap().stream_id,
        StreamId::new("s1")
    );
    assert_eq!(coordinator.messages().len(), 1);

    coordinator.apply(end("s1"));
    assert_eq!(coordinator.apply(start("s2")), StreamOutcome::Started);
    assert_eq!(coordinator.messages().len(), 2);
}

#[test]
fn test_error_finalizes_partial_message() {
    let (handlers, log) = recording();
    let coordinator = StreamCoordinator::new(handlers);

    coordinator.apply(start("s1"));
    coordinator.apply(chunk("s1", "Half"));
    assert_eq!(
        coordinator.apply(error(Some("s1"), "model overloaded")),
        StreamOutcome::Failed
    );

    let message = coordinator.last_message().unwrap();
    assert_eq!(message.content, "Half");
    assert!(!message.is_streaming);
    assert_eq!(message.error(), Some("model overloaded"));
    assert!(!coordinator.is_streaming());
    assert_eq!(log.lock().last().unwrap(), "error:model overloaded");
}

#[test]
fn test_error_without_id_applies_to_active_stream() {
    let coordinator = StreamCoordinator::new(StreamHandlers::new());

    coordinator.apply(start("s1"));
    assert_eq!(coordinator.apply(error(None, "boom")), StreamOutcome::Failed);
    assert!(!coordinator.is_streaming());
}

#[test]
fn test_error_for_other_stream_is_discarded() {
    let coordinator = StreamCoordinator::new(StreamHandlers::new());

    coordinator.apply(start("s1"));
    assert_eq!(
        coordinator.apply(error(Some("s9"), "not mine")),
        StreamOutcome::Discarded
    );
    assert!(coordinator.is_streaming());
}

#[test]
fn test_error_while_idle_reports_without_message() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::clone(&failures);
    let coordinator = StreamCoordinator::new(
        StreamHandlers::new().on_error(move |failure| f.lock().push(failure.clone())),
    );

    assert_eq!(coordinator.apply(error(None, "orphan")), StreamOutcome::Failed);
    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].message, None);
    assert_eq!(failures[0].error, "orphan");
    assert!(coordinator.messages().is_empty());
}

#[test]
fn test_abort_fails_active_stream() {
    let coordinator = StreamCoordinator::new(StreamHandlers::new());

    assert!(!coordinator.abort("nothing to abort"));
    coordinator.apply(start("s1"));
    coordinator.apply(chunk("s1", "partial"));
    assert!(coordinator.abort("connection lost"));

    let message = coordinator.last_message().unwrap();
    assert_eq!(message.error(), Some("connection lost"));
    assert_eq!(coordinator.apply(chunk("s1", "late")), StreamOutcome::Discarded);
    assert_eq!(coordinator.last_message().unwrap().content, "partial");
}

#[test]
fn test_callbacks_may_reenter_coordinator() {
    let slot: Arc<Mutex<Option<StreamCoordinator>>> = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (s, v) = (Arc::clone(&slot), Arc::clone(&seen));
    let coordinator = StreamCoordinator::new(StreamHandlers::new().on_update(move |_, _| {
        if let Some(c) = s.lock().as_ref() {
            v.lock().push(c.messages().len());
        }
    }));
    *slot.lock() = Some(coordinator.clone());

    coordinator.apply(start("s1"));
    coordinator.apply(chunk("s1", "x"));
    assert_eq!(*seen.lock(), vec![1]);
}

#[test]
fn test_apply_inbound_ignores_non_stream_events() {
    let coordinator = StreamCoordinator::new(StreamHandlers::new());

    assert_eq!(
        coordinator.apply_inbound(&InboundEvent::Pong { timestamp: None }),
        None
    );
    let start = InboundEvent::StreamStart {
        stream_id: StreamId::new("s1"),
        model: None,
        provider: None,
        timestamp: None,
    };
    assert_eq!(coordinator.apply_inbound(&start), Some(StreamOutcome::Started));
}

#[test]
fn test_reset_clears_history() {
    let coordinator = StreamCoordinator::new(StreamHandlers::new());

    coordinator.push_user_message("Hello");
    coordinator.apply(start("s1"));
    coordinator.reset();

    assert!(coordinator.messages().is_empty());
    assert!(!coordinator.is_streaming());
}
