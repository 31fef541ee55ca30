//! Integration tests for `HttpChat`
//!
//! Streams chat replies from an `httpmock` server through the request pipeline

use std::sync::Arc;
use std::time::Duration;

use httpmock::MockServer;
use parking_lot::Mutex;

use assistant_link::auth::{Credentials, MemoryCredentialStore, RequestPipeline, SessionManager};
use assistant_link::error::LinkError;
use assistant_link::stream::{CANCELLED, HttpChat, StreamHandlers, StreamOutcome};
use assistant_link::transport::HttpStreamTransport;
use assistant_link::types::AuthEndpoints;

const CHAT_PATH: &str = "/api/v1/chat/stream";

fn chat(server: &MockServer, handlers: StreamHandlers) -> HttpChat {
    let client = reqwest::Client::new();
    let store = Arc::new(MemoryCredentialStore::new());
    let session = Arc::new(SessionManager::new(
        client.clone(),
        server.base_url(),
        AuthEndpoints::default(),
        Some(Duration::from_secs(5)),
        store,
    ));
    session.set_credentials(Credentials {
        access_token: "t1".to_string(),
        refresh_token: Some("r1".to_string()),
        user: None,
    });
    let pipeline = Arc::new(RequestPipeline::new(
        client,
        server.base_url(),
        session,
        Some(Duration::from_secs(5)),
    ));
    let transport = HttpStreamTransport::new(pipeline, CHAT_PATH, 64 * 1024);
    HttpChat::new(transport, "u1", Duration::from_secs(5), handlers)
}

fn sse(lines: &[&str]) -> String {
    lines.iter().map(|l| format!("{l}\n\n")).collect()
}

#[tokio::test]
async fn test_streams_reply_into_history() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST")
                .path(CHAT_PATH)
                .header("authorization", "Bearer t1")
                .body_contains("\"user_id\":\"u1\"")
                .body_contains("\"message\":\"Hello\"");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse(&[
                    r#"data: {"type":"token","content":"Hi "}"#,
                    r#"data: {"type":"token","content":"there"}"#,
                    "data: [DONE]",
                ]));
        })
        .await;

    let deltas = Arc::new(Mutex::new(Vec::new()));
    let d = Arc::clone(&deltas);
    let chat = chat(
        &server,
        StreamHandlers::new().on_update(move |_, delta| d.lock().push(delta.to_string())),
    );

    let task = chat.send_message("Hello", None).unwrap();
    assert_eq!(task.wait().await, StreamOutcome::Completed);
    mock.assert_async().await;

    let messages = chat.coordinator().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "Hello");
    assert_eq!(messages[1].content, "Hi there");
    assert!(!messages[1].is_streaming);
    assert_eq!(*deltas.lock(), vec!["Hi ".to_string(), "there".to_string()]);
}

#[tokio::test]
async fn test_complete_payload_ends_stream() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path(CHAT_PATH);
            then.status(200).body(sse(&[
                r#"data: {"type":"token","content":"ok"}"#,
                r#"data: {"type":"complete"}"#,
                r#"data: {"type":"token","content":"ignored"}"#,
            ]));
        })
        .await;

    let chat = chat(&server, StreamHandlers::new());
    let task = chat.send_message("ping", None).unwrap();
    assert_eq!(task.wait().await, StreamOutcome::Completed);
    assert_eq!(chat.coordinator().last_message().unwrap().content, "ok");
}

#[tokio::test]
async fn test_error_payload_fails_stream() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path(CHAT_PATH);
            then.status(200).body(sse(&[
                r#"data: {"type":"token","content":"par"}"#,
                r#"data: {"type":"error","message":"model overloaded"}"#,
            ]));
        })
        .await;

    let errors = Arc::new(Mutex::new(Vec::new()));
    let e = Arc::clone(&errors);
    let chat = chat(
        &server,
        StreamHandlers::new().on_error(move |f| e.lock().push(f.error.clone())),
    );

    let task = chat.send_message("Hello", None).unwrap();
    assert_eq!(task.wait().await, StreamOutcome::Failed);

    let reply = chat.coordinator().last_message().unwrap();
    assert_eq!(reply.content, "par");
    assert_eq!(reply.error(), Some("model overloaded"));
    assert_eq!(*errors.lock(), vec!["model overloaded".to_string()]);
}

#[tokio::test]
async fn test_body_ending_without_terminator_is_an_abort() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path(CHAT_PATH);
            then.status(200)
                .body(sse(&[r#"data: {"type":"token","content":"cut"}"#]));
        })
        .await;

    let chat = chat(&server, StreamHandlers::new());
    let task = chat.send_message("Hello", None).unwrap();
    assert_eq!(task.wait().await, StreamOutcome::Failed);

    let reply = chat.coordinator().last_message().unwrap();
    assert_eq!(reply.content, "cut");
    let error = reply.error().unwrap();
    assert!(error.contains("closed before completion"), "{error}");
}

#[tokio::test]
async fn test_server_error_status_fails_stream() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path(CHAT_PATH);
            then.status(503).body("maintenance");
        })
        .await;

    let chat = chat(&server, StreamHandlers::new());
    let task = chat.send_message("Hello", None).unwrap();
    assert_eq!(task.wait().await, StreamOutcome::Failed);

    let error = chat
        .coordinator()
        .last_message()
        .unwrap()
        .error()
        .unwrap()
        .to_string();
    assert!(error.contains("503"), "{error}");
    assert!(!chat.coordinator().is_streaming());
}

#[tokio::test]
async fn test_cancel_abandons_pending_reply() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path(CHAT_PATH);
            then.status(200)
                .delay(Duration::from_secs(10))
                .body(sse(&["data: [DONE]"]));
        })
        .await;

    let chat = chat(&server, StreamHandlers::new());
    let task = chat.send_message("Hello", None).unwrap();
    task.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), task.wait())
        .await
        .unwrap();
    assert_eq!(outcome, StreamOutcome::Failed);
    assert_eq!(
        chat.coordinator().last_message().unwrap().error(),
        Some(CANCELLED)
    );
}

#[tokio::test]
async fn test_second_message_while_streaming_is_busy() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path(CHAT_PATH);
            then.status(200)
                .delay(Duration::from_secs(10))
                .body(sse(&["data: [DONE]"]));
        })
        .await;

    let errors = Arc::new(Mutex::new(0));
    let e = Arc::clone(&errors);
    let chat = chat(&server, StreamHandlers::new().on_error(move |_| *e.lock() += 1));

    let first = chat.send_message("one", None).unwrap();
    let second = chat.send_message("two", None);
    assert!(matches!(second, Err(LinkError::StreamBusy)));
    assert_eq!(*errors.lock(), 1);

    // Both user messages are kept
    let users: Vec<String> = chat
        .coordinator()
        .messages()
        .into_iter()
        .filter(|m| m.role == assistant_link::types::Role::User)
        .map(|m| m.content)
        .collect();
    assert_eq!(users, vec!["one".to_string(), "two".to_string()]);

    first.cancel();
    first.wait().await;
    assert!(chat.send_message("three", None).is_ok());
}

#[tokio::test]
async fn test_expired_token_is_renewed_before_streaming() {
    let server = MockServer::start_async().await;
    let rejected = server
        .mock_async(|when, then| {
            when.method("POST")
                .path(CHAT_PATH)
                .header("authorization", "Bearer t1");
            then.status(401);
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method("POST").path("/refresh").body_contains("r1");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"t2"}"#);
        })
        .await;
    let accepted = server
        .mock_async(|when, then| {
            when.method("POST")
                .path(CHAT_PATH)
                .header("authorization", "Bearer t2");
            then.status(200).body(sse(&[
                r#"data: {"type":"token","content":"fresh"}"#,
                "data: [DONE]",
            ]));
        })
        .await;

    let chat = chat(&server, StreamHandlers::new());
    let task = chat.send_message("Hello", None).unwrap();
    assert_eq!(task.wait().await, StreamOutcome::Completed);

    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;
    assert_eq!(chat.coordinator().last_message().unwrap().content, "fresh");
}
