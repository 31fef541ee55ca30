//! Integration tests for `RequestPipeline`
//!
//! Tests bearer injection, single-flight renewal on `401` and the terminal
//! second rejection

use std::sync::Arc;
use std::time::Duration;

use httpmock::MockServer;
use serde_json::json;

use assistant_link::auth::{
    AuthStatus, CredentialStore, Credentials, MemoryCredentialStore, RequestPipeline,
    SessionManager,
};
use assistant_link::error::LinkError;
use assistant_link::types::AuthEndpoints;

struct Fixture {
    store: Arc<MemoryCredentialStore>,
    session: Arc<SessionManager>,
    pipeline: Arc<RequestPipeline>,
}

fn fixture(server: &MockServer, refresh_token: Option<&str>) -> Fixture {
    let client = reqwest::Client::new();
    let store = Arc::new(MemoryCredentialStore::new());
    let session = Arc::new(SessionManager::new(
        client.clone(),
        server.base_url(),
        AuthEndpoints::default(),
        Some(Duration::from_secs(5)),
        Arc::clone(&store) as Arc<dyn CredentialStore>,
    ));
    session.set_credentials(Credentials {
        access_token: "old".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        user: None,
    });
    let pipeline = Arc::new(RequestPipeline::new(
        client,
        server.base_url(),
        Arc::clone(&session),
        Some(Duration::from_secs(5)),
    ));
    Fixture {
        store,
        session,
        pipeline,
    }
}

#[tokio::test]
async fn test_attaches_bearer_token() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/items")
                .header("authorization", "Bearer old");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"items": [1, 2, 3]}));
        })
        .await;

    let f = fixture(&server, Some("r1"));
    let body: serde_json::Value = f.pipeline.get_json("/items").await.unwrap();
    assert_eq!(body, json!({"items": [1, 2, 3]}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start_async().await;
    let rejected = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/items")
                .header("authorization", "Bearer old");
            then.status(401);
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/refresh")
                .json_body(json!({"refresh_token": "r1"}));
            then.status(200)
                .delay(Duration::from_millis(300))
                .header("content-type", "application/json")
                .json_body(json!({"access_token": "new", "refresh_token": "r2"}));
        })
        .await;
    let accepted = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/items")
                .header("authorization", "Bearer new");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"ok": true}));
        })
        .await;

    let f = fixture(&server, Some("r1"));
    let calls: Vec<_> = (0..5)
        .map(|_| {
            let pipeline = Arc::clone(&f.pipeline);
            tokio::spawn(async move { pipeline.get_json::<serde_json::Value>("/items").await })
        })
        .collect();

    for call in calls {
        assert_eq!(call.await.unwrap().unwrap(), json!({"ok": true}));
    }

    refresh.assert_hits_async(1).await;
    rejected.assert_hits_async(5).await;
    accepted.assert_hits_async(5).await;

    assert_eq!(f.session.access_token().as_deref(), Some("new"));
    assert!(!f.session.is_refreshing());
    let stored = f.store.load().unwrap();
    assert_eq!(stored.access_token, "new");
    assert_eq!(stored.refresh_token.as_deref(), Some("r2"));
}

#[tokio::test]
async fn test_second_401_is_unauthorized() {
    let server = MockServer::start_async().await;
    let items = server
        .mock_async(|when, then| {
            when.method("GET").path("/items");
            then.status(401);
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method("POST").path("/refresh");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"access_token": "new"}));
        })
        .await;

    let f = fixture(&server, Some("r1"));
    let result = f.pipeline.get_json::<serde_json::Value>("/items").await;

    assert!(matches!(result, Err(LinkError::Unauthorized)));
    items.assert_hits_async(2).await;
    refresh.assert_hits_async(1).await;
    assert!(!f.session.is_authenticated());
    assert!(matches!(f.session.status(), AuthStatus::Invalidated(_)));
    assert!(f.store.load().is_none());
}

#[tokio::test]
async fn test_missing_refresh_token_expires_session() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/items");
            then.status(401);
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method("POST").path("/refresh");
            then.status(200);
        })
        .await;

    let f = fixture(&server, None);
    let result = f.pipeline.get_json::<serde_json::Value>("/items").await;

    assert!(matches!(result, Err(LinkError::SessionExpired(_))));
    refresh.assert_hits_async(0).await;
    assert!(matches!(f.session.status(), AuthStatus::Invalidated(_)));
    assert_eq!(f.session.access_token(), None);
}

#[tokio::test]
async fn test_failed_refresh_fails_every_waiter() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/items");
            then.status(401);
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method("POST").path("/refresh");
            then.status(401)
                .delay(Duration::from_millis(300))
                .body("refresh token revoked");
        })
        .await;

    let f = fixture(&server, Some("r1"));
    let calls: Vec<_> = (0..3)
        .map(|_| {
            let pipeline = Arc::clone(&f.pipeline);
            tokio::spawn(async move { pipeline.get_json::<serde_json::Value>("/items").await })
        })
        .collect();

    for call in calls {
        let result = call.await.unwrap();
        assert!(
            matches!(result, Err(LinkError::SessionExpired(_))),
            "{result:?}"
        );
    }
    refresh.assert_hits_async(1).await;
    assert!(!f.session.is_refreshing());
    assert!(f.store.load().is_none());
}

#[tokio::test]
async fn test_other_error_statuses_pass_through() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/items");
            then.status(500).body("database unavailable");
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method("POST").path("/refresh");
            then.status(200);
        })
        .await;

    let f = fixture(&server, Some("r1"));
    let result = f.pipeline.get_json::<serde_json::Value>("/items").await;

    match result {
        Err(LinkError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "database unavailable");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    refresh.assert_hits_async(0).await;
    assert!(f.session.is_authenticated());
}

#[tokio::test]
async fn test_post_json_is_replayed_after_renewal() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/conversations")
                .header("authorization", "Bearer old");
            then.status(401);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/refresh");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"access_token": "new"}));
        })
        .await;
    let created = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/conversations")
                .header("authorization", "Bearer new")
                .json_body(json!({"title": "Trip"}));
            then.status(201)
                .header("content-type", "application/json")
                .json_body(json!({"id": "conv-1"}));
        })
        .await;

    let f = fixture(&server, Some("r1"));
    let reply: serde_json::Value = f
        .pipeline
        .post_json("/conversations", &json!({"title": "Trip"}))
        .await
        .unwrap();

    assert_eq!(reply, json!({"id": "conv-1"}));
    created.assert_async().await;
    // The refresh token is kept when the server does not rotate it
    assert_eq!(
        f.session.credentials().unwrap().refresh_token.as_deref(),
        Some("r1")
    );
}
