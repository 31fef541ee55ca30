//! Shared test utilities
//!
//! `MockConnector` opens in-memory sockets and hands the server end of each
//! one to the test.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use assistant_link::error::{LinkError, Result};
use assistant_link::transport::{CloseInfo, Connector, OutboundFrame, SocketChannel, SocketEvent};

/// Server end of one in-memory socket
pub struct ServerSide {
    /// Frames written by the client
    pub from_client: mpsc::UnboundedReceiver<OutboundFrame>,
    /// Events delivered to the client
    pub to_client: mpsc::UnboundedSender<SocketEvent>,
}

impl ServerSide {
    /// Send a JSON frame to the client
    pub fn send_json(&self, value: serde_json::Value) {
        let _ = self.to_client.send(SocketEvent::Text(value.to_string()));
    }

    /// Send a raw text frame to the client
    pub fn send_text(&self, text: &str) {
        let _ = self.to_client.send(SocketEvent::Text(text.to_string()));
    }

    /// Close the socket with `code`
    pub fn close(&self, code: u16) {
        let _ = self
            .to_client
            .send(SocketEvent::Closed(CloseInfo::new(code, "test close")));
    }

    /// Next frame written by the client, with a timeout
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        tokio::time::timeout(Duration::from_secs(120), self.from_client.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next text frame written by the client, parsed as JSON
    pub async fn next_json(&mut self) -> Option<serde_json::Value> {
        loop {
            match self.next_frame().await? {
                OutboundFrame::Text(text) => return serde_json::from_str(&text).ok(),
                OutboundFrame::Close => return None,
            }
        }
    }
}

struct MockState {
    attempts: usize,
    fail_remaining: usize,
    urls: Vec<String>,
}

/// Connector producing in-memory sockets
#[derive(Clone)]
pub struct MockConnector {
    servers: mpsc::UnboundedSender<ServerSide>,
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Create a connector and the receiver of server ends
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerSide>) {
        let (servers, rx) = mpsc::unbounded_channel();
        (
            Self {
                servers,
                state: Arc::new(Mutex::new(MockState {
                    attempts: 0,
                    fail_remaining: 0,
                    urls: Vec::new(),
                })),
            },
            rx,
        )
    }

    /// Refuse the next `n` connection attempts
    pub fn fail_next(&self, n: usize) {
        self.state.lock().fail_remaining = n;
    }

    /// Number of connection attempts so far
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// URLs of every connection attempt
    pub fn urls(&self) -> Vec<String> {
        self.state.lock().urls.clone()
    }
}

impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<SocketChannel> {
        {
            let mut state = self.state.lock();
            state.attempts += 1;
            state.urls.push(url.to_string());
            if state.fail_remaining > 0 {
                state.fail_remaining -= 1;
                return Err(LinkError::connection("connection refused"));
            }
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let _ = self.servers.send(ServerSide {
            from_client,
            to_client,
        });
        Ok(SocketChannel { outbound, inbound })
    }
}

/// Wait for the next server end, with a timeout
pub async fn next_server(servers: &mut mpsc::UnboundedReceiver<ServerSide>) -> ServerSide {
    match tokio::time::timeout(Duration::from_secs(120), servers.recv()).await {
        Ok(Some(server)) => server,
        _ => panic!("no connection attempt reached the server"),
    }
}

/// Initialise logging for tests
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
