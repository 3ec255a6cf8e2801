//! Common test utilities
//!
//! Builds the whole stack (mock Chrome, debugger, session manager, WebSocket server) and
//! talks to it the way a client would.

#![allow(dead_code)]

use ax_oxide::{
    cache::CacheConfig,
    cdp::{CdpDebugger, CdpWebSocketConnection},
    server::InspectorServer,
    service::InspectorService,
    session::{SessionConfig, SessionManager},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::mock_chrome::MockChromeServer;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running stack; dropping it stops the server and the mock browser
pub struct TestStack {
    pub chrome: MockChromeServer,
    pub manager: Arc<SessionManager>,
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Drop for TestStack {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Start mock Chrome and an inspector server on an ephemeral port
pub async fn start_stack() -> Result<TestStack, Box<dyn std::error::Error>> {
    let chrome = MockChromeServer::start().await?;
    let connection = CdpWebSocketConnection::new(chrome.ws_endpoint()).await?;
    let debugger = CdpDebugger::with_connection(connection).await?;
    let manager = SessionManager::new(
        debugger.clone(),
        debugger,
        SessionConfig::default(),
        &CacheConfig::default(),
    );

    let server = InspectorServer::bind(
        "127.0.0.1:0".parse()?,
        InspectorService::new(Arc::clone(&manager)),
    )
    .await?;
    let addr = server.local_addr()?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(server.run(async {
        shutdown_rx.await.ok();
    }));

    Ok(TestStack {
        chrome,
        manager,
        addr,
        shutdown_tx: Some(shutdown_tx),
    })
}

pub async fn connect(addr: SocketAddr) -> Result<Client, Box<dyn std::error::Error>> {
    let (client, _) = connect_async(format!("ws://{}", addr)).await?;
    Ok(client)
}

/// Send one request and wait for the next response frame
pub async fn request(client: &mut Client, request: Value) -> Result<Value, Box<dyn std::error::Error>> {
    client.send(Message::Text(request.to_string())).await?;
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await?
            .ok_or("connection closed")??;
        if let Message::Text(text) = message {
            return Ok(serde_json::from_str(&text)?);
        }
    }
}

/// Poll `condition` until it holds or a second passes
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
