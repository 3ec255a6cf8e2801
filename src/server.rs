//! WebSocket front end
//!
//! Each text frame carries one JSON request; each request gets exactly one text frame back.
//! Requests on one connection are handled concurrently, so responses may come back out of
//! order and callers match them up by `id`.

use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::service::InspectorService;
use crate::Result;

/// Outgoing frames buffered per connection
const OUTBOUND_BUFFER: usize = 64;

pub struct InspectorServer {
    listener: TcpListener,
    service: InspectorService,
}

impl InspectorServer {
    pub async fn bind(addr: SocketAddr, service: InspectorService) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, service })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` completes
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let connection = Uuid::new_v4();
                            debug!("Connection {} from {}", connection, peer);
                            let span = info_span!("connection", id = %connection);
                            tokio::spawn(handle_connection(stream, peer, self.service.clone()).instrument(span));
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, service: InspectorService) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };
    let (mut sink, mut source) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("Write to {} failed: {}", peer, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let service = service.clone();
                let tx = tx.clone();
                tokio::spawn(
                    async move {
                        let response = service.handle_text(&text).await;
                        if tx.send(response).await.is_err() {
                            debug!("Connection closed before the response was written");
                        }
                    }
                    .in_current_span(),
                );
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Read from {} failed: {}", peer, e);
                break;
            }
        }
    }

    // The writer drains once every in-flight request has dropped its sender
    drop(tx);
    let _ = writer.await;
    debug!("Connection from {} closed", peer);
}
