//! Browser-level CDP debugger
//!
//! One WebSocket connection to the browser endpoint; each inspected target gets its own
//! flattened session (`Target.attachToTarget` with `flatten: true`), and commands are
//! routed by session id.

use super::connection::CdpWebSocketConnection;
use super::traits::*;
use super::types::GetFrameTreeResponse;
use crate::error::SessionFault;
use crate::types::{FrameHandle, ResourceId};
use crate::Error;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Target information (page, iframe, worker, ...)
#[derive(Debug, Clone)]
pub struct TargetInfo {
    /// Target ID
    pub target_id: String,
    /// Target type
    pub target_type: String,
    /// Target title
    pub title: String,
    /// Target URL
    pub url: String,
}

fn http_endpoint(endpoint: &str) -> String {
    endpoint
        .trim_end_matches('/')
        .replace("ws://", "http://")
        .replace("wss://", "https://")
}

/// Resolve the browser WebSocket URL for an endpoint.
///
/// A `ws://.../devtools/browser/...` URL is used as is; anything else is treated as the
/// remote debugging HTTP endpoint and asked for `/json/version`.
pub async fn discover_browser_url(endpoint: &str) -> Result<String, Error> {
    if endpoint.contains("/devtools/") {
        return Ok(endpoint.to_string());
    }

    let url = format!("{}/json/version", http_endpoint(endpoint));
    debug!("Fetching browser version from {}", url);

    let version: Value = reqwest::get(&url)
        .await
        .map_err(|e| Error::internal(format!("Failed to connect to browser: {}", e)))?
        .json()
        .await
        .map_err(|e| Error::internal(format!("Failed to parse browser version: {}", e)))?;

    version
        .get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::configuration(format!("No webSocketDebuggerUrl at {}", url)))
}

/// List page targets from the HTTP endpoint
pub async fn list_targets(endpoint: &str) -> Result<Vec<TargetInfo>, Error> {
    let url = format!("{}/json", http_endpoint(endpoint));
    debug!("Fetching targets from {}", url);

    let targets_json: Vec<Value> = reqwest::get(&url)
        .await
        .map_err(|e| Error::internal(format!("Failed to fetch targets: {}", e)))?
        .json()
        .await
        .map_err(|e| Error::internal(format!("Failed to parse targets: {}", e)))?;

    let mut targets = Vec::new();
    for target_json in targets_json {
        if let (Some(target_id), Some(target_type), Some(url)) = (
            target_json.get("id").and_then(|v| v.as_str()),
            target_json.get("type").and_then(|v| v.as_str()),
            target_json.get("url").and_then(|v| v.as_str()),
        ) {
            targets.push(TargetInfo {
                target_id: target_id.to_string(),
                target_type: target_type.to_string(),
                title: target_json
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                url: url.to_string(),
            });
        }
    }

    Ok(targets)
}

type SessionMap = Arc<Mutex<HashMap<ResourceId, String>>>;

fn lock_error<T>(e: std::sync::PoisonError<T>) -> Error {
    Error::internal(format!("Lock error: {}", e))
}

/// CDP-backed [`Debugger`]
#[derive(Debug)]
pub struct CdpDebugger {
    connection: Arc<dyn CdpConnection>,
    /// resource -> flattened session id
    sessions: SessionMap,
    detach_tx: broadcast::Sender<DetachEvent>,
}

impl CdpDebugger {
    /// Connect to a browser endpoint (HTTP or WebSocket form)
    pub async fn connect(endpoint: &str) -> Result<Arc<Self>, Error> {
        let browser_url = discover_browser_url(endpoint).await?;
        info!("Connecting debugger to {}", browser_url);
        let connection = CdpWebSocketConnection::new(browser_url).await?;
        Self::with_connection(connection).await
    }

    /// Wrap an existing browser-level connection
    pub async fn with_connection(connection: Arc<dyn CdpConnection>) -> Result<Arc<Self>, Error> {
        let (detach_tx, _) = broadcast::channel(64);
        let debugger = Arc::new(Self {
            connection,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            detach_tx,
        });

        let events = debugger.connection.listen_events().await?;
        tokio::spawn(Self::event_pump(
            events,
            Arc::clone(&debugger.sessions),
            debugger.detach_tx.clone(),
        ));

        // Target.targetDestroyed is only delivered while discovery is on
        if let Err(e) = debugger
            .connection
            .send_command("Target.setDiscoverTargets", json!({ "discover": true }), None)
            .await
        {
            warn!("Target discovery unavailable, closed tabs surface on next use: {}", e);
        }

        Ok(debugger)
    }

    /// Translate target lifecycle events into [`DetachEvent`]s
    async fn event_pump(
        mut events: tokio::sync::mpsc::Receiver<CdpEvent>,
        sessions: SessionMap,
        detach_tx: broadcast::Sender<DetachEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let detached = match event.method.as_str() {
                "Target.detachedFromTarget" => {
                    let session_id = event.params.get("sessionId").and_then(|v| v.as_str());
                    let reason = event
                        .params
                        .get("reason")
                        .and_then(|v| v.as_str())
                        .unwrap_or("detached")
                        .to_string();
                    session_id.and_then(|sid| {
                        let mut sessions = sessions.lock().ok()?;
                        let resource = sessions
                            .iter()
                            .find(|(_, s)| s.as_str() == sid)
                            .map(|(r, _)| r.clone())?;
                        sessions.remove(&resource);
                        Some((resource, DetachReason::TargetDetached(reason)))
                    })
                }
                "Target.targetDestroyed" => {
                    let target = event.params.get("targetId").and_then(|v| v.as_str());
                    target
                        .and_then(|t| ResourceId::parse(t).ok())
                        .and_then(|resource| {
                            let mut sessions = sessions.lock().ok()?;
                            sessions.remove(&resource)?;
                            Some((resource, DetachReason::TargetDestroyed))
                        })
                }
                _ => None,
            };

            if let Some((resource, reason)) = detached {
                info!("Session for {} closed by browser: {:?}", resource, reason);
                let _ = detach_tx.send(DetachEvent { resource, reason });
            }
        }

        warn!("Browser connection lost, dropping all sessions");
        let orphaned: Vec<ResourceId> = match sessions.lock() {
            Ok(mut sessions) => sessions.drain().map(|(resource, _)| resource).collect(),
            Err(_) => Vec::new(),
        };
        for resource in orphaned {
            let _ = detach_tx.send(DetachEvent {
                resource,
                reason: DetachReason::ConnectionLost,
            });
        }
    }

    /// Whether the browser connection is still up
    pub fn is_connected(&self) -> bool {
        self.connection.is_active()
    }

    /// Close the browser connection; open sessions end with it
    pub async fn close(&self) -> Result<(), Error> {
        self.connection.close().await
    }

    fn session_id(&self, resource: &ResourceId) -> Result<Option<String>, Error> {
        Ok(self.sessions.lock().map_err(lock_error)?.get(resource).cloned())
    }

    async fn detach_session(&self, session_id: &str) -> Result<(), Error> {
        match self
            .connection
            .send_command(
                "Target.detachFromTarget",
                json!({ "sessionId": session_id }),
                None,
            )
            .await
        {
            Ok(_) | Err(Error::SessionUnavailable { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Debugger for CdpDebugger {
    async fn attach(&self, resource: &ResourceId) -> Result<(), Error> {
        if let Some(stale) = self.session_id(resource)? {
            debug!("Dropping stale session {} for {}", stale, resource);
            self.sessions.lock().map_err(lock_error)?.remove(resource);
            if let Err(e) = self.detach_session(&stale).await {
                warn!("Failed to close stale session {}: {}", stale, e);
            }
        }

        let response = self
            .connection
            .send_command(
                "Target.attachToTarget",
                json!({ "targetId": resource.as_str(), "flatten": true }),
                None,
            )
            .await?;

        let session_id = response
            .result
            .as_ref()
            .and_then(|r| r.get("sessionId"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::cdp("Target.attachToTarget returned no sessionId"))?
            .to_string();

        info!("Attached to {} (session {})", resource, session_id);
        self.sessions
            .lock()
            .map_err(lock_error)?
            .insert(resource.clone(), session_id);
        Ok(())
    }

    async fn detach(&self, resource: &ResourceId) -> Result<(), Error> {
        let session_id = self.sessions.lock().map_err(lock_error)?.remove(resource);
        match session_id {
            Some(session_id) => {
                info!("Detaching from {} (session {})", resource, session_id);
                self.detach_session(&session_id).await
            }
            None => Ok(()),
        }
    }

    async fn send_command(
        &self,
        resource: &ResourceId,
        method: &str,
        params: Value,
    ) -> Result<Value, Error> {
        if !self.connection.is_active() {
            return Err(Error::websocket("Browser connection lost"));
        }
        let session_id = self.session_id(resource)?.ok_or_else(|| {
            Error::session_unavailable(
                SessionFault::NotAttached,
                format!("No open session for {}", resource),
            )
        })?;

        let response = self
            .connection
            .send_command(method, params, Some(&session_id))
            .await?;
        response
            .result
            .ok_or_else(|| Error::cdp("No result in response"))
    }

    fn subscribe_detach(&self) -> broadcast::Receiver<DetachEvent> {
        self.detach_tx.subscribe()
    }
}

#[async_trait]
impl FrameDirectory for CdpDebugger {
    /// Frames of the target numbered depth-first; the main frame is handle 0
    async fn list_frames(&self, resource: &ResourceId) -> Result<Vec<NavigationFrame>, Error> {
        let raw = self
            .send_command(resource, "Page.getFrameTree", json!({}))
            .await?;
        let response: GetFrameTreeResponse = serde_json::from_value(raw)?;
        let flat = response.frame_tree.flatten();

        let handles: HashMap<&str, FrameHandle> = flat
            .iter()
            .enumerate()
            .map(|(i, frame)| (frame.id.as_str(), FrameHandle(i as i64)))
            .collect();

        Ok(flat
            .iter()
            .enumerate()
            .map(|(i, frame)| NavigationFrame {
                handle: FrameHandle(i as i64),
                parent: frame
                    .parent_id
                    .as_deref()
                    .and_then(|p| handles.get(p).copied()),
                url: frame.url.clone(),
            })
            .collect())
    }
}
