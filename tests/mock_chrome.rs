//! Mock Chrome DevTools Protocol server
//!
//! Browser-level endpoint with flattened target sessions, serving a single page with one
//! button (`#save`) so the whole stack can run without a real Chrome.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Default)]
struct BrowserState {
    /// session id -> target id
    sessions: HashMap<String, String>,
    /// every method received, in order
    methods: Vec<String>,
    next_session: u32,
    /// set by Target.setDiscoverTargets
    discovering: bool,
}

/// Mock Chrome server
pub struct MockChromeServer {
    addr: String,
    state: Arc<Mutex<BrowserState>>,
    events: broadcast::Sender<String>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockChromeServer {
    /// Start a new mock Chrome server
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let ws_addr = format!("ws://{}/devtools/browser/mock", addr);

        let state = Arc::new(Mutex::new(BrowserState::default()));
        let (events, _) = broadcast::channel(16);
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let accept_state = Arc::clone(&state);
        let accept_events = events.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                tracing::info!("Mock Chrome: Connection from {}", peer_addr);
                                tokio::spawn(Self::handle_connection(
                                    stream,
                                    Arc::clone(&accept_state),
                                    accept_events.subscribe(),
                                ));
                            }
                            Err(e) => {
                                tracing::error!("Mock Chrome: Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Mock Chrome: Shutdown signal received");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            addr: ws_addr,
            state,
            events,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Handle a WebSocket connection
    async fn handle_connection(
        stream: TcpStream,
        state: Arc<Mutex<BrowserState>>,
        mut events: broadcast::Receiver<String>,
    ) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                tracing::error!("Mock Chrome: WebSocket handshake error: {}", e);
                return;
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_receiver.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(req) = serde_json::from_str::<Value>(&text) else {
                                continue;
                            };
                            let response = Self::create_cdp_response(&state, &req);
                            if ws_sender.send(Message::Text(response.to_string())).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::error!("Mock Chrome: WebSocket error: {}", e);
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
                event = events.recv() => {
                    let Ok(event) = event else { break };
                    if ws_sender.send(Message::Text(event)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Create a CDP response for a request
    fn create_cdp_response(state: &Mutex<BrowserState>, req: &Value) -> Value {
        let method = req.get("method").and_then(|m| m.as_str()).unwrap_or("unknown");
        let id = req.get("id").and_then(|i| i.as_i64()).unwrap_or(0);
        let params = req.get("params").cloned().unwrap_or_else(|| json!({}));
        let session_id = req.get("sessionId").and_then(|s| s.as_str()).map(str::to_string);

        let mut state = state.lock().unwrap();
        state.methods.push(method.to_string());

        if let Some(session_id) = &session_id {
            if !state.sessions.contains_key(session_id) {
                return json!({
                    "id": id,
                    "sessionId": session_id,
                    "error": {"code": -32001, "message": format!("Session with given id not found: {}", session_id)}
                });
            }
        }

        let result = match method {
            "Target.attachToTarget" => {
                let target = params["targetId"].as_str().unwrap_or_default().to_string();
                if target == "closed-tab" {
                    return json!({
                        "id": id,
                        "error": {"code": -32602, "message": "No target with given id found"}
                    });
                }
                state.next_session += 1;
                let session = format!("S{}", state.next_session);
                state.sessions.insert(session.clone(), target);
                json!({ "sessionId": session })
            }
            "Target.detachFromTarget" => {
                if let Some(session) = params["sessionId"].as_str() {
                    state.sessions.remove(session);
                }
                json!({})
            }
            "Target.setDiscoverTargets" => {
                state.discovering = params["discover"].as_bool().unwrap_or(false);
                json!({})
            }
            "DOM.enable" | "Accessibility.enable" | "Page.enable" | "Runtime.enable" => json!({}),
            "DOM.getDocument" => json!({
                "root": {"nodeId": 1, "backendNodeId": 1, "nodeName": "#document"}
            }),
            "DOM.querySelector" => {
                let node_id = if params["selector"] == json!("#save") { 9 } else { 0 };
                json!({ "nodeId": node_id })
            }
            "DOM.getAttributes" => json!({
                "attributes": ["id", "save", "aria-pressed", "false"]
            }),
            "Accessibility.getPartialAXTree" => json!({
                "nodes": [{
                    "nodeId": "30",
                    "ignored": false,
                    "role": {"type": "role", "value": "button"},
                    "name": {"type": "computedString", "value": "Save"},
                    "properties": [
                        {"name": "focusable", "value": {"type": "booleanOrUndefined", "value": true}},
                        {"name": "pressed", "value": {"type": "tristate", "value": "false"}}
                    ],
                    "backendDOMNodeId": 9
                }]
            }),
            "Accessibility.getFullAXTree" => json!({
                "nodes": [
                    {"nodeId": "1", "ignored": false, "role": {"type": "role", "value": "RootWebArea"}, "childIds": ["30"]},
                    {"nodeId": "30", "ignored": false, "role": {"type": "role", "value": "button"}, "parentId": "1", "backendDOMNodeId": 9}
                ]
            }),
            "Page.getFrameTree" => json!({
                "frameTree": {"frame": {"id": "MAIN", "url": "https://example.com/"}}
            }),
            "Runtime.evaluate" => json!({
                "result": {"type": "object", "subtype": "null", "value": null}
            }),
            _ => {
                return json!({
                    "id": id,
                    "error": {"code": -32601, "message": format!("'{}' wasn't found", method)}
                });
            }
        };

        match session_id {
            Some(session_id) => json!({ "id": id, "sessionId": session_id, "result": result }),
            None => json!({ "id": id, "result": result }),
        }
    }

    /// Get the browser WebSocket endpoint URL
    pub fn ws_endpoint(&self) -> &str {
        &self.addr
    }

    /// Methods received so far, in order
    pub fn methods(&self) -> Vec<String> {
        self.state.lock().unwrap().methods.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.methods().iter().filter(|m| *m == method).count()
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    /// Close every session from the browser side, as when the user closes the DevTools bar
    pub fn detach_all(&self) {
        let sessions: Vec<(String, String)> = self.state.lock().unwrap().sessions.drain().collect();
        for (session_id, target_id) in sessions {
            let event = json!({
                "method": "Target.detachedFromTarget",
                "params": {"sessionId": session_id, "targetId": target_id, "reason": "canceled_by_user"}
            });
            let _ = self.events.send(event.to_string());
        }
    }

    /// Close a tab; only clients that enabled target discovery hear about it
    pub fn close_target(&self, target_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.sessions.retain(|_, target| target != target_id);
        if state.discovering {
            let event = json!({
                "method": "Target.targetDestroyed",
                "params": {"targetId": target_id}
            });
            let _ = self.events.send(event.to_string());
        }
    }

    /// Shutdown the mock server
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockChromeServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
