//! Request dispatch
//!
//! Decodes inbound JSON requests, validates them and runs them as serialized session
//! operations. Every outcome, failures included, becomes a JSON response echoing the
//! request `id`.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::cache::{Invalidation, InvalidationMode};
use crate::inspect::{self, validate, ResolveRequest};
use crate::session::{ExecuteOptions, SessionManager};
use crate::types::{FrameHandle, ResourceId};
use crate::{Error, Result};

/// What the caller wants done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    GetFullTree,
    GetElementInfo,
    DetachSession,
    InvalidateSelectorCache,
}

/// One inbound request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub request_kind: RequestKind,
    pub resource_id: String,
    #[serde(default)]
    pub frame_handle: Option<i64>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub use_direct_reference: bool,
    #[serde(default)]
    pub mode: Option<InvalidationMode>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Front door of the inspection engine
#[derive(Debug, Clone)]
pub struct InspectorService {
    manager: Arc<SessionManager>,
}

impl InspectorService {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Handle one raw text frame and produce the response text
    pub async fn handle_text(&self, text: &str) -> String {
        let response = match serde_json::from_str::<Value>(text) {
            Ok(raw) => {
                let id = raw.get("id").cloned();
                match serde_json::from_value::<InspectRequest>(raw) {
                    Ok(request) => self.handle(request).await,
                    Err(e) => error_response(id, &Error::invalid_input(format!("invalid request: {}", e))),
                }
            }
            Err(e) => error_response(None, &Error::invalid_input(format!("invalid request: {}", e))),
        };
        response.to_string()
    }

    /// Handle a decoded request
    #[instrument(skip(self, request), fields(kind = ?request.request_kind, resource = %request.resource_id))]
    pub async fn handle(&self, request: InspectRequest) -> Value {
        let id = request.id.clone();
        let kind = request.request_kind;
        match self.dispatch(request).await {
            Ok(body) => with_id(body, id),
            Err(e) => {
                match &e {
                    Error::NotFound(_) | Error::InvalidInput(_) => debug!("{:?} failed: {}", kind, e),
                    _ => warn!("{:?} failed: {}", kind, e),
                }
                error_response(id, &e)
            }
        }
    }

    async fn dispatch(&self, request: InspectRequest) -> Result<Value> {
        let resource = ResourceId::parse(&request.resource_id)?;
        let frame = FrameHandle::parse(request.frame_handle.unwrap_or(0))?;

        match request.request_kind {
            RequestKind::GetElementInfo => {
                let resolve = ResolveRequest {
                    frame,
                    selector: validate::selector(request.selector.as_deref())?,
                    use_direct_reference: request.use_direct_reference,
                };
                let record = self
                    .manager
                    .execute_serialized(&resource, ExecuteOptions::default(), |ctx| async move {
                        inspect::resolve_accessibility_info(&ctx, &resolve).await
                    })
                    .await?;
                Ok(serde_json::to_value(record)?)
            }
            RequestKind::GetFullTree => {
                let nodes = self
                    .manager
                    .execute_serialized(&resource, ExecuteOptions::default(), |ctx| async move {
                        inspect::full_tree(&ctx, frame).await
                    })
                    .await?;
                Ok(json!({ "nodes": nodes }))
            }
            RequestKind::DetachSession => {
                let detached = self.manager.detach_session(&resource).await?;
                Ok(json!({ "status": "ok", "detached": detached }))
            }
            RequestKind::InvalidateSelectorCache => {
                let outcome = self
                    .manager
                    .invalidate(Invalidation {
                        resource,
                        frame,
                        selector: validate::selector(request.selector.as_deref())?,
                        reason: request.reason.unwrap_or_default(),
                        mode: request.mode.unwrap_or_default(),
                    })
                    .await?;
                Ok(json!({
                    "status": "ok",
                    "nodesRemoved": outcome.nodes_removed,
                    "microRemoved": outcome.micro_removed,
                }))
            }
        }
    }
}

fn with_id(body: Value, id: Option<Value>) -> Value {
    let mut object = match body {
        Value::Object(object) => object,
        other => {
            let mut object = Map::new();
            object.insert("result".to_string(), other);
            object
        }
    };
    if let Some(id) = id {
        object.insert("id".to_string(), id);
    }
    Value::Object(object)
}

fn error_response(id: Option<Value>, error: &Error) -> Value {
    with_id(json!({ "error": error.to_string() }), id)
}
