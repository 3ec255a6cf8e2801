//! Typed CDP client scoped to one resource
//!
//! This module provides typed methods for the DOM, Accessibility, Page and Runtime
//! commands the resolution pipeline issues. It holds no state of its own; ordering is the
//! caller's business (see `session::SessionManager::execute_serialized`).

use super::traits::Debugger;
use super::types::*;
use crate::types::ResourceId;
use crate::Error;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// CDP client bound to one resource's session
#[derive(Debug, Clone)]
pub struct SessionClient {
    debugger: Arc<dyn Debugger>,
    resource: ResourceId,
}

impl SessionClient {
    /// Create a new client for `resource`
    pub fn new(debugger: Arc<dyn Debugger>, resource: ResourceId) -> Self {
        Self { debugger, resource }
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Call a raw CDP method
    pub async fn call_method(&self, method: &str, params: Value) -> Result<Value, Error> {
        debug!("Calling CDP method {} on {}", method, self.resource);
        self.debugger.send_command(&self.resource, method, params).await
    }

    /// Enable a domain
    pub async fn enable_domain(&self, domain: &str) -> Result<(), Error> {
        let method = format!("{}.enable", domain);
        self.call_method(&method, json!({})).await?;
        Ok(())
    }

    /// Fetch the document root
    pub async fn get_document(&self, depth: i64, pierce: bool) -> Result<Node, Error> {
        let raw = self
            .call_method("DOM.getDocument", json!({ "depth": depth, "pierce": pierce }))
            .await?;
        let response: GetDocumentResponse = serde_json::from_value(raw)?;
        Ok(response.root)
    }

    /// `DOM.querySelector`; `None` when nothing matched
    pub async fn query_selector(&self, node_id: i64, selector: &str) -> Result<Option<i64>, Error> {
        let raw = self
            .call_method(
                "DOM.querySelector",
                json!({ "nodeId": node_id, "selector": selector }),
            )
            .await?;
        Ok(raw
            .get("nodeId")
            .and_then(|v| v.as_i64())
            .filter(|id| *id > 0))
    }

    /// Convert a live object handle into a node id
    pub async fn request_node(&self, object_id: &str) -> Result<i64, Error> {
        let raw = self
            .call_method("DOM.requestNode", json!({ "objectId": object_id }))
            .await?;
        raw.get("nodeId")
            .and_then(|v| v.as_i64())
            .filter(|id| *id > 0)
            .ok_or_else(|| Error::not_found("Node not found"))
    }

    /// Attributes of an element as name/value pairs
    pub async fn get_attributes(&self, node_id: i64) -> Result<Vec<(String, String)>, Error> {
        let raw = self
            .call_method("DOM.getAttributes", json!({ "nodeId": node_id }))
            .await?;
        let flat: Vec<String> = raw
            .get("attributes")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        Ok(flat
            .chunks(2)
            .filter_map(|pair| match pair {
                [name, value] => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect())
    }

    /// Evaluate an expression, keeping the result as a remote handle
    pub async fn evaluate(&self, expression: &str, context_id: Option<i64>) -> Result<RemoteObject, Error> {
        let params = EvaluateParams {
            expression: expression.to_string(),
            await_promise: Some(false),
            return_by_value: Some(false),
            context_id,
        };
        let raw = self
            .call_method("Runtime.evaluate", serde_json::to_value(params)?)
            .await?;
        let response: EvaluateResponse = serde_json::from_value(raw)?;

        if let Some(exception) = response.exception_details {
            return Err(Error::script_execution_failed(
                exception
                    .exception
                    .and_then(|e| e.description)
                    .or(exception.text)
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        Ok(response.result)
    }

    /// Release a remote handle; failures are ignored
    pub async fn release_object(&self, object_id: &str) {
        if let Err(e) = self
            .call_method("Runtime.releaseObject", json!({ "objectId": object_id }))
            .await
        {
            debug!("Failed to release {}: {}", object_id, e);
        }
    }

    /// Accessibility nodes for a DOM node, optionally with ancestors and children
    pub async fn partial_ax_tree(&self, node_id: i64, fetch_relatives: bool) -> Result<Vec<AxNode>, Error> {
        let raw = self
            .call_method(
                "Accessibility.getPartialAXTree",
                json!({ "nodeId": node_id, "fetchRelatives": fetch_relatives }),
            )
            .await?;
        let response: AxTreeResponse = serde_json::from_value(raw)?;
        Ok(response.nodes)
    }

    /// Accessibility node for a backend node id, without relatives
    pub async fn partial_ax_tree_by_backend(&self, backend_node_id: i64) -> Result<Vec<AxNode>, Error> {
        let raw = self
            .call_method(
                "Accessibility.getPartialAXTree",
                json!({ "backendNodeId": backend_node_id, "fetchRelatives": false }),
            )
            .await?;
        let response: AxTreeResponse = serde_json::from_value(raw)?;
        Ok(response.nodes)
    }

    /// Whole accessibility tree, of the main frame or of `frame_id`
    pub async fn full_ax_tree(&self, frame_id: Option<&str>) -> Result<Vec<AxNode>, Error> {
        let params = match frame_id {
            Some(frame_id) => json!({ "frameId": frame_id }),
            None => json!({}),
        };
        let raw = self.call_method("Accessibility.getFullAXTree", params).await?;
        let response: AxTreeResponse = serde_json::from_value(raw)?;
        Ok(response.nodes)
    }

    /// Protocol frame tree
    pub async fn frame_tree(&self) -> Result<FrameTree, Error> {
        let raw = self.call_method("Page.getFrameTree", json!({})).await?;
        let response: GetFrameTreeResponse = serde_json::from_value(raw)?;
        Ok(response.frame_tree)
    }

    /// Create an isolated world in `frame_id`, returning its execution context id
    pub async fn create_isolated_world(&self, frame_id: &str, world_name: &str) -> Result<i64, Error> {
        let raw = self
            .call_method(
                "Page.createIsolatedWorld",
                json!({
                    "frameId": frame_id,
                    "worldName": world_name,
                    "grantUniveralAccess": true,
                }),
            )
            .await?;
        raw.get("executionContextId")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::cdp("Page.createIsolatedWorld returned no executionContextId"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockDebugger;

    async fn client(mock: &Arc<MockDebugger>) -> SessionClient {
        let tab = ResourceId::parse("tab-1").unwrap();
        mock.attach(&tab).await.unwrap();
        SessionClient::new(mock.clone(), tab)
    }

    #[tokio::test]
    async fn test_attributes_are_paired() {
        let mock = Arc::new(MockDebugger::new());
        mock.on("DOM.getAttributes", |_| {
            Ok(json!({ "attributes": ["id", "foo", "aria-label", "Save", "dangling"] }))
        });
        let client = client(&mock).await;

        let attributes = client.get_attributes(4).await.unwrap();
        assert_eq!(
            attributes,
            vec![
                ("id".to_string(), "foo".to_string()),
                ("aria-label".to_string(), "Save".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_query_selector_zero_means_missing() {
        let mock = Arc::new(MockDebugger::new());
        mock.on("DOM.querySelector", |_| Ok(json!({ "nodeId": 0 })));
        let client = client(&mock).await;

        assert_eq!(client.query_selector(1, "#missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_evaluate_exception_is_error() {
        let mock = Arc::new(MockDebugger::new());
        mock.on("Runtime.evaluate", |_| {
            Ok(json!({
                "result": {"type": "object"},
                "exceptionDetails": {"text": "Uncaught", "exception": {"type": "object", "description": "SyntaxError: bad"}}
            }))
        });
        let client = client(&mock).await;

        let err = client.evaluate("document.querySelector('[')", None).await.unwrap_err();
        assert!(matches!(err, Error::ScriptExecutionFailed(msg) if msg.contains("SyntaxError")));
    }

    #[tokio::test]
    async fn test_isolated_world_params() {
        let mock = Arc::new(MockDebugger::new());
        mock.on("Page.createIsolatedWorld", |params| {
            assert_eq!(params["frameId"], "F1");
            Ok(json!({ "executionContextId": 31 }))
        });
        let client = client(&mock).await;

        assert_eq!(client.create_isolated_world("F1", "ax-oxide").await.unwrap(), 31);
    }
}
