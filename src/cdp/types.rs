//! CDP (Chrome DevTools Protocol) type definitions
//!
//! This module defines the core data structures for CDP communication.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// CDP JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    /// Request ID
    pub id: u64,
    /// Method name (e.g., "DOM.getDocument")
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Flattened session the command targets
    #[serde(skip_serializing_if = "Option::is_none", rename = "sessionId")]
    pub session_id: Option<String>,
}

/// CDP JSON-RPC notification (event)
#[derive(Debug, Clone, Deserialize)]
pub struct CdpNotification {
    /// Event method (e.g., "Target.detachedFromTarget")
    pub method: String,
    /// Event parameters
    #[serde(default)]
    pub params: Value,
    /// Session ID for multi-session targets
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,
}

/// CDP JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct CdpRpcResponse {
    /// Response ID (matches request ID)
    pub id: u64,
    /// Response result
    #[serde(default)]
    pub result: Value,
    /// Error if any
    #[serde(default)]
    pub error: Option<CdpErrorDetail>,
}

/// CDP error detail
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorDetail {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default)]
    pub data: Option<Value>,
}

/// JavaScript evaluation parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    /// JavaScript expression to evaluate
    pub expression: String,
    /// Whether to await promise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub await_promise: Option<bool>,
    /// Whether to return as value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    /// Execution context ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<i64>,
}

/// Remote object (result of JavaScript evaluation)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// Object type
    #[serde(default)]
    pub r#type: String,
    /// Object subtype ("node", "null", ...)
    #[serde(default)]
    pub subtype: Option<String>,
    /// Object value
    #[serde(default)]
    pub value: Option<Value>,
    /// Object description
    #[serde(default)]
    pub description: Option<String>,
    /// Handle to the live object
    #[serde(default)]
    pub object_id: Option<String>,
}

impl RemoteObject {
    /// Live handle, when the result is a DOM node
    pub fn node_handle(&self) -> Option<&str> {
        if self.subtype.as_deref() == Some("null") {
            return None;
        }
        self.object_id.as_deref()
    }
}

/// Exception details
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Exception text
    #[serde(default)]
    pub text: Option<String>,
    /// Exception object
    #[serde(default)]
    pub exception: Option<RemoteObject>,
}

/// JavaScript evaluation response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    /// Evaluation result
    #[serde(default)]
    pub result: RemoteObject,
    /// Exception details if evaluation failed
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

/// Document node
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node ID
    pub node_id: i64,
    /// Backend ID
    #[serde(default)]
    pub backend_node_id: i64,
    /// Node name
    #[serde(default)]
    pub node_name: String,
    /// Children
    #[serde(default)]
    pub children: Option<Vec<Node>>,
    /// Attributes as a flat name/value list
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
    /// Frame owned by this node (iframe elements)
    #[serde(default)]
    pub frame_id: Option<String>,
    /// Document of a frame owner
    #[serde(default)]
    pub content_document: Option<Box<Node>>,
}

/// Get document response
#[derive(Debug, Clone, Deserialize)]
pub struct GetDocumentResponse {
    /// Root node
    pub root: Node,
}

/// Value of an accessibility property
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxValue {
    /// Value type ("boolean", "tristate", "idref", "computedString", ...)
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub related_nodes: Vec<AxRelatedNode>,
}

impl AxValue {
    /// Value rendered as text; empty when absent
    pub fn text(&self) -> String {
        match &self.value {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// Node referenced by a relationship property
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxRelatedNode {
    #[serde(default, rename = "backendDOMNodeId")]
    pub backend_dom_node_id: Option<i64>,
    #[serde(default)]
    pub idref: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Named accessibility property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxProperty {
    pub name: String,
    pub value: AxValue,
}

/// Accessibility tree node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxNode {
    pub node_id: String,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub ignored_reasons: Vec<AxProperty>,
    #[serde(default)]
    pub role: Option<AxValue>,
    #[serde(default)]
    pub name: Option<AxValue>,
    #[serde(default)]
    pub description: Option<AxValue>,
    #[serde(default)]
    pub value: Option<AxValue>,
    #[serde(default)]
    pub properties: Vec<AxProperty>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    #[serde(default, rename = "backendDOMNodeId")]
    pub backend_dom_node_id: Option<i64>,
}

impl AxNode {
    /// Role, unless missing or one of the placeholder roles
    pub fn concrete_role(&self) -> Option<String> {
        let role = self.role.as_ref()?.text();
        match role.as_str() {
            "" | "none" | "Ignored" | "InlineTextBox" => None,
            _ => Some(role),
        }
    }

    pub fn property(&self, name: &str) -> Option<&AxValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Nodes returned by `Accessibility.getPartialAXTree` / `getFullAXTree`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AxTreeResponse {
    #[serde(default)]
    pub nodes: Vec<AxNode>,
}

/// Frame as reported by `Page.getFrameTree`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub url_fragment: Option<String>,
}

/// Recursive frame tree
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTree {
    pub frame: Frame,
    #[serde(default)]
    pub child_frames: Vec<FrameTree>,
}

impl FrameTree {
    /// Frames in depth-first order, the root first
    pub fn flatten(&self) -> Vec<&Frame> {
        let mut frames = Vec::new();
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            frames.push(&tree.frame);
            for child in tree.child_frames.iter().rev() {
                stack.push(child);
            }
        }
        frames
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFrameTreeResponse {
    pub frame_tree: FrameTree,
}
