//! Records returned to callers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::cdp::types::AxNode;

/// Nearest enclosing grouping element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub role: String,
    pub label: String,
}

/// Element referenced by `aria-activedescendant`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveDescendant {
    pub role: String,
    pub name: String,
}

/// Normalized accessibility information for one element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityInfo {
    pub role: String,
    pub name: String,
    pub description: String,
    pub value: String,
    /// State name -> protocol value (`true`, `"mixed"`, ...)
    pub states: BTreeMap<String, Value>,
    /// `aria-*` attribute -> value
    pub aria_properties: BTreeMap<String, String>,
    pub ignored: bool,
    pub ignored_reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_descendant: Option<ActiveDescendant>,
}

/// Flat accessibility-tree node, for full-tree dumps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub node_id: String,
    pub role: String,
    pub name: String,
    pub ignored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
    #[serde(default, rename = "backendDOMNodeId", skip_serializing_if = "Option::is_none")]
    pub backend_dom_node_id: Option<i64>,
}

impl From<&AxNode> for TreeNode {
    fn from(node: &AxNode) -> Self {
        Self {
            node_id: node.node_id.clone(),
            role: node.role.as_ref().map(|r| r.text()).unwrap_or_default(),
            name: node.name.as_ref().map(|n| n.text()).unwrap_or_default(),
            ignored: node.ignored,
            parent_id: node.parent_id.clone(),
            child_ids: node.child_ids.clone(),
            backend_dom_node_id: node.backend_dom_node_id,
        }
    }
}
