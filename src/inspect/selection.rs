//! Choosing the representative node of a fetched subtree and turning it into a record

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::cdp::types::{AxNode, AxValue};
use crate::inspect::record::{AccessibilityInfo, ActiveDescendant, GroupInfo};

/// Roles that make an ancestor the element's `group`
pub const GROUPING_ROLES: [&str; 10] = [
    "group",
    "radiogroup",
    "toolbar",
    "tablist",
    "menubar",
    "menu",
    "listbox",
    "tree",
    "treegrid",
    "grid",
];

/// Protocol properties reported as states
const STATE_PROPERTIES: [&str; 18] = [
    "busy",
    "disabled",
    "editable",
    "focusable",
    "focused",
    "hidden",
    "invalid",
    "modal",
    "multiline",
    "multiselectable",
    "readonly",
    "required",
    "selected",
    "settable",
    "checked",
    "expanded",
    "pressed",
    "hiddenRoot",
];

/// Protocol property name -> ARIA attribute it mirrors
const ARIA_MIRRORS: [(&str, &str); 25] = [
    ("busy", "aria-busy"),
    ("disabled", "aria-disabled"),
    ("hidden", "aria-hidden"),
    ("invalid", "aria-invalid"),
    ("modal", "aria-modal"),
    ("multiline", "aria-multiline"),
    ("multiselectable", "aria-multiselectable"),
    ("readonly", "aria-readonly"),
    ("required", "aria-required"),
    ("selected", "aria-selected"),
    ("checked", "aria-checked"),
    ("expanded", "aria-expanded"),
    ("pressed", "aria-pressed"),
    ("level", "aria-level"),
    ("hasPopup", "aria-haspopup"),
    ("autocomplete", "aria-autocomplete"),
    ("orientation", "aria-orientation"),
    ("valuemin", "aria-valuemin"),
    ("valuemax", "aria-valuemax"),
    ("valuetext", "aria-valuetext"),
    ("live", "aria-live"),
    ("atomic", "aria-atomic"),
    ("relevant", "aria-relevant"),
    ("roledescription", "aria-roledescription"),
    ("keyshortcuts", "aria-keyshortcuts"),
];

/// Relationship properties whose value is a list of referenced ids
const RELATION_MIRRORS: [(&str, &str); 7] = [
    ("activedescendant", "aria-activedescendant"),
    ("controls", "aria-controls"),
    ("describedby", "aria-describedby"),
    ("details", "aria-details"),
    ("errormessage", "aria-errormessage"),
    ("labelledby", "aria-labelledby"),
    ("owns", "aria-owns"),
];

/// Nodes of one `getPartialAXTree` response, indexed by id
#[derive(Debug)]
pub struct Subtree<'a> {
    nodes: &'a [AxNode],
    by_id: HashMap<&'a str, &'a AxNode>,
}

impl<'a> Subtree<'a> {
    /// The first node is the one the fetch was rooted at
    pub fn new(nodes: &'a [AxNode]) -> Self {
        let by_id = nodes.iter().map(|n| (n.node_id.as_str(), n)).collect();
        Self { nodes, by_id }
    }

    pub fn root(&self) -> Option<&'a AxNode> {
        self.nodes.first()
    }

    pub fn get(&self, id: &str) -> Option<&'a AxNode> {
        self.by_id.get(id).copied()
    }

    pub fn by_backend_id(&self, backend_id: i64) -> Option<&'a AxNode> {
        self.nodes
            .iter()
            .find(|n| n.backend_dom_node_id == Some(backend_id))
    }

    /// Root and its fetched descendants, depth-first in child order
    fn descendants(&self) -> Vec<&'a AxNode> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<&'a AxNode> = self.root().into_iter().collect();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.node_id.as_str()) {
                continue;
            }
            order.push(node);
            for child in node.child_ids.iter().rev() {
                if let Some(child) = self.get(child) {
                    stack.push(child);
                }
            }
        }
        order
    }

    /// Pick the node the record describes.
    ///
    /// First non-ignored node with a concrete role, in subtree order. Failing that, the
    /// root; an ignored root with children gets one step down to its first non-ignored
    /// child carrying any role at all.
    pub fn select(&self) -> Option<&'a AxNode> {
        let candidates = self.descendants();
        if let Some(node) = candidates.iter().find(|n| is_meaningful(n)) {
            return Some(*node);
        }

        let root = self.root()?;
        if root.ignored && !root.child_ids.is_empty() {
            if let Some(child) = root
                .child_ids
                .iter()
                .filter_map(|id| self.get(id))
                .find(|n| !n.ignored && !text_of(&n.role).is_empty())
            {
                return Some(child);
            }
        }
        Some(root)
    }

    /// Nearest ancestor of `node` with a grouping role
    pub fn group_of(&self, node: &AxNode) -> Option<GroupInfo> {
        let mut visited = HashSet::new();
        let mut current = node.parent_id.as_deref();
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            let parent = self.get(id)?;
            if let Some(role) = parent.concrete_role() {
                if GROUPING_ROLES.contains(&role.as_str()) {
                    return Some(GroupInfo {
                        role,
                        label: text_of(&parent.name),
                    });
                }
            }
            current = parent.parent_id.as_deref();
        }
        None
    }
}

fn is_meaningful(node: &AxNode) -> bool {
    !node.ignored && node.concrete_role().is_some()
}

fn text_of(value: &Option<AxValue>) -> String {
    value.as_ref().map(AxValue::text).unwrap_or_default()
}

/// Referenced ids of a relationship value, space separated
fn relation_text(value: &AxValue) -> String {
    let ids: Vec<String> = value
        .related_nodes
        .iter()
        .filter_map(|r| r.idref.clone())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        value.text()
    } else {
        ids.join(" ")
    }
}

/// `"true"`/`"false"` become booleans, everything else stays text
fn attribute_state(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
    }
}

/// Merge the chosen node with the element's DOM attributes.
///
/// DOM attributes decide `aria-*` values; protocol properties fill what the attributes
/// leave unset and are the only source for states with no ARIA attribute.
pub fn build_record(node: &AxNode, attributes: &[(String, String)]) -> AccessibilityInfo {
    let mut record = AccessibilityInfo {
        role: node
            .concrete_role()
            .unwrap_or_else(|| text_of(&node.role)),
        name: text_of(&node.name),
        description: text_of(&node.description),
        value: text_of(&node.value),
        ignored: node.ignored,
        ignored_reasons: node.ignored_reasons.iter().map(|r| r.name.clone()).collect(),
        ..Default::default()
    };

    for (name, value) in attributes {
        if name.starts_with("aria-") {
            record.aria_properties.insert(name.clone(), value.clone());
        }
    }

    for (property, attribute) in ARIA_MIRRORS {
        if let Some(value) = node.property(property) {
            record
                .aria_properties
                .entry(attribute.to_string())
                .or_insert_with(|| value.text());
        }
    }
    for (property, attribute) in RELATION_MIRRORS {
        if let Some(value) = node.property(property) {
            record
                .aria_properties
                .entry(attribute.to_string())
                .or_insert_with(|| relation_text(value));
        }
    }

    for state in STATE_PROPERTIES {
        let from_attribute = ARIA_MIRRORS
            .iter()
            .find(|(property, _)| *property == state)
            .and_then(|(_, attribute)| {
                attributes
                    .iter()
                    .find(|(name, _)| name == attribute)
                    .map(|(_, value)| attribute_state(value))
            });
        let from_property = node
            .property(state)
            .and_then(|value| value.value.clone());

        if let Some(value) = from_attribute.or(from_property) {
            record.states.insert(state.to_string(), value);
        }
    }

    record
}

/// Backend id of the node's active descendant, if it names one
pub fn active_descendant_target(node: &AxNode) -> Option<i64> {
    node.property("activedescendant")?
        .related_nodes
        .iter()
        .find_map(|r| r.backend_dom_node_id)
}

pub fn describe_active_descendant(node: &AxNode) -> ActiveDescendant {
    ActiveDescendant {
        role: node
            .concrete_role()
            .unwrap_or_else(|| text_of(&node.role)),
        name: text_of(&node.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nodes(value: Value) -> Vec<AxNode> {
        serde_json::from_value(value).unwrap()
    }

    fn combobox_subtree() -> Vec<AxNode> {
        nodes(json!([
            {
                "nodeId": "10", "ignored": false,
                "role": {"type": "role", "value": "combobox"},
                "name": {"type": "computedString", "value": "Country"},
                "properties": [
                    {"name": "expanded", "value": {"type": "booleanOrUndefined", "value": true}},
                    {"name": "focusable", "value": {"type": "boolean", "value": true}},
                    {"name": "hasPopup", "value": {"type": "token", "value": "listbox"}},
                    {"name": "activedescendant", "value": {"type": "idref", "relatedNodes": [{"backendDOMNodeId": 31, "idref": "opt-2"}]}}
                ],
                "parentId": "5", "childIds": ["11"], "backendDOMNodeId": 20
            },
            {
                "nodeId": "11", "ignored": false,
                "role": {"type": "role", "value": "option"},
                "name": {"type": "computedString", "value": "Chile"},
                "parentId": "10", "childIds": [], "backendDOMNodeId": 31
            },
            {
                "nodeId": "5", "ignored": false,
                "role": {"type": "role", "value": "group"},
                "name": {"type": "computedString", "value": "Shipping"},
                "parentId": "1", "childIds": ["10"]
            },
            {
                "nodeId": "1", "ignored": false,
                "role": {"type": "role", "value": "RootWebArea"},
                "childIds": ["5"]
            }
        ]))
    }

    #[test]
    fn test_selects_first_meaningful_node() {
        let fetched = combobox_subtree();
        let subtree = Subtree::new(&fetched);
        assert_eq!(subtree.select().unwrap().node_id, "10");
    }

    #[test]
    fn test_ancestors_are_not_candidates() {
        let fetched = nodes(json!([
            {"nodeId": "7", "ignored": true, "parentId": "2", "childIds": []},
            {"nodeId": "2", "ignored": false, "role": {"type": "role", "value": "main"}, "childIds": ["7"]}
        ]));
        let subtree = Subtree::new(&fetched);
        let chosen = subtree.select().unwrap();
        assert_eq!(chosen.node_id, "7");
        assert!(chosen.ignored);
    }

    #[test]
    fn test_ignored_root_descends_once() {
        let fetched = nodes(json!([
            {"nodeId": "1", "ignored": true, "childIds": ["2", "3"]},
            {"nodeId": "2", "ignored": true, "role": {"type": "role", "value": "generic"}, "parentId": "1", "childIds": []},
            {"nodeId": "3", "ignored": false, "role": {"type": "internalRole", "value": "InlineTextBox"}, "parentId": "1", "childIds": []}
        ]));
        let subtree = Subtree::new(&fetched);
        assert_eq!(subtree.select().unwrap().node_id, "3");
    }

    #[test]
    fn test_subtree_order_is_depth_first() {
        let fetched = nodes(json!([
            {"nodeId": "1", "ignored": true, "childIds": ["2", "3"]},
            {"nodeId": "2", "ignored": true, "role": {"type": "role", "value": "none"}, "parentId": "1", "childIds": ["4"]},
            {"nodeId": "3", "ignored": false, "role": {"type": "role", "value": "button"}, "parentId": "1", "childIds": []},
            {"nodeId": "4", "ignored": false, "role": {"type": "role", "value": "img"}, "parentId": "2", "childIds": []}
        ]));
        let subtree = Subtree::new(&fetched);
        // Depth-first order reaches the nested img before the sibling button
        assert_eq!(subtree.select().unwrap().node_id, "4");
    }

    #[test]
    fn test_group_walks_parent_links() {
        let fetched = combobox_subtree();
        let subtree = Subtree::new(&fetched);
        let chosen = subtree.select().unwrap();
        assert_eq!(
            subtree.group_of(chosen),
            Some(GroupInfo {
                role: "group".into(),
                label: "Shipping".into()
            })
        );
        assert_eq!(subtree.group_of(subtree.get("5").unwrap()), None);
    }

    #[test]
    fn test_dom_attributes_win_for_aria() {
        let fetched = combobox_subtree();
        let attributes = vec![
            ("id".to_string(), "country".to_string()),
            ("aria-expanded".to_string(), "false".to_string()),
            ("aria-label".to_string(), "Country".to_string()),
        ];

        let record = build_record(&fetched[0], &attributes);
        assert_eq!(record.role, "combobox");
        assert_eq!(record.name, "Country");
        assert_eq!(record.aria_properties["aria-expanded"], "false");
        assert_eq!(record.aria_properties["aria-label"], "Country");
        assert_eq!(record.aria_properties["aria-haspopup"], "listbox");
        assert_eq!(record.aria_properties["aria-activedescendant"], "opt-2");
        assert!(!record.aria_properties.contains_key("id"));

        assert_eq!(record.states["expanded"], json!(false));
        assert_eq!(record.states["focusable"], json!(true));
        assert!(!record.states.contains_key("checked"));
    }

    #[test]
    fn test_active_descendant_reference() {
        let fetched = combobox_subtree();
        let subtree = Subtree::new(&fetched);
        let target = active_descendant_target(&fetched[0]).unwrap();
        assert_eq!(target, 31);
        assert_eq!(
            describe_active_descendant(subtree.by_backend_id(target).unwrap()),
            ActiveDescendant {
                role: "option".into(),
                name: "Chile".into()
            }
        );
    }

    #[test]
    fn test_ignored_reasons_are_listed() {
        let fetched = nodes(json!([
            {"nodeId": "1", "ignored": true, "ignoredReasons": [{"name": "ariaHiddenElement", "value": {"type": "boolean", "value": true}}]}
        ]));
        let record = build_record(&fetched[0], &[]);
        assert!(record.ignored);
        assert_eq!(record.ignored_reasons, vec!["ariaHiddenElement".to_string()]);
    }
}
