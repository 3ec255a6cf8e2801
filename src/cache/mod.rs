//! # 解析缓存
//!
//! 所有资源共享的进程级缓存。初始为空，由会话管理器持有，只能通过其方法访问；
//! 条目按资源分键，会话销毁时只清除该资源自己的条目。
//!
//! - 文档根: 资源 + 框架范围 -> 根节点 ID
//! - 节点 ID: 资源 + 框架范围 + 选择器 -> 节点 ID（有上限）
//! - 微缓存: 资源 + 框架句柄 -> 直接引用路径组装好的记录

pub mod ttl;

pub use ttl::TtlCache;

use crate::inspect::record::AccessibilityInfo;
use crate::types::{FrameHandle, FrameScope, ResourceId};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Cache sizing and lifetimes
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub document_ttl: Duration,
    pub node_ttl: Duration,
    pub node_max_entries: usize,
    pub micro_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            document_ttl: Duration::from_secs(30),
            node_ttl: Duration::from_secs(10),
            node_max_entries: 500,
            micro_ttl: Duration::from_millis(150),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub resource: ResourceId,
    pub scope: FrameScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub resource: ResourceId,
    pub scope: FrameScope,
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MicroKey {
    pub resource: ResourceId,
    pub frame: FrameHandle,
}

/// Which cache an invalidation signal targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationMode {
    /// Selector-scoped node ids
    #[default]
    Selector,
    /// Direct-reference micro-cache only
    Direct,
}

/// Invalidation signal emitted by the page-side observer
#[derive(Debug, Clone)]
pub struct Invalidation {
    pub resource: ResourceId,
    pub frame: FrameHandle,
    pub selector: Option<String>,
    pub reason: String,
    pub mode: InvalidationMode,
}

impl Invalidation {
    /// Interaction patterns whose state flips often enough that any cached resolution on
    /// the resource is suspect, not just the named selector.
    pub fn is_volatile(&self) -> bool {
        let reason = self.reason.to_ascii_lowercase();
        ["combobox", "aria-expanded", "aria-activedescendant", "listbox"]
            .iter()
            .any(|marker| reason.contains(marker))
    }
}

/// Entries removed by one invalidation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationOutcome {
    pub nodes_removed: usize,
    pub micro_removed: usize,
}

/// Entry counts, for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub documents: usize,
    pub nodes: usize,
    pub micro: usize,
}

/// The three resolution caches
#[derive(Debug)]
pub struct ResolutionCaches {
    documents: TtlCache<DocumentKey, i64>,
    nodes: TtlCache<NodeKey, i64>,
    micro: TtlCache<MicroKey, AccessibilityInfo>,
}

impl ResolutionCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            documents: TtlCache::new(config.document_ttl),
            nodes: TtlCache::bounded(config.node_ttl, config.node_max_entries),
            micro: TtlCache::new(config.micro_ttl),
        }
    }

    pub fn document_root(&mut self, resource: &ResourceId, scope: &FrameScope) -> Option<i64> {
        self.documents.get(&DocumentKey {
            resource: resource.clone(),
            scope: scope.clone(),
        })
    }

    pub fn store_document_root(&mut self, resource: &ResourceId, scope: &FrameScope, node_id: i64) {
        self.documents.set(
            DocumentKey {
                resource: resource.clone(),
                scope: scope.clone(),
            },
            node_id,
        );
    }

    pub fn forget_document_root(&mut self, resource: &ResourceId, scope: &FrameScope) {
        self.documents.delete(&DocumentKey {
            resource: resource.clone(),
            scope: scope.clone(),
        });
    }

    fn node_key(resource: &ResourceId, scope: &FrameScope, selector: &str) -> NodeKey {
        NodeKey {
            resource: resource.clone(),
            scope: scope.clone(),
            selector: selector.to_string(),
        }
    }

    pub fn node_id(&mut self, resource: &ResourceId, scope: &FrameScope, selector: &str) -> Option<i64> {
        self.nodes.get(&Self::node_key(resource, scope, selector))
    }

    pub fn store_node_id(&mut self, resource: &ResourceId, scope: &FrameScope, selector: &str, node_id: i64) {
        self.nodes.set(Self::node_key(resource, scope, selector), node_id);
    }

    pub fn forget_node_id(&mut self, resource: &ResourceId, scope: &FrameScope, selector: &str) {
        self.nodes.delete(&Self::node_key(resource, scope, selector));
    }

    pub fn micro_record(&mut self, resource: &ResourceId, frame: FrameHandle) -> Option<AccessibilityInfo> {
        self.micro.get(&MicroKey {
            resource: resource.clone(),
            frame,
        })
    }

    pub fn store_micro_record(&mut self, resource: &ResourceId, frame: FrameHandle, record: AccessibilityInfo) {
        self.micro.set(
            MicroKey {
                resource: resource.clone(),
                frame,
            },
            record,
        );
    }

    /// Apply an invalidation signal. Deleting nothing is not an error.
    pub fn invalidate(&mut self, signal: &Invalidation) -> InvalidationOutcome {
        let mut outcome = InvalidationOutcome::default();
        let volatile = signal.is_volatile();

        match signal.mode {
            InvalidationMode::Direct => {
                outcome.micro_removed = if volatile {
                    self.micro.retain(|key, _| key.resource != signal.resource)
                } else {
                    usize::from(self.micro.delete(&MicroKey {
                        resource: signal.resource.clone(),
                        frame: signal.frame,
                    }))
                };
            }
            InvalidationMode::Selector => {
                outcome.nodes_removed = if volatile {
                    self.nodes.retain(|key, _| key.resource != signal.resource)
                } else if let Some(selector) = signal.selector.as_deref() {
                    self.nodes.retain(|key, _| {
                        !(key.resource == signal.resource && key.selector == selector)
                    })
                } else {
                    0
                };
                if volatile {
                    outcome.micro_removed =
                        self.micro.retain(|key, _| key.resource != signal.resource);
                }
            }
        }

        debug!(
            "Invalidated {} node / {} micro entries for {} ({})",
            outcome.nodes_removed, outcome.micro_removed, signal.resource, signal.reason
        );
        outcome
    }

    /// Drop everything cached for `resource`; returns the number of entries removed
    pub fn purge_resource(&mut self, resource: &ResourceId) -> usize {
        self.documents.retain(|key, _| &key.resource != resource)
            + self.nodes.retain(|key, _| &key.resource != resource)
            + self.micro.retain(|key, _| &key.resource != resource)
    }

    /// Drop stale entries in all caches
    pub fn purge_expired(&mut self) -> usize {
        self.documents.purge_expired() + self.nodes.purge_expired() + self.micro.purge_expired()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            documents: self.documents.len(),
            nodes: self.nodes.len(),
            micro: self.micro.len(),
        }
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.nodes.clear();
        self.micro.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: &str) -> ResourceId {
        ResourceId::parse(id).unwrap()
    }

    fn signal(resource: &str, selector: &str, reason: &str, mode: InvalidationMode) -> Invalidation {
        Invalidation {
            resource: tab(resource),
            frame: FrameHandle::MAIN,
            selector: Some(selector.to_string()),
            reason: reason.to_string(),
            mode,
        }
    }

    fn record(role: &str) -> AccessibilityInfo {
        AccessibilityInfo {
            role: role.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_invalidating_unknown_selector_is_noop() {
        let mut caches = ResolutionCaches::new(&CacheConfig::default());
        caches.store_node_id(&tab("t1"), &FrameScope::Main, "#other", 5);

        let outcome = caches.invalidate(&signal("t1", "#foo", "attribute", InvalidationMode::Selector));
        assert_eq!(outcome, InvalidationOutcome::default());
        assert_eq!(caches.node_id(&tab("t1"), &FrameScope::Main, "#other"), Some(5));

        let mut empty = ResolutionCaches::new(&CacheConfig::default());
        assert_eq!(
            empty.invalidate(&signal("t1", "#foo", "focus", InvalidationMode::Direct)),
            InvalidationOutcome::default()
        );
    }

    #[tokio::test]
    async fn test_selector_invalidation_covers_every_scope() {
        let mut caches = ResolutionCaches::new(&CacheConfig::default());
        let frame = FrameScope::Frame("F1".into());
        caches.store_node_id(&tab("t1"), &FrameScope::Main, "#foo", 5);
        caches.store_node_id(&tab("t1"), &frame, "#foo", 6);
        caches.store_node_id(&tab("t2"), &FrameScope::Main, "#foo", 7);

        let outcome = caches.invalidate(&signal("t1", "#foo", "attribute", InvalidationMode::Selector));
        assert_eq!(outcome.nodes_removed, 2);
        assert_eq!(caches.node_id(&tab("t2"), &FrameScope::Main, "#foo"), Some(7));
    }

    #[tokio::test]
    async fn test_direct_mode_keeps_selector_entries() {
        let mut caches = ResolutionCaches::new(&CacheConfig::default());
        caches.store_node_id(&tab("t1"), &FrameScope::Main, "#foo", 5);
        caches.store_micro_record(&tab("t1"), FrameHandle::MAIN, record("button"));

        let outcome = caches.invalidate(&signal("t1", "#foo", "focus", InvalidationMode::Direct));
        assert_eq!(outcome.micro_removed, 1);
        assert_eq!(outcome.nodes_removed, 0);
        assert!(caches.micro_record(&tab("t1"), FrameHandle::MAIN).is_none());
        assert_eq!(caches.node_id(&tab("t1"), &FrameScope::Main, "#foo"), Some(5));
    }

    #[tokio::test]
    async fn test_volatile_selector_invalidation_clears_resource() {
        let mut caches = ResolutionCaches::new(&CacheConfig::default());
        caches.store_node_id(&tab("t1"), &FrameScope::Main, "#combo", 5);
        caches.store_node_id(&tab("t1"), &FrameScope::Main, "#unrelated", 6);
        caches.store_node_id(&tab("t2"), &FrameScope::Main, "#combo", 7);
        caches.store_micro_record(&tab("t1"), FrameHandle::MAIN, record("combobox"));

        let outcome = caches.invalidate(&signal(
            "t1",
            "#combo",
            "combobox aria-expanded changed",
            InvalidationMode::Selector,
        ));
        assert_eq!(outcome.nodes_removed, 2);
        assert_eq!(outcome.micro_removed, 1);
        assert_eq!(caches.stats().nodes, 1);
    }

    #[tokio::test]
    async fn test_purge_resource_touches_only_that_resource() {
        let mut caches = ResolutionCaches::new(&CacheConfig::default());
        caches.store_document_root(&tab("t1"), &FrameScope::Main, 1);
        caches.store_node_id(&tab("t1"), &FrameScope::Main, "#a", 5);
        caches.store_micro_record(&tab("t1"), FrameHandle::MAIN, record("link"));
        caches.store_document_root(&tab("t2"), &FrameScope::Main, 1);

        assert_eq!(caches.purge_resource(&tab("t1")), 3);
        assert_eq!(
            caches.stats(),
            CacheStats {
                documents: 1,
                nodes: 0,
                micro: 0
            }
        );
    }
}
