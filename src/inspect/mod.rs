//! # 元素检查
//!
//! 将选择器对应的元素（或页面当前聚焦的元素）转换为 [`AccessibilityInfo`] 记录。
//! 这里的所有代码都在串行化的会话操作中运行，只通过
//! [`SessionContext`](crate::session::SessionContext) 与浏览器通信。
//!
//! - `validate`: 发送任何协议命令之前的请求校验
//! - `scripts`: 页面端执行的表达式
//! - `selection`: 代表节点的选择规则和记录构建
//! - `pipeline`: 解析策略和缓存
//! - `record`: 输出类型

pub mod record;
pub mod validate;
pub mod scripts;
pub mod selection;
pub mod pipeline;


pub use pipeline::{full_tree, resolve_accessibility_info, ResolveRequest};
pub use record::{AccessibilityInfo, ActiveDescendant, GroupInfo, TreeNode};

/// Reported when no strategy yields a node
pub const NODE_NOT_FOUND: &str = "Node not found";

/// Reported when a node resolved but has no accessibility node
pub const NO_AX_NODE: &str = "No AXNode found";
