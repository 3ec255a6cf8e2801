//! # 会话管理层
//!
//! 每个被检查的资源对应一个调试会话，由以下状态机驱动：
//!
//! ```text
//! DETACHED --attach--> ATTACHING --success--> ATTACHED
//!     ^                    |                      |
//!     +------failure-------+    idle | detach | fatal | external close
//!     +-----------------------------------------------+
//! ```
//!
//! ## 主要功能
//! - **串行化**: 同一资源上的操作按提交顺序逐个执行
//! - **附加**: 打开会话并启用所需的域，失败时有限次重试
//! - **空闲释放**: 一段时间没有活动后自动分离
//! - **强制重置**: 会话失效、致命错误、错误过多或浏览器端关闭时重置，并清除该资源的缓存
//!
//! ## 模块结构
//! - `types`: 状态、配置和单次调用选项
//! - `manager`: 会话管理器实现
//! - `context`: 串行化操作可用的上下文
//!
//! ## 使用示例
//! ```rust,no_run
//! use ax_oxide::cache::CacheConfig;
//! use ax_oxide::cdp::CdpDebugger;
//! use ax_oxide::session::{ExecuteOptions, SessionConfig, SessionManager};
//! use ax_oxide::types::ResourceId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let debugger = CdpDebugger::connect("http://localhost:9222").await?;
//! let manager = SessionManager::new(
//!     debugger.clone(),
//!     debugger,
//!     SessionConfig::default(),
//!     &CacheConfig::default(),
//! );
//!
//! let tab = ResourceId::parse("8F2A6C1D0E9B4C7A9E3D2B1A0F9E8D7C")?;
//! let root = manager
//!     .execute_serialized(&tab, ExecuteOptions::default(), |ctx| async move {
//!         ctx.client().get_document(1, false).await
//!     })
//!     .await?;
//! println!("document node {}", root.node_id);
//! # Ok(())
//! # }
//! ```

pub mod types;
pub mod manager;
pub mod context;


pub use context::SessionContext;
pub use manager::{SessionManager, SweepOutcome};
pub use types::{ExecuteOptions, SessionConfig, SessionSnapshot, SessionState, REQUIRED_DOMAINS};
