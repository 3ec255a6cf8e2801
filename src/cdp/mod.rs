//! # Chrome DevTools Protocol (CDP) 层
//!
//! 提供与浏览器的 WebSocket 通信，每个目标使用独立的扁平化会话，并封装 DOM、
//! Accessibility、Page 和 Runtime 域的常用命令。
//!
//! ## 模块结构
//! - `traits`: 连接、调试器和框架目录的 trait 定义
//! - `types`: CDP 协议相关的数据类型
//! - `classify`: 将协议错误文本转换为类型化错误（唯一入口）
//! - `connection`: WebSocket 连接实现
//! - `debugger`: 浏览器级别的调试器，每个目标一个会话
//! - `client`: 绑定到单个资源的类型化命令
//! - `mock`: 用于测试的 Mock 实现
//!
//! ## 使用示例
//! ```rust,no_run
//! use ax_oxide::cdp::{CdpDebugger, Debugger, SessionClient};
//! use ax_oxide::types::ResourceId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let debugger = CdpDebugger::connect("http://localhost:9222").await?;
//! let tab = ResourceId::parse("8F2A6C1D0E9B4C7A9E3D2B1A0F9E8D7C")?;
//! debugger.attach(&tab).await?;
//!
//! let client = SessionClient::new(debugger.clone(), tab);
//! let root = client.get_document(0, false).await?;
//! println!("document node {}", root.node_id);
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod types;
pub mod classify;
pub mod connection;
pub mod debugger;
pub mod client;
pub mod mock;

pub use traits::{
    CdpConnection, CdpEvent, CdpResponse, Debugger, DetachEvent, DetachReason,
    FrameDirectory, NavigationFrame,
};

pub use connection::CdpWebSocketConnection;
pub use debugger::{CdpDebugger, TargetInfo};
pub use client::SessionClient;

pub use mock::{MockDebugger, MockFrameDirectory};
