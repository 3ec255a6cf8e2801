//! CDP (Chrome DevTools Protocol) layer traits
//!
//! This module defines the abstract interfaces for CDP communication.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::types::{FrameHandle, ResourceId};
use crate::Error;

/// CDP event representation
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// Event method (e.g., "Target.detachedFromTarget")
    pub method: String,
    /// Event parameters
    pub params: Value,
    /// Session ID (for multi-session targets)
    pub session_id: Option<String>,
}

/// CDP response representation
#[derive(Debug, Clone)]
pub struct CdpResponse {
    /// Response ID (matches request ID)
    pub id: u64,
    /// Response result
    pub result: Option<Value>,
}

/// CDP connection trait
///
/// Represents a WebSocket connection to a Chrome DevTools Protocol endpoint.
#[async_trait]
pub trait CdpConnection: Send + Sync + std::fmt::Debug {
    /// Send a CDP command and wait for response.
    ///
    /// Protocol-level failures come back already classified (see [`super::classify`]).
    async fn send_command(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<CdpResponse, Error>;

    /// Subscribe to CDP events
    async fn listen_events(&self) -> Result<mpsc::Receiver<CdpEvent>, Error>;

    /// Close the connection
    async fn close(&self) -> Result<(), Error>;

    /// Check if connection is active
    fn is_active(&self) -> bool;
}

/// Why a debugging session ended without being asked to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachReason {
    /// The browser detached the session (tab closed, devtools took over, ...)
    TargetDetached(String),
    /// The target was destroyed
    TargetDestroyed,
    /// The connection to the browser was lost
    ConnectionLost,
}

/// Session-closed notification for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachEvent {
    pub resource: ResourceId,
    pub reason: DetachReason,
}

/// Exclusive per-resource debugging transport.
///
/// One session per resource; every command names the resource it targets.
#[async_trait]
pub trait Debugger: Send + Sync + std::fmt::Debug {
    /// Open the debugging session for `resource`
    async fn attach(&self, resource: &ResourceId) -> Result<(), Error>;

    /// Close the debugging session for `resource`
    async fn detach(&self, resource: &ResourceId) -> Result<(), Error>;

    /// Issue a protocol command against the resource's session
    async fn send_command(
        &self,
        resource: &ResourceId,
        method: &str,
        params: Value,
    ) -> Result<Value, Error>;

    /// Sessions closed by the browser side
    fn subscribe_detach(&self) -> broadcast::Receiver<DetachEvent>;
}

/// Frame as known to the host (navigation) layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationFrame {
    pub handle: FrameHandle,
    pub parent: Option<FrameHandle>,
    pub url: String,
}

/// Navigation-level frame listing, the identifier space logical frame handles live in
#[async_trait]
pub trait FrameDirectory: Send + Sync + std::fmt::Debug {
    async fn list_frames(&self, resource: &ResourceId) -> Result<Vec<NavigationFrame>, Error>;
}
