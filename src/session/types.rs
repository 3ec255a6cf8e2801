//! Session state, settings and per-call options

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Domains enabled, in this order, on every fresh session
pub const REQUIRED_DOMAINS: [&str; 4] = ["DOM", "Accessibility", "Page", "Runtime"];

/// Debugging-session state of one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Detached,
    Attaching,
    Attached,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionState::Detached => "DETACHED",
            SessionState::Attaching => "ATTACHING",
            SessionState::Attached => "ATTACHED",
        };
        f.write_str(text)
    }
}

/// Session manager settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity after which the session is released
    pub idle_timeout: Duration,
    /// Attach attempts before giving up
    pub attach_max_attempts: u32,
    /// Base delay between attach attempts, multiplied by the attempt number
    pub attach_backoff: Duration,
    /// Counted errors tolerated before the session is reset
    pub max_error_count: u32,
    /// Lifetime of cached isolated-world execution contexts
    pub frame_context_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            attach_max_attempts: 3,
            attach_backoff: Duration::from_millis(100),
            max_error_count: 3,
            frame_context_ttl: Duration::from_secs(5),
        }
    }
}

/// How [`super::SessionManager::execute_serialized`] treats one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Attach before running the operation
    pub attach: bool,
    /// Arm the idle-release timer afterwards
    pub schedule_idle: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            attach: true,
            schedule_idle: true,
        }
    }
}

impl ExecuteOptions {
    /// Run in the resource's queue without opening a session
    pub fn without_attach() -> Self {
        Self {
            attach: false,
            schedule_idle: false,
        }
    }

    pub fn without_idle(mut self) -> Self {
        self.schedule_idle = false;
        self
    }
}

/// Point-in-time view of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub retry_count: u32,
    pub idle_ms: u64,
    pub frame_contexts: usize,
    pub idle_release_pending: bool,
}
