//! Unified error types for ax-oxide

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Why a debugging session could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFault {
    /// A command was issued against a session that is no longer open
    NotAttached,
    /// The remote target (tab) no longer exists
    TargetClosed,
    /// The session could not be opened
    AttachFailed,
}

impl std::fmt::Display for SessionFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SessionFault::NotAttached => "not attached",
            SessionFault::TargetClosed => "target closed",
            SessionFault::AttachFailed => "attach failed",
        };
        f.write_str(text)
    }
}

/// Unified error type for ax-oxide
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed resource id, frame handle or selector
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The session for the resource is not usable
    #[error("Session unavailable ({fault}): {message}")]
    SessionUnavailable {
        fault: SessionFault,
        message: String,
    },

    /// Another client already owns the debugging session
    #[error("Already attached: {0}")]
    AlreadyAttached(String),

    /// The browser refused to open a debugging session
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Selector or live reference did not resolve to a node
    #[error("{0}")]
    NotFound(String),

    /// Retryable failure
    #[error("Transient error: {0}")]
    Transient(String),

    /// Retry budget exceeded or the remote resource is gone
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// CDP protocol errors that matched no more specific class
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Script execution failed
    #[error("Script execution failed: {0}")]
    ScriptExecutionFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new session unavailable error
    pub fn session_unavailable<S: Into<String>>(fault: SessionFault, msg: S) -> Self {
        Error::SessionUnavailable {
            fault,
            message: msg.into(),
        }
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new transient error
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        Error::Transient(msg.into())
    }

    /// Create a new fatal error
    pub fn fatal<S: Into<String>>(msg: S) -> Self {
        Error::Fatal(msg.into())
    }

    /// Create a new WebSocket error
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        Error::WebSocket(msg.into())
    }

    /// Create a new CDP error
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new script execution failed error
    pub fn script_execution_failed<S: Into<String>>(msg: S) -> Self {
        Error::ScriptExecutionFailed(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether attaching again could succeed
    pub fn is_retryable_attach(&self) -> bool {
        !matches!(
            self,
            Error::AlreadyAttached(_)
                | Error::PermissionDenied(_)
                | Error::InvalidInput(_)
                | Error::Fatal(_)
                | Error::SessionUnavailable {
                    fault: SessionFault::TargetClosed,
                    ..
                }
        )
    }

    /// Whether the session this error was observed on must be discarded immediately
    pub fn invalidates_session(&self) -> bool {
        matches!(
            self,
            Error::SessionUnavailable { .. } | Error::Fatal(_) | Error::WebSocket(_)
        )
    }

    /// Whether the error says something about the session's health.
    ///
    /// Rejected input and unresolved nodes are valid outcomes, not session failures.
    pub fn counts_against_session(&self) -> bool {
        !matches!(self, Error::InvalidInput(_) | Error::NotFound(_))
    }
}
