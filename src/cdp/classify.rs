//! Classification of raw protocol failures.
//!
//! This is the only place that looks at CDP error text. Everything above the transport
//! matches on [`Error`] variants instead.

use super::types::CdpErrorDetail;
use crate::error::{Error, SessionFault};

/// Turn a CDP error payload into a typed error
pub fn protocol_error(method: &str, detail: &CdpErrorDetail) -> Error {
    let message = detail.message.to_ascii_lowercase();
    let described = format!("{} failed: {} (code: {})", method, detail.message, detail.code);

    if message.contains("already attached") || message.contains("another debugger") {
        Error::AlreadyAttached(described)
    } else if message.contains("permission")
        || message.contains("cannot access")
        || message.contains("not allowed")
    {
        Error::PermissionDenied(described)
    } else if message.contains("not attached")
        || message.contains("session with given id not found")
        || message.contains("no session")
    {
        Error::session_unavailable(SessionFault::NotAttached, described)
    } else if message.contains("no target with given id")
        || message.contains("target closed")
        || message.contains("no tab with given id")
        || message.contains("target crashed")
    {
        Error::session_unavailable(SessionFault::TargetClosed, described)
    } else if message.contains("could not find node")
        || message.contains("no node with given id")
        || message.contains("node not found")
    {
        Error::not_found(described)
    } else {
        Error::cdp(described)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(message: &str) -> CdpErrorDetail {
        CdpErrorDetail {
            code: -32000,
            message: message.to_string(),
            data: None,
        }
    }

    #[test]
    fn test_attach_refusals() {
        assert!(matches!(
            protocol_error("Target.attachToTarget", &detail("Another debugger is already attached")),
            Error::AlreadyAttached(_)
        ));
        assert!(matches!(
            protocol_error("Target.attachToTarget", &detail("Cannot access a chrome:// URL")),
            Error::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_session_loss() {
        assert!(matches!(
            protocol_error("DOM.getDocument", &detail("Session with given id not found.")),
            Error::SessionUnavailable {
                fault: SessionFault::NotAttached,
                ..
            }
        ));
        assert!(matches!(
            protocol_error("Target.attachToTarget", &detail("No target with given id found")),
            Error::SessionUnavailable {
                fault: SessionFault::TargetClosed,
                ..
            }
        ));
    }

    #[test]
    fn test_stale_node_and_fallback() {
        assert!(matches!(
            protocol_error("DOM.getAttributes", &detail("Could not find node with given id")),
            Error::NotFound(_)
        ));
        let err = protocol_error("DOM.querySelector", &detail("DOM Error while querying"));
        assert!(matches!(err, Error::Cdp(_)));
        assert!(err.to_string().contains("DOM.querySelector"));
    }
}
