//! Identifiers shared by the session, cache and resolution layers

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_RESOURCE_ID_LEN: usize = 128;

/// Inspected resource (a CDP target id, one per tab)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Validate and wrap a target id.
    ///
    /// Target ids are opaque tokens; anything outside `[A-Za-z0-9_.-]` is rejected so the
    /// id can never smuggle protocol syntax into a command.
    pub fn parse<S: AsRef<str>>(raw: S) -> Result<Self> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(Error::invalid_input("resource id is empty"));
        }
        if raw.len() > MAX_RESOURCE_ID_LEN {
            return Err(Error::invalid_input("resource id is too long"));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(Error::invalid_input(format!("malformed resource id: {}", raw)));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frame handle as known to the host layer; `0` is the top-level frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct FrameHandle(pub i64);

impl FrameHandle {
    pub const MAIN: FrameHandle = FrameHandle(0);

    /// Validate a raw handle from a request
    pub fn parse(raw: i64) -> Result<Self> {
        if raw < 0 {
            return Err(Error::invalid_input(format!("malformed frame handle: {}", raw)));
        }
        Ok(Self(raw))
    }

    pub fn is_main(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document scope a node id belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameScope {
    /// Top-level document
    Main,
    /// A sub-frame, by protocol frame id
    Frame(String),
}

impl FrameScope {
    pub fn protocol_frame_id(&self) -> Option<&str> {
        match self {
            FrameScope::Main => None,
            FrameScope::Frame(id) => Some(id),
        }
    }
}

impl fmt::Display for FrameScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameScope::Main => f.write_str("main"),
            FrameScope::Frame(id) => write!(f, "frame:{}", id),
        }
    }
}

/// Protocol node id together with the scope it was resolved under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNode {
    pub node_id: i64,
    pub scope: FrameScope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_accepts_target_ids() {
        let id = ResourceId::parse("8F2A6C1D0E9B4C7A9E3D2B1A0F9E8D7C").unwrap();
        assert_eq!(id.as_str(), "8F2A6C1D0E9B4C7A9E3D2B1A0F9E8D7C");
        assert!(ResourceId::parse(" tab-1 ").is_ok());
    }

    #[test]
    fn test_resource_id_rejects_garbage() {
        assert!(matches!(ResourceId::parse(""), Err(Error::InvalidInput(_))));
        assert!(matches!(ResourceId::parse("a\"b"), Err(Error::InvalidInput(_))));
        assert!(matches!(
            ResourceId::parse("x".repeat(200)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_frame_handle_validation() {
        assert!(FrameHandle::parse(0).unwrap().is_main());
        assert!(!FrameHandle::parse(7).unwrap().is_main());
        assert!(FrameHandle::parse(-1).is_err());
    }
}
