//! ax-oxide: accessibility inspection over the Chrome DevTools Protocol
//!
//! This library resolves DOM elements in browser tabs to normalized accessibility records,
//! with one serialized debugging session per tab and short-lived resolution caches. A
//! WebSocket JSON server exposes it to clients.

pub mod error;
pub mod config;
pub mod types;

pub mod cache;
pub mod cdp;
pub mod frame;
pub mod session;
pub mod inspect;
pub mod service;
pub mod server;

// Re-exports
pub use error::{Error, Result};

/// ax-oxide library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
