//! Open Proxy - Proxy Liveness Checker
//!
//! Loads candidate proxy lists and checks which proxies are alive by routing
//! a reference request through each one, many at a time.

pub mod error;
pub mod proxy;

pub use error::{ConfigError, FailureKind, ProbeError};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
