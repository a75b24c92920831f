//! Error types for the proxy checker

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Configuration problems detected before any probing starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    WorkerCount,

    #[error("timeout of {0}s exceeds the maximum of {1}s")]
    Timeout(u64, u64),

    #[error("invalid reference target '{0}': {1}")]
    ReferenceTarget(String, String),

    #[error("excerpt length must be at least 1")]
    ExcerptLen,
}

/// Coarse classification of why a probe failed
///
/// Outcomes only expose the message; the kind is kept for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unsupported,
    InvalidEndpoint,
    Refused,
    Timeout,
    Negotiation,
    Dns,
    Request,
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Unsupported => "unsupported",
            FailureKind::InvalidEndpoint => "invalid-endpoint",
            FailureKind::Refused => "refused",
            FailureKind::Timeout => "timeout",
            FailureKind::Negotiation => "negotiation",
            FailureKind::Dns => "dns",
            FailureKind::Request => "request",
            FailureKind::Panicked => "panicked",
        };
        write!(f, "{}", name)
    }
}

/// A failed probe attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProbeError {
    pub kind: FailureKind,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Refused, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// Build a probe error from a reqwest failure, walking the source chain
    /// so nested causes such as "Connection refused" survive into the message.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        Self::from_chain(err, err.is_timeout())
    }

    fn from_chain(err: &(dyn StdError + 'static), timed_out: bool) -> Self {
        let mut message = describe_chain(err);
        let kind = if timed_out {
            FailureKind::Timeout
        } else {
            classify_chain(err, &message)
        };
        // SOCKS connectors drop the io error when the proxy port is closed.
        if kind == FailureKind::Refused && !message.to_lowercase().contains("refused") {
            message.push_str(": proxy unreachable: connection refused");
        }
        Self::new(kind, message)
    }
}

/// Message reqwest's SOCKS connector reports when the TCP connect to the
/// proxy itself fails
const SOCKS_CONNECT_FAILED: &str = "failed to create underlying connection";

/// Join an error and all of its sources with ": "
pub fn describe_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if parts.last().map_or(true, |last| !last.contains(&text)) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}

fn classify_chain(err: &(dyn StdError + 'static), message: &str) -> FailureKind {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return FailureKind::Refused,
                std::io::ErrorKind::TimedOut => return FailureKind::Timeout,
                _ => {}
            }
        }
        source = cause.source();
    }

    let lower = message.to_lowercase();
    if lower.contains("refused") || lower.contains(SOCKS_CONNECT_FAILED) {
        FailureKind::Refused
    } else if lower.contains("timed out") || lower.contains("deadline") {
        FailureKind::Timeout
    } else if lower.contains("dns") || lower.contains("resolve") || lower.contains("lookup") {
        FailureKind::Dns
    } else if lower.contains("socks") || lower.contains("proxy") || lower.contains("tunnel") {
        FailureKind::Negotiation
    } else {
        FailureKind::Request
    }
}
