//! Proxy data models

use crate::error::{FailureKind, ProbeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Proxy protocols the checker knows how to probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyType {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyType {
    /// Case-insensitive lookup. Anything else, including "", is unsupported.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" => Some(ProxyType::Http),
            "https" => Some(ProxyType::Https),
            "socks4" => Some(ProxyType::Socks4),
            "socks5" => Some(ProxyType::Socks5),
            _ => None,
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

/// A candidate proxy as read from input
///
/// The protocol is kept as the raw input string so unsupported values reach
/// the dispatcher and are reported rather than dropped by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub address: String,
    pub port: u16,
    pub protocol: String,
}

impl ProxyEndpoint {
    pub fn new(address: impl Into<String>, port: u16, protocol: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            protocol: protocol.into(),
        }
    }

    /// Parsed protocol, or `None` when unsupported
    pub fn proxy_type(&self) -> Option<ProxyType> {
        ProxyType::parse(&self.protocol)
    }

    /// Host part suitable for a URL authority (IPv6 literals are bracketed)
    pub fn host(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        }
    }

    /// Get the proxy string in IP:PORT format
    pub fn to_simple_string(&self) -> String {
        format!("{}:{}", self.host(), self.port)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.protocol.to_uppercase(),
            self.to_simple_string()
        )
    }
}

/// Result branch of a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The reference request came back through the proxy
    Alive {
        status_code: u16,
        body_excerpt: String,
    },
    /// The probe failed before a response arrived
    Dead { kind: FailureKind, error: String },
}

/// Outcome of probing one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub endpoint: ProxyEndpoint,
    pub status: ProbeStatus,
    /// Wall-clock time from dispatch to resolution, success or failure
    pub elapsed: Duration,
}

impl ProbeOutcome {
    pub fn alive(
        endpoint: ProxyEndpoint,
        status_code: u16,
        body_excerpt: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            endpoint,
            status: ProbeStatus::Alive {
                status_code,
                body_excerpt,
            },
            elapsed,
        }
    }

    pub fn dead(endpoint: ProxyEndpoint, err: ProbeError, elapsed: Duration) -> Self {
        Self {
            endpoint,
            status: ProbeStatus::Dead {
                kind: err.kind,
                error: err.message,
            },
            elapsed,
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.status, ProbeStatus::Alive { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.status {
            ProbeStatus::Alive { status_code, .. } => Some(*status_code),
            ProbeStatus::Dead { .. } => None,
        }
    }

    pub fn body_excerpt(&self) -> Option<&str> {
        match &self.status {
            ProbeStatus::Alive { body_excerpt, .. } => Some(body_excerpt),
            ProbeStatus::Dead { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ProbeStatus::Alive { .. } => None,
            ProbeStatus::Dead { error, .. } => Some(error),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            ProbeStatus::Alive { .. } => None,
            ProbeStatus::Dead { kind, .. } => Some(*kind),
        }
    }

    /// Project an alive outcome into the record kept by the accumulator
    pub fn verified(&self, index: usize) -> Option<VerifiedProxy> {
        let status_code = self.status_code()?;
        Some(VerifiedProxy {
            index,
            address: self.endpoint.address.clone(),
            port: self.endpoint.port,
            protocol: self.endpoint.protocol.clone(),
            status_code,
            elapsed: self.elapsed,
        })
    }
}

/// A proxy confirmed alive during the current run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedProxy {
    /// Position of the endpoint in the input list
    pub index: usize,
    #[serde(rename = "ip")]
    pub address: String,
    pub port: u16,
    pub protocol: String,
    #[serde(rename = "code")]
    pub status_code: u16,
    #[serde(rename = "ping", with = "duration_secs")]
    pub elapsed: Duration,
}

impl VerifiedProxy {
    pub fn endpoint(&self) -> ProxyEndpoint {
        ProxyEndpoint::new(self.address.clone(), self.port, self.protocol.clone())
    }
}

/// Durations are written as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
