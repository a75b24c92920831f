//! Loading candidate lists and saving verified proxies

use crate::proxy::models::{ProxyEndpoint, VerifiedProxy};
use crate::Result;
use anyhow::{anyhow, Context};
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Port assumed when a JSON record has none
pub const DEFAULT_PORT: u16 = 8080;

/// On-disk encodings for proxy lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    Text,
    Json,
}

impl ListFormat {
    /// Pick a format from a file extension, text unless it ends in `.json`
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ListFormat::Json,
            _ => ListFormat::Text,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "txt" | "text" => Some(ListFormat::Text),
            "json" => Some(ListFormat::Json),
            _ => None,
        }
    }
}

/// Proxy list parser for text and JSON inputs
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single text line
    ///
    /// Supports formats:
    /// - IP:PORT PROTOCOL
    /// - scheme://IP:PORT
    /// - IP:PORT (protocol taken from `default_protocol`)
    pub fn parse_line(line: &str, default_protocol: &str) -> Option<ProxyEndpoint> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        if let Some(endpoint) = Self::parse_url_format(line) {
            return Some(endpoint);
        }

        let mut fields = line.split_whitespace();
        let address_part = fields.next()?;
        let protocol = fields.next().unwrap_or(default_protocol);
        let (address, port) = Self::split_host_port(address_part)?;
        Some(ProxyEndpoint::new(address, port, protocol))
    }

    /// Parse URL format proxy (e.g., http://ip:port or socks5://ip:port)
    fn parse_url_format(line: &str) -> Option<ProxyEndpoint> {
        let re = Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*)://(\[[^\]]+\]|[^:/\s]+):(\d+)/?$").ok()?;

        let caps = re.captures(line)?;
        let address = caps[2].trim_start_matches('[').trim_end_matches(']');
        let port: u16 = caps[3].parse().ok()?;
        Some(ProxyEndpoint::new(address, port, &caps[1]))
    }

    fn split_host_port(s: &str) -> Option<(String, u16)> {
        let (host, port) = s.rsplit_once(':')?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port: u16 = port.parse().ok()?;
        if host.is_empty() {
            return None;
        }
        Some((host.to_string(), port))
    }

    /// Parse proxies from a string (multiple lines)
    pub fn parse_string(content: &str, default_protocol: &str) -> Vec<ProxyEndpoint> {
        content
            .lines()
            .enumerate()
            .filter_map(|(n, line)| {
                let parsed = Self::parse_line(line, default_protocol);
                let trimmed = line.trim();
                if parsed.is_none() && !trimmed.is_empty() && !trimmed.starts_with('#') {
                    warn!("skipping unparseable line {}: {}", n + 1, trimmed);
                }
                parsed
            })
            .collect()
    }

    /// Parse a JSON proxy list
    ///
    /// Accepts a top-level array or an object whose `data` field holds the
    /// array. Each record may use `ip` or `address`, a numeric or string
    /// `port` (default 8080), and `protocol` or a `protocols` array.
    pub fn parse_json(content: &str) -> Result<Vec<ProxyEndpoint>> {
        let value: Value = serde_json::from_str(content).context("invalid JSON proxy list")?;
        let records = match &value {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("data") {
                Some(Value::Array(items)) => items,
                _ => return Err(anyhow!("JSON object has no 'data' array")),
            },
            _ => return Err(anyhow!("JSON proxy list must be an array")),
        };

        Ok(records
            .iter()
            .enumerate()
            .filter_map(|(n, record)| {
                let endpoint = Self::endpoint_from_json(record);
                if endpoint.is_none() {
                    warn!("skipping JSON record {}: not an object", n);
                }
                endpoint
            })
            .collect())
    }

    fn endpoint_from_json(record: &Value) -> Option<ProxyEndpoint> {
        let obj = record.as_object()?;

        let address = obj
            .get("ip")
            .or_else(|| obj.get("address"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        // Unusable ports become 0 so the dispatcher reports them as invalid.
        let port = match obj.get("port") {
            None | Some(Value::Null) => DEFAULT_PORT,
            Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()).unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            Some(_) => 0,
        };

        let protocol = match obj.get("protocol") {
            Some(Value::String(s)) => s.trim().to_string(),
            _ => obj
                .get("protocols")
                .and_then(Value::as_array)
                .and_then(|list| list.first())
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };

        Some(ProxyEndpoint::new(address, port, protocol))
    }

    /// Parse proxies from a file in the given format
    pub fn parse_file<P: AsRef<Path>>(
        path: P,
        format: ListFormat,
        default_protocol: &str,
    ) -> Result<Vec<ProxyEndpoint>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read proxy list {}", path.display()))?;
        match format {
            ListFormat::Text => Ok(Self::parse_string(&content, default_protocol)),
            ListFormat::Json => Self::parse_json(&content),
        }
    }

    /// Render verified proxies in the given format
    pub fn render(proxies: &[VerifiedProxy], format: ListFormat) -> Result<String> {
        match format {
            ListFormat::Json => Ok(serde_json::to_string_pretty(proxies)?),
            ListFormat::Text => Ok(proxies
                .iter()
                .map(|p| format!("{} {}", p.endpoint().to_simple_string(), p.protocol))
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// Save verified proxies to a file
    pub fn save_to_file<P: AsRef<Path>>(
        proxies: &[VerifiedProxy],
        path: P,
        format: ListFormat,
    ) -> Result<()> {
        let path = path.as_ref();
        let content = Self::render(proxies, format)?;
        fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}
