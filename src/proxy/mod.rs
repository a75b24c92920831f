//! Proxy module for loading and checking proxies
//!
//! This module provides functionality for:
//! - Parsing candidate lists from text and JSON
//! - Probing HTTP/HTTPS proxies by forwarding and SOCKS4/SOCKS5 proxies by tunnelling
//! - Checking whole lists concurrently with a bounded worker pool
//! - Collecting and saving the proxies found alive

pub mod accumulator;
pub mod checker;
pub mod dispatcher;
pub mod models;
pub mod parser;
pub mod probe;
pub mod report;

pub use accumulator::ResultAccumulator;
pub use checker::{BatchRunner, BatchSummary, CheckerConfig, OutcomeSender};
pub use dispatcher::{ProxyDispatcher, UNSUPPORTED_PROTOCOL};
pub use models::{ProbeOutcome, ProbeStatus, ProxyEndpoint, ProxyType, VerifiedProxy};
pub use parser::{ListFormat, ProxyParser};
pub use probe::{
    ForwardingProbe, ProbeSettings, ProtocolProbe, ReqwestTransport, Route, SocksProbe,
    SocksVersion, Transport, TransportResponse,
};
