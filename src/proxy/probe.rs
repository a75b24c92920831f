//! Per-protocol connectivity probes
//!
//! Every probe builds its own transport for the single request it makes, so
//! no routing state is shared between concurrent checks.

use crate::error::{describe_chain, FailureKind, ProbeError};
use crate::proxy::models::{ProbeOutcome, ProxyEndpoint, ProxyType};
use reqwest::{Client, Proxy as ReqwestProxy};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// SOCKS protocol revision used for a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksVersion {
    V4,
    V5,
}

/// How the reference request reaches the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// HTTP forwarding proxy; http and https traffic both go to the same address
    Forward { host: String, port: u16 },
    /// SOCKS tunnel carrying the request's TCP connection
    Socks {
        version: SocksVersion,
        host: String,
        port: u16,
    },
}

impl Route {
    pub fn forward(endpoint: &ProxyEndpoint) -> Self {
        Route::Forward {
            host: endpoint.host(),
            port: endpoint.port,
        }
    }

    pub fn socks(endpoint: &ProxyEndpoint, version: SocksVersion) -> Self {
        Route::Socks {
            version,
            host: endpoint.host(),
            port: endpoint.port,
        }
    }

    /// Proxy URL understood by reqwest
    pub fn proxy_url(&self) -> String {
        match self {
            Route::Forward { host, port } => format!("http://{}:{}", host, port),
            Route::Socks {
                version: SocksVersion::V4,
                host,
                port,
            } => format!("socks4://{}:{}", host, port),
            Route::Socks {
                version: SocksVersion::V5,
                host,
                port,
            } => format!("socks5://{}:{}", host, port),
        }
    }
}

/// What came back from the reference target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: String,
}

/// Issues one GET against `target` through `route`
pub trait Transport: Send + Sync + 'static {
    fn fetch(
        &self,
        route: &Route,
        target: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<TransportResponse, ProbeError>> + Send;
}

/// Transport backed by a fresh reqwest client per request
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    /// Create a reqwest client routed through the given proxy
    fn create_client(route: &Route, timeout: Duration) -> Result<Client, ProbeError> {
        let proxy = ReqwestProxy::all(route.proxy_url())
            .map_err(|e| ProbeError::new(FailureKind::Negotiation, describe_chain(&e)))?;

        Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProbeError::new(FailureKind::Request, describe_chain(&e)))
    }
}

impl Transport for ReqwestTransport {
    async fn fetch(
        &self,
        route: &Route,
        target: &str,
        timeout: Duration,
    ) -> Result<TransportResponse, ProbeError> {
        let client = Self::create_client(route, timeout)?;
        let response = client
            .get(target)
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(&e))?;
        let status_code = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::from_reqwest(&e))?;
        Ok(TransportResponse { status_code, body })
    }
}

/// One connectivity test for one proxy
pub trait ProtocolProbe: Send + Sync {
    fn probe(
        &self,
        endpoint: &ProxyEndpoint,
        timeout: Duration,
    ) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Settings shared by both probe variants
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub reference_target: Arc<str>,
    pub excerpt_len: usize,
}

/// Probe for http/https proxies
pub struct ForwardingProbe<T> {
    transport: Arc<T>,
    settings: ProbeSettings,
}

impl<T: Transport> ForwardingProbe<T> {
    pub fn new(transport: Arc<T>, settings: ProbeSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }
}

impl<T: Transport> ProtocolProbe for ForwardingProbe<T> {
    async fn probe(&self, endpoint: &ProxyEndpoint, timeout: Duration) -> ProbeOutcome {
        let route = Route::forward(endpoint);
        run_probe(&*self.transport, &route, endpoint, &self.settings, timeout).await
    }
}

/// Probe for socks4/socks5 proxies
pub struct SocksProbe<T> {
    transport: Arc<T>,
    settings: ProbeSettings,
}

impl<T: Transport> SocksProbe<T> {
    pub fn new(transport: Arc<T>, settings: ProbeSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }
}

impl<T: Transport> ProtocolProbe for SocksProbe<T> {
    async fn probe(&self, endpoint: &ProxyEndpoint, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        let version = match endpoint.proxy_type() {
            Some(ProxyType::Socks4) => SocksVersion::V4,
            Some(ProxyType::Socks5) => SocksVersion::V5,
            _ => {
                return ProbeOutcome::dead(
                    endpoint.clone(),
                    ProbeError::new(FailureKind::Unsupported, "unsupported protocol"),
                    start.elapsed(),
                )
            }
        };
        let route = Route::socks(endpoint, version);
        run_probe(&*self.transport, &route, endpoint, &self.settings, timeout).await
    }
}

async fn run_probe<T: Transport>(
    transport: &T,
    route: &Route,
    endpoint: &ProxyEndpoint,
    settings: &ProbeSettings,
    timeout: Duration,
) -> ProbeOutcome {
    let start = Instant::now();

    let result = if timeout.is_zero() {
        Err(ProbeError::timeout("timed out: timeout is zero"))
    } else {
        match tokio::time::timeout(
            timeout,
            transport.fetch(route, &settings.reference_target, timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProbeError::timeout(format!(
                "timed out after {:.1}s",
                timeout.as_secs_f64()
            ))),
        }
    };
    let elapsed = start.elapsed();

    match result {
        Ok(response) => {
            debug!(
                proxy = %endpoint,
                status = response.status_code,
                elapsed_ms = elapsed.as_millis() as u64,
                "proxy online"
            );
            ProbeOutcome::alive(
                endpoint.clone(),
                response.status_code,
                excerpt(&response.body, settings.excerpt_len),
                elapsed,
            )
        }
        Err(err) => {
            debug!(proxy = %endpoint, kind = %err.kind, error = %err.message, "proxy offline");
            ProbeOutcome::dead(endpoint.clone(), err, elapsed)
        }
    }
}

/// First `len` characters of `text`
pub fn excerpt(text: &str, len: usize) -> String {
    text.chars().take(len).collect()
}
