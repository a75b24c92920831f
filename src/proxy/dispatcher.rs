//! Protocol dispatch for single proxy checks

use crate::error::{FailureKind, ProbeError};
use crate::proxy::models::{ProbeOutcome, ProxyEndpoint, ProxyType};
use crate::proxy::probe::{ForwardingProbe, ProbeSettings, ProtocolProbe, SocksProbe, Transport};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Error text for protocols outside http/https/socks4/socks5
pub const UNSUPPORTED_PROTOCOL: &str = "unsupported protocol";

/// Routes each endpoint to the probe for its protocol
///
/// `dispatch` never fails: unsupported protocols, malformed endpoints and
/// panicking probes all come back as non-alive outcomes.
pub struct ProxyDispatcher<T> {
    forwarding: ForwardingProbe<T>,
    socks: SocksProbe<T>,
}

impl<T: Transport> ProxyDispatcher<T> {
    pub fn new(transport: Arc<T>, settings: ProbeSettings) -> Self {
        Self {
            forwarding: ForwardingProbe::new(Arc::clone(&transport), settings.clone()),
            socks: SocksProbe::new(transport, settings),
        }
    }

    pub async fn dispatch(&self, endpoint: &ProxyEndpoint, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();

        let Some(proxy_type) = endpoint.proxy_type() else {
            debug!(proxy = %endpoint, "unsupported protocol '{}'", endpoint.protocol);
            return ProbeOutcome::dead(
                endpoint.clone(),
                ProbeError::new(FailureKind::Unsupported, UNSUPPORTED_PROTOCOL),
                start.elapsed(),
            );
        };

        if let Err(err) = validate_endpoint(endpoint) {
            debug!(proxy = %endpoint, error = %err, "rejected endpoint");
            return ProbeOutcome::dead(endpoint.clone(), err, start.elapsed());
        }

        let result = match proxy_type {
            ProxyType::Http | ProxyType::Https => {
                guarded(self.forwarding.probe(endpoint, timeout)).await
            }
            ProxyType::Socks4 | ProxyType::Socks5 => {
                guarded(self.socks.probe(endpoint, timeout)).await
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(proxy = %endpoint, "probe panicked: {}", message);
                ProbeOutcome::dead(
                    endpoint.clone(),
                    ProbeError::new(FailureKind::Panicked, message),
                    start.elapsed(),
                )
            }
        }
    }
}

/// Endpoints must carry an address and a non-zero port before any I/O
fn validate_endpoint(endpoint: &ProxyEndpoint) -> Result<(), ProbeError> {
    if endpoint.address.trim().is_empty() {
        return Err(ProbeError::new(
            FailureKind::InvalidEndpoint,
            "invalid endpoint: missing address",
        ));
    }
    if endpoint.port == 0 {
        return Err(ProbeError::new(
            FailureKind::InvalidEndpoint,
            "invalid endpoint: missing or zero port",
        ));
    }
    Ok(())
}

async fn guarded<F>(probe: F) -> std::thread::Result<ProbeOutcome>
where
    F: Future<Output = ProbeOutcome>,
{
    AssertUnwindSafe(probe).catch_unwind().await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "probe panicked".to_string()
    }
}
