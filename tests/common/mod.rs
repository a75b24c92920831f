#![allow(dead_code)]

use open_proxy::{ProbeError, Route, Transport, TransportResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How the mock answers for a given proxy host
#[derive(Debug, Clone)]
pub enum Behavior {
    Respond { status: u16, body: String, delay: Duration },
    Refuse,
    Hang,
}

/// Deterministic transport keyed by proxy host
#[derive(Default)]
pub struct MockTransport {
    behaviors: HashMap<String, Behavior>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    routes: Mutex<Vec<Route>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alive(self, host: &str, status: u16) -> Self {
        self.alive_after(host, status, Duration::ZERO)
    }

    pub fn alive_after(mut self, host: &str, status: u16, delay: Duration) -> Self {
        self.behaviors.insert(
            host.to_string(),
            Behavior::Respond {
                status,
                body: format!("hello from {}", host),
                delay,
            },
        );
        self
    }

    pub fn hang(mut self, host: &str) -> Self {
        self.behaviors.insert(host.to_string(), Behavior::Hang);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

fn route_host(route: &Route) -> &str {
    match route {
        Route::Forward { host, .. } => host,
        Route::Socks { host, .. } => host,
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    async fn fetch(
        &self,
        route: &Route,
        _target: &str,
        _timeout: Duration,
    ) -> Result<TransportResponse, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.routes.lock().unwrap().push(route.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        // Yield so concurrent probes overlap even without delays.
        tokio::task::yield_now().await;

        match self.behaviors.get(route_host(route)).cloned() {
            Some(Behavior::Respond {
                status,
                body,
                delay,
            }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(TransportResponse {
                    status_code: status,
                    body,
                })
            }
            Some(Behavior::Hang) => std::future::pending().await,
            Some(Behavior::Refuse) | None => Err(ProbeError::refused(format!(
                "error sending request: tcp connect error: Connection refused (os error 111) via {}",
                route.proxy_url()
            ))),
        }
    }
}
