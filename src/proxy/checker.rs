//! Batch proxy checking with a bounded worker pool

use crate::error::ConfigError;
use crate::proxy::accumulator::ResultAccumulator;
use crate::proxy::dispatcher::ProxyDispatcher;
use crate::proxy::models::{ProbeOutcome, ProxyEndpoint};
use crate::proxy::probe::{ProbeSettings, ReqwestTransport, Transport};
use reqwest::Url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default timeout for proxy checks in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 9;

/// Upper bound accepted for the per-probe timeout
pub const MAX_TIMEOUT_SECS: u64 = 600;

/// Default number of concurrent checks
pub const DEFAULT_WORKERS: usize = 10;

/// Default URL to test proxies against
pub const DEFAULT_REFERENCE_TARGET: &str = "https://www.google.com";

/// Default number of body characters kept per outcome
pub const DEFAULT_EXCERPT_LEN: usize = 125;

/// Configuration for a batch run
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// URL every probe requests through its proxy
    pub reference_target: String,
    /// Timeout applied to each probe independently
    pub timeout: Duration,
    /// Number of probes allowed in flight at once
    pub worker_count: usize,
    /// Characters of the response body kept in an outcome
    pub excerpt_len: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            reference_target: DEFAULT_REFERENCE_TARGET.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            worker_count: DEFAULT_WORKERS,
            excerpt_len: DEFAULT_EXCERPT_LEN,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_reference_target(mut self, url: impl Into<String>) -> Self {
        self.reference_target = url.into();
        self
    }

    pub fn with_excerpt_len(mut self, excerpt_len: usize) -> Self {
        self.excerpt_len = excerpt_len;
        self
    }

    /// Reject settings that would make the whole run meaningless.
    ///
    /// A zero timeout is allowed: every probe then fails immediately.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::WorkerCount);
        }
        if self.timeout > Duration::from_secs(MAX_TIMEOUT_SECS) {
            return Err(ConfigError::Timeout(
                self.timeout.as_secs(),
                MAX_TIMEOUT_SECS,
            ));
        }
        if self.excerpt_len == 0 {
            return Err(ConfigError::ExcerptLen);
        }
        let url = Url::parse(&self.reference_target).map_err(|e| {
            ConfigError::ReferenceTarget(self.reference_target.clone(), e.to_string())
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ReferenceTarget(
                self.reference_target.clone(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        Ok(())
    }
}

/// Counters describing a finished batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Endpoints handed to the runner
    pub total: usize,
    /// Endpoints actually dispatched
    pub checked: usize,
    /// Endpoints found alive
    pub alive: usize,
    /// Whether cancellation stopped the run early
    pub cancelled: bool,
}

/// Receives `(input index, outcome)` for every dispatched endpoint
pub type OutcomeSender = mpsc::UnboundedSender<(usize, ProbeOutcome)>;

/// Runs a candidate list through the dispatcher and collects alive proxies
pub struct BatchRunner<T> {
    config: CheckerConfig,
    dispatcher: Arc<ProxyDispatcher<T>>,
    reporter: Option<OutcomeSender>,
}

impl BatchRunner<ReqwestTransport> {
    /// Create a runner that probes over real network connections
    pub fn new(config: CheckerConfig) -> Result<Self, ConfigError> {
        Self::with_transport(config, ReqwestTransport::new())
    }
}

impl<T: Transport> BatchRunner<T> {
    pub fn with_transport(config: CheckerConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;
        let settings = ProbeSettings {
            reference_target: Arc::from(config.reference_target.as_str()),
            excerpt_len: config.excerpt_len,
        };
        let dispatcher = Arc::new(ProxyDispatcher::new(Arc::new(transport), settings));
        Ok(Self {
            config,
            dispatcher,
            reporter: None,
        })
    }

    /// Forward every outcome to `reporter` (verbose mode)
    pub fn with_reporter(mut self, reporter: OutcomeSender) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Check all endpoints and return the proxies found alive
    pub async fn run(
        &self,
        endpoints: Vec<ProxyEndpoint>,
        cancel: CancellationToken,
    ) -> ResultAccumulator {
        let accumulator = ResultAccumulator::new();
        self.run_into(endpoints, cancel, accumulator.clone()).await;
        accumulator
    }

    /// Check all endpoints, appending alive proxies to a caller-owned accumulator.
    ///
    /// No new probe starts once `cancel` fires; probes already in flight run
    /// to completion or to their own timeout.
    pub async fn run_into(
        &self,
        endpoints: Vec<ProxyEndpoint>,
        cancel: CancellationToken,
        accumulator: ResultAccumulator,
    ) -> BatchSummary {
        let total = endpoints.len();
        let timeout = self.config.timeout;
        let semaphore = Arc::new(Semaphore::new(self.config.worker_count));
        let checked = Arc::new(AtomicUsize::new(0));
        let alive = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();

        info!(
            total,
            workers = self.config.worker_count,
            timeout_secs = timeout.as_secs_f64(),
            target = %self.config.reference_target,
            "starting proxy check"
        );

        for (index, endpoint) in endpoints.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            let accumulator = accumulator.clone();
            let reporter = self.reporter.clone();
            let checked = Arc::clone(&checked);
            let alive = Arc::clone(&alive);

            set.spawn(async move {
                let _permit = permit;
                let outcome = dispatcher.dispatch(&endpoint, timeout).await;
                let done = checked.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    "[{}/{}] {} alive={}",
                    done,
                    total,
                    outcome.endpoint,
                    outcome.is_alive()
                );

                if let Some(verified) = outcome.verified(index) {
                    alive.fetch_add(1, Ordering::Relaxed);
                    accumulator.append(verified);
                }
                if let Some(reporter) = reporter {
                    // A dropped receiver only loses display output.
                    let _ = reporter.send((index, outcome));
                }
            });

            // Reap finished tasks so the set stays bounded by the pool size.
            while let Some(joined) = set.try_join_next() {
                log_join_error(joined);
            }
        }

        while let Some(joined) = set.join_next().await {
            log_join_error(joined);
        }

        let summary = BatchSummary {
            total,
            checked: checked.load(Ordering::Relaxed),
            alive: alive.load(Ordering::Relaxed),
            cancelled: cancel.is_cancelled(),
        };
        info!(
            checked = summary.checked,
            alive = summary.alive,
            cancelled = summary.cancelled,
            "proxy check finished"
        );
        summary
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!("check task failed: {}", e);
    }
}
