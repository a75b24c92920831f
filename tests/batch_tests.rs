mod common;

use common::MockTransport;
use open_proxy::{
    BatchRunner, CheckerConfig, FailureKind, ProxyDispatcher, ProbeSettings, ProxyEndpoint,
    ProbeError, ResultAccumulator, Route, SocksVersion, Transport, TransportResponse,
    UNSUPPORTED_PROTOCOL,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn settings() -> ProbeSettings {
    ProbeSettings {
        reference_target: Arc::from("http://reference.test/"),
        excerpt_len: 125,
    }
}

fn config(workers: usize) -> CheckerConfig {
    CheckerConfig::new()
        .with_reference_target("http://reference.test/")
        .with_worker_count(workers)
        .with_timeout(Duration::from_secs(2))
}

fn key_set(acc: &ResultAccumulator) -> HashSet<(String, u16, String)> {
    acc.snapshot()
        .into_iter()
        .map(|p| (p.address, p.port, p.protocol))
        .collect()
}

#[tokio::test]
async fn http_proxy_answering_200_is_alive_and_accumulated() {
    let transport = MockTransport::new().alive("10.0.0.1", 200);
    let runner = BatchRunner::with_transport(config(4), transport).unwrap();
    let endpoint = ProxyEndpoint::new("10.0.0.1", 8080, "http");

    let acc = runner.run(vec![endpoint.clone()], CancellationToken::new()).await;
    assert_eq!(acc.size(), 1);
    let verified = &acc.snapshot()[0];
    assert_eq!(verified.status_code, 200);
    assert_eq!(verified.endpoint(), endpoint);
}

#[tokio::test]
async fn refused_socks5_tunnel_is_dead() {
    let transport = Arc::new(MockTransport::new());
    let dispatcher = ProxyDispatcher::new(transport.clone(), settings());
    let endpoint = ProxyEndpoint::new("10.0.0.2", 1080, "socks5");

    let outcome = dispatcher.dispatch(&endpoint, Duration::from_secs(2)).await;
    assert!(!outcome.is_alive());
    assert!(outcome.error().unwrap().contains("Connection refused"));
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Refused));
    assert!(outcome.verified(0).is_none());
    assert_eq!(
        transport.routes(),
        vec![Route::Socks {
            version: SocksVersion::V5,
            host: "10.0.0.2".to_string(),
            port: 1080
        }]
    );
}

#[tokio::test]
async fn unsupported_protocol_fails_immediately() {
    let transport = Arc::new(MockTransport::new().hang("10.0.0.3"));
    let dispatcher = ProxyDispatcher::new(transport.clone(), settings());
    let endpoint = ProxyEndpoint::new("10.0.0.3", 21, "ftp");

    let start = Instant::now();
    let outcome = dispatcher.dispatch(&endpoint, Duration::from_secs(30)).await;
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!outcome.is_alive());
    assert_eq!(outcome.error(), Some(UNSUPPORTED_PROTOCOL));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn batch_keeps_exactly_the_alive_endpoints() {
    let transport = MockTransport::new()
        .alive_after("10.0.0.1", 200, Duration::from_millis(40))
        .alive("10.0.0.4", 204);
    let endpoints = vec![
        ProxyEndpoint::new("10.0.0.1", 8080, "http"),
        ProxyEndpoint::new("10.0.0.2", 1080, "socks5"),
        ProxyEndpoint::new("10.0.0.3", 3128, "https"),
        ProxyEndpoint::new("10.0.0.4", 1080, "socks4"),
        ProxyEndpoint::new("10.0.0.5", 21, "ftp"),
    ];
    let runner = BatchRunner::with_transport(config(2), transport).unwrap();

    let acc = ResultAccumulator::new();
    let summary = runner
        .run_into(endpoints, CancellationToken::new(), acc.clone())
        .await;

    assert_eq!(summary.total, 5);
    assert_eq!(summary.checked, 5);
    assert_eq!(summary.alive, 2);
    assert!(!summary.cancelled);
    assert_eq!(acc.size(), 2);

    let expected: HashSet<_> = [
        ("10.0.0.1".to_string(), 8080, "http".to_string()),
        ("10.0.0.4".to_string(), 1080, "socks4".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(key_set(&acc), expected);

    let ordered: Vec<_> = acc.sorted_by_index().iter().map(|p| p.index).collect();
    assert_eq!(ordered, vec![0, 3]);
}

#[tokio::test]
async fn pool_size_does_not_change_the_alive_set() {
    let endpoints: Vec<_> = (1..=12)
        .map(|i| {
            let protocol = if i % 2 == 0 { "socks5" } else { "http" };
            ProxyEndpoint::new(format!("10.0.1.{}", i), 8000 + i as u16, protocol)
        })
        .collect();
    let build = || {
        MockTransport::new()
            .alive_after("10.0.1.2", 200, Duration::from_millis(30))
            .alive("10.0.1.5", 200)
            .alive_after("10.0.1.7", 302, Duration::from_millis(10))
            .alive("10.0.1.12", 200)
    };

    let sequential = BatchRunner::with_transport(config(1), build())
        .unwrap()
        .run(endpoints.clone(), CancellationToken::new())
        .await;
    let sequential_set = key_set(&sequential);
    assert_eq!(sequential_set.len(), 4);

    for workers in [2, 3, 5, 11] {
        let acc = BatchRunner::with_transport(config(workers), build())
            .unwrap()
            .run(endpoints.clone(), CancellationToken::new())
            .await;
        assert_eq!(key_set(&acc), sequential_set, "workers = {}", workers);
    }
}

#[tokio::test]
async fn worker_count_bounds_in_flight_probes() {
    let mut transport = MockTransport::new();
    let mut endpoints = Vec::new();
    for i in 1..=8 {
        let host = format!("10.0.2.{}", i);
        transport = transport.alive_after(&host, 200, Duration::from_millis(20));
        endpoints.push(ProxyEndpoint::new(host, 8080, "http"));
    }
    let transport = Arc::new(transport);

    let runner = BatchRunner::with_transport(config(3), SharedMock(transport.clone())).unwrap();
    let acc = runner.run(endpoints, CancellationToken::new()).await;

    assert_eq!(acc.size(), 8);
    assert!(transport.max_in_flight() <= 3);
    assert!(transport.max_in_flight() >= 2);
}

#[tokio::test]
async fn long_list_with_small_pool_accounts_for_every_endpoint() {
    let mut transport = MockTransport::new();
    let mut endpoints = Vec::new();
    for i in 0..500u16 {
        let host = format!("10.1.{}.{}", i / 250, i % 250);
        if i % 2 == 0 {
            transport = transport.alive(&host, 200);
        }
        endpoints.push(ProxyEndpoint::new(host, 8080, "http"));
    }

    let runner = BatchRunner::with_transport(config(4), transport).unwrap();
    let acc = ResultAccumulator::new();
    let summary = runner
        .run_into(endpoints, CancellationToken::new(), acc.clone())
        .await;

    assert_eq!(summary.total, 500);
    assert_eq!(summary.checked, 500);
    assert_eq!(summary.alive, 250);
    assert!(!summary.cancelled);
    let indices: Vec<usize> = acc.sorted_by_index().iter().map(|p| p.index).collect();
    assert_eq!(indices, (0..500).step_by(2).collect::<Vec<_>>());
}

#[tokio::test]
async fn hung_proxy_is_bounded_by_its_own_timeout() {
    let transport = MockTransport::new().hang("10.0.3.1").alive("10.0.3.2", 200);
    let runner = BatchRunner::with_transport(
        config(2).with_timeout(Duration::from_millis(200)),
        transport,
    )
    .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = runner.with_reporter(tx);

    let start = Instant::now();
    let acc = runner
        .run(
            vec![
                ProxyEndpoint::new("10.0.3.1", 8080, "http"),
                ProxyEndpoint::new("10.0.3.2", 8080, "http"),
            ],
            CancellationToken::new(),
        )
        .await;
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(acc.size(), 1);

    drop(runner);
    let mut outcomes = Vec::new();
    while let Some(item) = rx.recv().await {
        outcomes.push(item);
    }
    outcomes.sort_by_key(|(index, _)| *index);
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].1.failure_kind(), Some(FailureKind::Timeout));
    assert!(outcomes[1].1.is_alive());
}

#[tokio::test]
async fn zero_timeout_fails_every_probe() {
    let transport = Arc::new(MockTransport::new().alive("10.0.4.1", 200));
    let runner = BatchRunner::with_transport(
        config(2).with_timeout(Duration::ZERO),
        SharedMock(transport.clone()),
    )
    .unwrap();

    let acc = runner
        .run(
            vec![ProxyEndpoint::new("10.0.4.1", 8080, "http")],
            CancellationToken::new(),
        )
        .await;
    assert!(acc.is_empty());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn unreachable_endpoint_is_dead_every_time() {
    let transport = Arc::new(MockTransport::new());
    let dispatcher = ProxyDispatcher::new(transport, settings());
    let endpoint = ProxyEndpoint::new("10.0.5.1", 8080, "https");

    let first = dispatcher.dispatch(&endpoint, Duration::from_secs(1)).await;
    let second = dispatcher.dispatch(&endpoint, Duration::from_secs(1)).await;
    assert!(!first.is_alive());
    assert!(!second.is_alive());
    assert_eq!(first.error(), second.error());
}

#[tokio::test]
async fn duplicate_endpoints_are_appended_twice() {
    let transport = MockTransport::new().alive("10.0.6.1", 200);
    let runner = BatchRunner::with_transport(config(2), transport).unwrap();
    let endpoint = ProxyEndpoint::new("10.0.6.1", 8080, "http");

    let acc = runner
        .run(vec![endpoint.clone(), endpoint], CancellationToken::new())
        .await;
    assert_eq!(acc.size(), 2);
}

#[tokio::test]
async fn cancelled_batch_dispatches_nothing_new() {
    let transport = Arc::new(MockTransport::new().alive("10.0.7.1", 200));
    let runner = BatchRunner::with_transport(config(2), SharedMock(transport.clone())).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let acc = ResultAccumulator::new();
    let summary = runner
        .run_into(
            vec![ProxyEndpoint::new("10.0.7.1", 8080, "http"); 5],
            cancel,
            acc.clone(),
        )
        .await;
    assert!(summary.cancelled);
    assert_eq!(summary.checked, 0);
    assert!(acc.is_empty());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn cancellation_mid_run_lets_in_flight_probes_finish() {
    let mut transport = MockTransport::new();
    for i in 1..=6 {
        transport = transport.alive_after(&format!("10.0.8.{}", i), 200, Duration::from_millis(100));
    }
    let transport = Arc::new(transport);
    let runner = BatchRunner::with_transport(config(2), SharedMock(transport.clone())).unwrap();
    let endpoints: Vec<_> = (1..=6)
        .map(|i| ProxyEndpoint::new(format!("10.0.8.{}", i), 8080, "http"))
        .collect();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let acc = ResultAccumulator::new();
    let summary = runner.run_into(endpoints, cancel, acc.clone()).await;

    assert!(summary.cancelled);
    assert_eq!(summary.checked, 2);
    assert_eq!(acc.size(), 2);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn reporter_does_not_change_the_result() {
    let build = || MockTransport::new().alive("10.0.9.1", 200).alive("10.0.9.3", 200);
    let endpoints = vec![
        ProxyEndpoint::new("10.0.9.1", 8080, "http"),
        ProxyEndpoint::new("10.0.9.2", 8080, "http"),
        ProxyEndpoint::new("10.0.9.3", 1080, "socks5"),
    ];

    let quiet = BatchRunner::with_transport(config(2), build())
        .unwrap()
        .run(endpoints.clone(), CancellationToken::new())
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let verbose_runner = BatchRunner::with_transport(config(2), build())
        .unwrap()
        .with_reporter(tx);
    let verbose = verbose_runner
        .run(endpoints, CancellationToken::new())
        .await;
    drop(verbose_runner);

    let mut reported = 0;
    while rx.recv().await.is_some() {
        reported += 1;
    }
    assert_eq!(reported, 3);
    assert_eq!(key_set(&quiet), key_set(&verbose));
}

/// Lets a test keep a handle on the mock after handing it to a runner
struct SharedMock(Arc<MockTransport>);

impl Transport for SharedMock {
    async fn fetch(
        &self,
        route: &Route,
        target: &str,
        timeout: Duration,
    ) -> Result<TransportResponse, ProbeError> {
        self.0.fetch(route, target, timeout).await
    }
}
