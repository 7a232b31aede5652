mod common;

use async_trait::async_trait;
use common::{init_tracing, rss_feed, test_config, ScriptedTransport};
use feedcast::config::SourceSpec;
use feedcast::traits::Transport;
use feedcast::types::TransportError;
use feedcast::pipeline::MIN_REFRESH_PERIOD;
use feedcast::{Aggregator, FeedManager, MemoryStore, Provenance, RefreshPipeline, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const FEED_URL: &str = "https://p.example/rss";

/// Holds every GET until the test releases a permit.
struct GatedTransport {
    inner: ScriptedTransport,
    gate: Semaphore,
}

impl GatedTransport {
    fn new() -> Self {
        Self {
            inner: ScriptedTransport::new().with_body(
                FEED_URL,
                rss_feed(&[("Piped", "https://p.example/1", "2025-01-06T10:00:00Z")]),
            ),
            gate: Semaphore::new(0),
        }
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn get(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        permit.forget();
        self.inner.get(url).await
    }
}

fn pipeline(transport: Arc<GatedTransport>, store: Arc<MemoryStore>) -> RefreshPipeline {
    let config = test_config(vec![SourceSpec::new("NEWS", "Pipe", "PIP", &[FEED_URL])]);
    let registry = FeedManager::new(&config.feeds);
    RefreshPipeline::new(Aggregator::new(&config, registry, transport, store))
}

#[tokio::test]
async fn test_refresh_in_flight_drops_new_requests() -> Result<()> {
    init_tracing();

    let transport = Arc::new(GatedTransport::new());
    let mut pipeline = pipeline(transport.clone(), Arc::new(MemoryStore::new()));

    assert!(pipeline.request_refresh(true));
    assert!(pipeline.is_refreshing());
    assert!(!pipeline.request_refresh(true));
    assert!(!pipeline.request_refresh(false));
    assert!(pipeline.try_next_result().is_none());

    transport.release();
    let output = tokio::time::timeout(Duration::from_secs(2), pipeline.next_result())
        .await
        .expect("pass finishes")
        .expect("channel open");
    assert_eq!(output.provenance, Provenance::Live);
    assert_eq!(output.items.len(), 1);
    assert!(!pipeline.is_refreshing());

    // exactly one pass ran for the three requests
    assert_eq!(transport.inner.call_count(), 1);
    assert!(pipeline.try_next_result().is_none());

    // a new request is accepted once the pass is over and hits the cache
    assert!(pipeline.request_refresh(false));
    let cached = tokio::time::timeout(Duration::from_secs(2), pipeline.next_result())
        .await
        .expect("cache pass finishes")
        .expect("channel open");
    assert_eq!(cached.provenance, Provenance::Cache);
    assert_eq!(cached.items, output.items);
    Ok(())
}

#[tokio::test]
async fn test_clear_cache_and_refresh_goes_live() -> Result<()> {
    init_tracing();

    let transport = Arc::new(GatedTransport::new());
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = pipeline(transport.clone(), store.clone());

    transport.release();
    pipeline.request_refresh(false);
    pipeline.next_result().await.expect("first pass");
    assert!(store.snapshot().is_some());

    transport.release();
    assert!(pipeline.clear_cache_and_refresh());
    let output = tokio::time::timeout(Duration::from_secs(2), pipeline.next_result())
        .await
        .expect("pass finishes")
        .expect("channel open");
    assert_eq!(output.provenance, Provenance::Live);
    assert_eq!(transport.inner.call_count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_auto_refresh_ticks_force_live_passes() -> Result<()> {
    init_tracing();

    let transport = Arc::new(GatedTransport::new());
    transport.gate.add_permits(10);
    let mut pipeline = pipeline(transport.clone(), Arc::new(MemoryStore::new()));

    let ticker = pipeline.spawn_auto_refresh(Duration::from_secs(180));

    let first = pipeline.next_result().await.expect("first tick");
    let second = pipeline.next_result().await.expect("second tick");
    ticker.abort();

    assert_eq!(first.provenance, Provenance::Live);
    assert_eq!(second.provenance, Provenance::Live, "timer refreshes bypass the cache");
    assert_eq!(transport.inner.call_count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_refresh_period_is_raised_to_the_minimum() -> Result<()> {
    init_tracing();

    let transport = Arc::new(GatedTransport::new());
    transport.gate.add_permits(10);
    let mut pipeline = pipeline(transport.clone(), Arc::new(MemoryStore::new()));

    let started = tokio::time::Instant::now();
    let ticker = pipeline.spawn_auto_refresh(Duration::ZERO);

    let first = pipeline.next_result().await.expect("first tick");
    let second = pipeline.next_result().await.expect("second tick");
    assert!(!ticker.is_finished(), "ticker task is still running");
    ticker.abort();

    assert_eq!(first.provenance, Provenance::Live);
    assert_eq!(second.provenance, Provenance::Live);
    assert!(started.elapsed() >= MIN_REFRESH_PERIOD * 2);
    Ok(())
}
