use crate::aggregator::Aggregator;
use crate::types::AggregationOutput;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shortest auto refresh period; shorter requests are raised to it.
pub const MIN_REFRESH_PERIOD: Duration = Duration::from_secs(1);

/// Runs aggregation passes off the consumer's task, one at a time, and hands
/// each finished output over a channel.
pub struct RefreshPipeline {
    trigger: RefreshTrigger,
    results: mpsc::UnboundedReceiver<AggregationOutput>,
}

/// Cloneable half of the pipeline that can start passes, e.g. from a timer.
#[derive(Clone)]
pub struct RefreshTrigger {
    aggregator: Arc<Aggregator>,
    in_flight: Arc<AtomicBool>,
    results: mpsc::UnboundedSender<AggregationOutput>,
}

/// Clears the in-flight flag when the pass ends, including by panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RefreshPipeline {
    pub fn new(aggregator: Aggregator) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            trigger: RefreshTrigger {
                aggregator: Arc::new(aggregator),
                in_flight: Arc::new(AtomicBool::new(false)),
                results: tx,
            },
            results: rx,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.trigger.aggregator
    }

    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.trigger.is_refreshing()
    }

    /// Start a pass unless one is already running. Returns whether it started.
    pub fn request_refresh(&self, force: bool) -> bool {
        self.trigger.request_refresh(force)
    }

    /// Delete the cache, then start a forced pass.
    pub fn clear_cache_and_refresh(&self) -> bool {
        if let Err(e) = self.trigger.aggregator.clear_cache() {
            warn!("Failed to clear cache: {}", e);
        }
        self.trigger.request_refresh(true)
    }

    pub async fn next_result(&mut self) -> Option<AggregationOutput> {
        self.results.recv().await
    }

    pub fn try_next_result(&mut self) -> Option<AggregationOutput> {
        self.results.try_recv().ok()
    }

    /// Issue a forced refresh every `period`. Ticks that land on a running
    /// pass are dropped. Abort the returned handle to stop.
    pub fn spawn_auto_refresh(&self, period: Duration) -> JoinHandle<()> {
        let trigger = self.trigger.clone();
        let period = period.max(MIN_REFRESH_PERIOD);
        info!("Auto refresh every {}s", period.as_secs());

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !trigger.request_refresh(true) {
                    debug!("Auto refresh skipped, a pass is still running");
                }
            }
        })
    }
}

impl RefreshTrigger {
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn request_refresh(&self, force: bool) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Refresh already in flight, dropping request");
            return false;
        }

        let guard = InFlight(self.in_flight.clone());
        let aggregator = self.aggregator.clone();
        let results = self.results.clone();

        tokio::spawn(async move {
            let output = aggregator.aggregate(force).await;
            drop(guard);
            if results.send(output).is_err() {
                debug!("Pipeline dropped before the pass finished");
            }
        });
        true
    }
}
