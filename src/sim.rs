/// Random burst feed
///
/// Drives an `UpdateSink` the way a venue feed behaves in practice: bursts
/// of random updates separated by random pauses, across the whole
/// instrument/market space. The producer runs on its own thread; stop is a
/// cooperative flag honored between bursts, so an in-flight burst finishes
/// before the feed winds down. Any dispatch error ends the feed.

use crate::keyspace::{Instrument, Market, Side};
use crate::lifecycle::join_timeout;
use crate::provider::{DispatchError, UpdateSink};
use crate::update::{MarketUpdate, Tick};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FEED_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Upper bound on updates per burst
    pub max_burst: usize,
    /// Upper bound on the pause between bursts, in milliseconds
    pub max_pause_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            max_burst: 1000,
            max_pause_ms: 100,
        }
    }
}

pub struct FeedSimulator;

impl FeedSimulator {
    /// Spawn the producer thread against a sink
    pub fn spawn(sink: Arc<dyn UpdateSink>, config: SimConfig) -> FeedHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let worker = thread::spawn(move || run_feed(sink, config, worker_stop));
        FeedHandle {
            stop,
            worker: Some(worker),
        }
    }
}

/// Handle to a running feed
pub struct FeedHandle {
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl FeedHandle {
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| !w.is_finished())
            .unwrap_or(false)
    }

    /// Raise the stop flag and wait briefly for the producer to finish
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if !join_timeout(worker, FEED_JOIN_TIMEOUT) {
                tracing::warn!(
                    "feed simulator did not stop within {:?}",
                    FEED_JOIN_TIMEOUT
                );
            }
        }
    }
}

fn run_feed(sink: Arc<dyn UpdateSink>, config: SimConfig, stop: Arc<AtomicBool>) {
    let mut rng = rand::thread_rng();
    tracing::info!("feed simulator started");

    while !stop.load(Ordering::Acquire) {
        let burst = rng.gen_range(0..=config.max_burst);
        for _ in 0..burst {
            let update = random_update(&mut rng);
            match sink.accept(&update) {
                Ok(()) => {}
                Err(DispatchError::Halted) => {
                    tracing::info!("sink halted, feed stopping");
                    return;
                }
                Err(e) => {
                    tracing::error!("update rejected, feed stopping: {}", e);
                    return;
                }
            }
        }
        thread::sleep(Duration::from_millis(rng.gen_range(0..=config.max_pause_ms)));
    }

    tracing::info!("feed simulator stopped");
}

/// Uniform draw over the full key space, both sides always quoted
fn random_update(rng: &mut impl Rng) -> MarketUpdate {
    let instrument = Instrument::ALL[rng.gen_range(0..Instrument::COUNT)];
    let market = Market::ALL[rng.gen_range(0..Market::COUNT)];
    let side = Side::ALL[rng.gen_range(0..Side::COUNT)];

    let tick = Tick {
        instrument,
        side,
        bid_price: rng.gen_range(0.5..2.0),
        bid_amount: rng.gen_range(1.0..1_000_000.0),
        offer_price: rng.gen_range(0.5..2.0),
        offer_amount: rng.gen_range(1.0..1_000_000.0),
    };
    MarketUpdate::new(market, tick)
}
