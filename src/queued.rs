/// Queued fan-out dispatch
///
/// `QueuedProvider` decouples the feed from its subscribers. Each distinct
/// subscriber handle gets a bounded ring and a dedicated worker thread,
/// created on its first subscription and kept until `stop`; further
/// subscriptions of the same handle share them. `accept` copies the update
/// into every registered subscriber's ring under the registry read lock, so
/// subscribers run in parallel with the feed and with each other while each
/// one still sees its updates in feed order. A full ring blocks the feed
/// instead of dropping, and a transform error costs that subscriber one
/// update, never the stream.

use crate::keyspace::{Instrument, Market, PairTable};
use crate::lifecycle::{join_timeout, Lifecycle};
use crate::provider::{DispatchError, Provider, Subscriber, SubscriptionError, UpdateSink};
use crate::ring::RingBuffer;
use crate::update::MarketUpdate;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Environment override for the per-subscriber queue capacity
pub const QUEUE_CAPACITY_ENV: &str = "MD_FANOUT_QUEUE_CAPACITY";

const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

struct QueueEntry {
    id: usize,
    subscriber: Arc<dyn Subscriber>,
    ring: Arc<RingBuffer<MarketUpdate>>,
    worker: Option<thread::JoinHandle<()>>,
}

pub struct QueuedProvider {
    registry: RwLock<PairTable<Vec<Arc<dyn Subscriber>>>>,
    // Queues live outside the registry lock: `stop` only ever touches this
    // list, so it cannot be blocked by a feed thread stuck in backpressure
    // while holding the registry read lock.
    queues: Mutex<Vec<QueueEntry>>,
    queue_capacity: usize,
    halted: AtomicBool,
}

impl QueuedProvider {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Capacity applies per subscriber and must be a power of two
    pub fn with_capacity(queue_capacity: usize) -> Self {
        assert!(
            queue_capacity.is_power_of_two(),
            "capacity must be a power of two"
        );
        QueuedProvider {
            registry: RwLock::new(PairTable::default()),
            queues: Mutex::new(Vec::new()),
            queue_capacity,
            halted: AtomicBool::new(false),
        }
    }

    /// Read the queue capacity from the environment, rounded up to the next
    /// power of two, falling back to the default
    pub fn with_env_config() -> Self {
        let capacity = std::env::var(QUEUE_CAPACITY_ENV)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|v| v.next_power_of_two())
            .unwrap_or(DEFAULT_QUEUE_CAPACITY);

        tracing::info!("queued provider using queue capacity {}", capacity);
        Self::with_capacity(capacity)
    }

    /// Number of distinct subscriber queues created so far
    pub fn queue_count(&self) -> usize {
        self.queues.lock().len()
    }

    /// Number of queue workers that are still running
    pub fn running_workers(&self) -> usize {
        let queues = self.queues.lock();
        queues
            .iter()
            .filter(|e| e.worker.as_ref().map_or(false, |w| !w.is_finished()))
            .count()
    }

    /// Per-subscriber ring capacity this provider was built with
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Find or create the queue and worker for a subscriber handle
    ///
    /// Creation is refused once the provider is halted. The check runs under
    /// the queues lock, the same lock stop holds for its halt and join sweep,
    /// so a queue is either created before the sweep and torn down by it, or
    /// not created at all.
    fn ensure_queue(&self, subscriber: &Arc<dyn Subscriber>) {
        let mut queues = self.queues.lock();
        if self.halted.load(Ordering::Acquire) {
            return;
        }
        if queues.iter().any(|e| Arc::ptr_eq(&e.subscriber, subscriber)) {
            return;
        }

        let id = queues.len();
        let ring = Arc::new(RingBuffer::new(self.queue_capacity));

        let worker_ring = Arc::clone(&ring);
        let worker_subscriber = Arc::clone(subscriber);
        let worker = thread::spawn(move || {
            run_worker(id, worker_ring, worker_subscriber);
        });

        queues.push(QueueEntry {
            id,
            subscriber: Arc::clone(subscriber),
            ring,
            worker: Some(worker),
        });
    }

    /// Look up the ring for a registered subscriber
    fn ring_of(&self, subscriber: &Arc<dyn Subscriber>) -> Option<Arc<RingBuffer<MarketUpdate>>> {
        let queues = self.queues.lock();
        queues
            .iter()
            .find(|e| Arc::ptr_eq(&e.subscriber, subscriber))
            .map(|e| Arc::clone(&e.ring))
    }
}

impl Default for QueuedProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn run_worker(id: usize, ring: Arc<RingBuffer<MarketUpdate>>, subscriber: Arc<dyn Subscriber>) {
    tracing::debug!("dispatch worker {} started", id);
    while let Some(update) = ring.pop() {
        if let Err(e) = subscriber.transform(&update) {
            tracing::warn!("dispatch worker {} dropped update: {}", id, e);
        }
    }
    tracing::debug!("dispatch worker {} stopped", id);
}

impl Provider for QueuedProvider {
    fn subscribe(
        &self,
        instrument: Instrument,
        market: Market,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<(), SubscriptionError> {
        let mut registry = self.registry.write();
        let cell = registry.get_mut(instrument, market);
        if cell.iter().any(|s| Arc::ptr_eq(s, &subscriber)) {
            return Err(SubscriptionError::AlreadySubscribed { instrument, market });
        }

        // The queue must exist before the registry names the subscriber, or
        // a concurrent accept could find a subscriber with nowhere to put
        // the update. Once halted, ensure_queue creates nothing; the
        // registration still lands but dispatch is over.
        self.ensure_queue(&subscriber);
        cell.push(subscriber);
        Ok(())
    }

    fn unsubscribe(
        &self,
        instrument: Instrument,
        market: Market,
        subscriber: &Arc<dyn Subscriber>,
    ) -> Result<(), SubscriptionError> {
        let mut registry = self.registry.write();
        let cell = registry.get_mut(instrument, market);
        match cell.iter().position(|s| Arc::ptr_eq(s, subscriber)) {
            Some(at) => {
                // The queue and worker stay up: a handle dropping its last
                // pair may resubscribe later, and teardown belongs to stop
                cell.remove(at);
                Ok(())
            }
            None => Err(SubscriptionError::NotSubscribed { instrument, market }),
        }
    }

    fn subscriber_count(&self, instrument: Instrument, market: Market) -> usize {
        self.registry.read().get(instrument, market).len()
    }
}

impl UpdateSink for QueuedProvider {
    fn accept(&self, update: &MarketUpdate) -> Result<(), DispatchError> {
        if self.halted.load(Ordering::Acquire) {
            return Err(DispatchError::Halted);
        }

        let (market, tick) = update.validate()?;
        let registry = self.registry.read();
        for subscriber in registry.get(tick.instrument, market) {
            match self.ring_of(subscriber) {
                Some(ring) => {
                    if ring.push(*update).is_err() {
                        return Err(DispatchError::Halted);
                    }
                }
                None => {
                    tracing::error!(
                        "no queue for subscriber registered on {} {}",
                        tick.instrument,
                        market
                    );
                }
            }
        }
        Ok(())
    }
}

impl Lifecycle for QueuedProvider {
    fn start(&self) {
        tracing::info!(
            "queued provider started (queue capacity {})",
            self.queue_capacity
        );
    }

    /// Halt every ring, then join every worker with a bounded wait.
    /// Publishers blocked in backpressure and workers blocked on empty rings
    /// are both woken by the halt.
    fn stop(&self) {
        self.halted.store(true, Ordering::Release);

        let mut queues = self.queues.lock();
        for entry in queues.iter() {
            entry.ring.halt();
        }
        for entry in queues.iter_mut() {
            if let Some(worker) = entry.worker.take() {
                if !join_timeout(worker, WORKER_JOIN_TIMEOUT) {
                    tracing::warn!(
                        "dispatch worker {} did not stop within {:?}",
                        entry.id,
                        WORKER_JOIN_TIMEOUT
                    );
                }
            }
        }
        tracing::info!("queued provider stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyspace::Side;
    use crate::provider::Passthrough;
    use crate::update::Tick;

    fn sample_update(instrument: Instrument, market: Market) -> MarketUpdate {
        MarketUpdate::new(
            market,
            Tick {
                instrument,
                side: Side::Bid,
                bid_price: 1.1,
                bid_amount: 100.0,
                offer_price: 1.2,
                offer_amount: 200.0,
            },
        )
    }

    #[test]
    fn test_one_queue_per_distinct_handle() {
        let provider = QueuedProvider::with_capacity(16);
        let a: Arc<dyn Subscriber> = Arc::new(Passthrough);
        let b: Arc<dyn Subscriber> = Arc::new(Passthrough);

        provider
            .subscribe(Instrument::GbpUsd, Market::Ebs, Arc::clone(&a))
            .unwrap();
        provider
            .subscribe(Instrument::EurUsd, Market::Lseg, Arc::clone(&a))
            .unwrap();
        assert_eq!(provider.queue_count(), 1);

        provider
            .subscribe(Instrument::GbpUsd, Market::Ebs, Arc::clone(&b))
            .unwrap();
        assert_eq!(provider.queue_count(), 2);
        assert_eq!(provider.running_workers(), 2);

        provider.stop();
        assert_eq!(provider.running_workers(), 0);
    }

    #[test]
    fn test_queue_survives_unsubscribe() {
        let provider = QueuedProvider::with_capacity(16);
        let subscriber: Arc<dyn Subscriber> = Arc::new(Passthrough);

        provider
            .subscribe(Instrument::GbpUsd, Market::Ebs, Arc::clone(&subscriber))
            .unwrap();
        provider
            .unsubscribe(Instrument::GbpUsd, Market::Ebs, &subscriber)
            .unwrap();

        assert_eq!(provider.subscriber_count(Instrument::GbpUsd, Market::Ebs), 0);
        assert_eq!(provider.queue_count(), 1);

        // Resubscribing reuses the existing queue
        provider
            .subscribe(Instrument::GbpUsd, Market::Ebs, Arc::clone(&subscriber))
            .unwrap();
        assert_eq!(provider.queue_count(), 1);

        provider.stop();
    }

    #[test]
    fn test_accept_after_stop_rejected() {
        let provider = QueuedProvider::with_capacity(16);
        let subscriber: Arc<dyn Subscriber> = Arc::new(Passthrough);
        provider
            .subscribe(Instrument::GbpUsd, Market::Ebs, subscriber)
            .unwrap();

        provider.stop();

        let result = provider.accept(&sample_update(Instrument::GbpUsd, Market::Ebs));
        assert_eq!(result, Err(DispatchError::Halted));
    }

    #[test]
    fn test_subscribe_after_stop_registers_without_queue() {
        let provider = QueuedProvider::with_capacity(16);
        provider.stop();

        let subscriber: Arc<dyn Subscriber> = Arc::new(Passthrough);
        provider
            .subscribe(Instrument::GbpUsd, Market::Ebs, subscriber)
            .unwrap();

        assert_eq!(provider.subscriber_count(Instrument::GbpUsd, Market::Ebs), 1);
        assert_eq!(provider.queue_count(), 0);
    }

    #[test]
    fn test_invalid_update_rejected_before_dispatch() {
        let provider = QueuedProvider::with_capacity(16);
        let result = provider.accept(&MarketUpdate::default());
        assert!(matches!(result, Err(DispatchError::Invalid(_))));
        provider.stop();
    }
}
