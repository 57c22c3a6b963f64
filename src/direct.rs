/// Synchronous fan-out dispatch
///
/// `DirectProvider` runs every subscriber's transform inline on the feed
/// thread, under the registry read lock. Nothing is buffered and no threads
/// are owned: latency is the sum of the transforms, and a slow subscriber
/// stalls the feed for everyone behind it. The first transform error aborts
/// fan-out of that update and surfaces to the caller.

use crate::keyspace::{Instrument, Market, PairTable};
use crate::lifecycle::Lifecycle;
use crate::provider::{DispatchError, Provider, Subscriber, SubscriptionError, UpdateSink};
use crate::update::MarketUpdate;
use parking_lot::RwLock;
use std::sync::Arc;

type Registry = PairTable<Vec<Arc<dyn Subscriber>>>;

pub struct DirectProvider {
    registry: RwLock<Registry>,
}

impl DirectProvider {
    pub fn new() -> Self {
        DirectProvider {
            registry: RwLock::new(PairTable::default()),
        }
    }
}

impl Default for DirectProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for DirectProvider {
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

impl UpdateSink for DirectProvider {
    fn accept(&self, update: &MarketUpdate) -> Result<(), DispatchError> {
        let (market, tick) = update.validate()?;
        let registry = self.registry.read();
        for subscriber in registry.get(tick.instrument, market) {
            subscriber.transform(update)?;
        }
        Ok(())
    }
}

impl Lifecycle for DirectProvider {
    fn start(&self) {
        tracing::info!("direct provider started");
    }

    fn stop(&self) {
        tracing::info!("direct provider stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Passthrough;
    use crate::keyspace::pairs;

    #[test]
    fn test_new_provider_is_empty() {
        let provider = DirectProvider::new();
        for (instrument, market) in pairs() {
            assert_eq!(provider.subscriber_count(instrument, market), 0);
        }
    }

    #[test]
    fn test_duplicate_subscribe_rejected() {
        let provider = DirectProvider::new();
        let subscriber: Arc<dyn Subscriber> = Arc::new(Passthrough);

        provider
            .subscribe(Instrument::GbpUsd, Market::Ebs, Arc::clone(&subscriber))
            .unwrap();
        let result = provider.subscribe(Instrument::GbpUsd, Market::Ebs, Arc::clone(&subscriber));

        assert!(matches!(
            result,
            Err(SubscriptionError::AlreadySubscribed {
                instrument: Instrument::GbpUsd,
                market: Market::Ebs,
            })
        ));
        assert_eq!(provider.subscriber_count(Instrument::GbpUsd, Market::Ebs), 1);
    }

    #[test]
    fn test_same_handle_on_two_pairs() {
        let provider = DirectProvider::new();
        let subscriber: Arc<dyn Subscriber> = Arc::new(Passthrough);

        provider
            .subscribe(Instrument::GbpUsd, Market::Ebs, Arc::clone(&subscriber))
            .unwrap();
        provider
            .subscribe(Instrument::GbpUsd, Market::Lseg, Arc::clone(&subscriber))
            .unwrap();

        assert_eq!(provider.subscriber_count(Instrument::GbpUsd, Market::Ebs), 1);
        assert_eq!(provider.subscriber_count(Instrument::GbpUsd, Market::Lseg), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_rejected() {
        let provider = DirectProvider::new();
        let subscriber: Arc<dyn Subscriber> = Arc::new(Passthrough);

        let result = provider.unsubscribe(Instrument::EurUsd, Market::Ebs, &subscriber);
        assert!(matches!(
            result,
            Err(SubscriptionError::NotSubscribed { .. })
        ));
    }
}
