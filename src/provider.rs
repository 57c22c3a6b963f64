/// Subscription and dispatch contracts
///
/// A `Provider` keeps the (instrument, market) subscription registry; an
/// `UpdateSink` is the feed-facing half that accepts updates for fan-out.
/// Subscribers are shared trait objects and registry identity is allocation
/// identity: re-registering a clone of the same `Arc` is a duplicate, while
/// a second `Arc` around an identical value is not.

use crate::keyspace::{Instrument, Market};
use crate::update::{InvalidUpdate, MarketUpdate};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("already subscribed to {instrument} on {market}")]
    AlreadySubscribed {
        instrument: Instrument,
        market: Market,
    },

    #[error("not subscribed to {instrument} on {market}")]
    NotSubscribed {
        instrument: Instrument,
        market: Market,
    },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("invalid update: {0}")]
    Invalid(#[from] InvalidUpdate),

    #[error("dispatcher is halted")]
    Halted,
}

/// A consumer of market updates
///
/// `transform` may run on the feed thread (direct dispatch) or on a dedicated
/// worker (queued dispatch); implementations must not care which.
pub trait Subscriber: Send + Sync {
    fn transform(&self, update: &MarketUpdate) -> Result<MarketUpdate, InvalidUpdate>;
}

/// Subscription registry keyed by (instrument, market)
pub trait Provider: Send + Sync {
    /// Register a subscriber for one pair. Registering the same handle twice
    /// for the same pair is an error; the same handle may be registered for
    /// any number of distinct pairs.
    fn subscribe(
        &self,
        instrument: Instrument,
        market: Market,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<(), SubscriptionError>;

    /// Remove a registration made by `subscribe`
    fn unsubscribe(
        &self,
        instrument: Instrument,
        market: Market,
        subscriber: &Arc<dyn Subscriber>,
    ) -> Result<(), SubscriptionError>;

    /// Number of subscribers currently registered for one pair
    fn subscriber_count(&self, instrument: Instrument, market: Market) -> usize;
}

/// Feed-facing entry point: hand one update to the dispatcher
pub trait UpdateSink: Send + Sync {
    fn accept(&self, update: &MarketUpdate) -> Result<(), DispatchError>;
}

/// Subscriber that validates and echoes every update unchanged
#[derive(Debug, Default)]
pub struct Passthrough;

impl Subscriber for Passthrough {
    fn transform(&self, update: &MarketUpdate) -> Result<MarketUpdate, InvalidUpdate> {
        update.validate()?;
        Ok(*update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyspace::Side;
    use crate::update::Tick;

    fn sample_update() -> MarketUpdate {
        MarketUpdate::new(
            Market::Currenex,
            Tick {
                instrument: Instrument::EurSek,
                side: Side::Offer,
                bid_price: 10.5,
                bid_amount: 300.0,
                offer_price: 10.6,
                offer_amount: 400.0,
            },
        )
    }

    #[test]
    fn test_arc_identity_not_value_identity() {
        let a: Arc<dyn Subscriber> = Arc::new(Passthrough);
        let b: Arc<dyn Subscriber> = Arc::new(Passthrough);
        let a2 = Arc::clone(&a);

        assert!(Arc::ptr_eq(&a, &a2));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_passthrough_echoes() {
        let update = sample_update();
        let out = Passthrough.transform(&update).unwrap();
        assert_eq!(out, update);
    }

    #[test]
    fn test_passthrough_rejects_incomplete() {
        let result = Passthrough.transform(&MarketUpdate::default());
        assert!(matches!(result, Err(InvalidUpdate::MissingMarket)));
    }
}
