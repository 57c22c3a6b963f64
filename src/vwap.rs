/// Streaming VWAP aggregation
///
/// Keeps a running volume-weighted average per (instrument, market) pair.
/// As a subscriber, the aggregator folds each incoming tick into the pair's
/// totals and emits the cumulative VWAP quote for that pair. `start`
/// subscribes one shared handle to every pair of the provider and `stop`
/// withdraws exactly the subscriptions that stuck; a pair that fails either
/// way is logged and skipped, never fatal to the sweep.

use crate::keyspace::{pairs, Instrument, Market, PairTable};
use crate::lifecycle::Lifecycle;
use crate::provider::{Provider, Subscriber};
use crate::update::{InvalidUpdate, MarketUpdate, Tick};
use parking_lot::Mutex;
use std::sync::Arc;

/// Running totals for one pair
///
/// Both fields of a side move together, and only when the incoming tick has
/// that side present (price and amount both above zero).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VwapEntry {
    pub bid_total: f64,
    pub bid_amount: f64,
    pub offer_total: f64,
    pub offer_amount: f64,
}

impl VwapEntry {
    pub fn bid_vwap(&self) -> f64 {
        vwap(self.bid_total, self.bid_amount)
    }

    pub fn offer_vwap(&self) -> f64 {
        vwap(self.offer_total, self.offer_amount)
    }

    fn absorb(&mut self, tick: &Tick) {
        if tick.bid_amount > 0.0 && tick.bid_price > 0.0 {
            self.bid_total += tick.bid_amount * tick.bid_price;
            self.bid_amount += tick.bid_amount;
        }
        if tick.offer_amount > 0.0 && tick.offer_price > 0.0 {
            self.offer_total += tick.offer_amount * tick.offer_price;
            self.offer_amount += tick.offer_amount;
        }
    }
}

/// Volume-weighted average price; zero while nothing has accumulated
fn vwap(total: f64, amount: f64) -> f64 {
    if amount == 0.0 {
        return 0.0;
    }
    total / amount
}

struct VwapState {
    entries: Mutex<PairTable<VwapEntry>>,
}

impl Subscriber for VwapState {
    fn transform(&self, update: &MarketUpdate) -> Result<MarketUpdate, InvalidUpdate> {
        // Validate before touching any entry, so a bad update mutates nothing
        let (market, tick) = update.validate()?;

        let mut entries = self.entries.lock();
        let entry = entries.get_mut(tick.instrument, market);
        entry.absorb(&tick);

        let out = Tick {
            instrument: tick.instrument,
            side: tick.side,
            bid_price: entry.bid_vwap(),
            bid_amount: entry.bid_amount,
            offer_price: entry.offer_vwap(),
            offer_amount: entry.offer_amount,
        };
        drop(entries);

        let result = MarketUpdate::new(market, out);
        tracing::trace!("vwap {}", result);
        Ok(result)
    }
}

/// Aggregator facade: owns the shared state handle and its subscriptions
///
/// A single instance assumes one delivery path at a time; to aggregate more
/// streams, run more instances rather than sharing one.
pub struct VwapAggregator {
    provider: Arc<dyn Provider>,
    state: Arc<VwapState>,
    subscribed: Mutex<Vec<(Instrument, Market)>>,
}

impl VwapAggregator {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        VwapAggregator {
            provider,
            state: Arc::new(VwapState {
                entries: Mutex::new(PairTable::default()),
            }),
            subscribed: Mutex::new(Vec::new()),
        }
    }

    /// Copy of the running totals for one pair
    pub fn entry(&self, instrument: Instrument, market: Market) -> VwapEntry {
        *self.state.entries.lock().get(instrument, market)
    }
}

impl Subscriber for VwapAggregator {
    fn transform(&self, update: &MarketUpdate) -> Result<MarketUpdate, InvalidUpdate> {
        self.state.transform(update)
    }
}

impl Lifecycle for VwapAggregator {
    fn start(&self) {
        let mut subscribed = self.subscribed.lock();
        for (instrument, market) in pairs() {
            let handle: Arc<dyn Subscriber> = Arc::clone(&self.state) as Arc<dyn Subscriber>;
            match self.provider.subscribe(instrument, market, handle) {
                Ok(()) => subscribed.push((instrument, market)),
                Err(e) => {
                    tracing::warn!("vwap subscribe failed for {} {}: {}", instrument, market, e);
                }
            }
        }
        tracing::info!("vwap aggregator started, {} pairs subscribed", subscribed.len());
    }

    fn stop(&self) {
        let mut subscribed = self.subscribed.lock();
        for (instrument, market) in subscribed.drain(..) {
            let handle: Arc<dyn Subscriber> = Arc::clone(&self.state) as Arc<dyn Subscriber>;
            if let Err(e) = self.provider.unsubscribe(instrument, market, &handle) {
                tracing::warn!(
                    "vwap unsubscribe failed for {} {}: {}",
                    instrument,
                    market,
                    e
                );
            }
        }
        tracing::info!("vwap aggregator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::DirectProvider;
    use crate::keyspace::Side;

    fn aggregator() -> VwapAggregator {
        VwapAggregator::new(Arc::new(DirectProvider::new()))
    }

    fn two_sided(
        instrument: Instrument,
        market: Market,
        bid_price: f64,
        bid_amount: f64,
        offer_price: f64,
        offer_amount: f64,
    ) -> MarketUpdate {
        MarketUpdate::new(
            market,
            Tick {
                instrument,
                side: Side::Bid,
                bid_price,
                bid_amount,
                offer_price,
                offer_amount,
            },
        )
    }

    #[test]
    fn test_vwap_of_zero_amount_is_zero() {
        assert_eq!(vwap(0.0, 0.0), 0.0);
        assert_eq!(vwap(12345.0, 0.0), 0.0);
        assert!((vwap(290.0, 250.0) - 1.16).abs() < 1e-12);
    }

    #[test]
    fn test_entry_absorbs_both_sides() {
        let mut entry = VwapEntry::default();
        entry.absorb(&Tick {
            instrument: Instrument::GbpUsd,
            side: Side::Bid,
            bid_price: 1.1,
            bid_amount: 100.0,
            offer_price: 1.2,
            offer_amount: 200.0,
        });

        assert!((entry.bid_total - 110.0).abs() < 1e-12);
        assert!((entry.bid_amount - 100.0).abs() < 1e-12);
        assert!((entry.offer_total - 240.0).abs() < 1e-12);
        assert!((entry.offer_amount - 200.0).abs() < 1e-12);
    }

    #[test]
    fn test_entry_skips_absent_sides() {
        let mut entry = VwapEntry::default();

        // Zero and negative prices or amounts mark a side absent
        entry.absorb(&Tick {
            instrument: Instrument::GbpUsd,
            side: Side::Bid,
            bid_price: 0.0,
            bid_amount: 100.0,
            offer_price: 1.2,
            offer_amount: -5.0,
        });

        assert_eq!(entry, VwapEntry::default());
        assert_eq!(entry.bid_vwap(), 0.0);
        assert_eq!(entry.offer_vwap(), 0.0);
    }

    #[test]
    fn test_transform_emits_cumulative_quote() {
        let aggregator = aggregator();
        let first = aggregator
            .transform(&two_sided(
                Instrument::EurUsd,
                Market::Ebs,
                1.1,
                100.0,
                1.2,
                200.0,
            ))
            .unwrap();

        // First tick echoes itself as its own average
        let tick = first.tick.unwrap();
        assert!((tick.bid_price - 1.1).abs() < 1e-9);
        assert!((tick.bid_amount - 100.0).abs() < 1e-9);
        assert!((tick.offer_price - 1.2).abs() < 1e-9);
        assert!((tick.offer_amount - 200.0).abs() < 1e-9);
        assert_eq!(first.market, Some(Market::Ebs));
    }

    #[test]
    fn test_transform_rejects_incomplete_and_mutates_nothing() {
        let aggregator = aggregator();
        let result = aggregator.transform(&MarketUpdate::default());
        assert!(matches!(result, Err(InvalidUpdate::MissingMarket)));

        for (instrument, market) in pairs() {
            assert_eq!(aggregator.entry(instrument, market), VwapEntry::default());
        }
    }
}
