/// Market update and tick values
///
/// A `Tick` is a two-sided quote for one instrument. A `MarketUpdate` pairs a
/// tick with its source market and is the unit that flows from the feed
/// through dispatch to subscribers. Updates are plain `Copy` values so queued
/// dispatch can hand them between threads by copy into pre-allocated ring
/// slots; the all-`None` default is the state of a slot that has never been
/// written, and `validate` rejects it.

use crate::keyspace::{Instrument, Market, Side};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidUpdate {
    #[error("update carries no market")]
    MissingMarket,

    #[error("update carries no tick")]
    MissingTick,
}

/// Immutable two-sided quote
///
/// A side with price or amount at or below zero is absent from this tick and
/// must be skipped by consumers. The `side` tag rides along untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub instrument: Instrument,
    pub side: Side,
    pub bid_price: f64,
    pub bid_amount: f64,
    pub offer_price: f64,
    pub offer_amount: f64,
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} bid {:.5}x{} offer {:.5}x{}",
            self.instrument,
            self.side,
            self.bid_price,
            self.bid_amount,
            self.offer_price,
            self.offer_amount
        )
    }
}

/// One event on the update plane: a tick attributed to a market
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketUpdate {
    pub market: Option<Market>,
    pub tick: Option<Tick>,
}

impl MarketUpdate {
    pub fn new(market: Market, tick: Tick) -> Self {
        MarketUpdate {
            market: Some(market),
            tick: Some(tick),
        }
    }

    /// Check completeness, yielding the market and tick by value
    ///
    /// This is the single validation point for both dispatch and transforms;
    /// the market is checked before the tick.
    pub fn validate(&self) -> Result<(Market, Tick), InvalidUpdate> {
        let market = self.market.ok_or(InvalidUpdate::MissingMarket)?;
        let tick = self.tick.ok_or(InvalidUpdate::MissingTick)?;
        Ok((market, tick))
    }
}

impl fmt::Display for MarketUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.market, self.tick) {
            (Some(market), Some(tick)) => write!(f, "{} {}", market, tick),
            _ => f.write_str("(incomplete update)"),
        }
    }
}
