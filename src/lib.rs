/// md-fanout - Market Data Fan-out and Aggregation
///
/// Subscription-driven fan-out of market updates over a closed
/// (instrument, market) key space, with a streaming VWAP aggregator riding
/// on top. Features include:
/// - Direct synchronous dispatch on the feed thread
/// - Queued dispatch with a bounded ring and dedicated worker per subscriber
/// - Blocking backpressure, no update loss while running
/// - Running volume-weighted averages per pair
/// - Random burst feed simulator for demos and benchmarks

pub mod keyspace;
pub mod update;
pub mod provider;
pub mod lifecycle;
pub mod direct;
pub mod ring;
pub mod queued;
pub mod vwap;
pub mod sim;

pub use keyspace::{pairs, Instrument, Market, PairTable, Side, PAIR_COUNT};
pub use update::{InvalidUpdate, MarketUpdate, Tick};
pub use provider::{
    DispatchError, Passthrough, Provider, Subscriber, SubscriptionError, UpdateSink,
};
pub use lifecycle::{join_timeout, Lifecycle};
pub use direct::DirectProvider;
pub use ring::{RingBuffer, RingHalted};
pub use queued::{QueuedProvider, DEFAULT_QUEUE_CAPACITY, QUEUE_CAPACITY_ENV};
pub use vwap::{VwapAggregator, VwapEntry};
pub use sim::{FeedHandle, FeedSimulator, SimConfig};
