/// Fan-out demo: a simulated feed into either provider variant
///
/// Runs the full stack for ten seconds: random burst updates into the chosen
/// provider with the VWAP aggregator subscribed to every pair. Pass `queued`
/// to dispatch through per-subscriber queues; anything else dispatches
/// directly on the feed thread.
///
///   cargo run --example provider_runner -- queued

use md_fanout::{
    DirectProvider, FeedSimulator, Lifecycle, Provider, QueuedProvider, SimConfig, UpdateSink,
    VwapAggregator,
};
use std::env;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RUN_FOR: Duration = Duration::from_secs(10);

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "md_fanout=debug,provider_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let variant = env::args().nth(1).unwrap_or_else(|| "direct".to_string());
    match variant.as_str() {
        "queued" => {
            tracing::info!("running queued dispatch for {:?}", RUN_FOR);
            run(Arc::new(QueuedProvider::with_env_config()));
        }
        _ => {
            tracing::info!("running direct dispatch for {:?}", RUN_FOR);
            run(Arc::new(DirectProvider::new()));
        }
    }
}

fn run<P>(provider: Arc<P>)
where
    P: Provider + UpdateSink + Lifecycle + 'static,
{
    let aggregator = VwapAggregator::new(Arc::clone(&provider) as Arc<dyn Provider>);

    aggregator.start();
    provider.start();

    let feed = FeedSimulator::spawn(
        Arc::clone(&provider) as Arc<dyn UpdateSink>,
        SimConfig::default(),
    );

    thread::sleep(RUN_FOR);

    // Wind down in feed order: producer first, then the aggregator's
    // subscriptions, then the dispatcher itself
    feed.stop();
    aggregator.stop();
    provider.stop();
}
