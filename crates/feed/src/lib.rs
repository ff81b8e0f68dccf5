//! Simulated market data feed.
//!
//! One task per symbol random-walks the mid price and publishes a tick to
//! the bus at jittered intervals. News shocks queued via
//! [`FeedSimulator::inject_news`] are applied one-shot by the next tick of
//! the affected symbol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use bus::TickBus;
use common::{NewsImpact, Result, SymbolRegistry, SymbolSpec, Tick};

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub tick_interval_min_ms: u64,
    pub tick_interval_max_ms: u64,
    /// One-step volatility as a fraction of mid.
    pub volatility_sigma: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tick_interval_min_ms: 1000,
            tick_interval_max_ms: 3000,
            volatility_sigma: 0.001,
        }
    }
}

/// Random-walk state for one symbol.
struct SymbolWalker {
    spec: SymbolSpec,
    mid: f64,
    sigma: f64,
}

impl SymbolWalker {
    fn new(spec: SymbolSpec, sigma: f64) -> Self {
        let mid = spec.base_price;
        Self { spec, mid, sigma }
    }

    /// Advance the walk one step and synthesize the next tick.
    fn step<R: Rng>(&mut self, rng: &mut R, news: Option<NewsImpact>) -> Tick {
        let drift: f64 = rng.gen_range(-1.0..=1.0) * self.sigma;
        let mut mid = self.mid * (1.0 + drift);

        let (spread, volume) = match news {
            Some(impact) => {
                // One-shot shock: jump, wide spread, elevated volume
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                mid *= 1.0 + sign * impact.magnitude();
                let spread = mid * 0.0003;
                let volume = rng.gen_range(100_000.0..1_100_000.0) * 5.0;
                (spread, volume)
            }
            None => {
                let spread = mid * (0.0001 + rng.gen_range(0.0..1.0) * 0.0003);
                let volume = rng.gen_range(100_000.0..1_100_000.0);
                (spread, volume)
            }
        };

        self.mid = mid;
        Tick {
            symbol: self.spec.symbol.clone(),
            bid: self.spec.round_price(mid - spread / 2.0),
            ask: self.spec.round_price(mid + spread / 2.0),
            volume,
            event_time: chrono::Utc::now(),
            seq: 0,
        }
    }
}

pub struct FeedSimulator {
    bus: Arc<TickBus>,
    registry: Arc<SymbolRegistry>,
    config: FeedConfig,
    pending_news: Arc<RwLock<HashMap<String, NewsImpact>>>,
}

impl FeedSimulator {
    pub fn new(bus: Arc<TickBus>, registry: Arc<SymbolRegistry>, config: FeedConfig) -> Self {
        Self {
            bus,
            registry,
            config,
            pending_news: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Queue a one-shot news shock for `symbol`, consumed by its next tick.
    pub async fn inject_news(&self, symbol: &str, impact: NewsImpact) -> Result<()> {
        self.registry.get(symbol)?;
        info!(%symbol, ?impact, "news shock queued");
        self.pending_news
            .write()
            .await
            .insert(symbol.to_string(), impact);
        Ok(())
    }

    /// Spawn one generator task per registered symbol.
    pub fn spawn_all(&self) -> Vec<JoinHandle<()>> {
        self.registry
            .specs()
            .map(|spec| self.spawn_symbol(spec.clone()))
            .collect()
    }

    fn spawn_symbol(&self, spec: SymbolSpec) -> JoinHandle<()> {
        let bus = Arc::clone(&self.bus);
        let pending_news = Arc::clone(&self.pending_news);
        let config = self.config.clone();

        tokio::spawn(async move {
            let symbol = spec.symbol.clone();
            let mut walker = SymbolWalker::new(spec, config.volatility_sigma);
            let mut rng = SmallRng::from_entropy();
            info!(%symbol, "feed generator started");

            loop {
                let wait_ms =
                    rng.gen_range(config.tick_interval_min_ms..=config.tick_interval_max_ms);
                sleep(Duration::from_millis(wait_ms)).await;

                let news = pending_news.write().await.remove(&symbol);
                let tick = walker.step(&mut rng, news);
                debug!(%symbol, bid = tick.bid, ask = tick.ask, "tick generated");
                if let Err(e) = bus.publish(tick).await {
                    warn!(%symbol, error = %e, "generated tick rejected by bus");
                }
            }
        })
    }
}
