//! Tick bus: the single writer for per-symbol price history and the fan-out
//! point for tick and trade events.
//!
//! Producers call [`TickBus::publish`]; the bus validates the tick, assigns
//! the per-symbol sequence number, appends to the bounded history ring and
//! broadcasts to subscribers. Slow subscribers are skipped ahead
//! (drop-oldest) with an observable dropped-event counter.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::warn;

use common::{BusEvent, Error, HistoryPoint, Result, Tick, Trade};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Which events a subscription receives.
#[derive(Debug, Clone, Default)]
pub enum SymbolFilter {
    /// Every symbol.
    #[default]
    All,
    /// A single symbol.
    One(String),
}

impl SymbolFilter {
    fn matches(&self, symbol: &str) -> bool {
        match self {
            SymbolFilter::All => true,
            SymbolFilter::One(s) => s == symbol,
        }
    }
}

/// Per-symbol state owned exclusively by the bus.
#[derive(Debug, Default)]
struct SymbolBook {
    ring: VecDeque<HistoryPoint>,
    latest: Option<Tick>,
    next_seq: u64,
}

/// Aggregate bus health, for dashboards and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStatus {
    pub active_symbols: usize,
    pub average_spread: f64,
    pub latest_update: Option<DateTime<Utc>>,
    pub bad_ticks: u64,
    pub dropped_events: u64,
}

pub struct TickBus {
    books: RwLock<HashMap<String, SymbolBook>>,
    events_tx: broadcast::Sender<BusEvent>,
    history_capacity: usize,
    bad_ticks: AtomicU64,
    dropped_events: Arc<AtomicU64>,
}

impl TickBus {
    pub fn new(history_capacity: usize) -> Self {
        Self::with_channel_capacity(history_capacity, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Channel capacity bounds how far a subscriber may fall behind before
    /// old events are dropped for it.
    pub fn with_channel_capacity(history_capacity: usize, channel_capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(channel_capacity);
        Self {
            books: RwLock::new(HashMap::new()),
            events_tx,
            history_capacity,
            bad_ticks: AtomicU64::new(0),
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Validate, sequence, record and fan out one tick. Returns the tick
    /// with its assigned `seq`.
    pub async fn publish(&self, mut tick: Tick) -> Result<Tick> {
        if let Err(violation) = validate(&tick) {
            self.bad_ticks.fetch_add(1, Ordering::Relaxed);
            warn!(symbol = %tick.symbol, %violation, "rejecting bad tick");
            return Err(Error::BadTick(violation));
        }

        let mut books = self.books.write().await;
        let book = books.entry(tick.symbol.clone()).or_default();
        book.next_seq += 1;
        tick.seq = book.next_seq;

        if book.ring.len() == self.history_capacity {
            book.ring.pop_front();
        }
        book.ring.push_back(HistoryPoint::from_tick(&tick));
        book.latest = Some(tick.clone());

        // Sent under the lock so fan-out preserves per-symbol seq order.
        // No receivers is fine; events are fire-and-forget.
        let _ = self.events_tx.send(BusEvent::Tick(tick.clone()));
        Ok(tick)
    }

    /// Fan out a trade event to subscribers.
    pub fn publish_trade(&self, trade: Trade) {
        let _ = self.events_tx.send(BusEvent::Trade(trade));
    }

    /// Non-blocking push channel of bus events matching `filter`.
    pub fn subscribe(&self, filter: SymbolFilter) -> Subscription {
        Subscription {
            rx: self.events_tx.subscribe(),
            filter,
            dropped: AtomicU64::new(0),
            bus_dropped: Arc::clone(&self.dropped_events),
        }
    }

    /// The last `n` history points for `symbol`, oldest first.
    pub async fn snapshot(&self, symbol: &str, n: usize) -> Vec<HistoryPoint> {
        let books = self.books.read().await;
        match books.get(symbol) {
            Some(book) => {
                let skip = book.ring.len().saturating_sub(n);
                book.ring.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub async fn latest(&self, symbol: &str) -> Option<Tick> {
        let books = self.books.read().await;
        books.get(symbol).and_then(|b| b.latest.clone())
    }

    pub async fn history_len(&self, symbol: &str) -> usize {
        let books = self.books.read().await;
        books.get(symbol).map_or(0, |b| b.ring.len())
    }

    pub fn bad_tick_count(&self) -> u64 {
        self.bad_ticks.load(Ordering::Relaxed)
    }

    pub fn dropped_event_count(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub async fn market_status(&self) -> MarketStatus {
        let books = self.books.read().await;
        let latest: Vec<&Tick> = books.values().filter_map(|b| b.latest.as_ref()).collect();
        let average_spread = if latest.is_empty() {
            0.0
        } else {
            latest.iter().map(|t| t.spread()).sum::<f64>() / latest.len() as f64
        };
        MarketStatus {
            active_symbols: latest.len(),
            average_spread,
            latest_update: latest.iter().map(|t| t.event_time).max(),
            bad_ticks: self.bad_tick_count(),
            dropped_events: self.dropped_event_count(),
        }
    }
}

fn validate(tick: &Tick) -> std::result::Result<(), String> {
    if !tick.bid.is_finite() || !tick.ask.is_finite() {
        return Err("non-finite price".to_string());
    }
    if tick.bid <= 0.0 {
        return Err(format!("bid must be positive, got {}", tick.bid));
    }
    if tick.ask < tick.bid {
        return Err(format!("ask {} below bid {}", tick.ask, tick.bid));
    }
    if tick.spread() <= 0.0 {
        return Err("spread must be positive".to_string());
    }
    if tick.volume < 0.0 {
        return Err(format!("negative volume {}", tick.volume));
    }
    Ok(())
}

/// A subscriber's end of the bus. Lagging is handled inside [`recv`]:
/// skipped events are counted, never delivered out of order.
///
/// [`recv`]: Subscription::recv
pub struct Subscription {
    rx: broadcast::Receiver<BusEvent>,
    filter: SymbolFilter,
    dropped: AtomicU64,
    bus_dropped: Arc<AtomicU64>,
}

impl Subscription {
    /// Next matching event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.filter.matches(event.symbol()) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped.fetch_add(n, Ordering::Relaxed);
                    self.bus_dropped.fetch_add(n, Ordering::Relaxed);
                    warn!(dropped = n, "subscriber lagged; oldest events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Events dropped for this subscriber because it fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
