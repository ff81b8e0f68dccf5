//! Persistence for trades, positions and daily statistics.
//!
//! The trait is the contract the engine programs against; `SqliteStore` is
//! the durable implementation and `MemoryStore` backs tests and ephemeral
//! runs. A single execution writes trade + position + daily stats in one
//! transaction via [`TradeStore::record_execution`].

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use common::{DailyStats, Position, Result, Trade};

#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Append one trade. Idempotent by `trade.id`.
    async fn append_trade(&self, trade: &Trade) -> Result<()>;

    /// Insert or replace the position row for its symbol.
    async fn upsert_position(&self, position: &Position) -> Result<()>;

    /// Insert or replace the stats row for its date.
    async fn upsert_daily_stats(&self, stats: &DailyStats) -> Result<()>;

    /// Commit trade + position + daily stats as one transaction. Either all
    /// three land or none do.
    async fn record_execution(
        &self,
        trade: &Trade,
        position: &Position,
        stats: &DailyStats,
    ) -> Result<()>;

    /// Total executed notional recorded for `date` (0 when absent).
    async fn load_today_notional(&self, date: NaiveDate) -> Result<f64>;

    async fn load_daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStats>>;

    /// All persisted positions, for ledger recovery on start.
    async fn load_positions(&self) -> Result<Vec<Position>>;

    /// Trades in descending `(event_time, seq)` order, optionally filtered
    /// by symbol.
    async fn list_trades(
        &self,
        symbol: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Trade>>;
}
