//! In-process store used by tests and ephemeral runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use common::{DailyStats, Position, Result, Trade};

use crate::TradeStore;

#[derive(Default)]
struct Inner {
    trades: Vec<Trade>,
    positions: HashMap<String, Position>,
    stats: HashMap<NaiveDate, DailyStats>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn append_trade(&self, trade: &Trade) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.trades.iter().any(|t| t.id == trade.id) {
            inner.trades.push(trade.clone());
        }
        Ok(())
    }

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .positions
            .insert(position.symbol.clone(), position.clone());
        Ok(())
    }

    async fn upsert_daily_stats(&self, stats: &DailyStats) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.stats.insert(stats.date, stats.clone());
        Ok(())
    }

    async fn record_execution(
        &self,
        trade: &Trade,
        position: &Position,
        stats: &DailyStats,
    ) -> Result<()> {
        // One lock scope = one transaction
        let mut inner = self.inner.lock().await;
        if !inner.trades.iter().any(|t| t.id == trade.id) {
            inner.trades.push(trade.clone());
        }
        inner
            .positions
            .insert(position.symbol.clone(), position.clone());
        inner.stats.insert(stats.date, stats.clone());
        Ok(())
    }

    async fn load_today_notional(&self, date: NaiveDate) -> Result<f64> {
        let inner = self.inner.lock().await;
        Ok(inner.stats.get(&date).map_or(0.0, |s| s.total_notional))
    }

    async fn load_daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStats>> {
        let inner = self.inner.lock().await;
        Ok(inner.stats.get(&date).cloned())
    }

    async fn load_positions(&self) -> Result<Vec<Position>> {
        let inner = self.inner.lock().await;
        Ok(inner.positions.values().cloned().collect())
    }

    async fn list_trades(
        &self,
        symbol: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Trade>> {
        let inner = self.inner.lock().await;
        let mut trades: Vec<Trade> = inner
            .trades
            .iter()
            .filter(|t| symbol.map_or(true, |s| t.symbol == s))
            .cloned()
            .collect();
        trades.sort_by(|a, b| (b.event_time, b.seq).cmp(&(a.event_time, a.seq)));
        Ok(trades
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::{OrderSide, TradeStatus};

    fn trade(symbol: &str, seq: u64, ts_offset_s: i64) -> Trade {
        Trade {
            id: common::new_trade_id(),
            symbol: symbol.into(),
            side: OrderSide::Buy,
            quantity: 1_000.0,
            price: 1.0851,
            notional: 1_085.1,
            strategy_tag: "consensus".into(),
            status: TradeStatus::Executed,
            reject_reason: None,
            event_time: Utc.timestamp_opt(1_700_000_000 + ts_offset_s, 0).unwrap(),
            seq,
        }
    }

    #[tokio::test]
    async fn append_is_idempotent_by_id() {
        let store = MemoryStore::new();
        let t = trade("EURUSD", 1, 0);
        store.append_trade(&t).await.unwrap();
        store.append_trade(&t).await.unwrap();
        assert_eq!(store.list_trades(None, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_orders_descending_with_seq_tiebreak() {
        let store = MemoryStore::new();
        // Same timestamp, increasing seq
        store.append_trade(&trade("EURUSD", 1, 0)).await.unwrap();
        store.append_trade(&trade("EURUSD", 2, 0)).await.unwrap();
        store.append_trade(&trade("EURUSD", 3, 60)).await.unwrap();

        let listed = store.list_trades(None, 10, 0).await.unwrap();
        let seqs: Vec<u64> = listed.iter().map(|t| t.seq).collect();
        assert_eq!(seqs, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn list_filters_by_symbol_and_paginates() {
        let store = MemoryStore::new();
        store.append_trade(&trade("EURUSD", 1, 0)).await.unwrap();
        store.append_trade(&trade("USDJPY", 2, 10)).await.unwrap();
        store.append_trade(&trade("EURUSD", 3, 20)).await.unwrap();

        let eur = store.list_trades(Some("EURUSD"), 10, 0).await.unwrap();
        assert_eq!(eur.len(), 2);
        let page2 = store.list_trades(Some("EURUSD"), 1, 1).await.unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].seq, 1);
    }

    #[tokio::test]
    async fn notional_defaults_to_zero_for_unknown_date() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(store.load_today_notional(date).await.unwrap(), 0.0);
    }
}
