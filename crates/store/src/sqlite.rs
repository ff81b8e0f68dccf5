//! Durable store backed by SQLite via sqlx.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::info;

use common::{DailyStats, Error, OrderSide, Position, RejectReason, Result, Trade, TradeStatus};

use crate::TradeStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Config(format!("migration failed: {e}")))?;
        info!(%database_url, "sqlite store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const DATE_FMT: &str = "%Y-%m-%d";

async fn insert_trade<'e, E>(executor: E, trade: &Trade) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO trades
            (id, symbol, side, quantity, price, notional, strategy_tag,
             status, reject_reason, event_time, seq)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(trade.id.to_string())
    .bind(&trade.symbol)
    .bind(trade.side)
    .bind(trade.quantity)
    .bind(trade.price)
    .bind(trade.notional)
    .bind(&trade.strategy_tag)
    .bind(trade.status)
    .bind(trade.reject_reason.map(|r| r.as_code()))
    .bind(trade.event_time.to_rfc3339())
    .bind(trade.seq as i64)
    .execute(executor)
    .await?;
    Ok(())
}

async fn upsert_position_row<'e, E>(executor: E, position: &Position) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO positions
            (symbol, quantity, avg_price, realized_pnl, unrealized_pnl,
             stop_loss, take_profit, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(symbol) DO UPDATE SET
            quantity = excluded.quantity,
            avg_price = excluded.avg_price,
            realized_pnl = excluded.realized_pnl,
            unrealized_pnl = excluded.unrealized_pnl,
            stop_loss = excluded.stop_loss,
            take_profit = excluded.take_profit,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&position.symbol)
    .bind(position.quantity)
    .bind(position.avg_price)
    .bind(position.realized_pnl)
    .bind(position.unrealized_pnl)
    .bind(position.stop_loss)
    .bind(position.take_profit)
    .bind(position.updated_at.to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

async fn upsert_stats_row<'e, E>(executor: E, stats: &DailyStats) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO daily_stats
            (date, total_notional, trade_count, realized_pnl, active_positions)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(date) DO UPDATE SET
            total_notional = excluded.total_notional,
            trade_count = excluded.trade_count,
            realized_pnl = excluded.realized_pnl,
            active_positions = excluded.active_positions
        "#,
    )
    .bind(stats.date.format(DATE_FMT).to_string())
    .bind(stats.total_notional)
    .bind(stats.trade_count as i64)
    .bind(stats.realized_pnl)
    .bind(stats.active_positions as i64)
    .execute(executor)
    .await?;
    Ok(())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("bad timestamp '{raw}': {e}")))
}

fn trade_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Trade> {
    let id: String = row.try_get("id")?;
    let reject_reason: Option<String> = row.try_get("reject_reason")?;
    let event_time: String = row.try_get("event_time")?;
    let seq: i64 = row.try_get("seq")?;

    Ok(Trade {
        id: uuid::Uuid::parse_str(&id).map_err(|e| Error::Other(format!("bad trade id: {e}")))?,
        symbol: row.try_get("symbol")?,
        side: row.try_get::<OrderSide, _>("side")?,
        quantity: row.try_get("quantity")?,
        price: row.try_get("price")?,
        notional: row.try_get("notional")?,
        strategy_tag: row.try_get("strategy_tag")?,
        status: row.try_get::<TradeStatus, _>("status")?,
        reject_reason: reject_reason.as_deref().and_then(RejectReason::from_code),
        event_time: parse_time(&event_time)?,
        seq: seq as u64,
    })
}

#[async_trait]
impl TradeStore for SqliteStore {
    async fn append_trade(&self, trade: &Trade) -> Result<()> {
        insert_trade(&self.pool, trade).await
    }

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        upsert_position_row(&self.pool, position).await
    }

    async fn upsert_daily_stats(&self, stats: &DailyStats) -> Result<()> {
        upsert_stats_row(&self.pool, stats).await
    }

    async fn record_execution(
        &self,
        trade: &Trade,
        position: &Position,
        stats: &DailyStats,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_trade(&mut *tx, trade).await?;
        upsert_position_row(&mut *tx, position).await?;
        upsert_stats_row(&mut *tx, stats).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_today_notional(&self, date: NaiveDate) -> Result<f64> {
        let row = sqlx::query("SELECT total_notional FROM daily_stats WHERE date = ?1")
            .bind(date.format(DATE_FMT).to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map_or(0.0, |r| r.get("total_notional")))
    }

    async fn load_daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStats>> {
        let row = sqlx::query(
            r#"
            SELECT total_notional, trade_count, realized_pnl, active_positions
            FROM daily_stats WHERE date = ?1
            "#,
        )
        .bind(date.format(DATE_FMT).to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DailyStats {
            date,
            total_notional: r.get("total_notional"),
            trade_count: r.get::<i64, _>("trade_count") as u64,
            realized_pnl: r.get("realized_pnl"),
            active_positions: r.get::<i64, _>("active_positions") as u64,
        }))
    }

    async fn load_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, quantity, avg_price, realized_pnl, unrealized_pnl,
                   stop_loss, take_profit, updated_at
            FROM positions
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let updated_at: String = row.try_get("updated_at")?;
                Ok(Position {
                    symbol: row.try_get("symbol")?,
                    quantity: row.try_get("quantity")?,
                    avg_price: row.try_get("avg_price")?,
                    realized_pnl: row.try_get("realized_pnl")?,
                    unrealized_pnl: row.try_get("unrealized_pnl")?,
                    stop_loss: row.try_get("stop_loss")?,
                    take_profit: row.try_get("take_profit")?,
                    updated_at: parse_time(&updated_at)?,
                })
            })
            .collect()
    }

    async fn list_trades(
        &self,
        symbol: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Trade>> {
        let rows = match symbol {
            Some(symbol) => {
                sqlx::query(
                    r#"
                    SELECT * FROM trades WHERE symbol = ?1
                    ORDER BY event_time DESC, seq DESC
                    LIMIT ?2 OFFSET ?3
                    "#,
                )
                .bind(symbol)
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM trades
                    ORDER BY event_time DESC, seq DESC
                    LIMIT ?1 OFFSET ?2
                    "#,
                )
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(trade_from_row).collect()
    }
}
