//! The trading core: evaluation, sizing, risk gating, execution and the
//! atomic persistence of each fill.
//!
//! `TradingCore` is shared behind an `Arc`; the engine task in
//! [`crate::lifecycle`] is its only trade-applying caller, which keeps the
//! day book and engine state in a single-writer domain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use bus::TickBus;
use common::{
    new_trade_id, Clock, DailyStats, EngineState, Error, HaltReason, OrderSide, RejectReason,
    Result, Signal, SignalKind, SymbolRegistry, Tick, Trade, TradeSequence, TradeStatus,
};
use ledger::PositionLedger;
use risk::{RiskContext, RiskDecision, RiskGate, TradeProposal};
use store::TradeStore;
use strategy::ConsensusEvaluator;

use crate::EngineConfig;

/// Monotonic counters exposed alongside the engine status.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    executed_trades: AtomicU64,
    rejected_trades: AtomicU64,
    persistence_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub executed_trades: u64,
    pub rejected_trades: u64,
    pub persistence_failures: u64,
}

impl EngineMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            executed_trades: self.executed_trades.load(Ordering::Relaxed),
            rejected_trades: self.rejected_trades.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct TradingCore {
    config: EngineConfig,
    bus: Arc<TickBus>,
    ledger: Arc<PositionLedger>,
    store: Arc<dyn TradeStore>,
    registry: Arc<SymbolRegistry>,
    evaluator: ConsensusEvaluator,
    gate: RiskGate,
    clock: Arc<dyn Clock>,
    seq: TradeSequence,
    state: Arc<RwLock<EngineState>>,
    day: Arc<RwLock<DailyStats>>,
    metrics: Arc<EngineMetrics>,
}

impl TradingCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        bus: Arc<TickBus>,
        ledger: Arc<PositionLedger>,
        store: Arc<dyn TradeStore>,
        registry: Arc<SymbolRegistry>,
        evaluator: ConsensusEvaluator,
        gate: RiskGate,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let today = clock.now_wall().date_naive();
        Self {
            config,
            bus,
            ledger,
            store,
            registry,
            evaluator,
            gate,
            clock,
            seq: TradeSequence::new(),
            state: Arc::new(RwLock::new(EngineState::Stopped)),
            day: Arc::new(RwLock::new(DailyStats::empty(today))),
            metrics: Arc::new(EngineMetrics::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state_handle(&self) -> Arc<RwLock<EngineState>> {
        Arc::clone(&self.state)
    }

    pub fn day_handle(&self) -> Arc<RwLock<DailyStats>> {
        Arc::clone(&self.day)
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn daily_cap(&self) -> f64 {
        self.gate.config().daily_cap_notional
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Recover today's stats and the persisted positions. Called on start.
    pub async fn load_day(&self) -> Result<()> {
        let today = self.clock.now_wall().date_naive();
        let stats = self
            .store
            .load_daily_stats(today)
            .await?
            .unwrap_or_else(|| DailyStats::empty(today));
        info!(
            date = %today,
            daily_notional = stats.total_notional,
            "recovered daily stats"
        );
        *self.day.write().await = stats;

        let positions = self.store.load_positions().await?;
        if !positions.is_empty() {
            info!(count = positions.len(), "recovered positions");
            self.ledger.seed(positions).await;
        }
        Ok(())
    }

    /// At UTC midnight: fresh day book, and a daily-volume halt clears.
    pub async fn rollover_if_needed(&self) {
        let today = self.clock.now_wall().date_naive();
        let mut day = self.day.write().await;
        if day.date == today {
            return;
        }
        info!(from = %day.date, to = %today, "daily rollover");
        *day = DailyStats::empty(today);
        drop(day);

        let mut state = self.state.write().await;
        if *state
            == (EngineState::Halted {
                reason: HaltReason::DailyVolumeExceeded,
            })
        {
            info!("daily-volume halt cleared by rollover");
            *state = EngineState::Running;
        }
    }

    pub async fn set_running(&self) {
        *self.state.write().await = EngineState::Running;
    }

    pub async fn set_stopped(&self) {
        *self.state.write().await = EngineState::Stopped;
    }

    /// `Running → Halted`. Marking continues; evaluation stops.
    pub async fn halt(&self, reason: HaltReason) {
        let mut state = self.state.write().await;
        if *state == EngineState::Running {
            warn!(%reason, "engine halted");
            *state = EngineState::Halted { reason };
        } else {
            warn!(%reason, current = %*state, "halt ignored: engine not running");
        }
    }

    /// Refresh unrealized PnL for the tick's symbol.
    pub async fn mark_tick(&self, tick: &Tick) {
        self.ledger.mark(&tick.symbol, tick.mid()).await;
    }

    /// One evaluation sweep: exit checks first, then every registered
    /// symbol through the strategies. Errors are contained per symbol; the
    /// sweep always finishes.
    pub async fn evaluate_all(&self) {
        self.check_exits().await;
        for symbol in self.registry.symbols() {
            if let Err(e) = self.evaluate_symbol(symbol).await {
                match &e {
                    Error::TradeRejected { .. } => {}
                    other => error!(%symbol, error = %other, "evaluation failed"),
                }
            }
        }
    }

    /// Close any position whose stop-loss or take-profit level the market
    /// has crossed. Longs exit against the bid, shorts against the ask.
    pub async fn check_exits(&self) -> Vec<Trade> {
        let mut closed = Vec::new();
        for position in self.ledger.snapshot().await {
            if position.is_flat() || !self.registry.contains(&position.symbol) {
                continue;
            }
            let Some(tick) = self.bus.latest(&position.symbol).await else {
                continue;
            };

            let long = position.quantity > 0.0;
            let exit_price = if long { tick.bid } else { tick.ask };
            let stop_hit = position.stop_loss.map_or(false, |sl| {
                if long {
                    exit_price <= sl
                } else {
                    exit_price >= sl
                }
            });
            let target_hit = position.take_profit.map_or(false, |tp| {
                if long {
                    exit_price >= tp
                } else {
                    exit_price <= tp
                }
            });

            let tag = if stop_hit {
                "stop_loss"
            } else if target_hit {
                "take_profit"
            } else {
                continue;
            };

            let side = if long { OrderSide::Sell } else { OrderSide::Buy };
            info!(
                symbol = %position.symbol,
                quantity = position.quantity,
                exit_price,
                reason = tag,
                "exit level crossed; closing position"
            );
            match self
                .execute(&position.symbol, side, position.quantity.abs(), tag)
                .await
            {
                Ok(trade) => closed.push(trade),
                Err(e) => warn!(symbol = %position.symbol, error = %e, "auto-close failed"),
            }
        }
        closed
    }

    /// Evaluate one symbol: snapshot → consensus → (maybe) execute.
    pub async fn evaluate_symbol(&self, symbol: &str) -> Result<Option<Trade>> {
        let window = self.evaluator.params().min_history();
        let history = self.bus.snapshot(symbol, window).await;
        let prices: Vec<f64> = history.iter().map(|h| h.mid).collect();

        let signal = self.evaluator.evaluate(symbol, &prices);
        if signal.kind == SignalKind::Hold || signal.confidence < self.config.min_confidence {
            return Ok(None);
        }

        if !self.direction_compatible(&signal).await {
            debug!(
                %symbol,
                kind = ?signal.kind,
                "signal direction incompatible with open position"
            );
            return Ok(None);
        }

        let side = match signal.kind.as_side() {
            Some(side) => side,
            None => return Ok(None),
        };
        self.execute_signal(symbol, side, signal.confidence, "consensus")
            .await
            .map(Some)
    }

    /// BUY only adds when flat or short; SELL only when flat or long.
    async fn direction_compatible(&self, signal: &Signal) -> bool {
        let quantity = self
            .ledger
            .get(&signal.symbol)
            .await
            .map_or(0.0, |p| p.quantity);
        match signal.kind {
            SignalKind::Buy => quantity <= 0.0,
            SignalKind::Sell => quantity >= 0.0,
            SignalKind::Hold => false,
        }
    }

    /// Size from confidence, then run the full execution path.
    pub async fn execute_signal(
        &self,
        symbol: &str,
        side: OrderSide,
        confidence: f64,
        tag: &str,
    ) -> Result<Trade> {
        let spec = self.registry.get(symbol)?;
        let tick = self
            .bus
            .latest(symbol)
            .await
            .ok_or_else(|| Error::Other(format!("no market data for {symbol}")))?;
        let quantity = self.gate.size_position(spec, confidence, tick.mid());
        self.execute(symbol, side, quantity, tag).await
    }

    /// Manually sized trade, same gate and persistence as strategy trades.
    pub async fn execute_manual(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<Trade> {
        self.execute(symbol, side, quantity, "manual").await
    }

    async fn execute(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        tag: &str,
    ) -> Result<Trade> {
        self.registry.get(symbol)?;
        let tick = self
            .bus
            .latest(symbol)
            .await
            .ok_or_else(|| Error::Other(format!("no market data for {symbol}")))?;

        // BUY lifts the ask, SELL hits the bid
        let price = match side {
            OrderSide::Buy => tick.ask,
            OrderSide::Sell => tick.bid,
        };
        let proposal = TradeProposal {
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
        };

        let ctx = RiskContext {
            engine_state: self.state().await,
            daily_notional: self.day.read().await.total_notional,
            symbol_exposure: self
                .ledger
                .get(symbol)
                .await
                .map_or(0.0, |p| p.exposure()),
        };

        if let RiskDecision::Rejected { reason, halt } = self.gate.check(&proposal, &ctx) {
            if halt {
                self.halt(HaltReason::DailyVolumeExceeded).await;
            }
            self.record_rejection(&proposal, reason, tag).await;
            return Err(Error::TradeRejected { reason });
        }

        let trade = Trade {
            id: new_trade_id(),
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            notional: proposal.notional(),
            strategy_tag: tag.to_string(),
            status: TradeStatus::Executed,
            reject_reason: None,
            event_time: self.clock.now_wall(),
            seq: self.seq.next(),
        };

        // Compute every post-trade value up front, persist the three rows in
        // one transaction, and only then touch in-memory state. A failed or
        // timed-out write therefore leaves memory exactly as it was.
        let preview = self
            .ledger
            .preview(symbol, side, quantity, price, tick.mid())
            .await;
        let new_stats = self.stats_after(&trade, &preview).await;

        let deadline = Duration::from_millis(self.config.persistence_deadline_ms);
        let write = timeout(
            deadline,
            self.store.record_execution(&trade, &preview.position, &new_stats),
        )
        .await;
        match write {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(%symbol, error = %e, "execution write failed; rolling back");
                return Err(self.persistence_rejection(&proposal, tag).await);
            }
            Err(_) => {
                error!(%symbol, ?deadline, "execution write timed out; rolling back");
                return Err(self.persistence_rejection(&proposal, tag).await);
            }
        }

        self.ledger
            .apply_trade(symbol, side, quantity, price, tick.mid())
            .await;
        *self.day.write().await = new_stats;
        self.metrics.executed_trades.fetch_add(1, Ordering::Relaxed);

        info!(
            %symbol,
            side = %side,
            quantity,
            price,
            notional = trade.notional,
            strategy = tag,
            "trade executed"
        );
        self.bus.publish_trade(trade.clone());
        Ok(trade)
    }

    async fn stats_after(&self, trade: &Trade, preview: &ledger::ApplyOutcome) -> DailyStats {
        let mut stats = self.day.read().await.clone();
        stats.total_notional += trade.notional;
        stats.trade_count += 1;
        stats.realized_pnl += preview.realized_delta;

        let was_active = self
            .ledger
            .get(&trade.symbol)
            .await
            .map_or(false, |p| !p.is_flat());
        let now_active = !preview.position.is_flat();
        let mut active = self.ledger.active_count().await;
        if was_active && !now_active {
            active = active.saturating_sub(1);
        } else if !was_active && now_active {
            active += 1;
        }
        stats.active_positions = active;
        stats
    }

    async fn persistence_rejection(&self, proposal: &TradeProposal, tag: &str) -> Error {
        self.metrics
            .persistence_failures
            .fetch_add(1, Ordering::Relaxed);
        self.record_rejection(proposal, RejectReason::PersistenceFailed, tag)
            .await;
        Error::TradeRejected {
            reason: RejectReason::PersistenceFailed,
        }
    }

    /// Best-effort append of a REJECTED trade row. The rejection itself is
    /// already decided; a store fault here only costs the audit record.
    async fn record_rejection(&self, proposal: &TradeProposal, reason: RejectReason, tag: &str) {
        self.metrics.rejected_trades.fetch_add(1, Ordering::Relaxed);
        let trade = Trade {
            id: new_trade_id(),
            symbol: proposal.symbol.clone(),
            side: proposal.side,
            quantity: proposal.quantity,
            price: proposal.price,
            notional: proposal.notional(),
            strategy_tag: tag.to_string(),
            status: TradeStatus::Rejected,
            reject_reason: Some(reason),
            event_time: self.clock.now_wall(),
            seq: self.seq.next(),
        };
        if let Err(e) = self.store.append_trade(&trade).await {
            debug!(error = %e, "failed to record rejection");
        }
    }
}
