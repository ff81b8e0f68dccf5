//! Engine task and its cloneable handle.
//!
//! The task owns all state transitions; other components interact through
//! `EngineHandle` commands and read-only snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use bus::{SymbolFilter, TickBus};
use common::{
    BusEvent, DailyStats, EngineCommand, EngineState, EngineStatus, HaltReason, OrderSide,
};

use crate::executor::{EngineMetrics, MetricsSnapshot, TradingCore};

/// Cloneable handle passed to the feed, tooling and tests.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    day: Arc<RwLock<DailyStats>>,
    metrics: Arc<EngineMetrics>,
    daily_cap: f64,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn start(&self) {
        self.send(EngineCommand::Start).await;
    }

    pub async fn stop(&self) {
        self.send(EngineCommand::Stop).await;
    }

    pub async fn halt(&self, reason: HaltReason) {
        self.send(EngineCommand::Halt(reason)).await;
    }

    pub async fn execute_manual(&self, symbol: &str, side: OrderSide, quantity: f64) {
        self.send(EngineCommand::ExecuteManual {
            symbol: symbol.to_string(),
            side,
            quantity,
        })
        .await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn status(&self) -> EngineStatus {
        let state = *self.state.read().await;
        let day = self.day.read().await.clone();
        EngineStatus {
            running: state.is_running(),
            halt_reason: state.halt_reason(),
            current_date: day.date,
            daily_notional: day.total_notional,
            trade_count: day.trade_count,
            remaining_capacity: (self.daily_cap - day.total_notional).max(0.0),
        }
    }
}

/// The engine task. Drives the evaluation loop, the mark loop and command
/// processing. Call [`Engine::run`] from `tokio::spawn`.
pub struct Engine {
    core: Arc<TradingCore>,
    bus: Arc<TickBus>,
    command_rx: mpsc::Receiver<EngineCommand>,
    mark_task: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn new(core: TradingCore, bus: Arc<TickBus>) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let core = Arc::new(core);

        let handle = EngineHandle {
            command_tx,
            state: core.state_handle(),
            day: core.day_handle(),
            metrics: core.metrics(),
            daily_cap: core.daily_cap(),
        };

        let engine = Engine {
            core,
            bus,
            command_rx,
            mark_task: None,
        };

        (engine, handle)
    }

    pub async fn run(mut self) {
        info!("engine task started in stopped state");
        let interval_ms = self.core.config().evaluation_interval_ms;
        let mut evaluation = tokio::time::interval(Duration::from_millis(interval_ms));
        evaluation.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(EngineCommand::Start) => self.handle_start().await,
                    Some(EngineCommand::Halt(reason)) => self.core.halt(reason).await,
                    Some(EngineCommand::Stop) => self.handle_stop().await,
                    Some(EngineCommand::ExecuteManual { symbol, side, quantity }) => {
                        self.core.rollover_if_needed().await;
                        // Outcome is visible via the trade tape and logs
                        let _ = self.core.execute_manual(&symbol, side, quantity).await;
                    }
                    None => {
                        warn!("engine command channel closed; shutting down");
                        self.handle_stop().await;
                        return;
                    }
                },
                _ = evaluation.tick() => {
                    self.core.rollover_if_needed().await;
                    if self.core.state().await.is_running() {
                        self.core.evaluate_all().await;
                    }
                }
            }
        }
    }

    async fn handle_start(&mut self) {
        let state = self.core.state().await;
        if state != EngineState::Stopped {
            warn!(current = %state, "start ignored: engine not stopped");
            return;
        }

        if let Err(e) = self.core.load_day().await {
            warn!(error = %e, "start aborted: could not recover state");
            return;
        }

        // Mark loop: keeps unrealized PnL fresh on every tick, including
        // while halted.
        let core = Arc::clone(&self.core);
        let mut sub = self.bus.subscribe(SymbolFilter::All);
        self.mark_task = Some(tokio::spawn(async move {
            while let Some(event) = sub.recv().await {
                if let BusEvent::Tick(tick) = event {
                    core.mark_tick(&tick).await;
                }
            }
        }));

        self.core.set_running().await;
        info!("engine running");
    }

    async fn handle_stop(&mut self) {
        if let Some(task) = self.mark_task.take() {
            task.abort();
        }
        self.core.set_stopped().await;
        info!("engine stopped");
    }
}
