//! Position ledger: exclusive owner of per-symbol net positions.
//!
//! Each symbol gets its own lock so distinct symbols update in parallel
//! while a given symbol's trade-apply and mark operations stay mutually
//! exclusive. External readers get owned snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use common::{OrderSide, Position};

/// Stop-loss / take-profit distances as fractions of the average entry
/// price. A non-positive fraction disables that exit level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitRules {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl Default for ExitRules {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
        }
    }
}

impl From<&common::Config> for ExitRules {
    fn from(cfg: &common::Config) -> Self {
        Self {
            stop_loss_pct: cfg.stop_loss_pct,
            take_profit_pct: cfg.take_profit_pct,
        }
    }
}

/// Result of applying one fill to a position.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// The position after the fill.
    pub position: Position,
    /// Realized PnL booked by this fill (0 when adding).
    pub realized_delta: f64,
}

/// Weighted-average position arithmetic, shared by preview and commit.
///
/// Adding to a position (same direction, or from flat) blends the average
/// price. Reducing books realized PnL against the held average; flipping
/// through zero leaves the residual at the fill price. Exit levels are
/// re-derived from the resulting average on every fill.
fn apply_fill(
    position: &mut Position,
    side: OrderSide,
    quantity: f64,
    price: f64,
    mark: f64,
    exits: &ExitRules,
) -> f64 {
    let signed = side.sign() * quantity;
    let q0 = position.quantity;
    let a0 = position.avg_price;
    let q1 = q0 + signed;

    let realized_delta = if q0 == 0.0 || q0.signum() == signed.signum() {
        position.avg_price = (q0.abs() * a0 + quantity * price) / q1.abs();
        0.0
    } else {
        let reduce = q0.abs().min(quantity);
        let realized = (price - a0) * reduce * q0.signum();
        position.avg_price = if q1 == 0.0 {
            0.0
        } else if q1.signum() == q0.signum() {
            a0
        } else {
            // Flipped through zero: residual opened at the fill price
            price
        };
        realized
    };

    position.quantity = q1;
    position.realized_pnl += realized_delta;
    position.unrealized_pnl = (mark - position.avg_price) * position.quantity;
    set_exit_levels(position, exits);
    position.updated_at = Utc::now();

    debug_assert!(
        position.quantity != 0.0 || position.avg_price == 0.0,
        "flat position must have zero average"
    );
    debug_assert!(position.avg_price >= 0.0, "negative average price");

    realized_delta
}

/// Long positions stop below and take profit above the average; shorts are
/// inverted. A flat position carries no levels.
fn set_exit_levels(position: &mut Position, exits: &ExitRules) {
    if position.quantity == 0.0 {
        position.stop_loss = None;
        position.take_profit = None;
        return;
    }
    let avg = position.avg_price;
    let long = position.quantity > 0.0;
    position.stop_loss = (exits.stop_loss_pct > 0.0).then(|| {
        if long {
            avg * (1.0 - exits.stop_loss_pct)
        } else {
            avg * (1.0 + exits.stop_loss_pct)
        }
    });
    position.take_profit = (exits.take_profit_pct > 0.0).then(|| {
        if long {
            avg * (1.0 + exits.take_profit_pct)
        } else {
            avg * (1.0 - exits.take_profit_pct)
        }
    });
}

#[derive(Default)]
pub struct PositionLedger {
    positions: RwLock<HashMap<String, Arc<Mutex<Position>>>>,
    exits: ExitRules,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(exits: ExitRules) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            exits,
        }
    }

    /// Restore positions from the store on engine start.
    pub async fn seed(&self, positions: Vec<Position>) {
        let mut map = self.positions.write().await;
        for position in positions {
            map.insert(
                position.symbol.clone(),
                Arc::new(Mutex::new(position)),
            );
        }
    }

    async fn entry(&self, symbol: &str) -> Arc<Mutex<Position>> {
        {
            let map = self.positions.read().await;
            if let Some(entry) = map.get(symbol) {
                return Arc::clone(entry);
            }
        }
        let mut map = self.positions.write().await;
        Arc::clone(
            map.entry(symbol.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Position::flat(symbol)))),
        )
    }

    /// The position this fill would produce, without committing it. Used by
    /// the engine to persist the post-trade state before mutating memory.
    pub async fn preview(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        mark: f64,
    ) -> ApplyOutcome {
        let entry = self.entry(symbol).await;
        let guard = entry.lock().await;
        let mut position = guard.clone();
        let realized_delta = apply_fill(&mut position, side, quantity, price, mark, &self.exits);
        ApplyOutcome {
            position,
            realized_delta,
        }
    }

    /// Apply a fill. Atomic per symbol.
    pub async fn apply_trade(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        mark: f64,
    ) -> ApplyOutcome {
        let entry = self.entry(symbol).await;
        let mut position = entry.lock().await;
        let realized_delta = apply_fill(&mut position, side, quantity, price, mark, &self.exits);
        debug!(
            %symbol,
            quantity = position.quantity,
            avg_price = position.avg_price,
            realized_delta,
            "position updated"
        );
        ApplyOutcome {
            position: position.clone(),
            realized_delta,
        }
    }

    /// Refresh unrealized PnL against a new mark. No-op for flat or unknown
    /// symbols.
    pub async fn mark(&self, symbol: &str, price: f64) {
        let entry = {
            let map = self.positions.read().await;
            match map.get(symbol) {
                Some(entry) => Arc::clone(entry),
                None => return,
            }
        };
        let mut position = entry.lock().await;
        if position.is_flat() {
            return;
        }
        position.unrealized_pnl = (price - position.avg_price) * position.quantity;
        position.updated_at = Utc::now();
    }

    pub async fn get(&self, symbol: &str) -> Option<Position> {
        let entry = {
            let map = self.positions.read().await;
            map.get(symbol).cloned()?
        };
        let position = entry.lock().await;
        Some(position.clone())
    }

    pub async fn snapshot(&self) -> Vec<Position> {
        let entries: Vec<Arc<Mutex<Position>>> = {
            let map = self.positions.read().await;
            map.values().cloned().collect()
        };
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(entry.lock().await.clone());
        }
        out
    }

    /// Number of symbols with an open (non-flat) position.
    pub async fn active_count(&self) -> u64 {
        self.snapshot()
            .await
            .iter()
            .filter(|p| !p.is_flat())
            .count() as u64
    }
}
