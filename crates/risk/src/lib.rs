//! Risk gate: the checkpoint between a sized trade proposal and the
//! executor.
//!
//! ALL trades MUST pass [`RiskGate::check`] before execution. The gate is
//! pure: it never mutates engine state itself, but a `DailyVolumeExceeded`
//! rejection instructs the engine to halt for the rest of the UTC day.

use serde::{Deserialize, Serialize};
use tracing::warn;

use common::{EngineState, OrderSide, RejectReason, SymbolSpec};

/// User-configurable risk limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Ceiling on total executed notional within one UTC day.
    pub daily_cap_notional: f64,
    /// Notional of a full-confidence position.
    pub base_position_notional: f64,
    /// Smallest trade worth executing; proposals below are sized up.
    pub min_notional: f64,
    /// Single-trade ceiling as a fraction of the daily cap.
    pub per_trade_cap_fraction: f64,
    /// Per-symbol exposure ceiling as a fraction of the daily cap.
    pub per_symbol_cap_fraction: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_cap_notional: 10_000_000.0,
            base_position_notional: 10_000.0,
            min_notional: 1_000.0,
            per_trade_cap_fraction: 0.10,
            per_symbol_cap_fraction: 0.20,
        }
    }
}

impl From<&common::Config> for RiskConfig {
    fn from(cfg: &common::Config) -> Self {
        Self {
            daily_cap_notional: cfg.daily_cap_notional,
            base_position_notional: cfg.base_position_notional,
            min_notional: cfg.min_notional,
            per_trade_cap_fraction: cfg.per_trade_cap_fraction,
            per_symbol_cap_fraction: cfg.per_symbol_cap_fraction,
        }
    }
}

/// A sized trade awaiting the gate.
#[derive(Debug, Clone)]
pub struct TradeProposal {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Execution price (ask for BUY, bid for SELL).
    pub price: f64,
}

impl TradeProposal {
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }
}

/// Engine-side facts the gate needs; the caller snapshots them.
#[derive(Debug, Clone, Copy)]
pub struct RiskContext {
    pub engine_state: EngineState,
    /// Notional executed so far today.
    pub daily_notional: f64,
    /// `|position.quantity × position.avg_price|` for the proposal's symbol.
    pub symbol_exposure: f64,
}

/// Gate outcome. `halt` tells the engine to stop trading for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskDecision {
    Approved,
    Rejected { reason: RejectReason, halt: bool },
}

impl RiskDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskDecision::Approved)
    }
}

pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Size a position from signal confidence, in base units rounded to the
    /// symbol's lot step. The result never falls below the min-notional
    /// floor.
    pub fn size_position(&self, spec: &SymbolSpec, confidence: f64, mid: f64) -> f64 {
        let target_notional = (self.config.base_position_notional * confidence)
            .max(self.config.min_notional);
        let quantity = spec.round_quantity(target_notional / mid);

        if quantity * mid < self.config.min_notional {
            // Size up to the floor instead of rejecting
            (self.config.min_notional / mid / spec.lot_step).ceil() * spec.lot_step
        } else {
            quantity
        }
    }

    /// Evaluate the limit checks in order. First violation wins.
    pub fn check(&self, proposal: &TradeProposal, ctx: &RiskContext) -> RiskDecision {
        let notional = proposal.notional();

        if !ctx.engine_state.is_running() {
            return self.reject(proposal, RejectReason::EngineHalted, false);
        }

        if ctx.daily_notional + notional > self.config.daily_cap_notional {
            return self.reject(proposal, RejectReason::DailyVolumeExceeded, true);
        }

        if notional > self.config.daily_cap_notional * self.config.per_trade_cap_fraction {
            return self.reject(proposal, RejectReason::TradeTooLarge, false);
        }

        let symbol_cap = self.config.daily_cap_notional * self.config.per_symbol_cap_fraction;
        if ctx.symbol_exposure + notional > symbol_cap {
            return self.reject(proposal, RejectReason::SymbolExposureExceeded, false);
        }

        RiskDecision::Approved
    }

    fn reject(&self, proposal: &TradeProposal, reason: RejectReason, halt: bool) -> RiskDecision {
        warn!(
            symbol = %proposal.symbol,
            side = %proposal.side,
            notional = proposal.notional(),
            %reason,
            "trade rejected by risk gate"
        );
        RiskDecision::Rejected { reason, halt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{HaltReason, SymbolRegistry};

    fn gate() -> RiskGate {
        RiskGate::new(RiskConfig::default())
    }

    fn eurusd_spec() -> SymbolSpec {
        SymbolRegistry::builtin().get("EURUSD").unwrap().clone()
    }

    fn proposal(quantity: f64, price: f64) -> TradeProposal {
        TradeProposal {
            symbol: "EURUSD".into(),
            side: OrderSide::Buy,
            quantity,
            price,
        }
    }

    fn running_ctx() -> RiskContext {
        RiskContext {
            engine_state: EngineState::Running,
            daily_notional: 0.0,
            symbol_exposure: 0.0,
        }
    }

    #[test]
    fn approves_a_modest_trade() {
        let decision = gate().check(&proposal(9_000.0, 1.0851), &running_ctx());
        assert!(decision.is_approved());
    }

    #[test]
    fn halted_engine_rejects_without_halting_again() {
        let ctx = RiskContext {
            engine_state: EngineState::Halted {
                reason: HaltReason::DailyVolumeExceeded,
            },
            ..running_ctx()
        };
        let decision = gate().check(&proposal(9_000.0, 1.0851), &ctx);
        assert_eq!(
            decision,
            RiskDecision::Rejected {
                reason: RejectReason::EngineHalted,
                halt: false
            }
        );
    }

    #[test]
    fn stopped_engine_rejects_too() {
        let ctx = RiskContext {
            engine_state: EngineState::Stopped,
            ..running_ctx()
        };
        let decision = gate().check(&proposal(9_000.0, 1.0851), &ctx);
        assert!(matches!(
            decision,
            RiskDecision::Rejected {
                reason: RejectReason::EngineHalted,
                ..
            }
        ));
    }

    #[test]
    fn daily_cap_breach_rejects_and_halts() {
        let ctx = RiskContext {
            daily_notional: 9_995_000.0,
            ..running_ctx()
        };
        let decision = gate().check(&proposal(9_000.0, 1.0), &ctx);
        assert_eq!(
            decision,
            RiskDecision::Rejected {
                reason: RejectReason::DailyVolumeExceeded,
                halt: true
            }
        );
    }

    #[test]
    fn oversized_trade_rejected_engine_stays_running() {
        // > 10% of the 10M cap
        let decision = gate().check(&proposal(1_100_000.0, 1.0), &running_ctx());
        assert_eq!(
            decision,
            RiskDecision::Rejected {
                reason: RejectReason::TradeTooLarge,
                halt: false
            }
        );
    }

    #[test]
    fn symbol_exposure_cap_counts_existing_position() {
        let ctx = RiskContext {
            symbol_exposure: 1_950_000.0,
            ..running_ctx()
        };
        // 100k more would push past the 2M per-symbol cap
        let decision = gate().check(&proposal(100_000.0, 1.0), &ctx);
        assert_eq!(
            decision,
            RiskDecision::Rejected {
                reason: RejectReason::SymbolExposureExceeded,
                halt: false
            }
        );
    }

    #[test]
    fn daily_cap_check_runs_before_per_trade_cap() {
        // Violates both; DailyVolumeExceeded must win
        let ctx = RiskContext {
            daily_notional: 9_999_999.0,
            ..running_ctx()
        };
        let decision = gate().check(&proposal(2_000_000.0, 1.0), &ctx);
        assert!(matches!(
            decision,
            RiskDecision::Rejected {
                reason: RejectReason::DailyVolumeExceeded,
                halt: true
            }
        ));
    }

    #[test]
    fn sizing_scales_with_confidence() {
        let gate = gate();
        let spec = eurusd_spec();
        let mid = 1.0850;

        let full = gate.size_position(&spec, 1.0, mid);
        let half = gate.size_position(&spec, 0.5, mid);
        assert!(full > half);
        assert!((full * mid - 10_000.0).abs() < mid + 1e-9);
    }

    #[test]
    fn sizing_enforces_min_notional_floor() {
        let gate = gate();
        let spec = eurusd_spec();
        let mid = 1.0850;

        // Tiny confidence would target 100 notional; floor lifts it to 1000
        let quantity = gate.size_position(&spec, 0.01, mid);
        assert!(quantity * mid >= 1_000.0 - 1e-9);
        // Lot step respected
        assert_eq!(quantity, quantity.floor());
    }
}
