use proptest::prelude::*;

use common::{EngineState, OrderSide, RejectReason, SymbolRegistry};
use risk::{RiskConfig, RiskContext, RiskDecision, RiskGate, TradeProposal};

proptest! {
    /// Gate checks on randomized f64 inputs must never panic and always
    /// return a decision consistent with the configured limits.
    #[test]
    fn gate_never_panics_on_extreme_inputs(
        quantity in 0.0001f64..10_000_000.0f64,
        price in 0.0001f64..1_000_000.0f64,
        daily_notional in 0.0f64..20_000_000.0f64,
        symbol_exposure in 0.0f64..20_000_000.0f64,
    ) {
        let gate = RiskGate::new(RiskConfig::default());
        let proposal = TradeProposal {
            symbol: "EURUSD".into(),
            side: OrderSide::Buy,
            quantity,
            price,
        };
        let ctx = RiskContext {
            engine_state: EngineState::Running,
            daily_notional,
            symbol_exposure,
        };

        let decision = gate.check(&proposal, &ctx);

        let notional = quantity * price;
        let cap = gate.config().daily_cap_notional;
        if daily_notional + notional > cap {
            prop_assert_eq!(decision, RiskDecision::Rejected {
                reason: RejectReason::DailyVolumeExceeded,
                halt: true,
            });
        } else if decision.is_approved() {
            prop_assert!(notional <= cap * gate.config().per_trade_cap_fraction);
            prop_assert!(
                symbol_exposure + notional <= cap * gate.config().per_symbol_cap_fraction
            );
        }
    }

    /// Sized positions always clear the min-notional floor and respect the
    /// lot step.
    #[test]
    fn sizing_always_clears_the_floor(
        confidence in 0.0f64..=1.0f64,
        mid in 0.1f64..200.0f64,
    ) {
        let gate = RiskGate::new(RiskConfig::default());
        let spec = SymbolRegistry::builtin().get("EURUSD").unwrap().clone();

        let quantity = gate.size_position(&spec, confidence, mid);

        prop_assert!(quantity > 0.0);
        prop_assert!(quantity * mid >= gate.config().min_notional - 1e-6);
        // lot_step is 1.0 for the builtin registry
        prop_assert_eq!(quantity, quantity.floor());
    }

    /// The gate is a pure function: same inputs, same decision.
    #[test]
    fn gate_is_deterministic(
        quantity in 0.0001f64..10_000_000.0f64,
        price in 0.0001f64..1_000_000.0f64,
        daily_notional in 0.0f64..20_000_000.0f64,
    ) {
        let gate = RiskGate::new(RiskConfig::default());
        let proposal = TradeProposal {
            symbol: "GBPUSD".into(),
            side: OrderSide::Sell,
            quantity,
            price,
        };
        let ctx = RiskContext {
            engine_state: EngineState::Running,
            daily_notional,
            symbol_exposure: 0.0,
        };

        prop_assert_eq!(gate.check(&proposal, &ctx), gate.check(&proposal, &ctx));
    }
}
