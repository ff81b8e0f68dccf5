use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One bid/ask quote for a currency pair.
///
/// Invariants (checked by the tick bus on publish): `bid > 0`, `ask >= bid`,
/// `spread > 0`. `seq` is assigned by the bus and is strictly increasing per
/// symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
    pub event_time: DateTime<Utc>,
    /// Per-symbol sequence number, 0 until assigned by the bus.
    #[serde(default)]
    pub seq: u64,
}

impl Tick {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// One entry in a symbol's bounded price history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub event_time: DateTime<Utc>,
    pub mid: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub seq: u64,
}

impl HistoryPoint {
    pub fn from_tick(tick: &Tick) -> Self {
        Self {
            event_time: tick.event_time,
            mid: tick.mid(),
            high: tick.ask,
            low: tick.bid,
            volume: tick.volume,
            seq: tick.seq,
        }
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for BUY, -1 for SELL.
    pub fn sign(&self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Direction of a strategy signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

impl SignalKind {
    pub fn as_side(&self) -> Option<OrderSide> {
        match self {
            SignalKind::Buy => Some(OrderSide::Buy),
            SignalKind::Sell => Some(OrderSide::Sell),
            SignalKind::Hold => None,
        }
    }
}

/// Which strategy produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalSource {
    #[serde(rename = "SMA")]
    Sma,
    #[serde(rename = "RSI")]
    Rsi,
    #[serde(rename = "BB")]
    Bollinger,
    #[serde(rename = "COMBINED")]
    Combined,
}

/// Machine-readable explanation attached to every signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    GoldenCross,
    DeathCross,
    Overbought,
    Oversold,
    AboveUpperBand,
    BelowLowerBand,
    InsufficientHistory,
    NoSignal,
    CombinedAnalysis,
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReasonCode::GoldenCross => "golden_cross",
            ReasonCode::DeathCross => "death_cross",
            ReasonCode::Overbought => "overbought",
            ReasonCode::Oversold => "oversold",
            ReasonCode::AboveUpperBand => "above_upper_band",
            ReasonCode::BelowLowerBand => "below_lower_band",
            ReasonCode::InsufficientHistory => "insufficient_history",
            ReasonCode::NoSignal => "no_signal",
            ReasonCode::CombinedAnalysis => "combined_analysis",
        };
        write!(f, "{s}")
    }
}

/// Indicator values computed on demand for a price window. Any field may be
/// absent when the window is too short.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_short: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_long: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb_middle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb_upper: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb_lower: Option<f64>,
}

/// Output of a strategy evaluation.
///
/// A consensus signal carries the per-strategy breakdown in `components`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub kind: SignalKind,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub reason: ReasonCode,
    pub source: SignalSource,
    /// Indicator values the strategy looked at.
    #[serde(default)]
    pub inputs: IndicatorSnapshot,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Signal>,
}

impl Signal {
    pub fn hold(symbol: impl Into<String>, source: SignalSource, reason: ReasonCode) -> Self {
        Self {
            symbol: symbol.into(),
            kind: SignalKind::Hold,
            confidence: 0.0,
            reason,
            source,
            inputs: IndicatorSnapshot::default(),
            components: Vec::new(),
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.kind != SignalKind::Hold && self.confidence > 0.0
    }
}

/// Net position for one symbol. `quantity` is signed: positive long,
/// negative short.
///
/// `stop_loss` and `take_profit` are price levels derived from the average
/// entry price; the engine auto-closes the position when the market crosses
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_price: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: 0.0,
            avg_price: 0.0,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            stop_loss: None,
            take_profit: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    /// Absolute notional exposure at the average entry price.
    pub fn exposure(&self) -> f64 {
        (self.quantity * self.avg_price).abs()
    }
}

/// Terminal status of a trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Executed,
    Rejected,
}

/// Reason a trade proposal was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    EngineHalted,
    DailyVolumeExceeded,
    TradeTooLarge,
    SymbolExposureExceeded,
    PersistenceFailed,
}

impl RejectReason {
    /// Stable machine-readable code, used in persistence and payloads.
    pub fn as_code(&self) -> &'static str {
        match self {
            RejectReason::EngineHalted => "EngineHalted",
            RejectReason::DailyVolumeExceeded => "DailyVolumeExceeded",
            RejectReason::TradeTooLarge => "TradeTooLarge",
            RejectReason::SymbolExposureExceeded => "SymbolExposureExceeded",
            RejectReason::PersistenceFailed => "PersistenceFailed",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "EngineHalted" => Some(RejectReason::EngineHalted),
            "DailyVolumeExceeded" => Some(RejectReason::DailyVolumeExceeded),
            "TradeTooLarge" => Some(RejectReason::TradeTooLarge),
            "SymbolExposureExceeded" => Some(RejectReason::SymbolExposureExceeded),
            "PersistenceFailed" => Some(RejectReason::PersistenceFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::EngineHalted => write!(f, "engine is halted"),
            RejectReason::DailyVolumeExceeded => write!(f, "daily volume cap exceeded"),
            RejectReason::TradeTooLarge => write!(f, "trade exceeds per-trade cap"),
            RejectReason::SymbolExposureExceeded => write!(f, "symbol exposure cap exceeded"),
            RejectReason::PersistenceFailed => write!(f, "persistence failed"),
        }
    }
}

/// An executed (or rejected) trade. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub notional: f64,
    pub strategy_tag: String,
    pub status: TradeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<RejectReason>,
    pub event_time: DateTime<Utc>,
    /// Process-wide execution sequence, used to break timestamp ties.
    pub seq: u64,
}

/// One row of trading statistics per UTC date. `total_notional` is monotone
/// non-decreasing within a date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total_notional: f64,
    pub trade_count: u64,
    pub realized_pnl: f64,
    pub active_positions: u64,
}

impl DailyStats {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_notional: 0.0,
            trade_count: 0,
            realized_pnl: 0.0,
            active_positions: 0,
        }
    }
}

/// Why the engine entered the Halted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    DailyVolumeExceeded,
    Manual,
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::DailyVolumeExceeded => write!(f, "daily_volume_exceeded"),
            HaltReason::Manual => write!(f, "manual"),
        }
    }
}

/// Trading engine state machine: `Stopped → Running → Halted → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Halted {
        reason: HaltReason,
    },
}

impl EngineState {
    pub fn is_running(&self) -> bool {
        matches!(self, EngineState::Running)
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        match self {
            EngineState::Halted { reason } => Some(*reason),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Halted { reason } => write!(f, "halted ({reason})"),
        }
    }
}

/// Snapshot of the engine returned to callers of `EngineHandle::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<HaltReason>,
    pub current_date: NaiveDate,
    pub daily_notional: f64,
    pub trade_count: u64,
    pub remaining_capacity: f64,
}

/// Commands accepted by the engine task.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Start,
    Halt(HaltReason),
    Stop,
    ExecuteManual {
        symbol: String,
        side: OrderSide,
        quantity: f64,
    },
}

/// Everything published on the tick bus. The `kind` discriminator makes the
/// payload self-describing for subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BusEvent {
    Tick(Tick),
    Trade(Trade),
}

impl BusEvent {
    pub fn symbol(&self) -> &str {
        match self {
            BusEvent::Tick(t) => &t.symbol,
            BusEvent::Trade(t) => &t.symbol,
        }
    }
}

/// Severity of an injected news shock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NewsImpact {
    Low,
    Med,
    High,
}

impl NewsImpact {
    /// Magnitude of the one-shot mid-price move.
    pub fn magnitude(&self) -> f64 {
        match self {
            NewsImpact::Low => 0.002,
            NewsImpact::Med => 0.005,
            NewsImpact::High => 0.01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_mid_and_spread() {
        let tick = Tick {
            symbol: "EURUSD".into(),
            bid: 1.0849,
            ask: 1.0851,
            volume: 500_000.0,
            event_time: Utc::now(),
            seq: 1,
        };
        assert!((tick.mid() - 1.0850).abs() < 1e-12);
        assert!((tick.spread() - 0.0002).abs() < 1e-12);
    }

    #[test]
    fn bus_event_serializes_with_kind_tag() {
        let event = BusEvent::Tick(Tick {
            symbol: "EURUSD".into(),
            bid: 1.0,
            ask: 1.1,
            volume: 1.0,
            event_time: Utc::now(),
            seq: 7,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "tick");
        assert_eq!(json["symbol"], "EURUSD");
    }

    #[test]
    fn flat_position_has_zero_average() {
        let p = Position::flat("EURUSD");
        assert!(p.is_flat());
        assert_eq!(p.avg_price, 0.0);
        assert_eq!(p.exposure(), 0.0);
    }

    #[test]
    fn reason_codes_render_snake_case() {
        assert_eq!(ReasonCode::GoldenCross.to_string(), "golden_cross");
        assert_eq!(ReasonCode::CombinedAnalysis.to_string(), "combined_analysis");
    }

    #[test]
    fn engine_state_transitions_render() {
        let halted = EngineState::Halted {
            reason: HaltReason::DailyVolumeExceeded,
        };
        assert!(!halted.is_running());
        assert_eq!(halted.halt_reason(), Some(HaltReason::DailyVolumeExceeded));
    }
}
