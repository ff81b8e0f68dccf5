//! Backtesting engine.
//!
//! Replays deterministically generated bars through a sandboxed copy of the
//! indicator + strategy stack with a simple long-only cash model. The
//! sandbox shares nothing with the live system: identical requests produce
//! bitwise-identical reports.

pub mod bars;

pub use bars::Bar;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use common::{Error, Result, Signal, SignalKind, SymbolRegistry};
use strategy::{ConsensusEvaluator, StrategyParams};

/// Evaluation starts once this many closes are in the sandbox history.
const WARMUP_BARS: usize = 30;
/// Fraction of cash committed per entry.
const ENTRY_FRACTION: f64 = 0.10;
const MIN_CONFIDENCE: f64 = 0.6;
const MAX_BARS: usize = 1_000_000;

/// Bar cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl BarInterval {
    pub fn duration(&self) -> Duration {
        match self {
            BarInterval::OneMinute => Duration::minutes(1),
            BarInterval::FiveMinutes => Duration::minutes(5),
            BarInterval::FifteenMinutes => Duration::minutes(15),
            BarInterval::OneHour => Duration::hours(1),
            BarInterval::FourHours => Duration::hours(4),
            BarInterval::OneDay => Duration::days(1),
        }
    }
}

impl std::str::FromStr for BarInterval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(BarInterval::OneMinute),
            "5m" => Ok(BarInterval::FiveMinutes),
            "15m" => Ok(BarInterval::FifteenMinutes),
            "1h" => Ok(BarInterval::OneHour),
            "4h" => Ok(BarInterval::FourHours),
            "1d" => Ok(BarInterval::OneDay),
            other => Err(Error::Config(format!("unknown bar interval '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: BarInterval,
    pub initial_capital: f64,
    pub parameters: StrategyParams,
}

impl BacktestRequest {
    /// Seed derived purely from the request inputs; float fields hash by
    /// bit pattern so equal requests always collide.
    fn seed(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.symbol.hash(&mut h);
        self.start.hash(&mut h);
        self.end.hash(&mut h);
        self.interval.hash(&mut h);
        self.initial_capital.to_bits().hash(&mut h);
        let p = &self.parameters;
        p.sma_short.hash(&mut h);
        p.sma_long.hash(&mut h);
        p.rsi_period.hash(&mut h);
        p.rsi_overbought.to_bits().hash(&mut h);
        p.rsi_oversold.to_bits().hash(&mut h);
        p.bb_period.hash(&mut h);
        p.bb_std.to_bits().hash(&mut h);
        h.finish()
    }

    fn bar_count(&self) -> Result<usize> {
        let span = self
            .end
            .signed_duration_since(self.start)
            .num_seconds();
        let step = self.interval.duration().num_seconds();
        if span <= 0 {
            return Err(Error::Config("backtest range is empty".into()));
        }
        let count = (span / step) as usize;
        if count == 0 || count > MAX_BARS {
            return Err(Error::Config(format!("unreasonable bar count {count}")));
        }
        Ok(count)
    }
}

/// One closed round-trip in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub bars: usize,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub win_rate: f64,
    /// Mean PnL of winning round-trips (0 with no winners).
    pub average_win: f64,
    /// Mean PnL of losing round-trips, negative (0 with no losers).
    pub average_loss: f64,
    /// `|average_win / average_loss|`; infinite when nothing lost.
    pub profit_factor: f64,
    /// Annualized mean-over-stddev of per-bar returns.
    pub sharpe_ratio: f64,
    pub total_pnl: f64,
    pub final_equity: f64,
    pub return_pct: f64,
    pub max_drawdown_pct: f64,
    pub trades: Vec<ClosedTrade>,
}

/// Run one backtest. Never touches the live bus, store or engine.
pub fn run(registry: &SymbolRegistry, request: &BacktestRequest) -> Result<BacktestReport> {
    let spec = registry.get(&request.symbol)?;
    let count = request.bar_count()?;

    let mut rng = StdRng::seed_from_u64(request.seed());
    let start_time = request
        .start
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::Config("bad start date".into()))?
        .and_utc();
    let bars = bars::generate(
        &mut rng,
        spec.base_price,
        start_time,
        request.interval.duration(),
        count,
        0.001,
    );

    let evaluator = ConsensusEvaluator::new(request.parameters.clone());
    let outcome = simulate(&bars, request.initial_capital, |history| {
        evaluator.evaluate(&request.symbol, history)
    });

    info!(
        symbol = %request.symbol,
        bars = bars.len(),
        equity_points = outcome.equity_curve.len(),
        trades = outcome.trades.len(),
        return_pct = outcome.return_pct,
        "backtest finished"
    );

    let stats = TradeStats::from_trades(&outcome.trades);
    Ok(BacktestReport {
        symbol: request.symbol.clone(),
        start: request.start,
        end: request.end,
        bars: bars.len(),
        total_trades: stats.total,
        winning_trades: stats.winners,
        losing_trades: stats.losers,
        win_rate: stats.win_rate,
        average_win: stats.average_win,
        average_loss: stats.average_loss,
        profit_factor: stats.profit_factor,
        sharpe_ratio: sharpe_ratio(request.initial_capital, &outcome.equity_curve),
        total_pnl: outcome.total_pnl,
        final_equity: outcome.final_equity,
        return_pct: outcome.return_pct,
        max_drawdown_pct: outcome.max_drawdown_pct,
        trades: outcome.trades,
    })
}

/// Win/loss aggregates over the closed-trade tape. A trade with zero PnL
/// counts as neither a winner nor a loser.
struct TradeStats {
    total: u64,
    winners: u64,
    losers: u64,
    win_rate: f64,
    average_win: f64,
    average_loss: f64,
    profit_factor: f64,
}

impl TradeStats {
    fn from_trades(trades: &[ClosedTrade]) -> Self {
        let wins: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
        let losses: Vec<f64> = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl).collect();
        let total = trades.len() as u64;
        let average_win = mean(&wins);
        let average_loss = mean(&losses);
        let profit_factor = if average_loss != 0.0 {
            (average_win / average_loss).abs()
        } else if total > 0 {
            f64::INFINITY
        } else {
            0.0
        };

        Self {
            total,
            winners: wins.len() as u64,
            losers: losses.len() as u64,
            win_rate: if total > 0 {
                wins.len() as f64 / total as f64
            } else {
                0.0
            },
            average_win,
            average_loss,
            profit_factor,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Annualized Sharpe ratio over per-bar PnL expressed as a fraction of the
/// initial capital. Zero when the equity never moves or the curve is too
/// short.
fn sharpe_ratio(initial_capital: f64, equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 || initial_capital <= 0.0 {
        return 0.0;
    }

    let mut returns = Vec::with_capacity(equity_curve.len());
    let mut prev = initial_capital;
    for &equity in equity_curve {
        returns.push((equity - prev) / initial_capital);
        prev = equity;
    }

    let avg = mean(&returns);
    let variance = returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / returns.len() as f64;
    let std = variance.sqrt();
    if std > 0.0 {
        avg / std * 252f64.sqrt()
    } else {
        0.0
    }
}

struct SimOutcome {
    trades: Vec<ClosedTrade>,
    total_pnl: f64,
    final_equity: f64,
    return_pct: f64,
    max_drawdown_pct: f64,
    equity_curve: Vec<f64>,
}

/// The long-only cash model. `evaluate` receives exactly the bars seen so
/// far (oldest first) — there is no way to look ahead.
fn simulate(
    bars: &[Bar],
    initial_capital: f64,
    mut evaluate: impl FnMut(&[f64]) -> Signal,
) -> SimOutcome {
    let mut cash = initial_capital;
    let mut units = 0.0f64;
    let mut entry_price = 0.0f64;
    let mut opened_at = None;

    let mut history: Vec<f64> = Vec::with_capacity(bars.len());
    let mut trades = Vec::new();
    let mut equity_curve = Vec::with_capacity(bars.len());
    let mut peak = initial_capital;
    let mut max_drawdown_pct = 0.0f64;

    for bar in bars {
        history.push(bar.close);

        if history.len() >= WARMUP_BARS {
            let signal = evaluate(&history);
            if signal.confidence >= MIN_CONFIDENCE {
                match signal.kind {
                    SignalKind::Buy if units == 0.0 => {
                        let size = (cash * ENTRY_FRACTION / bar.close).floor();
                        if size > 0.0 {
                            units = size;
                            entry_price = bar.close;
                            opened_at = Some(bar.open_time);
                            cash -= size * bar.close;
                        }
                    }
                    SignalKind::Sell if units > 0.0 => {
                        cash += units * bar.close;
                        trades.push(ClosedTrade {
                            opened_at: opened_at.take().unwrap_or(bar.open_time),
                            closed_at: bar.open_time,
                            quantity: units,
                            entry_price,
                            exit_price: bar.close,
                            pnl: (bar.close - entry_price) * units,
                        });
                        units = 0.0;
                        entry_price = 0.0;
                    }
                    _ => {}
                }
            }
        }

        let equity = cash + units * bar.close;
        equity_curve.push(equity);
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            let drawdown = (peak - equity) / peak * 100.0;
            if drawdown > max_drawdown_pct {
                max_drawdown_pct = drawdown;
            }
        }
    }

    let final_close = bars.last().map_or(0.0, |b| b.close);
    let final_equity = cash + units * final_close;
    SimOutcome {
        trades,
        total_pnl: final_equity - initial_capital,
        final_equity,
        return_pct: (final_equity - initial_capital) / initial_capital * 100.0,
        max_drawdown_pct,
        equity_curve,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::{ReasonCode, SignalSource};

    fn request() -> BacktestRequest {
        BacktestRequest {
            symbol: "EURUSD".into(),
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            interval: BarInterval::OneHour,
            initial_capital: 10_000.0,
            parameters: StrategyParams {
                sma_short: 10,
                sma_long: 50,
                ..StrategyParams::default()
            },
        }
    }

    fn flat_bars(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                open_time: start + Duration::hours(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 500_000.0,
            })
            .collect()
    }

    fn scripted(kind: SignalKind) -> Signal {
        Signal {
            symbol: "EURUSD".into(),
            kind,
            confidence: if kind == SignalKind::Hold { 0.0 } else { 1.0 },
            reason: ReasonCode::CombinedAnalysis,
            source: SignalSource::Combined,
            inputs: Default::default(),
            components: Vec::new(),
        }
    }

    #[test]
    fn identical_requests_yield_bitwise_identical_reports() {
        let registry = SymbolRegistry::builtin();
        let a = run(&registry, &request()).unwrap();
        let b = run(&registry, &request()).unwrap();

        assert_eq!(a.bars, b.bars);
        assert_eq!(a.total_trades, b.total_trades);
        assert_eq!(a.winning_trades, b.winning_trades);
        assert_eq!(a.losing_trades, b.losing_trades);
        assert_eq!(a.win_rate.to_bits(), b.win_rate.to_bits());
        assert_eq!(a.average_win.to_bits(), b.average_win.to_bits());
        assert_eq!(a.average_loss.to_bits(), b.average_loss.to_bits());
        assert_eq!(a.profit_factor.to_bits(), b.profit_factor.to_bits());
        assert_eq!(a.sharpe_ratio.to_bits(), b.sharpe_ratio.to_bits());
        assert_eq!(a.total_pnl.to_bits(), b.total_pnl.to_bits());
        assert_eq!(a.final_equity.to_bits(), b.final_equity.to_bits());
        assert_eq!(a.return_pct.to_bits(), b.return_pct.to_bits());
        assert_eq!(a.max_drawdown_pct.to_bits(), b.max_drawdown_pct.to_bits());
    }

    #[test]
    fn changed_inputs_change_the_seed() {
        let base = request();

        let mut shifted = request();
        shifted.start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        shifted.end = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_ne!(base.seed(), shifted.seed());

        let mut other_symbol = request();
        other_symbol.symbol = "USDJPY".into();
        assert_ne!(base.seed(), other_symbol.seed());

        let mut other_params = request();
        other_params.parameters.rsi_period = 21;
        assert_ne!(base.seed(), other_params.seed());
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let registry = SymbolRegistry::builtin();
        let mut req = request();
        req.symbol = "DOGEUSD".into();
        assert!(matches!(
            run(&registry, &req),
            Err(Error::UnknownSymbol(_))
        ));
    }

    #[test]
    fn empty_range_is_rejected() {
        let registry = SymbolRegistry::builtin();
        let mut req = request();
        req.end = req.start;
        assert!(matches!(run(&registry, &req), Err(Error::Config(_))));
    }

    #[test]
    fn expected_bar_count_for_one_month_hourly() {
        let req = request();
        // 30 days × 24 bars
        assert_eq!(req.bar_count().unwrap(), 720);
    }

    #[test]
    fn evaluation_sees_only_past_bars() {
        let bars = flat_bars(&vec![1.0; 50]);
        let mut seen_lengths = Vec::new();
        simulate(&bars, 10_000.0, |history| {
            seen_lengths.push(history.len());
            // The newest close must be the last element; nothing beyond it
            assert_eq!(*history.last().unwrap(), 1.0);
            scripted(SignalKind::Hold)
        });

        // First evaluation at the warmup boundary, then one per bar
        let expected: Vec<usize> = (WARMUP_BARS..=50).collect();
        assert_eq!(seen_lengths, expected);
    }

    #[test]
    fn round_trip_accounting_is_exact() {
        // Flat warmup, entry at 1.0, exit at 1.2
        let mut closes = vec![1.0; 34];
        closes.extend([1.1, 1.2, 1.2, 1.2]);
        let bars = flat_bars(&closes);

        let mut step = 0;
        let outcome = simulate(&bars, 10_000.0, |history| {
            step = history.len();
            match step {
                34 => scripted(SignalKind::Buy),  // close 1.0
                36 => scripted(SignalKind::Sell), // close 1.2
                _ => scripted(SignalKind::Hold),
            }
        });

        // Entry: floor(10_000 × 0.10 / 1.0) = 1000 units
        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert_eq!(trade.quantity, 1000.0);
        assert_eq!(trade.entry_price, 1.0);
        assert_eq!(trade.exit_price, 1.2);
        assert!((trade.pnl - 200.0).abs() < 1e-9);
        assert!((outcome.total_pnl - 200.0).abs() < 1e-9);
        assert!((outcome.final_equity - 10_200.0).abs() < 1e-9);
        assert!((outcome.return_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn residual_position_is_marked_at_final_close() {
        let mut closes = vec![1.0; 34];
        closes.extend([1.5, 1.5]);
        let bars = flat_bars(&closes);

        let outcome = simulate(&bars, 10_000.0, |history| {
            if history.len() == 34 {
                scripted(SignalKind::Buy)
            } else {
                scripted(SignalKind::Hold)
            }
        });

        // 1000 units bought at 1.0, still open, marked at 1.5
        assert!(outcome.trades.is_empty());
        assert!((outcome.final_equity - 10_500.0).abs() < 1e-9);
        assert!((outcome.total_pnl - 500.0).abs() < 1e-9);
    }

    #[test]
    fn drawdown_tracks_peak_to_trough() {
        // Ride 1.0 → 2.0 → 1.0 with an open position the whole way
        let mut closes = vec![1.0; 34];
        closes.extend([2.0, 1.0, 1.0]);
        let bars = flat_bars(&closes);

        let outcome = simulate(&bars, 10_000.0, |history| {
            if history.len() == 34 {
                scripted(SignalKind::Buy)
            } else {
                scripted(SignalKind::Hold)
            }
        });

        // Peak equity 11_000 (units=1000 at 2.0), trough 10_000:
        // drawdown = 1000/11000 ≈ 9.09%
        assert!((outcome.max_drawdown_pct - (1000.0 / 11_000.0 * 100.0)).abs() < 1e-9);
        assert_eq!(outcome.equity_curve.len(), bars.len());
    }

    #[test]
    fn trade_stats_aggregate_wins_and_losses() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let trade = |pnl: f64| ClosedTrade {
            opened_at: start,
            closed_at: start,
            quantity: 1000.0,
            entry_price: 1.0,
            exit_price: 1.0 + pnl / 1000.0,
            pnl,
        };

        let stats = TradeStats::from_trades(&[trade(200.0), trade(-100.0), trade(50.0)]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.winners, 2);
        assert_eq!(stats.losers, 1);
        assert!((stats.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((stats.average_win - 125.0).abs() < 1e-9);
        assert!((stats.average_loss - (-100.0)).abs() < 1e-9);
        assert!((stats.profit_factor - 1.25).abs() < 1e-9);
    }

    #[test]
    fn profit_factor_is_infinite_without_losers_and_zero_without_trades() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let win = ClosedTrade {
            opened_at: start,
            closed_at: start,
            quantity: 1000.0,
            entry_price: 1.0,
            exit_price: 1.2,
            pnl: 200.0,
        };

        let no_losses = TradeStats::from_trades(&[win]);
        assert!(no_losses.profit_factor.is_infinite());
        assert_eq!(no_losses.average_loss, 0.0);

        let empty = TradeStats::from_trades(&[]);
        assert_eq!(empty.profit_factor, 0.0);
        assert_eq!(empty.win_rate, 0.0);
    }

    #[test]
    fn sharpe_ratio_of_known_curve() {
        // Returns vs 100 of capital: +10%, then -5%
        // mean 0.025, population std 0.075, annualized by sqrt(252)
        let value = sharpe_ratio(100.0, &[110.0, 105.0]);
        let expected = 0.025 / 0.075 * 252f64.sqrt();
        assert!((value - expected).abs() < 1e-9, "got {value}");
    }

    #[test]
    fn sharpe_ratio_is_zero_for_flat_or_short_curves() {
        assert_eq!(sharpe_ratio(100.0, &[100.0, 100.0, 100.0]), 0.0);
        assert_eq!(sharpe_ratio(100.0, &[110.0]), 0.0);
        assert_eq!(sharpe_ratio(0.0, &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn buy_signals_while_long_are_ignored() {
        let bars = flat_bars(&vec![1.0; 40]);
        let outcome = simulate(&bars, 10_000.0, |_| scripted(SignalKind::Buy));
        // Only one entry despite a BUY every bar
        assert!(outcome.trades.is_empty());
        assert!((outcome.final_equity - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn interval_parses_from_compact_strings() {
        assert_eq!("1h".parse::<BarInterval>().unwrap(), BarInterval::OneHour);
        assert_eq!("1d".parse::<BarInterval>().unwrap(), BarInterval::OneDay);
        assert!("2w".parse::<BarInterval>().is_err());
    }
}
