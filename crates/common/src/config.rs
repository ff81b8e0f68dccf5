/// All tunables recognized by the system, loaded from environment variables
/// at startup. Every option has a default; `.env` is honored when present.
#[derive(Debug, Clone)]
pub struct Config {
    // Risk limits
    pub daily_cap_notional: f64,
    pub base_position_notional: f64,
    pub min_notional: f64,
    pub min_confidence: f64,
    pub per_trade_cap_fraction: f64,
    pub per_symbol_cap_fraction: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,

    // Strategy parameters
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub bb_period: usize,
    pub bb_std: f64,

    // Market simulation
    pub history_capacity: usize,
    pub tick_interval_min_ms: u64,
    pub tick_interval_max_ms: u64,
    pub volatility_sigma: f64,
    pub evaluation_interval_ms: u64,

    // Infrastructure
    pub database_url: String,
    pub symbols_config_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daily_cap_notional: 10_000_000.0,
            base_position_notional: 10_000.0,
            min_notional: 1_000.0,
            min_confidence: 0.6,
            per_trade_cap_fraction: 0.10,
            per_symbol_cap_fraction: 0.20,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
            sma_short: 10,
            sma_long: 50,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            bb_period: 20,
            bb_std: 2.0,
            history_capacity: 200,
            tick_interval_min_ms: 1000,
            tick_interval_max_ms: 3000,
            volatility_sigma: 0.001,
            evaluation_interval_ms: 5000,
            database_url: "sqlite://fxsim.db?mode=rwc".to_string(),
            symbols_config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults above for anything unset. Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        let d = Config::default();

        Config {
            daily_cap_notional: env_parse("DAILY_CAP_NOTIONAL", d.daily_cap_notional),
            base_position_notional: env_parse("BASE_POSITION_NOTIONAL", d.base_position_notional),
            min_notional: env_parse("MIN_NOTIONAL", d.min_notional),
            min_confidence: env_parse("MIN_CONFIDENCE", d.min_confidence),
            per_trade_cap_fraction: env_parse("PER_TRADE_CAP_FRACTION", d.per_trade_cap_fraction),
            per_symbol_cap_fraction: env_parse(
                "PER_SYMBOL_CAP_FRACTION",
                d.per_symbol_cap_fraction,
            ),
            stop_loss_pct: env_parse("STOP_LOSS_PCT", d.stop_loss_pct),
            take_profit_pct: env_parse("TAKE_PROFIT_PCT", d.take_profit_pct),
            sma_short: env_parse("SMA_SHORT", d.sma_short),
            sma_long: env_parse("SMA_LONG", d.sma_long),
            rsi_period: env_parse("RSI_PERIOD", d.rsi_period),
            rsi_overbought: env_parse("RSI_OVERBOUGHT", d.rsi_overbought),
            rsi_oversold: env_parse("RSI_OVERSOLD", d.rsi_oversold),
            bb_period: env_parse("BB_PERIOD", d.bb_period),
            bb_std: env_parse("BB_STD", d.bb_std),
            history_capacity: env_parse("HISTORY_CAPACITY", d.history_capacity),
            tick_interval_min_ms: env_parse("TICK_INTERVAL_MIN_MS", d.tick_interval_min_ms),
            tick_interval_max_ms: env_parse("TICK_INTERVAL_MAX_MS", d.tick_interval_max_ms),
            volatility_sigma: env_parse("VOLATILITY_SIGMA", d.volatility_sigma),
            evaluation_interval_ms: env_parse("EVALUATION_INTERVAL_MS", d.evaluation_interval_ms),
            database_url: std::env::var("DATABASE_URL").unwrap_or(d.database_url),
            symbols_config_path: std::env::var("SYMBOLS_CONFIG_PATH").ok(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.daily_cap_notional, 10_000_000.0);
        assert_eq!(cfg.base_position_notional, 10_000.0);
        assert_eq!(cfg.min_notional, 1_000.0);
        assert_eq!(cfg.min_confidence, 0.6);
        assert_eq!(cfg.stop_loss_pct, 0.02);
        assert_eq!(cfg.take_profit_pct, 0.04);
        assert_eq!(cfg.sma_short, 10);
        assert_eq!(cfg.sma_long, 50);
        assert_eq!(cfg.rsi_period, 14);
        assert_eq!(cfg.bb_period, 20);
        assert_eq!(cfg.history_capacity, 200);
        assert_eq!(cfg.evaluation_interval_ms, 5000);
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("FXSIM_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_parse("FXSIM_TEST_GARBAGE", 42usize), 42);
        std::env::remove_var("FXSIM_TEST_GARBAGE");
    }
}
