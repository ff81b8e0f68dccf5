use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use bus::{SymbolFilter, TickBus};
use common::{BusEvent, Clock, Config, SymbolRegistry, SystemClock};
use engine::{Engine, EngineConfig, TradingCore};
use feed::{FeedConfig, FeedSimulator};
use ledger::{ExitRules, PositionLedger};
use risk::{RiskConfig, RiskGate};
use store::{SqliteStore, TradeStore};
use strategy::{ConsensusEvaluator, StrategyParams};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env();

    let registry = match &cfg.symbols_config_path {
        Some(path) => SymbolRegistry::load(path)
            .unwrap_or_else(|e| panic!("failed to load symbols from '{path}': {e}")),
        None => SymbolRegistry::builtin(),
    };
    let registry = Arc::new(registry);

    // One-shot backtest mode: `fxsimd backtest SYMBOL START END INTERVAL`
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("backtest") {
        run_backtest(&registry, &args[2..]);
        return;
    }

    info!(symbols = registry.len(), "fxsimd starting");

    // ── Persistence ───────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url)
        .await
        .unwrap_or_else(|e| panic!("failed to open database '{}': {e}", cfg.database_url));
    let store: Arc<dyn TradeStore> = Arc::new(store);

    // ── Market plumbing ───────────────────────────────────────────────────
    let bus = Arc::new(TickBus::new(cfg.history_capacity));
    let ledger = Arc::new(PositionLedger::with_rules(ExitRules::from(&cfg)));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let feed = FeedSimulator::new(
        Arc::clone(&bus),
        Arc::clone(&registry),
        FeedConfig {
            tick_interval_min_ms: cfg.tick_interval_min_ms,
            tick_interval_max_ms: cfg.tick_interval_max_ms,
            volatility_sigma: cfg.volatility_sigma,
        },
    );

    // ── Trading engine ────────────────────────────────────────────────────
    let core = TradingCore::new(
        EngineConfig::from(&cfg),
        Arc::clone(&bus),
        Arc::clone(&ledger),
        store,
        Arc::clone(&registry),
        ConsensusEvaluator::new(StrategyParams::from(&cfg)),
        RiskGate::new(RiskConfig::from(&cfg)),
        clock,
    );
    let (engine, handle) = Engine::new(core, Arc::clone(&bus));

    // ── Trade event logger (sample bus consumer) ──────────────────────────
    let mut trade_sub = bus.subscribe(SymbolFilter::All);
    tokio::spawn(async move {
        while let Some(event) = trade_sub.recv().await {
            if let BusEvent::Trade(trade) = event {
                info!(
                    symbol = %trade.symbol,
                    side = %trade.side,
                    quantity = trade.quantity,
                    price = trade.price,
                    status = ?trade.status,
                    "trade event"
                );
            }
        }
    });

    // ── Spawn everything ──────────────────────────────────────────────────
    tokio::spawn(engine.run());
    let feed_tasks = feed.spawn_all();
    handle.start().await;

    info!("all subsystems started; press ctrl-c to stop");
    tokio::signal::ctrl_c().await.expect("ctrl-c handler");

    info!("shutdown signal received");
    handle.stop().await;
    for task in feed_tasks {
        task.abort();
    }
    let status = handle.status().await;
    info!(
        daily_notional = status.daily_notional,
        trades = status.trade_count,
        "fxsimd exiting"
    );
}

fn run_backtest(registry: &SymbolRegistry, args: &[String]) {
    if args.len() < 4 {
        eprintln!("usage: fxsimd backtest SYMBOL START END INTERVAL (e.g. EURUSD 2024-01-01 2024-01-31 1h)");
        std::process::exit(2);
    }

    let request = backtest::BacktestRequest {
        symbol: args[0].clone(),
        start: args[1].parse().unwrap_or_else(|e| panic!("bad start date: {e}")),
        end: args[2].parse().unwrap_or_else(|e| panic!("bad end date: {e}")),
        interval: args[3].parse().unwrap_or_else(|e| panic!("{e}")),
        initial_capital: 10_000.0,
        parameters: StrategyParams::default(),
    };

    match backtest::run(registry, &request) {
        Ok(report) => {
            let json = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|e| panic!("report serialization failed: {e}"));
            println!("{json}");
        }
        Err(e) => {
            warn!(error = %e, "backtest failed");
            std::process::exit(1);
        }
    }
}
