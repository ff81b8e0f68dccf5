pub mod executor;
pub mod lifecycle;

pub use executor::{EngineMetrics, MetricsSnapshot, TradingCore};
pub use lifecycle::{Engine, EngineHandle};

use serde::{Deserialize, Serialize};

/// Engine-level tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cadence of the strategy evaluation loop.
    pub evaluation_interval_ms: u64,
    /// Consensus signals below this confidence are ignored.
    pub min_confidence: f64,
    /// Deadline on the three-table execution write.
    pub persistence_deadline_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_ms: 5000,
            min_confidence: 0.6,
            persistence_deadline_ms: 2000,
        }
    }
}

impl From<&common::Config> for EngineConfig {
    fn from(cfg: &common::Config) -> Self {
        Self {
            evaluation_interval_ms: cfg.evaluation_interval_ms,
            min_confidence: cfg.min_confidence,
            ..EngineConfig::default()
        }
    }
}
