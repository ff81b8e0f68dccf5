pub mod clock;
pub mod config;
pub mod error;
pub mod symbols;
pub mod types;

pub use clock::{new_trade_id, Clock, SimClock, SystemClock, TradeSequence};
pub use config::Config;
pub use error::{Error, Result};
pub use symbols::{SymbolRegistry, SymbolSpec};
pub use types::*;
