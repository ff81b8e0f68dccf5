use thiserror::Error;

use crate::RejectReason;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("bad tick: {0}")]
    BadTick(String),

    #[error("trade rejected: {reason}")]
    TradeRejected { reason: RejectReason },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("persistence deadline exceeded after {0:?}")]
    PersistenceTimeout(std::time::Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The machine-readable rejection this error maps to at the trade
    /// boundary, if any. Database and timeout faults surface to callers as
    /// `PersistenceFailed`.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Error::TradeRejected { reason } => Some(*reason),
            Error::Database(_) | Error::PersistenceTimeout(_) => {
                Some(RejectReason::PersistenceFailed)
            }
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
