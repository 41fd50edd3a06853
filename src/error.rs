//! Typed failures for ledger operations.
//!
//! Business-rule rejections carry the context the caller needs to
//! re-render the offending input field (current balance, current
//! position). Anything else crashes loudly rather than touch the ledger.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Malformed request field: bad amount, liquidity below the minimum,
    /// reminder date not in the future.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },

    #[error("insufficient shares: holding {held}, requested {requested}")]
    InsufficientShares { held: f64, requested: f64 },

    /// Trade attempted against a market outside the OPEN state.
    #[error("market {0} is resolved")]
    MarketResolved(i64),

    #[error("market {0} not found")]
    InvalidMarket(i64),

    #[error("unknown user {0}")]
    UnknownUser(String),

    /// Transient storage failure; the caller should retry with backoff.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
