//! Typed errors for ledger operations.
//!
//! Validation failures are ordinary values the caller can match on and
//! render; only `Storage` is fatal and carries the underlying I/O fault
//! through unmodified.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ingredient code outside the fixed set.
    #[error("invalid ingredient code: {0}")]
    InvalidIngredient(String),

    /// Bad numeric or range input (quantity, price, trader count).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Sell quantity outside (0, available].
    #[error("invalid quantity: requested {requested}, available {available}")]
    InvalidQuantity { requested: i64, available: i64 },

    /// No open position or holding matched the lookup key.
    #[error("no open position found for {0}")]
    NotFound(String),

    /// The position id refers to a position that was already closed.
    #[error("position {0} is already closed")]
    AlreadyClosed(i64),

    /// Unrecoverable storage fault.
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
