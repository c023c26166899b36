pub mod promo_codes;
pub mod referrals;

use crate::repositories::StoreError;

/// Outcome of a ledger operation that did not succeed. Domain failures carry
/// the message reported to callers; store failures are passed through.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Expired(String),
    #[error("{0}")]
    LimitReached(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
