pub mod memory;
pub mod promo_codes;
pub mod referrals;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate value violates {0}")]
    Duplicate(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
                StoreError::Duplicate(db_error.constraint().unwrap_or("unique key").to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(error.to_string())
            }
            _ => StoreError::Backend(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_are_retryable() {
        let error = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(error.is_retryable());
    }

    #[test]
    fn missing_rows_are_fatal() {
        let error = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(error, StoreError::Backend(_)));
        assert!(!error.is_retryable());
    }
}
