use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::StoreError;
use crate::models::promo_codes::PromoCode;

/// Storage contract for promo codes.
///
/// `increment_usage` is the only write after insertion and must apply
/// atomically: the counter moves only while `usage_count < max_usage` and
/// `expiry_date > now` hold at write time. `None` means the precondition
/// failed and nothing was written.
#[async_trait]
pub trait PromoCodeStore: Send + Sync + 'static {
    async fn insert(&self, promo_code: PromoCode) -> Result<PromoCode, StoreError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError>;

    async fn list(&self) -> Result<Vec<PromoCode>, StoreError>;

    async fn increment_usage(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PromoCode>, StoreError>;
}

#[derive(Clone)]
pub struct PromoCodeRepository {
    conn: PgPool,
}

impl PromoCodeRepository {
    pub fn new(conn: PgPool) -> Self {
        PromoCodeRepository { conn }
    }
}

#[async_trait]
impl PromoCodeStore for PromoCodeRepository {
    async fn insert(&self, promo_code: PromoCode) -> Result<PromoCode, StoreError> {
        let inserted = sqlx::query_as::<_, PromoCode>(
            r#"INSERT INTO promo_codes
            (id, code, discount_type, discount_value, expiry_date, usage_count, max_usage)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&promo_code.id)
        .bind(&promo_code.code)
        .bind(promo_code.discount_type)
        .bind(promo_code.discount_value)
        .bind(promo_code.expiry_date)
        .bind(promo_code.usage_count)
        .bind(promo_code.max_usage)
        .fetch_one(&self.conn)
        .await?;

        Ok(inserted)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        let promo_code =
            sqlx::query_as::<_, PromoCode>("SELECT * FROM promo_codes WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.conn)
                .await?;

        Ok(promo_code)
    }

    async fn list(&self) -> Result<Vec<PromoCode>, StoreError> {
        let promo_codes =
            sqlx::query_as::<_, PromoCode>("SELECT * FROM promo_codes ORDER BY code")
                .fetch_all(&self.conn)
                .await?;

        Ok(promo_codes)
    }

    async fn increment_usage(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PromoCode>, StoreError> {
        let promo_code = sqlx::query_as::<_, PromoCode>(
            r#"UPDATE promo_codes
            SET usage_count = usage_count + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND usage_count < max_usage AND expiry_date > $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.conn)
        .await?;

        Ok(promo_code)
    }
}
