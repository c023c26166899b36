use async_trait::async_trait;
use sqlx::PgPool;

use super::StoreError;
use crate::models::referrals::Referral;

/// Storage contract for referrals.
///
/// `mark_used` sets the referred user and flips the status in one write,
/// guarded by `status = 'pending'`. `None` means another redeemer got there
/// first and nothing was written.
#[async_trait]
pub trait ReferralStore: Send + Sync + 'static {
    async fn insert(&self, referral: Referral) -> Result<Referral, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Referral>, StoreError>;

    async fn find_pending_by_code(&self, code: &str) -> Result<Option<Referral>, StoreError>;

    async fn mark_used(
        &self,
        id: &str,
        referred_user_id: &str,
    ) -> Result<Option<Referral>, StoreError>;
}

#[derive(Clone)]
pub struct ReferralRepository {
    conn: PgPool,
}

impl ReferralRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ReferralStore for ReferralRepository {
    async fn insert(&self, referral: Referral) -> Result<Referral, StoreError> {
        let inserted = sqlx::query_as::<_, Referral>(
            r#"
                INSERT INTO referrals
                (id, referrer_user_id, referred_user_id, referral_code, status, date_created)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
            "#,
        )
        .bind(&referral.id)
        .bind(&referral.referrer_user_id)
        .bind(&referral.referred_user_id)
        .bind(&referral.referral_code)
        .bind(referral.status)
        .bind(referral.date_created)
        .fetch_one(&self.conn)
        .await?;

        Ok(inserted)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>("SELECT * FROM referrals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(referral)
    }

    async fn find_pending_by_code(&self, code: &str) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(
            "SELECT * FROM referrals WHERE referral_code = $1 AND status = 'pending'",
        )
        .bind(code)
        .fetch_optional(&self.conn)
        .await?;

        Ok(referral)
    }

    async fn mark_used(
        &self,
        id: &str,
        referred_user_id: &str,
    ) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(
            r#"
                UPDATE referrals
                SET status = 'used', referred_user_id = $2, updated_at = CURRENT_TIMESTAMP
                WHERE id = $1 AND status = 'pending'
                RETURNING *
            "#,
        )
        .bind(id)
        .bind(referred_user_id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(referral)
    }
}
