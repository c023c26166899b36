use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::LedgerError;
use crate::{
    models::promo_codes::{Discount, DiscountType, NewPromoCode, PromoCode},
    repositories::{promo_codes::PromoCodeStore, StoreError},
    utils::{new_id, Clock},
};

pub const NOT_FOUND: &str = "Promo code not found";
pub const EXPIRED: &str = "Promo code expired";
pub const LIMIT_REACHED: &str = "Promo code usage limit reached";

/// Sole writer of promo codes. The usage counter is only ever moved by the
/// store's guarded increment, never by a separate read and write.
#[derive(Clone)]
pub struct PromoCodeLedger {
    store: Arc<dyn PromoCodeStore>,
    clock: Arc<dyn Clock>,
}

impl PromoCodeLedger {
    pub fn new(store: Arc<dyn PromoCodeStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn issue(&self, new_promo_code: NewPromoCode) -> Result<PromoCode, LedgerError> {
        let discount_type = validate(&new_promo_code)?;

        let promo_code = PromoCode {
            id: new_id(),
            code: new_promo_code.code,
            discount_type,
            discount_value: new_promo_code.discount_value,
            expiry_date: new_promo_code.expiry_date,
            usage_count: 0,
            max_usage: new_promo_code.max_usage,
        };

        match self.store.insert(promo_code).await {
            Ok(promo_code) => {
                log::info!(
                    "Issued promo code {} ({} {}, max usage {}).",
                    promo_code.code,
                    promo_code.discount_type,
                    promo_code.discount_value,
                    promo_code.max_usage
                );
                Ok(promo_code)
            }
            Err(StoreError::Duplicate(_)) => Err(LedgerError::Conflict(
                "Promo code already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(&self) -> Result<Vec<PromoCode>, LedgerError> {
        Ok(self.store.list().await?)
    }

    pub async fn redeem(&self, code: &str) -> Result<Discount, LedgerError> {
        let promo_code = self
            .store
            .find_by_code(code)
            .await?
            .ok_or_else(|| LedgerError::NotFound(NOT_FOUND.to_string()))?;

        let now = self.clock.now();
        check_redeemable(&promo_code, now)?;

        // Expiry is immutable and `now` is fixed for this attempt, so a failed
        // precondition can only mean the capacity ran out under us.
        match self.store.increment_usage(&promo_code.id, now).await? {
            Some(updated) => {
                log::info!(
                    "Redeemed promo code {} ({}/{}).",
                    updated.code,
                    updated.usage_count,
                    updated.max_usage
                );
                Ok(updated.discount())
            }
            None => {
                log::warn!(
                    "Promo code {} reached its usage limit during redemption.",
                    promo_code.code
                );
                Err(LedgerError::LimitReached(LIMIT_REACHED.to_string()))
            }
        }
    }
}

fn validate(new_promo_code: &NewPromoCode) -> Result<DiscountType, LedgerError> {
    if new_promo_code.code.trim().is_empty() {
        return Err(LedgerError::Validation("Promo code is required".to_string()));
    }

    let discount_type = new_promo_code
        .discount_type
        .parse::<DiscountType>()
        .map_err(|e| LedgerError::Validation(e.to_string()))?;

    // Written so that NaN fails too.
    if !(new_promo_code.discount_value > 0.0) {
        return Err(LedgerError::Validation(
            "Discount value must be positive".to_string(),
        ));
    }

    if new_promo_code.max_usage <= 0 {
        return Err(LedgerError::Validation(
            "Max usage must be positive".to_string(),
        ));
    }

    Ok(discount_type)
}

fn check_redeemable(promo_code: &PromoCode, now: DateTime<Utc>) -> Result<(), LedgerError> {
    if promo_code.is_expired_at(now) {
        return Err(LedgerError::Expired(EXPIRED.to_string()));
    }

    if promo_code.is_exhausted() {
        return Err(LedgerError::LimitReached(LIMIT_REACHED.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        repositories::memory::{FailingStore, InMemoryPromoCodeStore},
        utils::FixedClock,
    };
    use chrono::{Duration, TimeZone};
    use futures_util::future::join_all;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn ledger() -> (PromoCodeLedger, InMemoryPromoCodeStore) {
        let store = InMemoryPromoCodeStore::new();
        let ledger = PromoCodeLedger::new(
            Arc::new(store.clone()),
            Arc::new(FixedClock::new(now())),
        );
        (ledger, store)
    }

    fn new_promo_code(code: &str, expiry_date: DateTime<Utc>, max_usage: i32) -> NewPromoCode {
        NewPromoCode {
            code: code.to_string(),
            discount_type: "percentage".to_string(),
            discount_value: 10.0,
            expiry_date,
            max_usage,
        }
    }

    #[tokio::test]
    async fn issue_starts_with_zero_usage() {
        let (ledger, _) = ledger();

        let promo_code = ledger
            .issue(new_promo_code("SAVE10", now() + Duration::days(1), 3))
            .await
            .unwrap();

        assert_eq!(promo_code.usage_count, 0);
        assert_eq!(promo_code.max_usage, 3);
        assert_eq!(promo_code.discount_type, DiscountType::Percentage);
    }

    #[tokio::test]
    async fn issue_rejects_invalid_input() {
        let (ledger, store) = ledger();
        let expiry = now() + Duration::days(1);

        let empty_code = new_promo_code("  ", expiry, 1);
        let mut unknown_type = new_promo_code("A", expiry, 1);
        unknown_type.discount_type = "bogo".to_string();
        let mut zero_value = new_promo_code("B", expiry, 1);
        zero_value.discount_value = 0.0;
        let mut nan_value = new_promo_code("C", expiry, 1);
        nan_value.discount_value = f64::NAN;
        let zero_usage = new_promo_code("D", expiry, 0);
        let negative_usage = new_promo_code("E", expiry, -4);

        for invalid in [
            empty_code,
            unknown_type,
            zero_value,
            nan_value,
            zero_usage,
            negative_usage,
        ] {
            let result = ledger.issue(invalid).await;
            assert!(matches!(result, Err(LedgerError::Validation(_))));
        }

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn issue_rejects_duplicate_code() {
        let (ledger, _) = ledger();
        let expiry = now() + Duration::days(1);
        ledger.issue(new_promo_code("ONCE", expiry, 1)).await.unwrap();

        let result = ledger.issue(new_promo_code("ONCE", expiry, 5)).await;

        assert!(matches!(result, Err(LedgerError::Conflict(_))));
    }

    #[tokio::test]
    async fn redeem_until_limit() {
        let (ledger, store) = ledger();
        ledger
            .issue(new_promo_code("SAVE10", now() + Duration::days(1), 1))
            .await
            .unwrap();

        let discount = ledger.redeem("SAVE10").await.unwrap();
        assert_eq!(discount.discount_type, DiscountType::Percentage);
        assert_eq!(discount.value, 10.0);
        assert_eq!(store.find_by_code("SAVE10").await.unwrap().unwrap().usage_count, 1);

        let second = ledger.redeem("SAVE10").await;
        assert!(matches!(second, Err(LedgerError::LimitReached(_))));
        assert_eq!(store.find_by_code("SAVE10").await.unwrap().unwrap().usage_count, 1);
    }

    #[tokio::test]
    async fn redeem_unknown_code_is_not_found() {
        let (ledger, _) = ledger();

        let result = ledger.redeem("NOPE").await;

        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn redeem_expired_code_leaves_usage_untouched() {
        let (ledger, store) = ledger();
        ledger
            .issue(new_promo_code("OLD", now() - Duration::days(1), 10))
            .await
            .unwrap();

        let result = ledger.redeem("OLD").await;

        assert!(matches!(result, Err(LedgerError::Expired(_))));
        assert_eq!(store.find_by_code("OLD").await.unwrap().unwrap().usage_count, 0);
    }

    #[tokio::test]
    async fn code_expires_at_its_expiry_instant() {
        let (ledger, _) = ledger();
        ledger.issue(new_promo_code("EDGE", now(), 10)).await.unwrap();

        let result = ledger.redeem("EDGE").await;

        assert!(matches!(result, Err(LedgerError::Expired(_))));
    }

    #[tokio::test]
    async fn expiry_wins_over_exhaustion() {
        let (ledger, store) = ledger();
        let issued = ledger
            .issue(new_promo_code("BOTH", now() + Duration::seconds(1), 1))
            .await
            .unwrap();
        store.increment_usage(&issued.id, now()).await.unwrap();

        let late = PromoCodeLedger::new(
            Arc::new(store.clone()),
            Arc::new(FixedClock::new(now() + Duration::days(1))),
        );

        assert!(matches!(late.redeem("BOTH").await, Err(LedgerError::Expired(_))));
    }

    #[tokio::test]
    async fn list_is_stable_without_mutation() {
        let (ledger, _) = ledger();
        let expiry = now() + Duration::days(1);
        ledger.issue(new_promo_code("B", expiry, 1)).await.unwrap();
        ledger.issue(new_promo_code("A", expiry, 2)).await.unwrap();

        let first = ledger.list().await.unwrap();
        let second = ledger.list().await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_redemptions_never_exceed_max_usage() {
        let (ledger, store) = ledger();
        ledger
            .issue(new_promo_code("RUSH", now() + Duration::days(1), 5))
            .await
            .unwrap();

        let attempts = (0..50).map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.redeem("RUSH").await })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let limited = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::LimitReached(_))))
            .count();

        assert_eq!(succeeded, 5);
        assert_eq!(limited, 45);
        assert_eq!(store.find_by_code("RUSH").await.unwrap().unwrap().usage_count, 5);
    }

    #[tokio::test]
    async fn issue_surfaces_unavailable_store_instead_of_conflict() {
        let ledger = PromoCodeLedger::new(
            Arc::new(FailingStore::Unavailable),
            Arc::new(FixedClock::new(now())),
        );

        let result = ledger
            .issue(new_promo_code("SAVE10", now() + Duration::days(1), 1))
            .await;

        assert!(matches!(
            result,
            Err(LedgerError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn redeem_and_list_pass_backend_failures_through() {
        let ledger = PromoCodeLedger::new(
            Arc::new(FailingStore::Backend),
            Arc::new(FixedClock::new(now())),
        );

        assert!(matches!(
            ledger.redeem("SAVE10").await,
            Err(LedgerError::Store(StoreError::Backend(_)))
        ));
        assert!(matches!(
            ledger.list().await,
            Err(LedgerError::Store(StoreError::Backend(_)))
        ));
    }
}
