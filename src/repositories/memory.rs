//! In-memory stores backed by `DashMap`.
//!
//! Conditional updates run while holding the entry's shard lock, which gives
//! them the same check-and-set semantics as the guarded `UPDATE` statements of
//! the PostgreSQL repositories. Used by the `memory` backend and by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;

use super::{promo_codes::PromoCodeStore, referrals::ReferralStore, StoreError};
use crate::models::{
    promo_codes::PromoCode,
    referrals::{Referral, ReferralStatus},
};

#[derive(Clone, Default)]
pub struct InMemoryPromoCodeStore {
    by_code: Arc<DashMap<String, PromoCode>>,
    codes_by_id: Arc<DashMap<String, String>>,
}

impl InMemoryPromoCodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PromoCodeStore for InMemoryPromoCodeStore {
    async fn insert(&self, promo_code: PromoCode) -> Result<PromoCode, StoreError> {
        match self.by_code.entry(promo_code.code.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate("promo_codes_code_key".to_string())),
            Entry::Vacant(entry) => {
                // Index the id before the code becomes visible, so a redeem
                // that finds the code can always reach it by id.
                self.codes_by_id
                    .insert(promo_code.id.clone(), promo_code.code.clone());
                entry.insert(promo_code.clone());
                Ok(promo_code)
            }
        }
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        Ok(self.by_code.get(code).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<PromoCode>, StoreError> {
        let mut promo_codes: Vec<PromoCode> = self
            .by_code
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        promo_codes.sort_by(|a, b| a.code.cmp(&b.code));

        Ok(promo_codes)
    }

    async fn increment_usage(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PromoCode>, StoreError> {
        let Some(code) = self.codes_by_id.get(id).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };

        let Some(mut promo_code) = self.by_code.get_mut(&code) else {
            return Ok(None);
        };

        if promo_code.usage_count >= promo_code.max_usage || promo_code.is_expired_at(now) {
            return Ok(None);
        }

        promo_code.usage_count += 1;
        Ok(Some(promo_code.value().clone()))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryReferralStore {
    records: Arc<DashMap<String, Referral>>,
    ids_by_code: Arc<DashMap<String, String>>,
}

impl InMemoryReferralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReferralStore for InMemoryReferralStore {
    async fn insert(&self, referral: Referral) -> Result<Referral, StoreError> {
        match self.ids_by_code.entry(referral.referral_code.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(
                "referrals_referral_code_key".to_string(),
            )),
            Entry::Vacant(entry) => {
                self.records.insert(referral.id.clone(), referral.clone());
                entry.insert(referral.id.clone());
                Ok(referral)
            }
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Referral>, StoreError> {
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_pending_by_code(&self, code: &str) -> Result<Option<Referral>, StoreError> {
        let Some(id) = self.ids_by_code.get(code).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };

        Ok(self
            .records
            .get(&id)
            .filter(|entry| entry.status == ReferralStatus::Pending)
            .map(|entry| entry.value().clone()))
    }

    async fn mark_used(
        &self,
        id: &str,
        referred_user_id: &str,
    ) -> Result<Option<Referral>, StoreError> {
        let Some(mut referral) = self.records.get_mut(id) else {
            return Ok(None);
        };

        if referral.status != ReferralStatus::Pending {
            return Ok(None);
        }

        referral.status = ReferralStatus::Used;
        referral.referred_user_id = Some(referred_user_id.to_string());
        Ok(Some(referral.value().clone()))
    }
}

/// Store double whose every call fails with the configured error.
#[cfg(test)]
#[derive(Clone, Copy, Debug)]
pub enum FailingStore {
    Unavailable,
    Backend,
}

#[cfg(test)]
impl FailingStore {
    fn error(&self) -> StoreError {
        match self {
            FailingStore::Unavailable => StoreError::Unavailable("connection refused".to_string()),
            FailingStore::Backend => StoreError::Backend("corrupted row".to_string()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl PromoCodeStore for FailingStore {
    async fn insert(&self, _promo_code: PromoCode) -> Result<PromoCode, StoreError> {
        Err(self.error())
    }

    async fn find_by_code(&self, _code: &str) -> Result<Option<PromoCode>, StoreError> {
        Err(self.error())
    }

    async fn list(&self) -> Result<Vec<PromoCode>, StoreError> {
        Err(self.error())
    }

    async fn increment_usage(
        &self,
        _id: &str,
        _now: DateTime<Utc>,
    ) -> Result<Option<PromoCode>, StoreError> {
        Err(self.error())
    }
}

#[cfg(test)]
#[async_trait]
impl ReferralStore for FailingStore {
    async fn insert(&self, _referral: Referral) -> Result<Referral, StoreError> {
        Err(self.error())
    }

    async fn find_by_id(&self, _id: &str) -> Result<Option<Referral>, StoreError> {
        Err(self.error())
    }

    async fn find_pending_by_code(&self, _code: &str) -> Result<Option<Referral>, StoreError> {
        Err(self.error())
    }

    async fn mark_used(
        &self,
        _id: &str,
        _referred_user_id: &str,
    ) -> Result<Option<Referral>, StoreError> {
        Err(self.error())
    }
}
