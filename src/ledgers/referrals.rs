use std::sync::Arc;

use super::LedgerError;
use crate::{
    models::referrals::{NewReferral, Referral, ReferralStatus},
    repositories::{referrals::ReferralStore, StoreError},
    utils::{new_id, Clock},
};

pub const NOT_FOUND: &str = "Referral not found";
pub const NOT_FOUND_OR_USED: &str = "Referral not found or already used";

/// Sole writer of referrals. A referral moves from pending to used once,
/// through the store's guarded update.
#[derive(Clone)]
pub struct ReferralLedger {
    store: Arc<dyn ReferralStore>,
    clock: Arc<dyn Clock>,
}

impl ReferralLedger {
    pub fn new(store: Arc<dyn ReferralStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn issue(&self, new_referral: NewReferral) -> Result<Referral, LedgerError> {
        if new_referral.referrer_user_id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Referrer user id is required".to_string(),
            ));
        }
        if new_referral.referral_code.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Referral code is required".to_string(),
            ));
        }

        let referral = Referral {
            id: new_id(),
            referrer_user_id: new_referral.referrer_user_id,
            referred_user_id: None,
            referral_code: new_referral.referral_code,
            status: ReferralStatus::Pending,
            date_created: self.clock.now(),
        };

        match self.store.insert(referral).await {
            Ok(referral) => {
                log::info!(
                    "Issued referral {} for user {}.",
                    referral.referral_code,
                    referral.referrer_user_id
                );
                Ok(referral)
            }
            Err(StoreError::Duplicate(_)) => Err(LedgerError::Conflict(
                "Referral code already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Referral, LedgerError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(NOT_FOUND.to_string()))
    }

    pub async fn redeem(
        &self,
        referral_code: &str,
        referred_user_id: &str,
    ) -> Result<(), LedgerError> {
        if referred_user_id.trim().is_empty() {
            return Err(LedgerError::Validation("User id is required".to_string()));
        }

        let referral = self
            .store
            .find_pending_by_code(referral_code)
            .await?
            .ok_or_else(|| LedgerError::NotFound(NOT_FOUND_OR_USED.to_string()))?;

        match self.store.mark_used(&referral.id, referred_user_id).await? {
            Some(_) => {
                log::info!(
                    "Referral {} redeemed by user {}.",
                    referral.referral_code,
                    referred_user_id
                );
                Ok(())
            }
            None => {
                log::warn!(
                    "Referral {} was redeemed concurrently, rejecting user {}.",
                    referral.referral_code,
                    referred_user_id
                );
                Err(LedgerError::NotFound(NOT_FOUND_OR_USED.to_string()))
            }
        }
    }
}
