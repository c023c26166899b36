use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;

use super::{RequestHandler, Service};
use crate::{
    ledgers::{promo_codes::PromoCodeLedger, referrals::ReferralLedger, LedgerError},
    models::{
        promo_codes::{Discount, NewPromoCode, PromoCode},
        referrals::{NewReferral, Referral},
    },
    repositories::StoreError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Expired,
    LimitReached,
    StoreUnavailable,
    StoreFailure,
}

impl ErrorKind {
    pub fn retryable(&self) -> bool {
        matches!(self, ErrorKind::StoreUnavailable)
    }
}

impl From<&LedgerError> for ErrorKind {
    fn from(error: &LedgerError) -> Self {
        match error {
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::Expired(_) => ErrorKind::Expired,
            LedgerError::LimitReached(_) => ErrorKind::LimitReached,
            LedgerError::Store(StoreError::Unavailable(_)) => ErrorKind::StoreUnavailable,
            LedgerError::Store(_) => ErrorKind::StoreFailure,
        }
    }
}

/// Uniform result handed to the boundary: either a payload or an error kind,
/// always with a message.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub message: String,
}

impl<T> Outcome<T> {
    pub fn succeeded(payload: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error_kind: None,
            message: message.into(),
        }
    }

    pub fn failed(error: &LedgerError) -> Self {
        Self {
            success: false,
            payload: None,
            error_kind: Some(ErrorKind::from(error)),
            message: error.to_string(),
        }
    }

    fn from_result(result: Result<T, LedgerError>, message: &str) -> Self {
        match result {
            Ok(payload) => Self::succeeded(payload, message),
            Err(error) => {
                if let LedgerError::Store(store_error) = &error {
                    log::error!(
                        "Store failure (retryable: {}): {}",
                        store_error.is_retryable(),
                        store_error
                    );
                }
                Self::failed(&error)
            }
        }
    }
}

pub enum RedemptionRequest {
    CreatePromoCode {
        new_promo_code: NewPromoCode,
        response: oneshot::Sender<Outcome<String>>,
    },
    ListPromoCodes {
        response: oneshot::Sender<Outcome<Vec<PromoCode>>>,
    },
    ApplyPromoCode {
        user_id: String,
        code: String,
        response: oneshot::Sender<Outcome<Discount>>,
    },
    CreateReferral {
        new_referral: NewReferral,
        response: oneshot::Sender<Outcome<String>>,
    },
    GetReferral {
        id: String,
        response: oneshot::Sender<Outcome<Referral>>,
    },
    RedeemReferral {
        referral_code: String,
        user_id: String,
        response: oneshot::Sender<Outcome<()>>,
    },
}

/// Routes each request to the ledger owning the token kind. Holds no state of
/// its own beyond the ledger handles.
#[derive(Clone)]
pub struct RedemptionRequestHandler {
    promo_codes: PromoCodeLedger,
    referrals: ReferralLedger,
}

impl RedemptionRequestHandler {
    pub fn new(promo_codes: PromoCodeLedger, referrals: ReferralLedger) -> Self {
        RedemptionRequestHandler {
            promo_codes,
            referrals,
        }
    }

    pub async fn create_promo_code(&self, new_promo_code: NewPromoCode) -> Outcome<String> {
        let result = self
            .promo_codes
            .issue(new_promo_code)
            .await
            .map(|promo_code| promo_code.id);

        Outcome::from_result(result, "Promo code created successfully")
    }

    pub async fn list_promo_codes(&self) -> Outcome<Vec<PromoCode>> {
        Outcome::from_result(self.promo_codes.list().await, "Promo codes listed")
    }

    pub async fn apply_promo_code(&self, user_id: &str, code: &str) -> Outcome<Discount> {
        log::debug!("User {} applying promo code {}.", user_id, code);

        Outcome::from_result(
            self.promo_codes.redeem(code).await,
            "Promo code applied successfully",
        )
    }

    pub async fn create_referral(&self, new_referral: NewReferral) -> Outcome<String> {
        let result = self
            .referrals
            .issue(new_referral)
            .await
            .map(|referral| referral.id);

        Outcome::from_result(result, "Referral created successfully")
    }

    pub async fn get_referral(&self, id: &str) -> Outcome<Referral> {
        Outcome::from_result(self.referrals.get_by_id(id).await, "Referral found")
    }

    pub async fn redeem_referral(&self, referral_code: &str, user_id: &str) -> Outcome<()> {
        Outcome::from_result(
            self.referrals.redeem(referral_code, user_id).await,
            "Referral redeemed successfully",
        )
    }
}

#[async_trait]
impl RequestHandler<RedemptionRequest> for RedemptionRequestHandler {
    async fn handle_request(&self, request: RedemptionRequest) {
        match request {
            RedemptionRequest::CreatePromoCode {
                new_promo_code,
                response,
            } => {
                let outcome = self.create_promo_code(new_promo_code).await;
                let _ = response.send(outcome);
            }
            RedemptionRequest::ListPromoCodes { response } => {
                let outcome = self.list_promo_codes().await;
                let _ = response.send(outcome);
            }
            RedemptionRequest::ApplyPromoCode {
                user_id,
                code,
                response,
            } => {
                let outcome = self.apply_promo_code(&user_id, &code).await;
                let _ = response.send(outcome);
            }
            RedemptionRequest::CreateReferral {
                new_referral,
                response,
            } => {
                let outcome = self.create_referral(new_referral).await;
                let _ = response.send(outcome);
            }
            RedemptionRequest::GetReferral { id, response } => {
                let outcome = self.get_referral(&id).await;
                let _ = response.send(outcome);
            }
            RedemptionRequest::RedeemReferral {
                referral_code,
                user_id,
                response,
            } => {
                let outcome = self.redeem_referral(&referral_code, &user_id).await;
                let _ = response.send(outcome);
            }
        }
    }
}

pub struct RedemptionService;

impl RedemptionService {
    pub fn new() -> Self {
        RedemptionService {}
    }
}

#[async_trait]
impl Service<RedemptionRequest, RedemptionRequestHandler> for RedemptionService {}
