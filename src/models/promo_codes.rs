use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown discount type: {0}")]
pub struct UnknownDiscountType(pub String);

impl FromStr for DiscountType {
    type Err = UnknownDiscountType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(UnknownDiscountType(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    pub id: String,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub expiry_date: DateTime<Utc>,
    pub usage_count: i32,
    pub max_usage: i32,
}

impl PromoCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_date
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_count >= self.max_usage
    }

    pub fn discount(&self) -> Discount {
        Discount {
            discount_type: self.discount_type,
            value: self.discount_value,
        }
    }
}

/// Issuance request. The discount type stays a raw string so that an unknown
/// type is reported as a validation failure rather than a body rejection.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPromoCode {
    pub code: String,
    #[serde(alias = "type")]
    pub discount_type: String,
    #[serde(alias = "value")]
    pub discount_value: f64,
    pub expiry_date: DateTime<Utc>,
    pub max_usage: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Discount {
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPromoCode {
    pub user_id: String,
    pub promo_code: String,
}
