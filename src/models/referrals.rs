use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ReferralStatus {
    Pending,
    Used,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::Used => "used",
        }
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: String,
    pub referrer_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referred_user_id: Option<String>,
    pub referral_code: String,
    pub status: ReferralStatus,
    pub date_created: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReferral {
    pub referrer_user_id: String,
    pub referral_code: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemReferral {
    pub referral_code: String,
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{Postgres, Type};

    #[test]
    fn status_is_stored_as_text() {
        let text = <String as Type<Postgres>>::type_info();

        assert!(<ReferralStatus as Type<Postgres>>::compatible(&text));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ReferralStatus::Used).unwrap(), "used");
    }
}
