pub mod promo_codes;
pub mod referrals;
