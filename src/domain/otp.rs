use crate::domain::transaction::TransactionId;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const OTP_TOKEN_LEN: usize = 6;
pub const OTP_TTL_MINUTES: i64 = 5;

/// Surrogate key of a one-time password row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OtpId(pub i64);

impl fmt::Display for OtpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PENDING until redeemed (USED) or swept (EXPIRED). Both are terminal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpStatus {
    Pending,
    Used,
    Expired,
}

/// A single-use confirmation code tied to one pending transaction.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Otp {
    pub id: OtpId,
    pub user_id: String,
    pub token: String,
    pub transaction_id: Option<TransactionId>,
    pub status: OtpStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl Otp {
    /// Redeemable: still pending and not past its expiry instant.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.status == OtpStatus::Pending && self.expires_at > now
    }
}

pub fn default_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(OTP_TTL_MINUTES)
}

/// Draws a 6-digit token, leading zeros included.
pub fn random_token<R: Rng>(rng: &mut R) -> String {
    format!("{:06}", rng.gen_range(0..1_000_000u32))
}
