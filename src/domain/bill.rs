use crate::domain::account::{AccountId, Amount};
use crate::domain::transaction::TransactionId;
use crate::error::Rejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Surrogate key of a bill row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BillId(pub i64);

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of bill categories callers can pay.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillType {
    Electricity,
    Water,
    Gas,
    Internet,
    Tv,
    Phone,
    Parking,
    Other,
}

impl BillType {
    pub const ALL: [Self; 8] = [
        Self::Electricity,
        Self::Water,
        Self::Gas,
        Self::Internet,
        Self::Tv,
        Self::Phone,
        Self::Parking,
        Self::Other,
    ];

    /// Accepts caller-supplied text in any casing.
    pub fn parse(raw: &str) -> Result<Self, Rejection> {
        let needle = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|bill_type| bill_type.as_str() == needle)
            .ok_or_else(|| Rejection::UnknownBillType {
                given: raw.to_string(),
                valid: Self::valid_list(),
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Water => "water",
            Self::Gas => "gas",
            Self::Internet => "internet",
            Self::Tv => "tv",
            Self::Phone => "phone",
            Self::Parking => "parking",
            Self::Other => "other",
        }
    }

    /// Capitalized form used in read-back lists.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Electricity => "Electricity",
            Self::Water => "Water",
            Self::Gas => "Gas",
            Self::Internet => "Internet",
            Self::Tv => "Tv",
            Self::Phone => "Phone",
            Self::Parking => "Parking",
            Self::Other => "Other",
        }
    }

    pub fn valid_list() -> String {
        Self::ALL
            .iter()
            .map(|bill_type| bill_type.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for BillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillStatus {
    Pending,
    Paid,
    Overdue,
}

impl BillStatus {
    /// PAID is terminal; PENDING and OVERDUE both still want money.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pending | Self::Overdue)
    }

    pub fn spoken(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }
}

/// An obligation registered against a user, settled at most once.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Bill {
    pub id: BillId,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: BillType,
    pub amount: Amount,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub status: BillStatus,
    pub paid_from_account: Option<AccountId>,
    pub transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_any_casing() {
        assert_eq!(BillType::parse("electricity").unwrap(), BillType::Electricity);
        assert_eq!(BillType::parse("ELECTRICITY").unwrap(), BillType::Electricity);
        assert_eq!(BillType::parse(" Tv ").unwrap(), BillType::Tv);
    }

    #[test]
    fn test_parse_rejects_unknown_types_with_the_valid_list() {
        let err = BillType::parse("rent").unwrap_err();
        match err {
            Rejection::UnknownBillType { given, valid } => {
                assert_eq!(given, "rent");
                assert_eq!(
                    valid,
                    "electricity, water, gas, internet, tv, phone, parking, other"
                );
            }
            other => panic!("unexpected rejection: {other:?}"),
        }
    }

    #[test]
    fn test_outstanding_statuses() {
        assert!(BillStatus::Pending.is_outstanding());
        assert!(BillStatus::Overdue.is_outstanding());
        assert!(!BillStatus::Paid.is_outstanding());
    }
}
