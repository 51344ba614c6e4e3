use crate::domain::account::{AccountId, Amount};
use crate::domain::bill::{BillId, BillType};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Surrogate key of a ledger transaction row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the voice call a transaction originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub i64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Transfer,
    Deposit,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "TRANSFER",
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PENDING moves to COMPLETED or FAILED exactly once, never back.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable, globally unique transaction reference.
///
/// The timestamp plus a random suffix keeps references from colliding even
/// when two identical movements are booked in the same instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    pub fn transfer(from_number: &str, to_number: &str, amount: Amount) -> Self {
        Self(format!(
            "TRANSFER-{}-{}-{}-{}-{}",
            from_number,
            to_number,
            amount,
            Utc::now().timestamp_micros(),
            random_suffix()
        ))
    }

    pub fn deposit(to_number: &str) -> Self {
        Self(format!(
            "DEPOSIT-{}-{}-{}",
            to_number,
            Utc::now().timestamp_micros(),
            random_suffix()
        ))
    }

    pub fn bill(bill_type: BillType, bill_id: BillId) -> Self {
        Self(format!(
            "BILL-{}-{}-{}-{}",
            bill_type.as_str().to_uppercase(),
            bill_id,
            Utc::now().timestamp_micros(),
            random_suffix()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn random_suffix() -> String {
    format!("{:04x}", rand::thread_rng().gen_range(0..0x10000))
}

/// A movement of funds between at most two accounts.
///
/// `from_account` is `None` for deposits, `to_account` is `None` for
/// withdrawals such as bill payments.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub reference: Reference,
    pub from_account: Option<AccountId>,
    pub to_account: Option<AccountId>,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub call_id: Option<CallId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    #[test]
    fn test_references_are_unique_for_identical_movements() {
        let amount = Amount::new(dec!(50.0)).unwrap();
        let references: HashSet<String> = (0..64)
            .map(|_| {
                Reference::transfer("111111111111", "222222222222", amount)
                    .as_str()
                    .to_string()
            })
            .collect();
        assert_eq!(references.len(), 64);
    }

    #[test]
    fn test_reference_formats() {
        let amount = Amount::new(dec!(9.99)).unwrap();
        let reference = Reference::transfer("111111111111", "222222222222", amount);
        assert!(reference.as_str().starts_with("TRANSFER-111111111111-222222222222-9.99-"));

        let reference = Reference::deposit("333333333333");
        assert!(reference.as_str().starts_with("DEPOSIT-333333333333-"));

        let reference = Reference::bill(BillType::Electricity, BillId(7));
        assert!(reference.as_str().starts_with("BILL-ELECTRICITY-7-"));
    }

    #[test]
    fn test_status_terminality() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_transaction_serializes_kind_as_type() {
        let transaction = Transaction {
            id: TransactionId(1),
            reference: Reference::deposit("111111111111"),
            from_account: None,
            to_account: Some(AccountId(1)),
            amount: Amount::new(dec!(5)).unwrap(),
            kind: TransactionType::Deposit,
            status: TransactionStatus::Completed,
            description: None,
            call_id: None,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        };
        let json = serde_json::to_value(&transaction).unwrap();
        assert_eq!(json["type"], "DEPOSIT");
        assert_eq!(json["status"], "COMPLETED");
    }
}
