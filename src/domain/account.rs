use crate::error::Rejection;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

pub const ACCOUNT_NUMBER_LEN: usize = 12;

/// Surrogate key of a bank account row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Funds held by an account. Never negative.
///
/// This is a wrapper around `rust_decimal::Decimal` to enforce domain-specific
/// rules and provide type safety for financial calculations.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// A positive monetary amount moved by a transaction.
///
/// Ensures that transaction amounts are always positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, Rejection> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(Rejection::AmountNotPositive)
        }
    }

    /// Parses caller-supplied text, e.g. a tool parameter.
    pub fn parse(raw: &str) -> Result<Self, Rejection> {
        let value = raw.trim().parse::<Decimal>().map_err(|_| Rejection::InvalidAmount {
            given: raw.to_string(),
        })?;
        Self::new(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = Rejection;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// True when the balance can cover `amount` in full.
    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.value()
    }

    /// Subtracts `amount`, or `None` when that would go negative.
    pub fn checked_sub(&self, amount: Amount) -> Option<Self> {
        if self.covers(amount) {
            Some(Self(self.0 - amount.value()))
        } else {
            None
        }
    }

    /// The whole balance as a transferable amount. `None` when empty.
    pub fn as_amount(&self) -> Option<Amount> {
        Amount::new(self.0).ok()
    }
}

impl Add<Amount> for Balance {
    type Output = Self;
    fn add(self, rhs: Amount) -> Self::Output {
        Self(self.0 + rhs.value())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an account. CLOSED is terminal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Closed => "CLOSED",
        }
    }

    /// How the status is read out to a caller.
    pub fn spoken(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "frozen",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer account in the ledger.
///
/// `title` is the caller-facing name ("Savings", "Main Checking") and is
/// unique per user; `account_number` is unique across the whole ledger.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct BankAccount {
    pub id: AccountId,
    pub account_number: String,
    pub user_id: String,
    pub title: String,
    pub balance: Balance,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl BankAccount {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Credits the balance. Infallible, balances have no upper bound.
    pub fn credit(&mut self, amount: Amount) {
        self.balance = self.balance + amount;
    }

    /// Debits the balance if it covers the amount. Never goes negative.
    pub fn debit(&mut self, amount: Amount) -> bool {
        match self.balance.checked_sub(amount) {
            Some(balance) => {
                self.balance = balance;
                true
            }
            None => false,
        }
    }
}

/// Draws a candidate account number. Uniqueness is the store's problem.
pub fn random_account_number<R: Rng>(rng: &mut R) -> String {
    (0..ACCOUNT_NUMBER_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
