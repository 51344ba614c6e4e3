use crate::domain::account::{Amount, Balance};
use crate::domain::bill::BillType;
use crate::domain::transaction::TransactionStatus;
use std::fmt;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A business outcome the caller must relay, not an operational failure.
///
/// The `Display` string of each variant is the exact sentence spoken back
/// over the voice channel, so wording changes here are caller-visible.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Account '{title}' not found")]
    AccountNotFound { title: String },
    #[error("An account with the name '{title}' already exists")]
    DuplicateTitle { title: String },
    #[error("Account '{title}' is not active")]
    AccountInactive { title: String },
    #[error("Destination account '{title}' is not active")]
    DestinationInactive { title: String },
    #[error("Account '{title}' is already closed")]
    AlreadyClosed { title: String },
    #[error("Cannot {action} a closed account")]
    ClosedIsTerminal { action: StatusAction },
    #[error("Account '{title}' is already frozen")]
    AlreadyFrozen { title: String },
    #[error("Account '{title}' is not frozen")]
    NotFrozen { title: String },
    #[error("Account has a balance of {balance}. Please specify an account to transfer the remaining funds to.")]
    BalanceTransferRequired { balance: Balance },
    #[error("Transfer destination account '{title}' not found")]
    DestinationNotFound { title: String },
    #[error("Cannot transfer funds to the same account being closed")]
    SelfTransferRejected,
    #[error("Insufficient balance. Available: {available}")]
    InsufficientFunds { available: Balance },
    #[error("Insufficient balance. Bill amount: {bill_amount}, Available: {available}")]
    InsufficientFundsForBill { bill_amount: Amount, available: Balance },
    #[error("Recipient '{identifier}' not found")]
    RecipientNotFound { identifier: String },
    #[error("Recipient '{identifier}' has no active account")]
    RecipientHasNoActiveAccount { identifier: String },
    #[error("Invalid or expired OTP. Please request a new transfer.")]
    InvalidOrExpiredOtp,
    #[error("No pending transaction found for this OTP.")]
    NoPendingTransaction,
    #[error("Transaction not found.")]
    TransactionNotFound,
    #[error("Transaction is no longer pending. Current status: {status}")]
    TransactionNotPending { status: TransactionStatus },
    #[error("Transaction accounts not found.")]
    TransactionAccountsMissing,
    #[error("Invalid bill type '{given}'. Valid types are: {valid}")]
    UnknownBillType { given: String, valid: String },
    #[error("No outstanding {bill_type} bill found")]
    NoOutstandingBill { bill_type: BillType },
    #[error("Amount must be positive")]
    AmountNotPositive,
    #[error("Invalid amount '{given}'")]
    InvalidAmount { given: String },
    #[error("Missing required parameter '{name}'")]
    MissingParameter { name: String },
    #[error("Unknown tool '{name}'")]
    UnknownTool { name: String },
}

/// Status change a caller asked for, used to phrase rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Freeze,
    Unfreeze,
}

impl fmt::Display for StatusAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Freeze => write!(f, "freeze"),
            Self::Unfreeze => write!(f, "unfreeze"),
        }
    }
}

/// Infrastructure fault inside a ledger store. Never spoken to the caller.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("ledger row vanished mid-operation: {0}")]
    MissingRow(String),
    #[error("uniqueness violated: {0}")]
    Conflict(String),
    #[error("ledger invariant violated: {0}")]
    CorruptLedger(String),
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

/// Everything an engine operation can produce besides its receipt.
///
/// `Rejected` carries speech for the caller; `Store` propagates to the
/// operator untouched.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            Self::Store(_) => None,
        }
    }
}

/// Failure while reading the replay log of tool calls.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed call record on line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
}
