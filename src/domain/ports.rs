use super::account::{AccountId, AccountStatus, Amount, Balance, BankAccount};
use super::bill::{Bill, BillId, BillType};
use super::otp::{Otp, OtpId};
use super::transaction::{
    CallId, Reference, Transaction, TransactionId, TransactionStatus, TransactionType,
};
use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub type LedgerRef = Arc<dyn LedgerStore>;
pub type DirectoryRef = Arc<dyn UserDirectory>;

/// Row to insert for a freshly opened account. Accounts start ACTIVE with a
/// zero balance; opening funds arrive as a separate deposit.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: String,
    pub title: String,
    pub account_number: String,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference: Reference,
    pub from_account: Option<AccountId>,
    pub to_account: Option<AccountId>,
    pub amount: Amount,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub call_id: Option<CallId>,
}

/// Row to insert for a new obligation. Bills start PENDING, or OVERDUE
/// when registered past their due date.
#[derive(Debug, Clone)]
pub struct NewBill {
    pub user_id: String,
    pub kind: BillType,
    pub amount: Amount,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOtp {
    pub user_id: String,
    pub token: String,
    pub transaction_id: Option<TransactionId>,
    pub expires_at: DateTime<Utc>,
}

/// Everything needed to book one movement of funds.
#[derive(Debug, Clone)]
pub struct FundsPlan {
    pub amount: Amount,
    pub reference: Reference,
    pub description: Option<String>,
    pub call_id: Option<CallId>,
}

/// Result of an immediate transfer attempted under the store's lock.
///
/// Short funds is a first-class outcome rather than an error: the balance
/// is re-checked inside the atomic section and can differ from what the
/// engine saw moments earlier.
#[derive(Debug)]
pub enum TransferOutcome {
    Applied(Transaction),
    ShortFunds { available: Balance },
}

/// Result of settling a PENDING transaction at confirm time.
///
/// Every non-`Settled` outcome except `NotPending`/`Missing` marks the
/// transaction FAILED within the same atomic section.
#[derive(Debug)]
pub enum SettlementOutcome {
    Settled(Transaction),
    ShortFunds { available: Balance },
    AccountsMissing,
    NotPending { status: TransactionStatus },
    Missing,
}

#[derive(Debug)]
pub enum CloseOutcome {
    Closed {
        account: BankAccount,
        sweep: Option<Transaction>,
    },
    AlreadyClosed,
    SweepRequired { balance: Balance },
    DestinationUnavailable,
}

#[derive(Debug)]
pub enum BillSettlement {
    Paid { bill: Bill, transaction: Transaction },
    ShortFunds { available: Balance },
    AlreadySettled,
}

/// Persistence port for accounts, transactions, bills and OTPs.
///
/// Compound operations (`transfer_funds`, `settle_pending_transfer`,
/// `close_account`, `settle_bill`, `verify_and_consume_otp`) execute as one
/// atomic unit per implementation: concurrent calls observe either none or
/// all of their effects.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // accounts
    async fn create_account(&self, new: NewAccount) -> StoreResult<BankAccount>;
    async fn account_by_id(&self, id: AccountId) -> StoreResult<Option<BankAccount>>;
    async fn account_by_title(&self, user_id: &str, title: &str)
    -> StoreResult<Option<BankAccount>>;
    async fn accounts_by_user(
        &self,
        user_id: &str,
        status: Option<AccountStatus>,
    ) -> StoreResult<Vec<BankAccount>>;
    /// The user's oldest ACTIVE account, the target for incoming transfers.
    async fn default_account_for(&self, user_id: &str) -> StoreResult<Option<BankAccount>>;
    async fn account_number_taken(&self, account_number: &str) -> StoreResult<bool>;
    async fn update_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> StoreResult<BankAccount>;
    async fn all_accounts(&self) -> StoreResult<Vec<BankAccount>>;
    /// Closes an account, sweeping any remaining balance into `sweep_to`.
    async fn close_account(
        &self,
        id: AccountId,
        sweep_to: Option<AccountId>,
        call_id: Option<CallId>,
    ) -> StoreResult<CloseOutcome>;

    // funds movement
    async fn transfer_funds(
        &self,
        from: AccountId,
        to: AccountId,
        plan: FundsPlan,
    ) -> StoreResult<TransferOutcome>;
    async fn deposit_funds(&self, to: AccountId, plan: FundsPlan) -> StoreResult<Transaction>;
    async fn settle_pending_transfer(&self, id: TransactionId) -> StoreResult<SettlementOutcome>;

    // transactions
    async fn create_transaction(&self, new: NewTransaction) -> StoreResult<Transaction>;
    async fn transaction_by_id(&self, id: TransactionId) -> StoreResult<Option<Transaction>>;
    async fn transaction_by_reference(
        &self,
        reference: &Reference,
    ) -> StoreResult<Option<Transaction>>;
    /// Newest first, capped at `limit`.
    async fn transactions_for_account(
        &self,
        id: AccountId,
        limit: usize,
    ) -> StoreResult<Vec<Transaction>>;

    // bills
    async fn create_bill(&self, new: NewBill) -> StoreResult<Bill>;
    /// Outstanding bills for a user, soonest due first.
    async fn outstanding_bills(&self, user_id: &str) -> StoreResult<Vec<Bill>>;
    async fn outstanding_bill_of_type(
        &self,
        user_id: &str,
        kind: BillType,
    ) -> StoreResult<Option<Bill>>;
    async fn settle_bill(
        &self,
        bill: BillId,
        from: AccountId,
        plan: FundsPlan,
    ) -> StoreResult<BillSettlement>;

    // otps
    async fn create_otp(&self, new: NewOtp) -> StoreResult<Otp>;
    /// Finds the matching redeemable OTP and flips it to USED in one unit,
    /// so a token redeems at most once under any interleaving.
    async fn verify_and_consume_otp(
        &self,
        user_id: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Otp>>;
    async fn otp_by_id(&self, id: OtpId) -> StoreResult<Option<Otp>>;
    /// Expires every overdue PENDING OTP and fails its linked PENDING
    /// transaction. Returns how many OTPs were expired.
    async fn expire_stale_otps(&self, now: DateTime<Utc>) -> StoreResult<usize>;
}

/// Resolves caller-supplied recipient identifiers (phone numbers) to users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_by_phone(&self, phone_number: &str) -> StoreResult<Option<String>>;
}
