use crate::domain::account::{AccountId, AccountStatus, Amount, Balance, BankAccount};
use crate::domain::bill::{Bill, BillId, BillStatus, BillType};
use crate::domain::otp::{Otp, OtpId, OtpStatus};
use crate::domain::ports::{
    BillSettlement, CloseOutcome, FundsPlan, LedgerStore, NewAccount, NewBill, NewOtp,
    NewTransaction, SettlementOutcome, TransferOutcome, UserDirectory,
};
use crate::domain::transaction::{
    CallId, Reference, Transaction, TransactionId, TransactionStatus, TransactionType,
};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory ledger.
///
/// All tables live behind a single `RwLock`, so every compound operation
/// holds one write guard for its whole read-check-mutate sequence. That
/// guard is what makes the operations in the port contract atomic here.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<AccountId, BankAccount>,
    transactions: HashMap<TransactionId, Transaction>,
    bills: HashMap<BillId, Bill>,
    otps: HashMap<OtpId, Otp>,
    next_account_id: i64,
    next_transaction_id: i64,
    next_bill_id: i64,
    next_otp_id: i64,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerState {
    fn ensure_reference_free(&self, reference: &Reference) -> StoreResult<()> {
        if self
            .transactions
            .values()
            .any(|transaction| transaction.reference == *reference)
        {
            return Err(StoreError::Conflict(format!(
                "transaction reference '{reference}' already exists"
            )));
        }
        Ok(())
    }

    /// Only call after `ensure_reference_free`, balances may already be
    /// mutated by the time this runs.
    fn insert_transaction(&mut self, new: NewTransaction, now: DateTime<Utc>) -> Transaction {
        self.next_transaction_id += 1;
        let id = TransactionId(self.next_transaction_id);
        let transaction = Transaction {
            id,
            reference: new.reference,
            from_account: new.from_account,
            to_account: new.to_account,
            amount: new.amount,
            kind: new.kind,
            status: new.status,
            description: new.description,
            call_id: new.call_id,
            created_at: now,
            completed_at: (new.status == TransactionStatus::Completed).then_some(now),
        };
        self.transactions.insert(id, transaction.clone());
        transaction
    }

    fn credit_account(&mut self, id: AccountId, amount: Amount, now: DateTime<Utc>) -> StoreResult<()> {
        let account = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("account {id}")))?;
        account.credit(amount);
        account.updated_at = now;
        Ok(())
    }

    fn fail_transaction(&mut self, id: TransactionId) {
        if let Some(transaction) = self.transactions.get_mut(&id) {
            if transaction.status == TransactionStatus::Pending {
                transaction.status = TransactionStatus::Failed;
            }
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn create_account(&self, new: NewAccount) -> StoreResult<BankAccount> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        if state
            .accounts
            .values()
            .any(|account| account.account_number == new.account_number)
        {
            return Err(StoreError::Conflict(format!(
                "account number '{}' already exists",
                new.account_number
            )));
        }
        if state
            .accounts
            .values()
            .any(|account| account.user_id == new.user_id && account.title == new.title)
        {
            return Err(StoreError::Conflict(format!(
                "account title '{}' already exists for user '{}'",
                new.title, new.user_id
            )));
        }
        state.next_account_id += 1;
        let account = BankAccount {
            id: AccountId(state.next_account_id),
            account_number: new.account_number,
            user_id: new.user_id,
            title: new.title,
            balance: Balance::ZERO,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn account_by_id(&self, id: AccountId) -> StoreResult<Option<BankAccount>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(&id).cloned())
    }

    async fn account_by_title(
        &self,
        user_id: &str,
        title: &str,
    ) -> StoreResult<Option<BankAccount>> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|account| account.user_id == user_id && account.title == title)
            .cloned())
    }

    async fn accounts_by_user(
        &self,
        user_id: &str,
        status: Option<AccountStatus>,
    ) -> StoreResult<Vec<BankAccount>> {
        let state = self.state.read().await;
        let mut accounts: Vec<BankAccount> = state
            .accounts
            .values()
            .filter(|account| account.user_id == user_id)
            .filter(|account| status.is_none_or(|wanted| account.status == wanted))
            .cloned()
            .collect();
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }

    async fn default_account_for(&self, user_id: &str) -> StoreResult<Option<BankAccount>> {
        let state = self.state.read().await;
        let mut accounts: Vec<&BankAccount> = state
            .accounts
            .values()
            .filter(|account| account.user_id == user_id && account.is_active())
            .collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(accounts.first().map(|account| (*account).clone()))
    }

    async fn account_number_taken(&self, account_number: &str) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .any(|account| account.account_number == account_number))
    }

    async fn update_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> StoreResult<BankAccount> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("account {id}")))?;
        account.status = status;
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn all_accounts(&self) -> StoreResult<Vec<BankAccount>> {
        let state = self.state.read().await;
        let mut accounts: Vec<BankAccount> = state.accounts.values().cloned().collect();
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }

    async fn close_account(
        &self,
        id: AccountId,
        sweep_to: Option<AccountId>,
        call_id: Option<CallId>,
    ) -> StoreResult<CloseOutcome> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let Some(account) = state.accounts.get(&id).cloned() else {
            return Err(StoreError::MissingRow(format!("account {id}")));
        };
        if account.status == AccountStatus::Closed {
            return Ok(CloseOutcome::AlreadyClosed);
        }

        let mut sweep = None;
        if let Some(amount) = account.balance.as_amount() {
            let Some(destination_id) = sweep_to else {
                return Ok(CloseOutcome::SweepRequired {
                    balance: account.balance,
                });
            };
            if destination_id == id {
                return Ok(CloseOutcome::DestinationUnavailable);
            }
            let Some(destination) = state.accounts.get(&destination_id).cloned() else {
                return Ok(CloseOutcome::DestinationUnavailable);
            };
            if !destination.is_active() {
                return Ok(CloseOutcome::DestinationUnavailable);
            }

            let reference =
                Reference::transfer(&account.account_number, &destination.account_number, amount);
            state.ensure_reference_free(&reference)?;
            if let Some(source) = state.accounts.get_mut(&id) {
                source.balance = Balance::ZERO;
                source.updated_at = now;
            }
            state.credit_account(destination_id, amount, now)?;
            sweep = Some(state.insert_transaction(
                NewTransaction {
                    reference,
                    from_account: Some(id),
                    to_account: Some(destination_id),
                    amount,
                    kind: TransactionType::Transfer,
                    status: TransactionStatus::Completed,
                    description: Some(format!(
                        "Closure transfer from {} to {}",
                        account.account_number, destination.account_number
                    )),
                    call_id,
                },
                now,
            ));
        }

        let entry = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("account {id}")))?;
        entry.status = AccountStatus::Closed;
        entry.closed_at = Some(now);
        entry.updated_at = now;
        let closed = entry.clone();
        Ok(CloseOutcome::Closed {
            account: closed,
            sweep,
        })
    }

    async fn transfer_funds(
        &self,
        from: AccountId,
        to: AccountId,
        plan: FundsPlan,
    ) -> StoreResult<TransferOutcome> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        state.ensure_reference_free(&plan.reference)?;
        if !state.accounts.contains_key(&to) {
            return Err(StoreError::MissingRow(format!("account {to}")));
        }
        let (debited, available) = match state.accounts.get(&from) {
            None => return Err(StoreError::MissingRow(format!("account {from}"))),
            Some(source) => (source.balance.checked_sub(plan.amount), source.balance),
        };
        let Some(debited) = debited else {
            return Ok(TransferOutcome::ShortFunds { available });
        };

        if let Some(source) = state.accounts.get_mut(&from) {
            source.balance = debited;
            source.updated_at = now;
        }
        state.credit_account(to, plan.amount, now)?;
        let transaction = state.insert_transaction(
            NewTransaction {
                reference: plan.reference,
                from_account: Some(from),
                to_account: Some(to),
                amount: plan.amount,
                kind: TransactionType::Transfer,
                status: TransactionStatus::Completed,
                description: plan.description,
                call_id: plan.call_id,
            },
            now,
        );
        Ok(TransferOutcome::Applied(transaction))
    }

    async fn deposit_funds(&self, to: AccountId, plan: FundsPlan) -> StoreResult<Transaction> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        state.ensure_reference_free(&plan.reference)?;
        state.credit_account(to, plan.amount, now)?;
        Ok(state.insert_transaction(
            NewTransaction {
                reference: plan.reference,
                from_account: None,
                to_account: Some(to),
                amount: plan.amount,
                kind: TransactionType::Deposit,
                status: TransactionStatus::Completed,
                description: plan.description,
                call_id: plan.call_id,
            },
            now,
        ))
    }

    async fn settle_pending_transfer(&self, id: TransactionId) -> StoreResult<SettlementOutcome> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let Some(transaction) = state.transactions.get(&id).cloned() else {
            return Ok(SettlementOutcome::Missing);
        };
        if transaction.status != TransactionStatus::Pending {
            return Ok(SettlementOutcome::NotPending {
                status: transaction.status,
            });
        }
        let (Some(from), Some(to)) = (transaction.from_account, transaction.to_account) else {
            state.fail_transaction(id);
            return Ok(SettlementOutcome::AccountsMissing);
        };
        if !state.accounts.contains_key(&to) {
            state.fail_transaction(id);
            return Ok(SettlementOutcome::AccountsMissing);
        }
        let (debited, available) = match state.accounts.get(&from) {
            None => {
                state.fail_transaction(id);
                return Ok(SettlementOutcome::AccountsMissing);
            }
            Some(source) => (
                source.balance.checked_sub(transaction.amount),
                source.balance,
            ),
        };
        let Some(debited) = debited else {
            state.fail_transaction(id);
            return Ok(SettlementOutcome::ShortFunds { available });
        };

        if let Some(source) = state.accounts.get_mut(&from) {
            source.balance = debited;
            source.updated_at = now;
        }
        state.credit_account(to, transaction.amount, now)?;
        let entry = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("transaction {id}")))?;
        entry.status = TransactionStatus::Completed;
        entry.completed_at = Some(now);
        Ok(SettlementOutcome::Settled(entry.clone()))
    }

    async fn create_transaction(&self, new: NewTransaction) -> StoreResult<Transaction> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        state.ensure_reference_free(&new.reference)?;
        Ok(state.insert_transaction(new, now))
    }

    async fn transaction_by_id(&self, id: TransactionId) -> StoreResult<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(&id).cloned())
    }

    async fn transaction_by_reference(
        &self,
        reference: &Reference,
    ) -> StoreResult<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .find(|transaction| transaction.reference == *reference)
            .cloned())
    }

    async fn transactions_for_account(
        &self,
        id: AccountId,
        limit: usize,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|transaction| {
                transaction.from_account == Some(id) || transaction.to_account == Some(id)
            })
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        transactions.truncate(limit);
        Ok(transactions)
    }

    async fn create_bill(&self, new: NewBill) -> StoreResult<Bill> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        state.next_bill_id += 1;
        let bill = Bill {
            id: BillId(state.next_bill_id),
            user_id: new.user_id,
            kind: new.kind,
            amount: new.amount,
            description: new.description,
            due_date: new.due_date,
            status: if new.due_date < now {
                BillStatus::Overdue
            } else {
                BillStatus::Pending
            },
            paid_from_account: None,
            transaction_id: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
        };
        state.bills.insert(bill.id, bill.clone());
        Ok(bill)
    }

    async fn outstanding_bills(&self, user_id: &str) -> StoreResult<Vec<Bill>> {
        let state = self.state.read().await;
        let mut bills: Vec<Bill> = state
            .bills
            .values()
            .filter(|bill| bill.user_id == user_id && bill.status.is_outstanding())
            .cloned()
            .collect();
        bills.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        Ok(bills)
    }

    async fn outstanding_bill_of_type(
        &self,
        user_id: &str,
        kind: BillType,
    ) -> StoreResult<Option<Bill>> {
        let bills = self.outstanding_bills(user_id).await?;
        Ok(bills.into_iter().find(|bill| bill.kind == kind))
    }

    async fn settle_bill(
        &self,
        bill: BillId,
        from: AccountId,
        plan: FundsPlan,
    ) -> StoreResult<BillSettlement> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let Some(existing) = state.bills.get(&bill).cloned() else {
            return Err(StoreError::MissingRow(format!("bill {bill}")));
        };
        if !existing.status.is_outstanding() {
            return Ok(BillSettlement::AlreadySettled);
        }
        let (debited, available) = match state.accounts.get(&from) {
            None => return Err(StoreError::MissingRow(format!("account {from}"))),
            Some(source) => (source.balance.checked_sub(plan.amount), source.balance),
        };
        let Some(debited) = debited else {
            return Ok(BillSettlement::ShortFunds { available });
        };

        state.ensure_reference_free(&plan.reference)?;
        if let Some(source) = state.accounts.get_mut(&from) {
            source.balance = debited;
            source.updated_at = now;
        }
        let transaction = state.insert_transaction(
            NewTransaction {
                reference: plan.reference,
                from_account: Some(from),
                to_account: None,
                amount: plan.amount,
                kind: TransactionType::Withdrawal,
                status: TransactionStatus::Completed,
                description: plan.description,
                call_id: plan.call_id,
            },
            now,
        );
        let entry = state
            .bills
            .get_mut(&bill)
            .ok_or_else(|| StoreError::MissingRow(format!("bill {bill}")))?;
        entry.status = BillStatus::Paid;
        entry.paid_from_account = Some(from);
        entry.transaction_id = Some(transaction.id);
        entry.paid_at = Some(now);
        entry.updated_at = now;
        Ok(BillSettlement::Paid {
            bill: entry.clone(),
            transaction,
        })
    }

    async fn create_otp(&self, new: NewOtp) -> StoreResult<Otp> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        state.next_otp_id += 1;
        let otp = Otp {
            id: OtpId(state.next_otp_id),
            user_id: new.user_id,
            token: new.token,
            transaction_id: new.transaction_id,
            status: OtpStatus::Pending,
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
            used_at: None,
        };
        state.otps.insert(otp.id, otp.clone());
        Ok(otp)
    }

    async fn verify_and_consume_otp(
        &self,
        user_id: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Otp>> {
        let mut state = self.state.write().await;
        let mut candidates: Vec<OtpId> = state
            .otps
            .values()
            .filter(|otp| otp.user_id == user_id && otp.token == token && otp.is_redeemable(now))
            .map(|otp| otp.id)
            .collect();
        candidates.sort();
        let Some(id) = candidates.first().copied() else {
            return Ok(None);
        };
        let otp = state
            .otps
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("otp {id}")))?;
        otp.status = OtpStatus::Used;
        otp.used_at = Some(now);
        otp.updated_at = now;
        Ok(Some(otp.clone()))
    }

    async fn otp_by_id(&self, id: OtpId) -> StoreResult<Option<Otp>> {
        let state = self.state.read().await;
        Ok(state.otps.get(&id).cloned())
    }

    async fn expire_stale_otps(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let stale: Vec<OtpId> = state
            .otps
            .values()
            .filter(|otp| otp.status == OtpStatus::Pending && otp.expires_at <= now)
            .map(|otp| otp.id)
            .collect();
        for id in &stale {
            let linked = match state.otps.get_mut(id) {
                None => None,
                Some(otp) => {
                    otp.status = OtpStatus::Expired;
                    otp.updated_at = now;
                    otp.transaction_id
                }
            };
            if let Some(transaction_id) = linked {
                state.fail_transaction(transaction_id);
            }
        }
        Ok(stale.len())
    }
}

/// In-memory phone book mapping caller identifiers to user ids.
#[derive(Default, Clone)]
pub struct InMemoryDirectory {
    users_by_phone: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, phone_number: String, user_id: String) {
        let mut users = self.users_by_phone.write().await;
        users.insert(phone_number, user_id);
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn user_by_phone(&self, phone_number: &str) -> StoreResult<Option<String>> {
        let users = self.users_by_phone.read().await;
        Ok(users.get(phone_number).cloned())
    }
}
