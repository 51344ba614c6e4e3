use crate::domain::account::{AccountId, AccountStatus, Amount, Balance, BankAccount};
use crate::domain::bill::{Bill, BillId, BillStatus, BillType};
use crate::domain::otp::{Otp, OtpId, OtpStatus};
use crate::domain::ports::{
    BillSettlement, CloseOutcome, FundsPlan, LedgerStore, NewAccount, NewBill, NewOtp,
    NewTransaction, SettlementOutcome, TransferOutcome,
};
use crate::domain::transaction::{
    CallId, Reference, Transaction, TransactionId, TransactionStatus, TransactionType,
};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for account rows.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for transaction rows.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for bill rows.
pub const CF_BILLS: &str = "bills";
/// Column Family for one-time password rows.
pub const CF_OTPS: &str = "otps";
/// Column Family for id counters.
pub const CF_META: &str = "meta";

const NEXT_ACCOUNT_ID: &str = "next_account_id";
const NEXT_TRANSACTION_ID: &str = "next_transaction_id";
const NEXT_BILL_ID: &str = "next_bill_id";
const NEXT_OTP_ID: &str = "next_otp_id";

/// A persistent ledger backed by RocksDB.
///
/// Each table gets its own Column Family; rows are JSON values keyed by
/// their big-endian id. RocksDB gives atomic `WriteBatch` commits but no
/// cross-key transactions, so every mutating operation serializes through
/// the `writer` mutex and stages its changes in one batch. Reads go
/// straight to the DB.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        StoreError::backend(err)
    }
}

impl RocksDbLedger {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_ACCOUNTS, CF_TRANSACTIONS, CF_BILLS, CF_OTPS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> StoreResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::CorruptLedger(format!("column family '{name}' not found")))
    }

    fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(StoreError::backend)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
        serde_json::from_slice(bytes).map_err(StoreError::backend)
    }

    fn load<T: DeserializeOwned>(&self, cf_name: &str, id: i64) -> StoreResult<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> StoreResult<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(Self::decode(&value)?);
        }
        Ok(rows)
    }

    fn stage<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        id: i64,
        row: &T,
    ) -> StoreResult<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(&cf, id.to_be_bytes(), Self::encode(row)?);
        Ok(())
    }

    /// Allocates the next id of a counter. Callers must hold the writer
    /// lock, the read-increment-write below is not atomic on its own.
    fn next_id(&self, counter: &str) -> StoreResult<i64> {
        let cf = self.cf(CF_META)?;
        let current = match self.db.get_cf(&cf, counter.as_bytes())? {
            Some(bytes) => Self::decode::<i64>(&bytes)?,
            None => 0,
        };
        let next = current + 1;
        self.db.put_cf(&cf, counter.as_bytes(), Self::encode(&next)?)?;
        Ok(next)
    }

    fn reference_taken(&self, reference: &Reference) -> StoreResult<bool> {
        let transactions: Vec<Transaction> = self.scan(CF_TRANSACTIONS)?;
        Ok(transactions
            .iter()
            .any(|transaction| transaction.reference == *reference))
    }

    fn ensure_reference_free(&self, reference: &Reference) -> StoreResult<()> {
        if self.reference_taken(reference)? {
            return Err(StoreError::Conflict(format!(
                "transaction reference '{reference}' already exists"
            )));
        }
        Ok(())
    }

    /// Stages a new transaction row. Callers must hold the writer lock and
    /// have checked the reference.
    fn stage_transaction(
        &self,
        batch: &mut WriteBatch,
        new: NewTransaction,
        now: DateTime<Utc>,
    ) -> StoreResult<Transaction> {
        let id = TransactionId(self.next_id(NEXT_TRANSACTION_ID)?);
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
        self.stage(batch, CF_TRANSACTIONS, id.0, &transaction)?;
        Ok(transaction)
    }

    fn require_account(&self, id: AccountId) -> StoreResult<BankAccount> {
        self.load(CF_ACCOUNTS, id.0)?
            .ok_or_else(|| StoreError::MissingRow(format!("account {id}")))
    }

    /// Marks a PENDING transaction FAILED, leaving terminal rows alone.
    fn fail_transaction(&self, id: TransactionId) -> StoreResult<()> {
        let Some(mut transaction) = self.load::<Transaction>(CF_TRANSACTIONS, id.0)? else {
            return Ok(());
        };
        if transaction.status != TransactionStatus::Pending {
            return Ok(());
        }
        transaction.status = TransactionStatus::Failed;
        let cf = self.cf(CF_TRANSACTIONS)?;
        self.db
            .put_cf(&cf, id.0.to_be_bytes(), Self::encode(&transaction)?)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RocksDbLedger {
    async fn create_account(&self, new: NewAccount) -> StoreResult<BankAccount> {
        let _guard = self.writer.lock().await;
        let now = Utc::now();
        let accounts: Vec<BankAccount> = self.scan(CF_ACCOUNTS)?;
        if accounts
            .iter()
            .any(|account| account.account_number == new.account_number)
        {
            return Err(StoreError::Conflict(format!(
                "account number '{}' already exists",
                new.account_number
            )));
        }
        if accounts
            .iter()
            .any(|account| account.user_id == new.user_id && account.title == new.title)
        {
            return Err(StoreError::Conflict(format!(
                "account title '{}' already exists for user '{}'",
                new.title, new.user_id
            )));
        }

        let account = BankAccount {
            id: AccountId(self.next_id(NEXT_ACCOUNT_ID)?),
            account_number: new.account_number,
            user_id: new.user_id,
            title: new.title,
            balance: Balance::ZERO,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        let cf = self.cf(CF_ACCOUNTS)?;
        self.db
            .put_cf(&cf, account.id.0.to_be_bytes(), Self::encode(&account)?)?;
        Ok(account)
    }

    async fn account_by_id(&self, id: AccountId) -> StoreResult<Option<BankAccount>> {
        self.load(CF_ACCOUNTS, id.0)
    }

    async fn account_by_title(
        &self,
        user_id: &str,
        title: &str,
    ) -> StoreResult<Option<BankAccount>> {
        let accounts: Vec<BankAccount> = self.scan(CF_ACCOUNTS)?;
        Ok(accounts
            .into_iter()
            .find(|account| account.user_id == user_id && account.title == title))
    }

    async fn accounts_by_user(
        &self,
        user_id: &str,
        status: Option<AccountStatus>,
    ) -> StoreResult<Vec<BankAccount>> {
        let mut accounts: Vec<BankAccount> = self
            .scan::<BankAccount>(CF_ACCOUNTS)?
            .into_iter()
            .filter(|account| account.user_id == user_id)
            .filter(|account| status.is_none_or(|wanted| account.status == wanted))
            .collect();
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }

    async fn default_account_for(&self, user_id: &str) -> StoreResult<Option<BankAccount>> {
        let mut accounts: Vec<BankAccount> = self
            .scan::<BankAccount>(CF_ACCOUNTS)?
            .into_iter()
            .filter(|account| account.user_id == user_id && account.is_active())
            .collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(accounts.into_iter().next())
    }

    async fn account_number_taken(&self, account_number: &str) -> StoreResult<bool> {
        let accounts: Vec<BankAccount> = self.scan(CF_ACCOUNTS)?;
        Ok(accounts
            .iter()
            .any(|account| account.account_number == account_number))
    }

    async fn update_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> StoreResult<BankAccount> {
        let _guard = self.writer.lock().await;
        let mut account = self.require_account(id)?;
        account.status = status;
        account.updated_at = Utc::now();
        let cf = self.cf(CF_ACCOUNTS)?;
        self.db
            .put_cf(&cf, id.0.to_be_bytes(), Self::encode(&account)?)?;
        Ok(account)
    }

    async fn all_accounts(&self) -> StoreResult<Vec<BankAccount>> {
        let mut accounts: Vec<BankAccount> = self.scan(CF_ACCOUNTS)?;
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }

    async fn close_account(
        &self,
        id: AccountId,
        sweep_to: Option<AccountId>,
        call_id: Option<CallId>,
    ) -> StoreResult<CloseOutcome> {
        let _guard = self.writer.lock().await;
        let now = Utc::now();
        let mut account = self.require_account(id)?;
        if account.status == AccountStatus::Closed {
            return Ok(CloseOutcome::AlreadyClosed);
        }

        let mut batch = WriteBatch::default();
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
            let Some(mut destination) = self.load::<BankAccount>(CF_ACCOUNTS, destination_id.0)?
            else {
                return Ok(CloseOutcome::DestinationUnavailable);
            };
            if !destination.is_active() {
                return Ok(CloseOutcome::DestinationUnavailable);
            }

            let reference =
                Reference::transfer(&account.account_number, &destination.account_number, amount);
            self.ensure_reference_free(&reference)?;
            destination.credit(amount);
            destination.updated_at = now;
            self.stage(&mut batch, CF_ACCOUNTS, destination_id.0, &destination)?;
            sweep = Some(self.stage_transaction(
                &mut batch,
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
            )?);
            account.balance = Balance::ZERO;
        }

        account.status = AccountStatus::Closed;
        account.closed_at = Some(now);
        account.updated_at = now;
        self.stage(&mut batch, CF_ACCOUNTS, id.0, &account)?;
        self.db.write(batch)?;
        Ok(CloseOutcome::Closed { account, sweep })
    }

    async fn transfer_funds(
        &self,
        from: AccountId,
        to: AccountId,
        plan: FundsPlan,
    ) -> StoreResult<TransferOutcome> {
        let _guard = self.writer.lock().await;
        let now = Utc::now();
        self.ensure_reference_free(&plan.reference)?;
        let mut source = self.require_account(from)?;
        // A same-account transfer nets to zero and must stage one row.
        let mut destination = if to == from {
            None
        } else {
            Some(self.require_account(to)?)
        };

        let Some(debited) = source.balance.checked_sub(plan.amount) else {
            return Ok(TransferOutcome::ShortFunds {
                available: source.balance,
            });
        };
        source.updated_at = now;
        if let Some(destination) = destination.as_mut() {
            source.balance = debited;
            destination.credit(plan.amount);
            destination.updated_at = now;
        }

        let mut batch = WriteBatch::default();
        self.stage(&mut batch, CF_ACCOUNTS, from.0, &source)?;
        if let Some(destination) = &destination {
            self.stage(&mut batch, CF_ACCOUNTS, to.0, destination)?;
        }
        let transaction = self.stage_transaction(
            &mut batch,
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
        )?;
        self.db.write(batch)?;
        Ok(TransferOutcome::Applied(transaction))
    }

    async fn deposit_funds(&self, to: AccountId, plan: FundsPlan) -> StoreResult<Transaction> {
        let _guard = self.writer.lock().await;
        let now = Utc::now();
        self.ensure_reference_free(&plan.reference)?;
        let mut destination = self.require_account(to)?;
        destination.credit(plan.amount);
        destination.updated_at = now;

        let mut batch = WriteBatch::default();
        self.stage(&mut batch, CF_ACCOUNTS, to.0, &destination)?;
        let transaction = self.stage_transaction(
            &mut batch,
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
        )?;
        self.db.write(batch)?;
        Ok(transaction)
    }

    async fn settle_pending_transfer(&self, id: TransactionId) -> StoreResult<SettlementOutcome> {
        let _guard = self.writer.lock().await;
        let now = Utc::now();
        let Some(mut transaction) = self.load::<Transaction>(CF_TRANSACTIONS, id.0)? else {
            return Ok(SettlementOutcome::Missing);
        };
        if transaction.status != TransactionStatus::Pending {
            return Ok(SettlementOutcome::NotPending {
                status: transaction.status,
            });
        }
        let (Some(from), Some(to)) = (transaction.from_account, transaction.to_account) else {
            self.fail_transaction(id)?;
            return Ok(SettlementOutcome::AccountsMissing);
        };
        let Some(mut source) = self.load::<BankAccount>(CF_ACCOUNTS, from.0)? else {
            self.fail_transaction(id)?;
            return Ok(SettlementOutcome::AccountsMissing);
        };
        // Same-row settlements net to zero; stage the account once.
        let mut destination = if to == from {
            None
        } else {
            match self.load::<BankAccount>(CF_ACCOUNTS, to.0)? {
                Some(destination) => Some(destination),
                None => {
                    self.fail_transaction(id)?;
                    return Ok(SettlementOutcome::AccountsMissing);
                }
            }
        };
        let Some(debited) = source.balance.checked_sub(transaction.amount) else {
            let available = source.balance;
            self.fail_transaction(id)?;
            return Ok(SettlementOutcome::ShortFunds { available });
        };

        source.updated_at = now;
        if let Some(destination) = destination.as_mut() {
            source.balance = debited;
            destination.credit(transaction.amount);
            destination.updated_at = now;
        }
        transaction.status = TransactionStatus::Completed;
        transaction.completed_at = Some(now);

        let mut batch = WriteBatch::default();
        self.stage(&mut batch, CF_ACCOUNTS, from.0, &source)?;
        if let Some(destination) = &destination {
            self.stage(&mut batch, CF_ACCOUNTS, to.0, destination)?;
        }
        self.stage(&mut batch, CF_TRANSACTIONS, id.0, &transaction)?;
        self.db.write(batch)?;
        Ok(SettlementOutcome::Settled(transaction))
    }

    async fn create_transaction(&self, new: NewTransaction) -> StoreResult<Transaction> {
        let _guard = self.writer.lock().await;
        let now = Utc::now();
        self.ensure_reference_free(&new.reference)?;
        let mut batch = WriteBatch::default();
        let transaction = self.stage_transaction(&mut batch, new, now)?;
        self.db.write(batch)?;
        Ok(transaction)
    }

    async fn transaction_by_id(&self, id: TransactionId) -> StoreResult<Option<Transaction>> {
        self.load(CF_TRANSACTIONS, id.0)
    }

    async fn transaction_by_reference(
        &self,
        reference: &Reference,
    ) -> StoreResult<Option<Transaction>> {
        let transactions: Vec<Transaction> = self.scan(CF_TRANSACTIONS)?;
        Ok(transactions
            .into_iter()
            .find(|transaction| transaction.reference == *reference))
    }

    async fn transactions_for_account(
        &self,
        id: AccountId,
        limit: usize,
    ) -> StoreResult<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .scan::<Transaction>(CF_TRANSACTIONS)?
            .into_iter()
            .filter(|transaction| {
                transaction.from_account == Some(id) || transaction.to_account == Some(id)
            })
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        transactions.truncate(limit);
        Ok(transactions)
    }

    async fn create_bill(&self, new: NewBill) -> StoreResult<Bill> {
        let _guard = self.writer.lock().await;
        let now = Utc::now();
        let bill = Bill {
            id: BillId(self.next_id(NEXT_BILL_ID)?),
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
        let cf = self.cf(CF_BILLS)?;
        self.db
            .put_cf(&cf, bill.id.0.to_be_bytes(), Self::encode(&bill)?)?;
        Ok(bill)
    }

    async fn outstanding_bills(&self, user_id: &str) -> StoreResult<Vec<Bill>> {
        let mut bills: Vec<Bill> = self
            .scan::<Bill>(CF_BILLS)?
            .into_iter()
            .filter(|bill| bill.user_id == user_id && bill.status.is_outstanding())
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
        let _guard = self.writer.lock().await;
        let now = Utc::now();
        let Some(mut existing) = self.load::<Bill>(CF_BILLS, bill.0)? else {
            return Err(StoreError::MissingRow(format!("bill {bill}")));
        };
        if !existing.status.is_outstanding() {
            return Ok(BillSettlement::AlreadySettled);
        }
        let mut source = self.require_account(from)?;
        let Some(debited) = source.balance.checked_sub(plan.amount) else {
            return Ok(BillSettlement::ShortFunds {
                available: source.balance,
            });
        };
        self.ensure_reference_free(&plan.reference)?;

        source.balance = debited;
        source.updated_at = now;

        let mut batch = WriteBatch::default();
        self.stage(&mut batch, CF_ACCOUNTS, from.0, &source)?;
        let transaction = self.stage_transaction(
            &mut batch,
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
        )?;
        existing.status = BillStatus::Paid;
        existing.paid_from_account = Some(from);
        existing.transaction_id = Some(transaction.id);
        existing.paid_at = Some(now);
        existing.updated_at = now;
        self.stage(&mut batch, CF_BILLS, bill.0, &existing)?;
        self.db.write(batch)?;
        Ok(BillSettlement::Paid {
            bill: existing,
            transaction,
        })
    }

    async fn create_otp(&self, new: NewOtp) -> StoreResult<Otp> {
        let _guard = self.writer.lock().await;
        let now = Utc::now();
        let otp = Otp {
            id: OtpId(self.next_id(NEXT_OTP_ID)?),
            user_id: new.user_id,
            token: new.token,
            transaction_id: new.transaction_id,
            status: OtpStatus::Pending,
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
            used_at: None,
        };
        let cf = self.cf(CF_OTPS)?;
        self.db
            .put_cf(&cf, otp.id.0.to_be_bytes(), Self::encode(&otp)?)?;
        Ok(otp)
    }

    async fn verify_and_consume_otp(
        &self,
        user_id: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Otp>> {
        let _guard = self.writer.lock().await;
        let mut candidates: Vec<Otp> = self
            .scan::<Otp>(CF_OTPS)?
            .into_iter()
            .filter(|otp| otp.user_id == user_id && otp.token == token && otp.is_redeemable(now))
            .collect();
        candidates.sort_by_key(|otp| otp.id);
        let Some(mut otp) = candidates.into_iter().next() else {
            return Ok(None);
        };
        otp.status = OtpStatus::Used;
        otp.used_at = Some(now);
        otp.updated_at = now;
        let cf = self.cf(CF_OTPS)?;
        self.db
            .put_cf(&cf, otp.id.0.to_be_bytes(), Self::encode(&otp)?)?;
        Ok(Some(otp))
    }

    async fn otp_by_id(&self, id: OtpId) -> StoreResult<Option<Otp>> {
        self.load(CF_OTPS, id.0)
    }

    async fn expire_stale_otps(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let _guard = self.writer.lock().await;
        let stale: Vec<Otp> = self
            .scan::<Otp>(CF_OTPS)?
            .into_iter()
            .filter(|otp| otp.status == OtpStatus::Pending && otp.expires_at <= now)
            .collect();
        let expired = stale.len();
        for mut otp in stale {
            otp.status = OtpStatus::Expired;
            otp.updated_at = now;
            let cf = self.cf(CF_OTPS)?;
            self.db
                .put_cf(&cf, otp.id.0.to_be_bytes(), Self::encode(&otp)?)?;
            if let Some(transaction_id) = otp.transaction_id {
                self.fail_transaction(transaction_id)?;
            }
        }
        Ok(expired)
    }
}
