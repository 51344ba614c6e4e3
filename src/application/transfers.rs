use crate::domain::account::{Amount, BankAccount};
use crate::domain::otp::{Otp, default_expiry, random_token};
use crate::domain::ports::{
    DirectoryRef, FundsPlan, LedgerRef, NewOtp, NewTransaction, SettlementOutcome,
    TransferOutcome,
};
use crate::domain::transaction::{
    CallId, Reference, Transaction, TransactionStatus, TransactionType,
};
use crate::error::{EngineResult, Rejection, StoreError};
use chrono::{DateTime, Utc};

/// Money movement between accounts, in two flavors.
///
/// Immediate transfers validate and settle in one step. Requested
/// transfers book a PENDING transaction guarded by an OTP; funds move
/// only at `confirm`, where the balance is checked again.
pub struct TransferEngine {
    store: LedgerRef,
    directory: DirectoryRef,
}

/// Proof of an immediate transfer.
#[derive(Debug)]
pub struct TransferReceipt {
    pub transaction: Transaction,
    pub from: BankAccount,
    pub to: BankAccount,
}

/// A transfer held for confirmation: the PENDING transaction plus the
/// OTP the caller must read back.
#[derive(Debug)]
pub struct TransferTicket {
    pub transaction: Transaction,
    pub otp: Otp,
    pub from: BankAccount,
    pub to: BankAccount,
}

/// Proof of a settled two-phase transfer.
#[derive(Debug)]
pub struct SettlementReceipt {
    pub transaction: Transaction,
    pub from: BankAccount,
    pub to: BankAccount,
}

impl TransferEngine {
    pub fn new(store: LedgerRef, directory: DirectoryRef) -> Self {
        Self { store, directory }
    }

    /// Resolves both endpoints among the caller's own accounts.
    ///
    /// Existence is checked for both endpoints before either status, so
    /// a caller naming a missing destination hears about that first.
    async fn resolve_own(
        &self,
        user_id: &str,
        from_title: &str,
        to_title: &str,
    ) -> EngineResult<(BankAccount, BankAccount)> {
        let from = self
            .store
            .account_by_title(user_id, from_title)
            .await?
            .ok_or_else(|| Rejection::AccountNotFound {
                title: from_title.to_string(),
            })?;
        let to = self
            .store
            .account_by_title(user_id, to_title)
            .await?
            .ok_or_else(|| Rejection::AccountNotFound {
                title: to_title.to_string(),
            })?;
        if !from.is_active() {
            return Err(Rejection::AccountInactive { title: from.title }.into());
        }
        if !to.is_active() {
            return Err(Rejection::DestinationInactive { title: to.title }.into());
        }
        Ok((from, to))
    }

    /// Resolves the caller's source and another user's default account.
    /// The destination is the recipient's oldest ACTIVE account, so no
    /// separate status check is needed on it.
    async fn resolve_recipient(
        &self,
        user_id: &str,
        from_title: &str,
        identifier: &str,
    ) -> EngineResult<(BankAccount, BankAccount)> {
        let from = self
            .store
            .account_by_title(user_id, from_title)
            .await?
            .ok_or_else(|| Rejection::AccountNotFound {
                title: from_title.to_string(),
            })?;
        let recipient = self
            .directory
            .user_by_phone(identifier)
            .await?
            .ok_or_else(|| Rejection::RecipientNotFound {
                identifier: identifier.to_string(),
            })?;
        let to = self
            .store
            .default_account_for(&recipient)
            .await?
            .ok_or_else(|| Rejection::RecipientHasNoActiveAccount {
                identifier: identifier.to_string(),
            })?;
        if !from.is_active() {
            return Err(Rejection::AccountInactive { title: from.title }.into());
        }
        Ok((from, to))
    }

    fn require_covered(from: &BankAccount, amount: Amount) -> EngineResult<()> {
        if !from.balance.covers(amount) {
            return Err(Rejection::InsufficientFunds {
                available: from.balance,
            }
            .into());
        }
        Ok(())
    }

    async fn settle_immediately(
        &self,
        call_id: Option<CallId>,
        from: BankAccount,
        to: BankAccount,
        amount: Amount,
        description: String,
    ) -> EngineResult<TransferReceipt> {
        Self::require_covered(&from, amount)?;
        let plan = FundsPlan {
            amount,
            reference: Reference::transfer(&from.account_number, &to.account_number, amount),
            description: Some(description),
            call_id,
        };
        match self.store.transfer_funds(from.id, to.id, plan).await? {
            TransferOutcome::Applied(transaction) => {
                tracing::info!(
                    reference = %transaction.reference,
                    amount = %transaction.amount,
                    "transfer completed"
                );
                Ok(TransferReceipt {
                    transaction,
                    from,
                    to,
                })
            }
            TransferOutcome::ShortFunds { available } => {
                Err(Rejection::InsufficientFunds { available }.into())
            }
        }
    }

    /// Moves funds between two of the caller's own accounts right away.
    pub async fn transfer_own_accounts(
        &self,
        call_id: Option<CallId>,
        user_id: &str,
        from_title: &str,
        to_title: &str,
        amount: Amount,
    ) -> EngineResult<TransferReceipt> {
        let (from, to) = self.resolve_own(user_id, from_title, to_title).await?;
        let description = format!(
            "Transfer from {} to {}",
            from.account_number, to.account_number
        );
        self.settle_immediately(call_id, from, to, amount, description)
            .await
    }

    /// Moves funds to another user's default account right away.
    pub async fn transfer_to_recipient(
        &self,
        call_id: Option<CallId>,
        user_id: &str,
        from_title: &str,
        identifier: &str,
        amount: Amount,
    ) -> EngineResult<TransferReceipt> {
        let (from, to) = self.resolve_recipient(user_id, from_title, identifier).await?;
        let description = format!("Transfer to {identifier}");
        self.settle_immediately(call_id, from, to, amount, description)
            .await
    }

    async fn hold_for_confirmation(
        &self,
        call_id: Option<CallId>,
        user_id: &str,
        from: BankAccount,
        to: BankAccount,
        amount: Amount,
        description: String,
    ) -> EngineResult<TransferTicket> {
        Self::require_covered(&from, amount)?;
        let transaction = self
            .store
            .create_transaction(NewTransaction {
                reference: Reference::transfer(&from.account_number, &to.account_number, amount),
                from_account: Some(from.id),
                to_account: Some(to.id),
                amount,
                kind: TransactionType::Transfer,
                status: TransactionStatus::Pending,
                description: Some(description),
                call_id,
            })
            .await?;
        let otp = self
            .store
            .create_otp(NewOtp {
                user_id: user_id.to_string(),
                token: random_token(&mut rand::thread_rng()),
                transaction_id: Some(transaction.id),
                expires_at: default_expiry(Utc::now()),
            })
            .await?;
        tracing::info!(
            reference = %transaction.reference,
            otp = %otp.id,
            "transfer held for confirmation"
        );
        Ok(TransferTicket {
            transaction,
            otp,
            from,
            to,
        })
    }

    /// Books a PENDING transfer between the caller's own accounts and
    /// issues its confirmation OTP. No funds move yet.
    pub async fn request_own_accounts(
        &self,
        call_id: Option<CallId>,
        user_id: &str,
        from_title: &str,
        to_title: &str,
        amount: Amount,
    ) -> EngineResult<TransferTicket> {
        let (from, to) = self.resolve_own(user_id, from_title, to_title).await?;
        let description = format!("Pending transfer from {} to {}", from.title, to.title);
        self.hold_for_confirmation(call_id, user_id, from, to, amount, description)
            .await
    }

    /// Books a PENDING transfer to another user and issues its OTP.
    pub async fn request_to_recipient(
        &self,
        call_id: Option<CallId>,
        user_id: &str,
        from_title: &str,
        identifier: &str,
        amount: Amount,
    ) -> EngineResult<TransferTicket> {
        let (from, to) = self.resolve_recipient(user_id, from_title, identifier).await?;
        let description = format!("Pending transfer to {identifier}");
        self.hold_for_confirmation(call_id, user_id, from, to, amount, description)
            .await
    }

    /// Redeems an OTP and settles its pending transfer.
    ///
    /// The OTP is consumed before settlement, so a token never survives a
    /// failed settlement attempt.
    pub async fn confirm(&self, user_id: &str, token: &str) -> EngineResult<SettlementReceipt> {
        let Some(otp) = self
            .store
            .verify_and_consume_otp(user_id, token, Utc::now())
            .await?
        else {
            return Err(Rejection::InvalidOrExpiredOtp.into());
        };
        let Some(transaction_id) = otp.transaction_id else {
            return Err(Rejection::NoPendingTransaction.into());
        };

        match self.store.settle_pending_transfer(transaction_id).await? {
            SettlementOutcome::Settled(transaction) => {
                let (Some(from_id), Some(to_id)) =
                    (transaction.from_account, transaction.to_account)
                else {
                    return Err(StoreError::CorruptLedger(format!(
                        "settled transfer {} lacks endpoints",
                        transaction.id
                    ))
                    .into());
                };
                let from = self
                    .store
                    .account_by_id(from_id)
                    .await?
                    .ok_or_else(|| StoreError::MissingRow(format!("account {from_id}")))?;
                let to = self
                    .store
                    .account_by_id(to_id)
                    .await?
                    .ok_or_else(|| StoreError::MissingRow(format!("account {to_id}")))?;
                tracing::info!(reference = %transaction.reference, "pending transfer settled");
                Ok(SettlementReceipt {
                    transaction,
                    from,
                    to,
                })
            }
            SettlementOutcome::ShortFunds { available } => {
                Err(Rejection::InsufficientFunds { available }.into())
            }
            SettlementOutcome::AccountsMissing => {
                Err(Rejection::TransactionAccountsMissing.into())
            }
            SettlementOutcome::NotPending { status } => {
                Err(Rejection::TransactionNotPending { status }.into())
            }
            SettlementOutcome::Missing => Err(Rejection::TransactionNotFound.into()),
        }
    }

    /// Sweeps expired OTPs, failing the transfers they guarded.
    pub async fn expire_stale_otps(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let expired = self.store.expire_stale_otps(now).await?;
        if expired > 0 {
            tracing::debug!(expired, "expired stale OTPs");
        }
        Ok(expired)
    }
}
