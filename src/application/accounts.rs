use crate::domain::account::{
    AccountStatus, Amount, Balance, BankAccount, random_account_number,
};
use crate::domain::ports::{CloseOutcome, LedgerRef, NewAccount};
use crate::domain::transaction::{CallId, Transaction};
use crate::error::{EngineResult, Rejection, StatusAction, StoreError};

const MAX_NUMBER_ATTEMPTS: usize = 16;

/// Account lifecycle operations: open, close, freeze, unfreeze, and the
/// read side used for balance and history queries.
///
/// Validation runs here against a snapshot; the store re-checks whatever
/// can go stale (balances, statuses) inside its atomic operations.
pub struct AccountRegistry {
    store: LedgerRef,
}

/// Proof of a completed closure, including where any remaining funds went.
#[derive(Debug)]
pub struct ClosureReceipt {
    pub account: BankAccount,
    pub swept: Option<SweptFunds>,
}

#[derive(Debug)]
pub struct SweptFunds {
    pub amount: Amount,
    pub destination: String,
}

impl AccountRegistry {
    pub fn new(store: LedgerRef) -> Self {
        Self { store }
    }

    /// Opens a new ACTIVE account with a zero balance and a fresh number.
    pub async fn open(&self, user_id: &str, title: &str) -> EngineResult<BankAccount> {
        if self
            .store
            .account_by_title(user_id, title)
            .await?
            .is_some()
        {
            return Err(Rejection::DuplicateTitle {
                title: title.to_string(),
            }
            .into());
        }
        let account_number = self.unique_account_number().await?;
        let account = self
            .store
            .create_account(NewAccount {
                user_id: user_id.to_string(),
                title: title.to_string(),
                account_number,
            })
            .await?;
        tracing::info!(user = user_id, account = %account.account_number, "opened account");
        Ok(account)
    }

    async fn unique_account_number(&self) -> EngineResult<String> {
        for _ in 0..MAX_NUMBER_ATTEMPTS {
            let candidate = random_account_number(&mut rand::thread_rng());
            if !self.store.account_number_taken(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(StoreError::Conflict("could not draw an unused account number".to_string()).into())
    }

    /// Closes an account. A non-zero balance must be swept into another of
    /// the caller's accounts named by `transfer_to_title`.
    pub async fn close(
        &self,
        call_id: Option<CallId>,
        user_id: &str,
        title: &str,
        transfer_to_title: Option<&str>,
    ) -> EngineResult<ClosureReceipt> {
        let account = self
            .store
            .account_by_title(user_id, title)
            .await?
            .ok_or_else(|| Rejection::AccountNotFound {
                title: title.to_string(),
            })?;
        if account.status == AccountStatus::Closed {
            return Err(Rejection::AlreadyClosed {
                title: account.title,
            }
            .into());
        }

        let mut sweep_to = None;
        let mut destination_title = None;
        if account.balance > Balance::ZERO {
            let Some(wanted) = transfer_to_title else {
                return Err(Rejection::BalanceTransferRequired {
                    balance: account.balance,
                }
                .into());
            };
            let destination = self
                .store
                .account_by_title(user_id, wanted)
                .await?
                .ok_or_else(|| Rejection::DestinationNotFound {
                    title: wanted.to_string(),
                })?;
            if destination.id == account.id {
                return Err(Rejection::SelfTransferRejected.into());
            }
            if !destination.is_active() {
                return Err(Rejection::DestinationInactive {
                    title: destination.title,
                }
                .into());
            }
            sweep_to = Some(destination.id);
            destination_title = Some(destination.title);
        }

        match self
            .store
            .close_account(account.id, sweep_to, call_id)
            .await?
        {
            CloseOutcome::Closed { account, sweep } => {
                tracing::info!(
                    user = user_id,
                    account = %account.account_number,
                    swept = sweep.is_some(),
                    "closed account"
                );
                let swept = match (sweep, destination_title) {
                    (Some(transaction), Some(destination)) => Some(SweptFunds {
                        amount: transaction.amount,
                        destination,
                    }),
                    _ => None,
                };
                Ok(ClosureReceipt { account, swept })
            }
            CloseOutcome::AlreadyClosed => Err(Rejection::AlreadyClosed {
                title: title.to_string(),
            }
            .into()),
            CloseOutcome::SweepRequired { balance } => {
                Err(Rejection::BalanceTransferRequired { balance }.into())
            }
            CloseOutcome::DestinationUnavailable => match destination_title {
                Some(destination) => Err(Rejection::DestinationInactive {
                    title: destination,
                }
                .into()),
                None => Err(Rejection::BalanceTransferRequired {
                    balance: account.balance,
                }
                .into()),
            },
        }
    }

    pub async fn freeze(&self, user_id: &str, title: &str) -> EngineResult<BankAccount> {
        let account = self
            .store
            .account_by_title(user_id, title)
            .await?
            .ok_or_else(|| Rejection::AccountNotFound {
                title: title.to_string(),
            })?;
        match account.status {
            AccountStatus::Closed => Err(Rejection::ClosedIsTerminal {
                action: StatusAction::Freeze,
            }
            .into()),
            AccountStatus::Suspended => Err(Rejection::AlreadyFrozen {
                title: account.title,
            }
            .into()),
            AccountStatus::Active => {
                let account = self
                    .store
                    .update_account_status(account.id, AccountStatus::Suspended)
                    .await?;
                tracing::info!(user = user_id, account = %account.account_number, "froze account");
                Ok(account)
            }
        }
    }

    pub async fn unfreeze(&self, user_id: &str, title: &str) -> EngineResult<BankAccount> {
        let account = self
            .store
            .account_by_title(user_id, title)
            .await?
            .ok_or_else(|| Rejection::AccountNotFound {
                title: title.to_string(),
            })?;
        match account.status {
            AccountStatus::Closed => Err(Rejection::ClosedIsTerminal {
                action: StatusAction::Unfreeze,
            }
            .into()),
            AccountStatus::Active => Err(Rejection::NotFrozen {
                title: account.title,
            }
            .into()),
            AccountStatus::Suspended => {
                let account = self
                    .store
                    .update_account_status(account.id, AccountStatus::Active)
                    .await?;
                tracing::info!(user = user_id, account = %account.account_number, "unfroze account");
                Ok(account)
            }
        }
    }

    pub async fn find_by_title(
        &self,
        user_id: &str,
        title: &str,
    ) -> EngineResult<Option<BankAccount>> {
        Ok(self.store.account_by_title(user_id, title).await?)
    }

    pub async fn list(
        &self,
        user_id: &str,
        status: Option<AccountStatus>,
    ) -> EngineResult<Vec<BankAccount>> {
        Ok(self.store.accounts_by_user(user_id, status).await?)
    }

    /// The account plus its most recent transactions, newest first.
    pub async fn history(
        &self,
        user_id: &str,
        title: &str,
        limit: usize,
    ) -> EngineResult<(BankAccount, Vec<Transaction>)> {
        let account = self
            .store
            .account_by_title(user_id, title)
            .await?
            .ok_or_else(|| Rejection::AccountNotFound {
                title: title.to_string(),
            })?;
        let transactions = self
            .store
            .transactions_for_account(account.id, limit)
            .await?;
        Ok((account, transactions))
    }
}
