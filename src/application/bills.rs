use crate::domain::account::BankAccount;
use crate::domain::bill::{Bill, BillType};
use crate::domain::ports::{BillSettlement, FundsPlan, LedgerRef};
use crate::domain::transaction::{CallId, Reference, Transaction};
use crate::error::{EngineResult, Rejection};

/// Settles registered obligations from a caller's account.
pub struct BillPaymentEngine {
    store: LedgerRef,
}

/// Proof of a paid bill.
#[derive(Debug)]
pub struct BillReceipt {
    pub bill: Bill,
    pub transaction: Transaction,
    pub account: BankAccount,
}

impl BillPaymentEngine {
    pub fn new(store: LedgerRef) -> Self {
        Self { store }
    }

    /// All unpaid bills for the user, soonest due first.
    pub async fn list_outstanding(&self, user_id: &str) -> EngineResult<Vec<Bill>> {
        Ok(self.store.outstanding_bills(user_id).await?)
    }

    /// Pays the user's earliest-due outstanding bill of the given type.
    ///
    /// `raw_type` is caller speech and parsed here, so a misheard category
    /// comes back as a rejection listing the valid ones.
    pub async fn pay(
        &self,
        call_id: Option<CallId>,
        user_id: &str,
        raw_type: &str,
        from_title: &str,
    ) -> EngineResult<BillReceipt> {
        let bill_type = BillType::parse(raw_type)?;
        let account = self
            .store
            .account_by_title(user_id, from_title)
            .await?
            .ok_or_else(|| Rejection::AccountNotFound {
                title: from_title.to_string(),
            })?;
        if !account.is_active() {
            return Err(Rejection::AccountInactive {
                title: account.title,
            }
            .into());
        }
        let bill = self
            .store
            .outstanding_bill_of_type(user_id, bill_type)
            .await?
            .ok_or(Rejection::NoOutstandingBill { bill_type })?;
        if !account.balance.covers(bill.amount) {
            return Err(Rejection::InsufficientFundsForBill {
                bill_amount: bill.amount,
                available: account.balance,
            }
            .into());
        }

        let bill_amount = bill.amount;
        let plan = FundsPlan {
            amount: bill_amount,
            reference: Reference::bill(bill_type, bill.id),
            description: Some(format!("Payment for {bill_type} bill")),
            call_id,
        };
        match self.store.settle_bill(bill.id, account.id, plan).await? {
            BillSettlement::Paid { bill, transaction } => {
                tracing::info!(
                    reference = %transaction.reference,
                    amount = %transaction.amount,
                    "bill paid"
                );
                Ok(BillReceipt {
                    bill,
                    transaction,
                    account,
                })
            }
            BillSettlement::ShortFunds { available } => Err(Rejection::InsufficientFundsForBill {
                bill_amount,
                available,
            }
            .into()),
            BillSettlement::AlreadySettled => {
                Err(Rejection::NoOutstandingBill { bill_type }.into())
            }
        }
    }
}
