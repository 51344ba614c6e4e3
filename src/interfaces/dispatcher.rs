use crate::application::accounts::AccountRegistry;
use crate::application::bills::BillPaymentEngine;
use crate::application::transfers::TransferEngine;
use crate::domain::account::{Amount, BankAccount};
use crate::domain::bill::Bill;
use crate::domain::ports::{DirectoryRef, LedgerRef};
use crate::domain::transaction::{CallId, Transaction};
use crate::error::{EngineError, EngineResult, Rejection, StoreError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_HISTORY_LIMIT: usize = 5;

/// The closed set of tools the voice agent may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    TransferMoneyOwnAccounts,
    TransferMoneyToUser,
    RequestTransferOwnAccounts,
    RequestTransferToUser,
    ConfirmTransferOtp,
    PayBill,
    ListBills,
    ListAccounts,
    OpenAccount,
    CloseAccount,
    FreezeAccount,
    UnfreezeAccount,
    CheckBalance,
    GetHistory,
}

impl ToolName {
    pub const ALL: [Self; 14] = [
        Self::TransferMoneyOwnAccounts,
        Self::TransferMoneyToUser,
        Self::RequestTransferOwnAccounts,
        Self::RequestTransferToUser,
        Self::ConfirmTransferOtp,
        Self::PayBill,
        Self::ListBills,
        Self::ListAccounts,
        Self::OpenAccount,
        Self::CloseAccount,
        Self::FreezeAccount,
        Self::UnfreezeAccount,
        Self::CheckBalance,
        Self::GetHistory,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransferMoneyOwnAccounts => "transfer_money_own_accounts",
            Self::TransferMoneyToUser => "transfer_money_to_user",
            Self::RequestTransferOwnAccounts => "request_transfer_own_accounts",
            Self::RequestTransferToUser => "request_transfer_to_user",
            Self::ConfirmTransferOtp => "confirm_transfer_otp",
            Self::PayBill => "pay_bill",
            Self::ListBills => "list_bills",
            Self::ListAccounts => "list_accounts",
            Self::OpenAccount => "open_account",
            Self::CloseAccount => "close_account",
            Self::FreezeAccount => "freeze_account",
            Self::UnfreezeAccount => "unfreeze_account",
            Self::CheckBalance => "check_balance",
            Self::GetHistory => "get_history",
        }
    }
}

/// A tool invocation as it arrives off the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Who is calling, resolved by the telephony layer before dispatch.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub user_id: String,
    pub call_id: Option<CallId>,
}

/// Routes tool calls to the engines and renders every outcome as speech.
///
/// Business rejections come back as `Ok` with the sentence to read out;
/// only infrastructure faults surface as errors.
pub struct ToolDispatcher {
    accounts: AccountRegistry,
    transfers: TransferEngine,
    bills: BillPaymentEngine,
}

impl ToolDispatcher {
    pub fn new(store: LedgerRef, directory: DirectoryRef) -> Self {
        Self {
            accounts: AccountRegistry::new(store.clone()),
            transfers: TransferEngine::new(store.clone(), directory),
            bills: BillPaymentEngine::new(store),
        }
    }

    /// Housekeeping between calls: expires overdue OTPs and fails the
    /// transfers they guarded.
    pub async fn expire_stale_otps(&self) -> EngineResult<usize> {
        self.transfers.expire_stale_otps(Utc::now()).await
    }

    pub async fn dispatch(&self, ctx: &CallContext, call: &ToolCall) -> Result<String, StoreError> {
        match self.run(ctx, call).await {
            Ok(reply) => Ok(reply),
            Err(EngineError::Rejected(rejection)) => {
                tracing::debug!(tool = %call.tool, %rejection, "tool call rejected");
                Ok(rejection.to_string())
            }
            Err(EngineError::Store(err)) => {
                tracing::error!(tool = %call.tool, error = %err, "tool call failed");
                Err(err)
            }
        }
    }

    async fn run(&self, ctx: &CallContext, call: &ToolCall) -> EngineResult<String> {
        let Some(name) = ToolName::parse(&call.tool) else {
            return Err(Rejection::UnknownTool {
                name: call.tool.clone(),
            }
            .into());
        };
        let p = &call.parameters;

        match name {
            ToolName::TransferMoneyOwnAccounts => {
                let from = str_param(p, "from_account_title")?;
                let to = str_param(p, "to_account_title")?;
                let amount = amount_param(p, "amount")?;
                let receipt = self
                    .transfers
                    .transfer_own_accounts(ctx.call_id, &ctx.user_id, from, to, amount)
                    .await?;
                Ok(format!(
                    "Successfully transferred {} from {} to {}",
                    receipt.transaction.amount, receipt.from.title, receipt.to.title
                ))
            }
            ToolName::TransferMoneyToUser => {
                let from = str_param(p, "from_account_title")?;
                let recipient = str_param(p, "recipient_identifier")?;
                let amount = amount_param(p, "amount")?;
                let receipt = self
                    .transfers
                    .transfer_to_recipient(ctx.call_id, &ctx.user_id, from, recipient, amount)
                    .await?;
                Ok(format!(
                    "Successfully transferred {} to {}",
                    receipt.transaction.amount, recipient
                ))
            }
            ToolName::RequestTransferOwnAccounts => {
                let from = str_param(p, "from_account_title")?;
                let to = str_param(p, "to_account_title")?;
                let amount = amount_param(p, "amount")?;
                let ticket = self
                    .transfers
                    .request_own_accounts(ctx.call_id, &ctx.user_id, from, to, amount)
                    .await?;
                Ok(format!(
                    "Transaction ready: Transfer {} from {} to {}. An OTP has been generated. \
                     Your OTP is {}. Please provide this OTP to confirm the transaction.",
                    ticket.transaction.amount, ticket.from.title, ticket.to.title, ticket.otp.token
                ))
            }
            ToolName::RequestTransferToUser => {
                let from = str_param(p, "from_account_title")?;
                let recipient = str_param(p, "recipient_identifier")?;
                let amount = amount_param(p, "amount")?;
                let ticket = self
                    .transfers
                    .request_to_recipient(ctx.call_id, &ctx.user_id, from, recipient, amount)
                    .await?;
                Ok(format!(
                    "Transaction ready: Transfer {} to {}. An OTP has been generated. \
                     Your OTP is {}. Please provide this OTP to confirm the transaction.",
                    ticket.transaction.amount, recipient, ticket.otp.token
                ))
            }
            ToolName::ConfirmTransferOtp => {
                let token = str_param(p, "otp_token")?;
                let receipt = self.transfers.confirm(&ctx.user_id, token).await?;
                Ok(format!(
                    "Transaction confirmed! Successfully transferred {} from {} to {}.",
                    receipt.transaction.amount, receipt.from.title, receipt.to.title
                ))
            }
            ToolName::PayBill => {
                let bill_type = str_param(p, "bill_type")?;
                let from = str_param(p, "from_account_title")?;
                let receipt = self
                    .bills
                    .pay(ctx.call_id, &ctx.user_id, bill_type, from)
                    .await?;
                Ok(format!(
                    "Successfully paid {} bill of {} from {}",
                    receipt.bill.kind, receipt.bill.amount, receipt.account.title
                ))
            }
            ToolName::ListBills => {
                let bills = self.bills.list_outstanding(&ctx.user_id).await?;
                Ok(speak_bills(&bills, Utc::now()))
            }
            ToolName::ListAccounts => {
                let accounts = self.accounts.list(&ctx.user_id, None).await?;
                Ok(speak_accounts(&accounts))
            }
            ToolName::OpenAccount => {
                let title = str_param(p, "account_title")?;
                let account = self.accounts.open(&ctx.user_id, title).await?;
                Ok(format!(
                    "Successfully opened account '{}' with account number {}",
                    account.title, account.account_number
                ))
            }
            ToolName::CloseAccount => {
                let title = str_param(p, "account_title")?;
                let transfer_to = opt_str_param(p, "transfer_to_account_title")?;
                let receipt = self
                    .accounts
                    .close(ctx.call_id, &ctx.user_id, title, transfer_to)
                    .await?;
                let mut reply =
                    format!("Successfully closed account '{}'", receipt.account.title);
                if let Some(swept) = receipt.swept {
                    reply.push_str(&format!(
                        " and transferred {} to '{}'",
                        swept.amount, swept.destination
                    ));
                }
                Ok(reply)
            }
            ToolName::FreezeAccount => {
                let title = str_param(p, "account_title")?;
                let account = self.accounts.freeze(&ctx.user_id, title).await?;
                Ok(format!("Successfully froze account '{}'", account.title))
            }
            ToolName::UnfreezeAccount => {
                let title = str_param(p, "account_title")?;
                let account = self.accounts.unfreeze(&ctx.user_id, title).await?;
                Ok(format!("Successfully unfroze account '{}'", account.title))
            }
            ToolName::CheckBalance => {
                let title = str_param(p, "account_title")?;
                let account = self
                    .accounts
                    .find_by_title(&ctx.user_id, title)
                    .await?
                    .ok_or_else(|| Rejection::AccountNotFound {
                        title: title.to_string(),
                    })?;
                Ok(format!(
                    "Account '{}' has a balance of {}",
                    account.title, account.balance
                ))
            }
            ToolName::GetHistory => {
                let title = str_param(p, "account_title")?;
                let limit = limit_param(p, "limit", DEFAULT_HISTORY_LIMIT);
                let (account, transactions) =
                    self.accounts.history(&ctx.user_id, title, limit).await?;
                Ok(speak_history(&account, &transactions))
            }
        }
    }
}

fn str_param<'a>(parameters: &'a Value, name: &str) -> Result<&'a str, Rejection> {
    opt_str_param(parameters, name)?.ok_or_else(|| Rejection::MissingParameter {
        name: name.to_string(),
    })
}

/// Absent, null, blank and mistyped values all count as "not given".
fn opt_str_param<'a>(parameters: &'a Value, name: &str) -> Result<Option<&'a str>, Rejection> {
    match parameters.get(name) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(Some(value.as_str())),
        Some(Value::String(_)) | Some(Value::Null) | None => Ok(None),
        Some(_) => Err(Rejection::MissingParameter {
            name: name.to_string(),
        }),
    }
}

fn amount_param(parameters: &Value, name: &str) -> Result<Amount, Rejection> {
    match parameters.get(name) {
        Some(Value::Number(number)) => Amount::parse(&number.to_string()),
        Some(Value::String(raw)) => Amount::parse(raw),
        _ => Err(Rejection::MissingParameter {
            name: name.to_string(),
        }),
    }
}

fn limit_param(parameters: &Value, name: &str, default: usize) -> usize {
    parameters
        .get(name)
        .and_then(Value::as_u64)
        .map(|value| value as usize)
        .unwrap_or(default)
}

fn speak_bills(bills: &[Bill], now: DateTime<Utc>) -> String {
    if bills.is_empty() {
        return "You have no outstanding bills.".to_string();
    }
    let mut lines = vec![format!("You have {} outstanding bill(s):", bills.len())];
    for bill in bills {
        let due_state = if bill.due_date < now { "overdue" } else { "pending" };
        let description = bill
            .description
            .as_deref()
            .map(|text| format!(" - {text}"))
            .unwrap_or_default();
        lines.push(format!(
            "- {}{}: {} (due: {}, {})",
            bill.kind.label(),
            description,
            bill.amount,
            bill.due_date.format("%Y-%m-%d"),
            due_state
        ));
    }
    lines.join("\n")
}

fn speak_accounts(accounts: &[BankAccount]) -> String {
    if accounts.is_empty() {
        return "You have no accounts.".to_string();
    }
    let mut lines = vec![format!("You have {} account(s):", accounts.len())];
    for account in accounts {
        lines.push(format!(
            "- '{}' ({}): balance {}, {}",
            account.title,
            account.account_number,
            account.balance,
            account.status.spoken()
        ));
    }
    lines.join("\n")
}

fn speak_history(account: &BankAccount, transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return format!("No transactions found for account '{}'.", account.title);
    }
    let mut lines = vec![format!(
        "Last {} transaction(s) for '{}':",
        transactions.len(),
        account.title
    )];
    for transaction in transactions {
        lines.push(format!(
            "- {} of {} on {} ({})",
            transaction.kind,
            transaction.amount,
            transaction.created_at.format("%Y-%m-%d"),
            transaction.status
        ));
    }
    lines.join("\n")
}
