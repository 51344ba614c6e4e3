use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use telebank::domain::account::{AccountId, Amount};
use telebank::domain::otp::OtpStatus;
use telebank::domain::ports::{FundsPlan, LedgerRef, NewAccount, NewOtp, NewTransaction};
use telebank::domain::transaction::{
    Reference, TransactionStatus, TransactionType,
};
use telebank::infrastructure::in_memory::{InMemoryDirectory, InMemoryLedger};
use telebank::interfaces::dispatcher::{CallContext, ToolCall, ToolDispatcher};

async fn seed_account(
    store: &LedgerRef,
    user_id: &str,
    title: &str,
    number: &str,
    balance: &str,
) -> AccountId {
    let account = store
        .create_account(NewAccount {
            user_id: user_id.to_string(),
            title: title.to_string(),
            account_number: number.to_string(),
        })
        .await
        .unwrap();
    if balance != "0" {
        let amount = Amount::parse(balance).unwrap();
        store
            .deposit_funds(
                account.id,
                FundsPlan {
                    amount,
                    reference: Reference::deposit(&account.account_number),
                    description: None,
                    call_id: None,
                },
            )
            .await
            .unwrap();
    }
    account.id
}

async fn seeded() -> (ToolDispatcher, LedgerRef) {
    let store: LedgerRef = Arc::new(InMemoryLedger::new());
    let directory = Arc::new(InMemoryDirectory::new());
    directory
        .insert("+15550101".to_string(), "user-2".to_string())
        .await;
    seed_account(&store, "user-1", "Savings", "111111111111", "500").await;
    seed_account(&store, "user-1", "Checking", "222222222222", "0").await;
    seed_account(&store, "user-2", "Main", "333333333333", "10").await;
    let dispatcher = ToolDispatcher::new(store.clone(), directory);
    (dispatcher, store)
}

fn ctx(user_id: &str) -> CallContext {
    CallContext {
        user_id: user_id.to_string(),
        call_id: None,
    }
}

async fn speak(dispatcher: &ToolDispatcher, user_id: &str, tool: &str, parameters: Value) -> String {
    dispatcher
        .dispatch(
            &ctx(user_id),
            &ToolCall {
                tool: tool.to_string(),
                parameters,
            },
        )
        .await
        .unwrap()
}

fn extract_otp(reply: &str) -> String {
    let marker = "Your OTP is ";
    let start = reply.find(marker).expect("reply carries an OTP") + marker.len();
    reply[start..start + 6].to_string()
}

#[tokio::test]
async fn test_request_then_confirm_moves_funds_once() {
    let (dispatcher, _store) = seeded().await;
    let reply = speak(
        &dispatcher,
        "user-1",
        "request_transfer_own_accounts",
        json!({"from_account_title": "Savings", "to_account_title": "Checking", "amount": 120}),
    )
    .await;
    assert!(reply.starts_with("Transaction ready: Transfer 120 from Savings to Checking."));
    let token = extract_otp(&reply);

    // Nothing moved yet
    let reply = speak(
        &dispatcher,
        "user-1",
        "check_balance",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Account 'Savings' has a balance of 500");

    let reply = speak(
        &dispatcher,
        "user-1",
        "confirm_transfer_otp",
        json!({"otp_token": token}),
    )
    .await;
    assert_eq!(
        reply,
        "Transaction confirmed! Successfully transferred 120 from Savings to Checking."
    );

    let reply = speak(
        &dispatcher,
        "user-1",
        "check_balance",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Account 'Savings' has a balance of 380");

    // The token is burned
    let reply = speak(
        &dispatcher,
        "user-1",
        "confirm_transfer_otp",
        json!({"otp_token": token}),
    )
    .await;
    assert_eq!(reply, "Invalid or expired OTP. Please request a new transfer.");
}

#[tokio::test]
async fn test_wrong_token_settles_nothing() {
    let (dispatcher, _store) = seeded().await;
    let reply = speak(
        &dispatcher,
        "user-1",
        "request_transfer_own_accounts",
        json!({"from_account_title": "Savings", "to_account_title": "Checking", "amount": 50}),
    )
    .await;
    let token = extract_otp(&reply);
    let wrong = if token == "000000" { "000001" } else { "000000" };

    let reply = speak(
        &dispatcher,
        "user-1",
        "confirm_transfer_otp",
        json!({"otp_token": wrong}),
    )
    .await;
    assert_eq!(reply, "Invalid or expired OTP. Please request a new transfer.");

    // Another user cannot redeem the real token either
    let reply = speak(
        &dispatcher,
        "user-2",
        "confirm_transfer_otp",
        json!({"otp_token": token}),
    )
    .await;
    assert_eq!(reply, "Invalid or expired OTP. Please request a new transfer.");

    let reply = speak(
        &dispatcher,
        "user-1",
        "check_balance",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Account 'Savings' has a balance of 500");
}

#[tokio::test]
async fn test_settlement_rechecks_the_balance() {
    let (dispatcher, store) = seeded().await;
    let reply = speak(
        &dispatcher,
        "user-1",
        "request_transfer_own_accounts",
        json!({"from_account_title": "Savings", "to_account_title": "Checking", "amount": 100}),
    )
    .await;
    let token = extract_otp(&reply);

    // Drain the source while the request is pending
    let reply = speak(
        &dispatcher,
        "user-1",
        "transfer_money_own_accounts",
        json!({"from_account_title": "Savings", "to_account_title": "Checking", "amount": 450}),
    )
    .await;
    assert_eq!(reply, "Successfully transferred 450 from Savings to Checking");

    let reply = speak(
        &dispatcher,
        "user-1",
        "confirm_transfer_otp",
        json!({"otp_token": token}),
    )
    .await;
    assert_eq!(reply, "Insufficient balance. Available: 50");

    // The held transfer is FAILED, not still pending
    let reply = speak(
        &dispatcher,
        "user-1",
        "get_history",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert!(reply.contains("- TRANSFER of 100 on"));
    assert!(reply.contains("(FAILED)"));

    // Funds stayed where the drain left them
    let accounts = store.all_accounts().await.unwrap();
    let savings = accounts.iter().find(|a| a.title == "Savings").unwrap();
    assert_eq!(savings.balance.value().to_string(), "50");
}

#[tokio::test]
async fn test_recipient_transfer_lands_in_default_account() {
    let (dispatcher, _store) = seeded().await;
    let reply = speak(
        &dispatcher,
        "user-1",
        "request_transfer_to_user",
        json!({"from_account_title": "Savings", "recipient_identifier": "+15550101", "amount": 75}),
    )
    .await;
    assert!(reply.starts_with("Transaction ready: Transfer 75 to +15550101."));
    let token = extract_otp(&reply);

    let reply = speak(
        &dispatcher,
        "user-1",
        "confirm_transfer_otp",
        json!({"otp_token": token}),
    )
    .await;
    assert_eq!(
        reply,
        "Transaction confirmed! Successfully transferred 75 from Savings to Main."
    );

    let reply = speak(
        &dispatcher,
        "user-2",
        "check_balance",
        json!({"account_title": "Main"}),
    )
    .await;
    assert_eq!(reply, "Account 'Main' has a balance of 85");
}

#[tokio::test]
async fn test_unknown_recipient_is_spoken() {
    let (dispatcher, _store) = seeded().await;
    let reply = speak(
        &dispatcher,
        "user-1",
        "transfer_money_to_user",
        json!({"from_account_title": "Savings", "recipient_identifier": "+15559999", "amount": 5}),
    )
    .await;
    assert_eq!(reply, "Recipient '+15559999' not found");
}

#[tokio::test]
async fn test_expired_otp_fails_its_pending_transfer() {
    let (dispatcher, store) = seeded().await;
    let accounts = store.all_accounts().await.unwrap();
    let savings = accounts.iter().find(|a| a.title == "Savings").unwrap();
    let checking = accounts.iter().find(|a| a.title == "Checking").unwrap();

    let amount = Amount::parse("60").unwrap();
    let transaction = store
        .create_transaction(NewTransaction {
            reference: Reference::transfer(&savings.account_number, &checking.account_number, amount),
            from_account: Some(savings.id),
            to_account: Some(checking.id),
            amount,
            kind: TransactionType::Transfer,
            status: TransactionStatus::Pending,
            description: None,
            call_id: None,
        })
        .await
        .unwrap();
    let otp = store
        .create_otp(NewOtp {
            user_id: "user-1".to_string(),
            token: "123456".to_string(),
            transaction_id: Some(transaction.id),
            expires_at: Utc::now() - Duration::minutes(1),
        })
        .await
        .unwrap();

    let expired = store.expire_stale_otps(Utc::now()).await.unwrap();
    assert_eq!(expired, 1);

    let reply = speak(
        &dispatcher,
        "user-1",
        "confirm_transfer_otp",
        json!({"otp_token": "123456"}),
    )
    .await;
    assert_eq!(reply, "Invalid or expired OTP. Please request a new transfer.");

    let transaction = store
        .transaction_by_id(transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Failed);
    let otp = store.otp_by_id(otp.id).await.unwrap().unwrap();
    assert_eq!(otp.status, OtpStatus::Expired);
}
