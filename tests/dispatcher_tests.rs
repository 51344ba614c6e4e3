use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use telebank::domain::account::Amount;
use telebank::domain::bill::BillType;
use telebank::domain::ports::{FundsPlan, LedgerRef, NewAccount, NewBill};
use telebank::domain::transaction::Reference;
use telebank::infrastructure::in_memory::{InMemoryDirectory, InMemoryLedger};
use telebank::interfaces::dispatcher::{CallContext, ToolCall, ToolDispatcher};

async fn seeded() -> (ToolDispatcher, LedgerRef) {
    let store: LedgerRef = Arc::new(InMemoryLedger::new());
    let directory = Arc::new(InMemoryDirectory::new());

    let savings = store
        .create_account(NewAccount {
            user_id: "user-1".to_string(),
            title: "Savings".to_string(),
            account_number: "111111111111".to_string(),
        })
        .await
        .unwrap();
    store
        .create_account(NewAccount {
            user_id: "user-1".to_string(),
            title: "Checking".to_string(),
            account_number: "222222222222".to_string(),
        })
        .await
        .unwrap();
    store
        .deposit_funds(
            savings.id,
            FundsPlan {
                amount: Amount::parse("300.00").unwrap(),
                reference: Reference::deposit(&savings.account_number),
                description: None,
                call_id: None,
            },
        )
        .await
        .unwrap();

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

#[tokio::test]
async fn test_close_requires_and_performs_a_sweep() {
    let (dispatcher, _store) = seeded().await;

    let reply = speak(
        &dispatcher,
        "user-1",
        "close_account",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(
        reply,
        "Account has a balance of 300.00. Please specify an account to transfer the remaining funds to."
    );

    let reply = speak(
        &dispatcher,
        "user-1",
        "close_account",
        json!({"account_title": "Savings", "transfer_to_account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Cannot transfer funds to the same account being closed");

    let reply = speak(
        &dispatcher,
        "user-1",
        "close_account",
        json!({"account_title": "Savings", "transfer_to_account_title": "Checking"}),
    )
    .await;
    assert_eq!(
        reply,
        "Successfully closed account 'Savings' and transferred 300.00 to 'Checking'"
    );

    let reply = speak(
        &dispatcher,
        "user-1",
        "check_balance",
        json!({"account_title": "Checking"}),
    )
    .await;
    assert_eq!(reply, "Account 'Checking' has a balance of 300.00");

    // Closing is terminal
    let reply = speak(
        &dispatcher,
        "user-1",
        "close_account",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Account 'Savings' is already closed");
    let reply = speak(
        &dispatcher,
        "user-1",
        "freeze_account",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Cannot freeze a closed account");
}

#[tokio::test]
async fn test_close_empty_account_needs_no_destination() {
    let (dispatcher, _store) = seeded().await;
    let reply = speak(
        &dispatcher,
        "user-1",
        "close_account",
        json!({"account_title": "Checking"}),
    )
    .await;
    assert_eq!(reply, "Successfully closed account 'Checking'");
}

#[tokio::test]
async fn test_freeze_wording_and_transitions() {
    let (dispatcher, _store) = seeded().await;

    let reply = speak(
        &dispatcher,
        "user-1",
        "freeze_account",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Successfully froze account 'Savings'");

    let reply = speak(
        &dispatcher,
        "user-1",
        "freeze_account",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Account 'Savings' is already frozen");

    let reply = speak(
        &dispatcher,
        "user-1",
        "list_accounts",
        json!({}),
    )
    .await;
    assert!(reply.contains("- 'Savings' (111111111111): balance 300.00, frozen"));

    let reply = speak(
        &dispatcher,
        "user-1",
        "unfreeze_account",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Successfully unfroze account 'Savings'");

    let reply = speak(
        &dispatcher,
        "user-1",
        "unfreeze_account",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Account 'Savings' is not frozen");
}

#[tokio::test]
async fn test_bill_listing_and_payment() {
    let (dispatcher, store) = seeded().await;
    let now = Utc::now();
    store
        .create_bill(NewBill {
            user_id: "user-1".to_string(),
            kind: BillType::Electricity,
            amount: Amount::parse("120.50").unwrap(),
            description: Some("Monthly power".to_string()),
            due_date: now + Duration::days(10),
        })
        .await
        .unwrap();
    store
        .create_bill(NewBill {
            user_id: "user-1".to_string(),
            kind: BillType::Water,
            amount: Amount::parse("600.00").unwrap(),
            description: None,
            due_date: now - Duration::days(3),
        })
        .await
        .unwrap();

    let reply = speak(&dispatcher, "user-1", "list_bills", json!({})).await;
    assert!(reply.starts_with("You have 2 outstanding bill(s):"));
    // Soonest due first: the overdue water bill leads
    let water_at = reply.find("- Water: 600.00").unwrap();
    let power_at = reply.find("- Electricity - Monthly power: 120.50").unwrap();
    assert!(water_at < power_at);
    assert!(reply.contains(", overdue)"));
    assert!(reply.contains(", pending)"));

    let reply = speak(
        &dispatcher,
        "user-1",
        "pay_bill",
        json!({"bill_type": "water", "from_account_title": "Savings"}),
    )
    .await;
    assert_eq!(
        reply,
        "Insufficient balance. Bill amount: 600.00, Available: 300.00"
    );

    let reply = speak(
        &dispatcher,
        "user-1",
        "pay_bill",
        json!({"bill_type": "electricity", "from_account_title": "Savings"}),
    )
    .await;
    assert_eq!(
        reply,
        "Successfully paid electricity bill of 120.50 from Savings"
    );

    // Paid bills drop off the outstanding list
    let reply = speak(&dispatcher, "user-1", "list_bills", json!({})).await;
    assert!(reply.starts_with("You have 1 outstanding bill(s):"));
    assert!(!reply.contains("Electricity"));

    let reply = speak(
        &dispatcher,
        "user-1",
        "pay_bill",
        json!({"bill_type": "electricity", "from_account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "No outstanding electricity bill found");

    let reply = speak(
        &dispatcher,
        "user-1",
        "pay_bill",
        json!({"bill_type": "karaoke", "from_account_title": "Savings"}),
    )
    .await;
    assert_eq!(
        reply,
        "Invalid bill type 'karaoke'. Valid types are: electricity, water, gas, internet, tv, phone, parking, other"
    );
}

#[tokio::test]
async fn test_history_reads_newest_first() {
    let (dispatcher, _store) = seeded().await;

    for amount in [10, 20, 30] {
        speak(
            &dispatcher,
            "user-1",
            "transfer_money_own_accounts",
            json!({
                "from_account_title": "Savings",
                "to_account_title": "Checking",
                "amount": amount
            }),
        )
        .await;
    }

    let reply = speak(
        &dispatcher,
        "user-1",
        "get_history",
        json!({"account_title": "Savings", "limit": 2}),
    )
    .await;
    assert!(reply.starts_with("Last 2 transaction(s) for 'Savings':"));
    let lines: Vec<&str> = reply.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("- TRANSFER of 30 on"));
    assert!(lines[1].ends_with("(COMPLETED)"));
    assert!(lines[2].starts_with("- TRANSFER of 20 on"));

    let reply = speak(
        &dispatcher,
        "user-1",
        "get_history",
        json!({"account_title": "Checking"}),
    )
    .await;
    // Default limit is five; only three transfers landed here
    assert!(reply.starts_with("Last 3 transaction(s) for 'Checking':"));

    let reply = speak(
        &dispatcher,
        "user-2",
        "get_history",
        json!({"account_title": "Savings"}),
    )
    .await;
    assert_eq!(reply, "Account 'Savings' not found");
}

#[tokio::test]
async fn test_empty_history_wording() {
    let (dispatcher, _store) = seeded().await;
    let reply = speak(
        &dispatcher,
        "user-1",
        "get_history",
        json!({"account_title": "Checking"}),
    )
    .await;
    assert_eq!(reply, "No transactions found for account 'Checking'.");
}

#[tokio::test]
async fn test_otp_request_reads_the_full_script() {
    let (dispatcher, _store) = seeded().await;
    let reply = speak(
        &dispatcher,
        "user-1",
        "request_transfer_own_accounts",
        json!({"from_account_title": "Savings", "to_account_title": "Checking", "amount": 50}),
    )
    .await;
    assert!(reply.starts_with("Transaction ready: Transfer 50 from Savings to Checking. An OTP has been generated. Your OTP is "));
    assert!(reply.ends_with(". Please provide this OTP to confirm the transaction."));

    // Requesting over the balance is refused up front
    let reply = speak(
        &dispatcher,
        "user-1",
        "request_transfer_own_accounts",
        json!({"from_account_title": "Savings", "to_account_title": "Checking", "amount": 1000}),
    )
    .await;
    assert_eq!(reply, "Insufficient balance. Available: 300.00");
}
