use std::sync::Arc;
use telebank::application::transfers::TransferEngine;
use telebank::domain::account::Amount;
use telebank::domain::ports::{FundsPlan, LedgerRef, NewAccount};
use telebank::domain::transaction::Reference;
use telebank::error::Rejection;
use telebank::infrastructure::in_memory::{InMemoryDirectory, InMemoryLedger};

async fn seeded_engine() -> (Arc<TransferEngine>, LedgerRef) {
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
                amount: Amount::parse("100").unwrap(),
                reference: Reference::deposit(&savings.account_number),
                description: None,
                call_id: None,
            },
        )
        .await
        .unwrap();

    let engine = Arc::new(TransferEngine::new(store.clone(), directory));
    (engine, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_otp_redemption_is_exactly_once() {
    let (engine, store) = seeded_engine().await;
    let ticket = engine
        .request_own_accounts(None, "user-1", "Savings", "Checking", Amount::parse("40").unwrap())
        .await
        .unwrap();
    let token = ticket.otp.token.clone();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = engine.clone();
        let token = token.clone();
        handles.push(tokio::spawn(
            async move { engine.confirm("user-1", &token).await },
        ));
    }

    let mut settled = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            settled += 1;
        }
    }
    assert_eq!(settled, 1);

    let accounts = store.all_accounts().await.unwrap();
    let savings = accounts.iter().find(|a| a.title == "Savings").unwrap();
    let checking = accounts.iter().find(|a| a.title == "Checking").unwrap();
    assert_eq!(savings.balance.value().to_string(), "60");
    assert_eq!(checking.balance.value().to_string(), "40");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_never_overdraw() {
    let (engine, store) = seeded_engine().await;

    // 20 transfers of 7 against a balance of 100: at most 14 can land
    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .transfer_own_accounts(
                    None,
                    "user-1",
                    "Savings",
                    "Checking",
                    Amount::parse("7").unwrap(),
                )
                .await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += 1,
            Err(err) => {
                assert!(matches!(
                    err.rejection(),
                    Some(Rejection::InsufficientFunds { .. })
                ));
            }
        }
    }
    assert_eq!(applied, 14);

    let accounts = store.all_accounts().await.unwrap();
    let savings = accounts.iter().find(|a| a.title == "Savings").unwrap();
    let checking = accounts.iter().find(|a| a.title == "Checking").unwrap();
    assert_eq!(savings.balance.value().to_string(), "2");
    assert_eq!(checking.balance.value().to_string(), "98");
    assert!(savings.balance.value() >= rust_decimal::Decimal::ZERO);
}
