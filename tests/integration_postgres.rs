//! Postgres store tests
//!
//! Need a reachable `DATABASE_URL`; run with `cargo test -- --ignored`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use loyalty_ledger::accrual::{AccrualError, AccrualResult, AccrualSource};
use loyalty_ledger::jobs::Reconciler;
use loyalty_ledger::ledger::{Ledger, LedgerError};
use loyalty_ledger::store::{Store, StoreTx};
use loyalty_ledger::{DomainError, Order, OrderNumber, OrderState};

mod common;

struct FixedAccrual(i64);

#[async_trait]
impl AccrualSource for FixedAccrual {
    async fn fetch_status(&self, _number: &OrderNumber) -> Result<AccrualResult, AccrualError> {
        Ok(AccrualResult::Resolved {
            state: OrderState::Processed,
            accrual: self.0,
        })
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_order_insert_and_load() {
    let store = common::setup_test_db().await;
    let login = common::unique_login("pg-order");
    assert!(store.create_account(&login).await.unwrap());
    assert!(!store.create_account(&login).await.unwrap());

    let number = common::unique_number();
    let mut tx = store.begin().await.unwrap();
    assert!(tx.lock_order(&number).await.unwrap().is_none());
    assert!(tx
        .insert_order(&Order::purchase(number.clone(), &login, Utc::now()))
        .await
        .unwrap());
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(!tx
        .insert_order(&Order::purchase(number.clone(), &login, Utc::now()))
        .await
        .unwrap());
    tx.rollback().await.unwrap();

    let order = store.load_order(&number).await.unwrap().unwrap();
    assert_eq!(order.owner, login);
    assert_eq!(order.state, OrderState::New);
    assert_eq!(store.list_orders(&login).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_guarded_debit_never_overdraws() {
    let store = common::setup_test_db().await;
    let login = common::unique_login("pg-debit");
    store.create_account(&login).await.unwrap();

    let ledger = Ledger::new(store.clone());
    ledger.credit(&login, 1_000).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        let login = login.clone();
        handles.push(tokio::spawn(async move { ledger.debit(&login, 70).await }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(LedgerError::Domain(DomainError::InsufficientFunds { .. })) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(succeeded, 14);
    let account = ledger.balance(&login).await.unwrap();
    assert_eq!(account.debited_total, 980);
    assert_eq!(account.available().minor(), 20);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_settlement_credits_once() {
    let store = common::setup_test_db().await;
    let login = common::unique_login("pg-settle");
    store.create_account(&login).await.unwrap();

    let number = common::unique_number();
    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&Order::purchase(number.clone(), &login, Utc::now()))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        Arc::new(FixedAccrual(500)),
        4,
        100,
    ));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let reconciler = reconciler.clone();
        let number = number.clone();
        handles.push(tokio::spawn(
            async move { reconciler.reconcile_order(&number).await },
        ));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let order = store.load_order(&number).await.unwrap().unwrap();
    assert_eq!(order.state, OrderState::Processed);
    assert_eq!(order.accrual, 500);
    let account = store.load_account(&login).await.unwrap().unwrap();
    assert_eq!(account.credited_total, 500);
}
