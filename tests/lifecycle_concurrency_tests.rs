mod common;

use chrono::Duration;
use common::{Harness, t0};
use pixvip::domain::purchase::{CancelReason, PurchaseStatus};
use pixvip::error::CheckoutError;
use std::sync::Arc;

#[tokio::test]
async fn test_concurrent_expiry_cancels_once() {
    let harness = Arc::new(Harness::new());
    let purchase = harness.buy("alice", "cosmo").await;
    let late = t0() + Duration::hours(25);

    let mut handles = Vec::new();
    for _ in 0..100 {
        let lifecycle = harness.lifecycle.clone();
        let id = purchase.id;
        handles.push(tokio::spawn(async move {
            lifecycle.check_expiry(id, late).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(Some(cancelled)) => {
                assert_eq!(cancelled.status, PurchaseStatus::Cancelled);
                winners += 1;
            }
            Ok(None) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(winners, 1);
    let stored = harness.lifecycle.get(purchase.id).await.unwrap();
    assert_eq!(stored.status, PurchaseStatus::Cancelled);
    assert!(stored.completed_at.is_none());
}

#[tokio::test]
async fn test_double_confirm_writes_once() {
    let harness = Harness::new();
    let purchase = harness.buy("alice", "cosmo").await;
    let paid_at = t0() + Duration::minutes(5);

    let first = harness
        .lifecycle
        .confirm_payment(purchase.id, paid_at)
        .await
        .unwrap();
    assert_eq!(first.status, PurchaseStatus::Completed);
    assert_eq!(first.completed_at, Some(paid_at));

    let second = harness
        .lifecycle
        .confirm_payment(purchase.id, paid_at + Duration::minutes(1))
        .await;
    assert!(matches!(
        second,
        Err(CheckoutError::AlreadyFinalized {
            status: PurchaseStatus::Completed,
            ..
        })
    ));
    assert_eq!(harness.purchases.swaps(), 1);

    let stored = harness.lifecycle.get(purchase.id).await.unwrap();
    assert_eq!(stored.completed_at, Some(paid_at));
}

#[tokio::test]
async fn test_confirm_and_cancel_race_has_one_winner() {
    let harness = Arc::new(Harness::new());

    for round in 0..20 {
        let id = harness.buy(&format!("user{round}"), "astral").await.id;
        let confirm = {
            let lifecycle = harness.lifecycle.clone();
            tokio::spawn(async move { lifecycle.confirm_payment(id, t0()).await })
        };
        let cancel = {
            let lifecycle = harness.lifecycle.clone();
            tokio::spawn(async move { lifecycle.cancel(id, CancelReason::Requested).await })
        };

        let confirmed = confirm.await.unwrap();
        let cancelled = cancel.await.unwrap();
        assert!(confirmed.is_ok() != cancelled.is_ok(), "round {round}");

        let stored = harness.lifecycle.get(id).await.unwrap();
        let expected = if confirmed.is_ok() {
            PurchaseStatus::Completed
        } else {
            PurchaseStatus::Cancelled
        };
        assert_eq!(stored.status, expected);
    }
}

#[tokio::test]
async fn test_unexpired_purchase_is_left_alone() {
    let harness = Harness::new();
    let purchase = harness.buy("alice", "cosmo").await;

    let result = harness
        .lifecycle
        .check_expiry(purchase.id, t0() + Duration::hours(23))
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(harness.purchases.swaps(), 0);
}
