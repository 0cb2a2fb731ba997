mod common;

use chrono::Utc;
use common::due_subscription;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use subrenew::domain::ports::{SubscriptionStore, TransactionStore};
use subrenew::domain::transaction::TransactionStatus;
use subrenew::infrastructure::in_memory::{InMemorySubscriptionStore, InMemoryTransactionStore};
use uuid::Uuid;

#[tokio::test]
async fn test_concurrent_claimants_never_share_a_row() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let today = Utc::now().date_naive();

    for _ in 0..40 {
        let subscription = due_subscription(today);
        store
            .create_due(&subscription, today, Utc::now())
            .await
            .unwrap()
            .unwrap();
    }

    // Eight workers polling the same table with uneven batch sizes, summing
    // to at least the full due set.
    let mut rng = rand::thread_rng();
    let limits: Vec<usize> = (0..8).map(|_| rng.gen_range(5..15)).collect();

    let mut handles = Vec::new();
    for limit in limits {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim_batch(limit).await.unwrap()
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for transaction in handle.await.unwrap() {
            total += 1;
            assert!(
                seen.insert(transaction.id),
                "transaction {} claimed twice",
                transaction.id
            );
            assert_eq!(transaction.status, TransactionStatus::Processing);
        }
    }

    assert_eq!(total, 40, "every CREATED row claimed exactly once");
    assert!(store.claim_batch(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_claim_returns_at_most_the_available_rows() {
    let store = InMemoryTransactionStore::new();
    let today = Utc::now().date_naive();
    for _ in 0..3 {
        let subscription = due_subscription(today);
        store
            .create_due(&subscription, today, Utc::now())
            .await
            .unwrap()
            .unwrap();
    }

    let claimed = store.claim_batch(100).await.unwrap();
    assert_eq!(claimed.len(), 3);
}

#[tokio::test]
async fn test_concurrent_generation_creates_exactly_one_row() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let today = Utc::now().date_naive();
    let subscription = due_subscription(today);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        let subscription = subscription.clone();
        handles.push(tokio::spawn(async move {
            store
                .create_due(&subscription, today, Utc::now())
                .await
                .unwrap()
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(store.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_due_scan_skips_cancelled_and_manual_subscriptions() {
    let store = InMemorySubscriptionStore::new();
    let today = Utc::now().date_naive();

    let due = due_subscription(today);
    let mut cancelled = due_subscription(today);
    cancelled.cancel("user request");
    let mut manual = due_subscription(today);
    manual.auto_renew = false;
    let mut not_yet = due_subscription(today);
    not_yet.expiration_date = today + chrono::Days::new(1);

    for subscription in [due.clone(), cancelled, manual, not_yet] {
        store.store(subscription).await.unwrap();
    }

    let found: Vec<Uuid> = store
        .find_due(today)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(found, vec![due.id]);
}
