mod common;

use chrono::Utc;
use common::{ChargeReply, ScriptedGateway, due_subscription};
use std::sync::Arc;
use subrenew::application::processor::{ProcessOutcome, TransactionProcessor};
use subrenew::domain::events::RenewalStartEvent;
use subrenew::domain::ports::TransactionStore;
use subrenew::domain::transaction::{PaymentTransaction, TransactionStatus};
use subrenew::error::RenewalError;
use subrenew::infrastructure::in_memory::InMemoryTransactionStore;

async fn seeded(store: &InMemoryTransactionStore) -> PaymentTransaction {
    let today = Utc::now().date_naive();
    let subscription = due_subscription(today);
    store
        .create_due(&subscription, today, Utc::now())
        .await
        .unwrap()
        .unwrap()
}

fn processor(
    store: Arc<InMemoryTransactionStore>,
    gateway: Arc<ScriptedGateway>,
) -> TransactionProcessor {
    TransactionProcessor::new(store, gateway)
}

#[tokio::test]
async fn test_first_decline_schedules_retry_with_incremented_count() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let transaction = seeded(&store).await;
    let processor = processor(store.clone(), Arc::new(ScriptedGateway::declining()));

    let outcome = processor
        .process_start(&RenewalStartEvent::for_transaction(&transaction))
        .await
        .unwrap();

    let retry = match outcome {
        ProcessOutcome::RetryRequested { event } => event,
        other => panic!("expected retry, got {other:?}"),
    };
    assert_eq!(retry.rejected_payment_count, 1);
    assert_eq!(retry.transaction_id, transaction.id);

    let stored = store.get(transaction.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::PendingRetry);
    assert_eq!(stored.rejected_payment_count, 1);
    assert!(stored.finished_at.is_none());
}

#[tokio::test]
async fn test_exhausted_retries_decline_terminally() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let mut transaction = seeded(&store).await;
    transaction.rejected_payment_count = 3;
    transaction
        .transition(TransactionStatus::Processing, Utc::now())
        .unwrap();
    transaction
        .transition(TransactionStatus::PendingRetry, Utc::now())
        .unwrap();
    store.store(transaction.clone()).await.unwrap();

    let processor = processor(store.clone(), Arc::new(ScriptedGateway::declining()));
    let outcome = processor
        .process_start(&RenewalStartEvent::for_transaction(&transaction))
        .await
        .unwrap();

    let (declined, reason) = match outcome {
        ProcessOutcome::Declined {
            transaction,
            reason,
        } => (transaction, reason),
        other => panic!("expected decline, got {other:?}"),
    };
    assert!(reason.contains("after 3 attempts"));

    let stored = store.get(declined.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Declined);
    assert_eq!(stored.rejected_payment_count, 3);
    assert!(stored.finished_at.is_some());
    assert!(stored.cancellation_reason.is_some());
}

#[tokio::test]
async fn test_gateway_success_approves() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let transaction = seeded(&store).await;
    let processor = processor(store.clone(), Arc::new(ScriptedGateway::approving()));

    let outcome = processor
        .process_start(&RenewalStartEvent::for_transaction(&transaction))
        .await
        .unwrap();
    assert!(matches!(outcome, ProcessOutcome::Approved { .. }));

    let stored = store.get(transaction.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Approved);
    assert!(stored.finished_at.is_some());
    assert_eq!(stored.rejected_payment_count, 0);
}

#[tokio::test]
async fn test_gateway_timeout_leaves_row_processing() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let transaction = seeded(&store).await;
    let gateway = Arc::new(ScriptedGateway::replies(
        vec![ChargeReply::Unavailable],
        ChargeReply::Approve,
    ));
    let processor = processor(store.clone(), gateway);

    let err = processor
        .process_start(&RenewalStartEvent::for_transaction(&transaction))
        .await
        .unwrap_err();
    assert!(matches!(err, RenewalError::GatewayUnavailable(_)));
    assert!(err.is_retryable());

    // No stored transition beyond PROCESSING, no terminal stamp.
    let stored = store.get(transaction.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Processing);
    assert!(stored.finished_at.is_none());
    assert_eq!(stored.rejected_payment_count, 0);
}

#[tokio::test]
async fn test_terminal_delivery_produces_no_state_change() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let mut transaction = seeded(&store).await;
    transaction
        .transition(TransactionStatus::Processing, Utc::now())
        .unwrap();
    transaction
        .transition(TransactionStatus::Approved, Utc::now())
        .unwrap();
    store.store(transaction.clone()).await.unwrap();

    let gateway = Arc::new(ScriptedGateway::declining());
    let processor = processor(store.clone(), gateway.clone());

    let outcome = processor
        .process_start(&RenewalStartEvent::for_transaction(&transaction))
        .await
        .unwrap();
    assert!(matches!(outcome, ProcessOutcome::AlreadyFinal));
    assert_eq!(gateway.calls(), 0);

    let stored = store.get(transaction.id).await.unwrap().unwrap();
    assert_eq!(stored, transaction);
}

#[tokio::test]
async fn test_finished_at_iff_terminal_across_a_full_retry_chain() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let transaction = seeded(&store).await;
    let processor = processor(store.clone(), Arc::new(ScriptedGateway::declining()));

    // Drive the same transaction through its whole retry budget.
    let mut event = RenewalStartEvent::for_transaction(&transaction);
    loop {
        let stored = store.get(transaction.id).await.unwrap().unwrap();
        assert_eq!(
            stored.finished_at.is_some(),
            stored.status.is_terminal(),
            "finished_at must be set exactly on terminal statuses, saw {stored:?}"
        );
        match processor.process_start(&event).await.unwrap() {
            ProcessOutcome::RetryRequested { event: next } => event = next,
            ProcessOutcome::Declined { .. } => break,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    let stored = store.get(transaction.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Declined);
    assert_eq!(stored.rejected_payment_count, 3);
    assert!(stored.finished_at.is_some());
}
