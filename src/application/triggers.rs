use crate::domain::events::RenewalStartEvent;
use crate::domain::ports::{EventPublisherRef, SubscriptionStoreRef, TransactionStoreRef};
use crate::error::Result;
use chrono::{NaiveDate, Utc};
use std::time::Duration;

/// The scheduled entry points of the engine: transaction generation and
/// batch enqueueing. Both are idempotent for a given date/limit and safe
/// under concurrent invocation.
pub struct TriggerService {
    subscriptions: SubscriptionStoreRef,
    transactions: TransactionStoreRef,
    publisher: EventPublisherRef,
}

impl TriggerService {
    pub fn new(
        subscriptions: SubscriptionStoreRef,
        transactions: TransactionStoreRef,
        publisher: EventPublisherRef,
    ) -> Self {
        Self {
            subscriptions,
            transactions,
            publisher,
        }
    }

    /// Creates one `CREATED` transaction per subscription due on `as_of`.
    /// The store's insert-if-absent semantics make a double firing of the
    /// trigger generate nothing the second time.
    pub async fn generate_due_transactions(&self, as_of: NaiveDate) -> Result<usize> {
        let due = self.subscriptions.find_due(as_of).await?;
        let now = Utc::now();
        let mut created = 0;
        for subscription in due {
            if let Some(transaction) = self
                .transactions
                .create_due(&subscription, as_of, now)
                .await?
            {
                tracing::debug!(
                    subscription = %subscription.id,
                    transaction = %transaction.id,
                    "generated renewal transaction"
                );
                created += 1;
            }
        }
        tracing::info!(count = created, %as_of, "generated due transactions");
        Ok(created)
    }

    /// Claims a batch of `CREATED` rows and emits one start-renewal message
    /// per claimed row. Rows are durably marked `PROCESSING` by the claim
    /// before anything is published.
    pub async fn enqueue_due_transactions(&self, limit: usize) -> Result<usize> {
        let claimed = self.transactions.claim_batch(limit).await?;
        let count = claimed.len();
        for transaction in claimed {
            self.publisher
                .publish_renewal_start(
                    RenewalStartEvent::for_transaction(&transaction),
                    Duration::ZERO,
                )
                .await?;
        }
        tracing::info!(count, "enqueued claimed transactions");
        Ok(count)
    }
}
