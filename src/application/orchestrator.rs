use crate::application::processor::{ProcessOutcome, TransactionProcessor};
use crate::application::renewal::SubscriptionRenewalService;
use crate::config::{RedeliveryBackoff, RenewalConfig};
use crate::domain::events::{RenewalStartEvent, SubscriptionCancelEvent, TransactionCancelEvent};
use crate::domain::ports::EventPublisherRef;
use crate::error::{RenewalError, Result};
use chrono::Utc;
use std::time::Duration;

/// Consumes the engine's three queues and fans transaction outcomes out into
/// follow-up events. State is always persisted by the callee before an event
/// leaves through the publisher, and every handler is idempotent, so
/// at-least-once delivery is safe end to end.
pub struct RenewalOrchestrator {
    processor: TransactionProcessor,
    renewals: SubscriptionRenewalService,
    publisher: EventPublisherRef,
    retry_interval: Duration,
    backoff: RedeliveryBackoff,
}

impl RenewalOrchestrator {
    pub fn new(
        processor: TransactionProcessor,
        renewals: SubscriptionRenewalService,
        publisher: EventPublisherRef,
        config: &RenewalConfig,
    ) -> Self {
        Self {
            processor,
            renewals,
            publisher,
            retry_interval: config.retry_interval,
            backoff: config.redelivery_backoff.clone(),
        }
    }

    /// Handles one start-renewal delivery. Resolves every failure mode:
    /// transient errors are republished with capped backoff, poison and
    /// fatal messages are dead-lettered, everything else is acknowledged.
    pub async fn handle_renewal_start(&self, event: RenewalStartEvent) -> Result<()> {
        match self.processor.process_start(&event).await {
            Ok(ProcessOutcome::AlreadyFinal) => Ok(()),
            Ok(ProcessOutcome::Approved { transaction }) => {
                self.renewals
                    .apply_approval(transaction.subscription_id, transaction.id)
                    .await
            }
            Ok(ProcessOutcome::RetryRequested { event: retry }) => {
                self.publisher
                    .publish_renewal_start(retry, self.retry_interval)
                    .await
            }
            Ok(ProcessOutcome::Declined {
                transaction,
                reason,
            }) => {
                self.publisher
                    .publish_subscription_cancel(SubscriptionCancelEvent {
                        subscription_id: transaction.subscription_id,
                        reason: reason.clone(),
                    })
                    .await?;
                self.publisher
                    .publish_transaction_cancel(TransactionCancelEvent {
                        transaction_id: transaction.id,
                        subscription_id: transaction.subscription_id,
                        reason,
                        occurred_at: Utc::now(),
                    })
                    .await
            }
            Err(err) if err.is_retryable() => {
                let delay = self.backoff.delay_for(event.redelivery_count);
                tracing::warn!(
                    transaction = %event.transaction_id,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, scheduling redelivery"
                );
                let mut retry = event;
                retry.redelivery_count += 1;
                self.publisher.publish_renewal_start(retry, delay).await
            }
            Err(err) => {
                tracing::error!(
                    transaction = %event.transaction_id,
                    error = %err,
                    "non-retryable failure, dead-lettering delivery"
                );
                self.publisher
                    .dead_letter(serde_json::to_value(&event)?, err.to_string())
                    .await
            }
        }
    }

    /// Cancels the subscription named by a cascade event. A missing
    /// subscription is quarantined rather than silently dropped.
    pub async fn handle_subscription_cancel(&self, event: SubscriptionCancelEvent) -> Result<()> {
        match self
            .renewals
            .apply_cancellation(event.subscription_id, &event.reason)
            .await
        {
            Ok(()) => Ok(()),
            Err(err @ RenewalError::NotFound { .. }) => {
                tracing::error!(
                    subscription = %event.subscription_id,
                    "cancellation target missing, dead-lettering"
                );
                self.publisher
                    .dead_letter(serde_json::to_value(&event)?, err.to_string())
                    .await
            }
            Err(err) => Err(err),
        }
    }

    /// Marks the transaction named by a cancel event as aborted if it was
    /// left stuck in a non-terminal status.
    pub async fn handle_transaction_cancel(&self, event: TransactionCancelEvent) -> Result<()> {
        match self
            .processor
            .cancel(event.transaction_id, &event.reason)
            .await
        {
            Ok(()) => Ok(()),
            Err(err @ RenewalError::NotFound { .. }) => {
                tracing::error!(
                    transaction = %event.transaction_id,
                    "cancellation target missing, dead-lettering"
                );
                self.publisher
                    .dead_letter(serde_json::to_value(&event)?, err.to_string())
                    .await
            }
            Err(err) => Err(err),
        }
    }
}
