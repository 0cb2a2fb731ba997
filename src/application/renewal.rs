use crate::domain::ports::SubscriptionStoreRef;
use crate::error::{RenewalError, Result};
use chrono::Utc;
use uuid::Uuid;

/// Applies terminal transaction outcomes to the subscription record.
pub struct SubscriptionRenewalService {
    subscriptions: SubscriptionStoreRef,
}

impl SubscriptionRenewalService {
    pub fn new(subscriptions: SubscriptionStoreRef) -> Self {
        Self { subscriptions }
    }

    /// Extends the subscription one billing period from
    /// `max(today, expiration)`. Safe to call more than once for the same
    /// transaction id: the duplicate application is a no-op.
    pub async fn apply_approval(&self, subscription_id: Uuid, transaction_id: Uuid) -> Result<()> {
        let mut subscription =
            self.subscriptions
                .get(subscription_id)
                .await?
                .ok_or(RenewalError::NotFound {
                    entity: "subscription",
                    id: subscription_id,
                })?;

        let today = Utc::now().date_naive();
        if subscription.renew(transaction_id, today) {
            tracing::info!(
                subscription = %subscription.id,
                expires = %subscription.expiration_date,
                "subscription renewed"
            );
            self.subscriptions.store(subscription).await?;
        } else {
            tracing::debug!(
                subscription = %subscription_id,
                transaction = %transaction_id,
                "renewal already applied for this transaction"
            );
        }
        Ok(())
    }

    /// Cancels the subscription and disables auto-renew. Cancelling an
    /// already-cancelled subscription changes nothing. A missing subscription
    /// is an error the caller must decide on (the orchestrator dead-letters).
    pub async fn apply_cancellation(&self, subscription_id: Uuid, reason: &str) -> Result<()> {
        let mut subscription =
            self.subscriptions
                .get(subscription_id)
                .await?
                .ok_or(RenewalError::NotFound {
                    entity: "subscription",
                    id: subscription_id,
                })?;

        if subscription.cancel(reason) {
            tracing::info!(subscription = %subscription.id, reason, "subscription cancelled");
            self.subscriptions.store(subscription).await?;
        }
        Ok(())
    }
}
