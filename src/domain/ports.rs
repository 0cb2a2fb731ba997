use crate::domain::events::{RenewalStartEvent, SubscriptionCancelEvent, TransactionCancelEvent};
use crate::domain::subscription::Subscription;
use crate::domain::transaction::PaymentTransaction;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Business outcome of a synchronous charge attempt. Transport-level
/// failures surface as `RenewalError::GatewayUnavailable` instead.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ChargeOutcome {
    Approved { external_id: String },
    Declined { code: String, description: String },
}

#[derive(Debug, Clone, Copy)]
pub struct ChargeRequest {
    pub amount_in_cents: u32,
    pub correlation_id: Uuid,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// One bounded-timeout charge attempt against the external provider.
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeOutcome>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn store(&self, subscription: Subscription) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Subscription>>;
    /// Active, auto-renewing subscriptions expiring exactly on `as_of`.
    async fn find_due(&self, as_of: NaiveDate) -> Result<Vec<Subscription>>;
}

/// Result of atomically moving a transaction into `PROCESSING`.
#[derive(Debug)]
pub enum ClaimedStart {
    /// The row was non-terminal and is now `PROCESSING`.
    Started(PaymentTransaction),
    /// The row is already terminal; deliveries for it must be discarded.
    AlreadyFinal(PaymentTransaction),
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn store(&self, transaction: PaymentTransaction) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>>;

    /// Checks the terminal guard and flips the row to `PROCESSING` as one
    /// atomic read-modify-write under the row's lock, so two concurrent
    /// deliveries of the same id can never both get past a terminal status.
    /// `None` when the id is unknown.
    async fn begin_processing(&self, id: Uuid) -> Result<Option<ClaimedStart>>;

    /// Insert-if-absent: creates the renewal transaction for `subscription`
    /// unless one was already generated for `as_of`, or a non-terminal
    /// transaction for the subscription is still open. Returns `None` when
    /// nothing was created, which makes duplicate trigger firings harmless.
    async fn create_due(
        &self,
        subscription: &Subscription,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentTransaction>>;

    /// Atomically claims up to `limit` `CREATED` rows, oldest first, flipping
    /// them to `PROCESSING` in the same step. Each row is handed to exactly
    /// one caller no matter how many claimants poll concurrently; rows
    /// claimed by an in-flight competitor are skipped, not waited on.
    async fn claim_batch(&self, limit: usize) -> Result<Vec<PaymentTransaction>>;

    /// Every stored transaction, for reporting. Not a claim primitive.
    async fn all(&self) -> Result<Vec<PaymentTransaction>>;
}

/// At-least-once publication of the engine's follow-up events. State must be
/// durably persisted before anything is published through this port.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Schedules a start-renewal delivery no earlier than `delay` from now.
    async fn publish_renewal_start(
        &self,
        event: RenewalStartEvent,
        delay: Duration,
    ) -> Result<()>;
    async fn publish_subscription_cancel(&self, event: SubscriptionCancelEvent) -> Result<()>;
    async fn publish_transaction_cancel(&self, event: TransactionCancelEvent) -> Result<()>;
    /// Quarantines a message that must not be redelivered.
    async fn dead_letter(&self, payload: serde_json::Value, reason: String) -> Result<()>;
}

pub type SubscriptionStoreRef = Arc<dyn SubscriptionStore>;
pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type EventPublisherRef = Arc<dyn EventPublisher>;
