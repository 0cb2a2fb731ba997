use crate::domain::transaction::PaymentTransaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kicks off (or retries) the renewal payment for one claimed transaction.
///
/// `rejected_payment_count` is a hint carried for observability; the
/// persisted transaction is authoritative and is re-read before acting.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RenewalStartEvent {
    pub subscription_id: Uuid,
    pub transaction_id: Uuid,
    pub price_in_cents: u32,
    #[serde(default)]
    pub rejected_payment_count: u32,
    /// Transient-failure redelivery attempt, used to pace backoff. Defaults
    /// keep payloads without it readable.
    #[serde(default)]
    pub redelivery_count: u32,
}

impl RenewalStartEvent {
    pub fn for_transaction(transaction: &PaymentTransaction) -> Self {
        Self {
            subscription_id: transaction.subscription_id,
            transaction_id: transaction.id,
            price_in_cents: transaction.price_in_cents,
            rejected_payment_count: transaction.rejected_payment_count,
            redelivery_count: 0,
        }
    }
}

/// Terminal decline cascade: cancel the owning subscription.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCancelEvent {
    pub subscription_id: Uuid,
    pub reason: String,
}

/// Sweep instruction: abort the transaction if it was left stuck in a
/// non-terminal status. A no-op against an already-terminal row.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCancelEvent {
    pub transaction_id: Uuid,
    pub subscription_id: Uuid,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}
