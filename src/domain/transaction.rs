use crate::domain::subscription::Subscription;
use crate::error::{RenewalError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Business declines get this many scheduled retries before the transaction
/// is declined for good and cancellation cascades.
pub const MAX_PAYMENT_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Created,
    Processing,
    Approved,
    Declined,
    PendingRetry,
    Aborted,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Approved | TransactionStatus::Declined | TransactionStatus::Aborted
        )
    }

    /// The allowed transition table. Anything not listed is rejected, which
    /// is what keeps a stale delivery from regressing a terminal status.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match (self, next) {
            (Created, Processing) => true,
            (PendingRetry, Processing) => true,
            // Redelivery of a message whose first attempt died in flight.
            (Processing, Processing) => true,
            (Processing, Approved | Declined | PendingRetry) => true,
            // The cancel sweep may abort any non-terminal row.
            (Created | Processing | PendingRetry, Aborted) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Created => "CREATED",
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Approved => "APPROVED",
            TransactionStatus::Declined => "DECLINED",
            TransactionStatus::PendingRetry => "PENDING_RETRY",
            TransactionStatus::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One renewal payment attempt chain for a subscription. Never deleted; the
/// accumulated rows are the audit trail of every renewal ever attempted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub status: TransactionStatus,
    pub started_at: DateTime<Utc>,
    /// Set exactly when a terminal status is reached, never before.
    pub finished_at: Option<DateTime<Utc>>,
    /// Snapshot of the subscription price at generation time; not recomputed.
    pub price_in_cents: u32,
    pub rejected_payment_count: u32,
    pub cancellation_reason: Option<String>,
}

impl PaymentTransaction {
    pub fn new(subscription: &Subscription, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            status: TransactionStatus::Created,
            started_at: now,
            finished_at: None,
            price_in_cents: subscription.price_in_cents,
            rejected_payment_count: 0,
            cancellation_reason: None,
        }
    }

    /// Moves the transaction to `next`, stamping `finished_at` when (and only
    /// when) a terminal status is reached. Transitions outside the allowed
    /// table fail without mutating anything.
    pub fn transition(&mut self, next: TransactionStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RenewalError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Counts a business decline. The counter never decreases and is capped
    /// at the retry limit.
    pub fn record_rejection(&mut self) {
        self.rejected_payment_count = (self.rejected_payment_count + 1).min(MAX_PAYMENT_ATTEMPTS);
    }

    /// Calendar day this transaction was generated for, used by the
    /// duplicate-generation guard.
    pub fn creation_date(&self) -> NaiveDate {
        self.started_at.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::Plan;

    fn transaction() -> PaymentTransaction {
        let subscription = Subscription::new(
            Uuid::new_v4(),
            Plan::Premium,
            Utc::now().date_naive(),
        );
        PaymentTransaction::new(&subscription, Utc::now())
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&TransactionStatus::PendingRetry).unwrap();
        assert_eq!(json, "\"PENDING_RETRY\"");
        assert_eq!(TransactionStatus::Aborted.to_string(), "ABORTED");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransactionStatus::Approved.is_terminal());
        assert!(TransactionStatus::Declined.is_terminal());
        assert!(TransactionStatus::Aborted.is_terminal());
        assert!(!TransactionStatus::Created.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
        assert!(!TransactionStatus::PendingRetry.is_terminal());
    }

    #[test]
    fn test_terminal_statuses_accept_no_transition() {
        use TransactionStatus::*;
        for from in [Approved, Declined, Aborted] {
            for to in [Created, Processing, Approved, Declined, PendingRetry, Aborted] {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?} must be rejected");
            }
        }
    }

    #[test]
    fn test_created_only_moves_to_processing_or_aborted() {
        use TransactionStatus::*;
        assert!(Created.can_transition_to(Processing));
        assert!(Created.can_transition_to(Aborted));
        assert!(!Created.can_transition_to(Approved));
        assert!(!Created.can_transition_to(Declined));
        assert!(!Created.can_transition_to(PendingRetry));
    }

    #[test]
    fn test_transition_stamps_finished_at_only_on_terminal() {
        let mut tx = transaction();
        let now = Utc::now();

        tx.transition(TransactionStatus::Processing, now).unwrap();
        assert!(tx.finished_at.is_none());

        tx.transition(TransactionStatus::Approved, now).unwrap();
        assert_eq!(tx.finished_at, Some(now));
    }

    #[test]
    fn test_illegal_transition_leaves_row_untouched() {
        let mut tx = transaction();
        let err = tx
            .transition(TransactionStatus::Declined, Utc::now())
            .unwrap_err();
        assert!(matches!(err, RenewalError::InvalidTransition { .. }));
        assert_eq!(tx.status, TransactionStatus::Created);
        assert!(tx.finished_at.is_none());
    }

    #[test]
    fn test_rejection_counter_monotonic_and_capped() {
        let mut tx = transaction();
        for _ in 0..10 {
            tx.record_rejection();
        }
        assert_eq!(tx.rejected_payment_count, MAX_PAYMENT_ATTEMPTS);
    }

    #[test]
    fn test_price_snapshot_from_subscription() {
        let subscription = Subscription::new(
            Uuid::new_v4(),
            Plan::Family,
            Utc::now().date_naive(),
        );
        let tx = PaymentTransaction::new(&subscription, Utc::now());
        assert_eq!(tx.price_in_cents, 5990);
    }
}
