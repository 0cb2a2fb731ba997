use crate::domain::events::RenewalStartEvent;
use crate::domain::ports::{
    ChargeOutcome, ChargeRequest, ClaimedStart, PaymentGatewayRef, TransactionStoreRef,
};
use crate::domain::transaction::{MAX_PAYMENT_ATTEMPTS, PaymentTransaction, TransactionStatus};
use crate::error::{RenewalError, Result};
use chrono::Utc;
use uuid::Uuid;

/// What a delivery resolved to. The orchestrator turns these into follow-up
/// events; the processor itself only mutates the transaction row.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The transaction was already terminal; the delivery is discarded.
    AlreadyFinal,
    Approved {
        transaction: PaymentTransaction,
    },
    /// Declined with retry budget left. The incremented attempt counter is
    /// already persisted; `event` carries it for the delayed redelivery.
    RetryRequested {
        event: RenewalStartEvent,
    },
    /// Declined with the retry budget exhausted; cancellation cascades.
    Declined {
        transaction: PaymentTransaction,
        reason: String,
    },
}

/// The transaction state machine. Owns every mutation of a
/// `PaymentTransaction` during renewal processing.
pub struct TransactionProcessor {
    transactions: TransactionStoreRef,
    gateway: PaymentGatewayRef,
}

impl TransactionProcessor {
    pub fn new(transactions: TransactionStoreRef, gateway: PaymentGatewayRef) -> Self {
        Self {
            transactions,
            gateway,
        }
    }

    /// Drives one start-renewal delivery through the state machine.
    ///
    /// Transient gateway failures leave the row `PROCESSING` untouched and
    /// bubble up as `GatewayUnavailable` so the caller can redeliver; any
    /// other gateway failure aborts the transaction and is fatal for the
    /// message.
    pub async fn process_start(&self, event: &RenewalStartEvent) -> Result<ProcessOutcome> {
        // Terminal guard and the flip to PROCESSING happen as one atomic
        // read-modify-write inside the store.
        let started = self
            .transactions
            .begin_processing(event.transaction_id)
            .await?
            .ok_or(RenewalError::NotFound {
                entity: "payment transaction",
                id: event.transaction_id,
            })?;

        let mut transaction = match started {
            ClaimedStart::AlreadyFinal(transaction) => {
                tracing::info!(
                    transaction = %transaction.id,
                    status = %transaction.status,
                    "transaction already final, discarding delivery"
                );
                return Ok(ProcessOutcome::AlreadyFinal);
            }
            ClaimedStart::Started(transaction) => transaction,
        };

        if event.rejected_payment_count != transaction.rejected_payment_count {
            // Storage is authoritative; the payload is only a hint.
            tracing::warn!(
                transaction = %transaction.id,
                payload = event.rejected_payment_count,
                stored = transaction.rejected_payment_count,
                "attempt counter drifted between payload and storage"
            );
        }

        let request = ChargeRequest {
            amount_in_cents: transaction.price_in_cents,
            correlation_id: transaction.id,
        };

        match self.gateway.charge(request).await {
            Ok(ChargeOutcome::Approved { external_id }) => {
                tracing::info!(
                    transaction = %transaction.id,
                    external_id,
                    "payment approved"
                );
                transaction.transition(TransactionStatus::Approved, Utc::now())?;
                self.transactions.store(transaction.clone()).await?;
                Ok(ProcessOutcome::Approved { transaction })
            }
            Ok(ChargeOutcome::Declined { code, description }) => {
                self.handle_decline(transaction, code, description).await
            }
            Err(err @ RenewalError::GatewayUnavailable(_)) => {
                // No stored transition: the row stays PROCESSING and the
                // broker redelivers the message.
                tracing::warn!(
                    transaction = %transaction.id,
                    error = %err,
                    "gateway unavailable, leaving row for redelivery"
                );
                Err(err)
            }
            Err(err) => {
                transaction.cancellation_reason =
                    Some(format!("unexpected gateway failure: {err}"));
                transaction.transition(TransactionStatus::Aborted, Utc::now())?;
                self.transactions.store(transaction.clone()).await?;
                tracing::error!(
                    transaction = %transaction.id,
                    error = %err,
                    "aborting transaction after unexpected failure"
                );
                Err(RenewalError::Fatal(format!("charge failed: {err}")))
            }
        }
    }

    async fn handle_decline(
        &self,
        mut transaction: PaymentTransaction,
        code: String,
        description: String,
    ) -> Result<ProcessOutcome> {
        if transaction.rejected_payment_count < MAX_PAYMENT_ATTEMPTS {
            transaction.record_rejection();
            transaction.transition(TransactionStatus::PendingRetry, Utc::now())?;
            // Persisted before the retry is scheduled, so a crash here cannot
            // grant extra attempts on redelivery.
            self.transactions.store(transaction.clone()).await?;
            tracing::warn!(
                transaction = %transaction.id,
                attempt = transaction.rejected_payment_count,
                code,
                "payment declined, retry scheduled"
            );
            Ok(ProcessOutcome::RetryRequested {
                event: RenewalStartEvent::for_transaction(&transaction),
            })
        } else {
            let reason = format!(
                "payment declined after {MAX_PAYMENT_ATTEMPTS} attempts: {code}: {description}"
            );
            transaction.cancellation_reason = Some(reason.clone());
            transaction.transition(TransactionStatus::Declined, Utc::now())?;
            self.transactions.store(transaction.clone()).await?;
            tracing::warn!(
                transaction = %transaction.id,
                "retry budget exhausted, declining"
            );
            Ok(ProcessOutcome::Declined {
                transaction,
                reason,
            })
        }
    }

    /// Cancellation sweep for stuck rows. A transaction already in a
    /// terminal status (e.g. DECLINED by the decline path that published the
    /// cancel event) is left untouched.
    pub async fn cancel(&self, transaction_id: Uuid, reason: &str) -> Result<()> {
        let mut transaction =
            self.transactions
                .get(transaction_id)
                .await?
                .ok_or(RenewalError::NotFound {
                    entity: "payment transaction",
                    id: transaction_id,
                })?;

        if transaction.status.is_terminal() {
            tracing::debug!(
                transaction = %transaction.id,
                status = %transaction.status,
                "already terminal, nothing to cancel"
            );
            return Ok(());
        }

        transaction.cancellation_reason = Some(reason.to_string());
        transaction.transition(TransactionStatus::Aborted, Utc::now())?;
        self.transactions.store(transaction.clone()).await?;
        tracing::info!(transaction = %transaction.id, reason, "transaction aborted");
        Ok(())
    }
}
