use crate::application::orchestrator::RenewalOrchestrator;
use crate::domain::events::{RenewalStartEvent, SubscriptionCancelEvent, TransactionCancelEvent};
use crate::domain::ports::EventPublisher;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc, watch};

/// A message quarantined instead of redelivered.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub payload: serde_json::Value,
    pub reason: String,
}

struct Topic<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T> Topic<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

struct BrokerInner {
    renewal_start: Topic<RenewalStartEvent>,
    subscription_cancel: Topic<SubscriptionCancelEvent>,
    transaction_cancel: Topic<TransactionCancelEvent>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    /// Messages published (including scheduled ones) but not yet handled.
    pending: AtomicUsize,
    idle: Notify,
}

impl BrokerInner {
    fn message_done(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_one();
        }
    }
}

/// In-process, at-least-once message channel for the renewal pipeline.
///
/// Supports per-message scheduled delivery (the delayed-retry contract), a
/// bounded consumer pool per queue, and a dead-letter store for poison
/// messages. Durable-broker deployments swap this adapter out at the
/// `EventPublisher` port; nothing above the port knows the difference.
#[derive(Clone)]
pub struct InProcessBroker {
    inner: Arc<BrokerInner>,
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                renewal_start: Topic::new(),
                subscription_cancel: Topic::new(),
                transaction_cancel: Topic::new(),
                dead_letters: Mutex::new(Vec::new()),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.dead_letters.lock().await.clone()
    }

    /// Runs consumers until every published message, including scheduled
    /// retries, has been handled, then stops the workers. `concurrency`
    /// bounds the start-renewal pool; the cancel queues get one consumer
    /// each.
    pub async fn run_until_idle(&self, orchestrator: Arc<RenewalOrchestrator>, concurrency: usize) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handles = Vec::new();
        for worker in 0..concurrency.max(1) {
            handles.push(tokio::spawn(renewal_worker(
                self.clone(),
                orchestrator.clone(),
                shutdown_rx.clone(),
                worker,
            )));
        }
        handles.push(tokio::spawn(subscription_cancel_worker(
            self.clone(),
            orchestrator.clone(),
            shutdown_rx.clone(),
        )));
        handles.push(tokio::spawn(transaction_cancel_worker(
            self.clone(),
            orchestrator,
            shutdown_rx,
        )));

        loop {
            let notified = self.inner.idle.notified();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }

        let _ = shutdown_tx.send(true);
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl EventPublisher for InProcessBroker {
    async fn publish_renewal_start(
        &self,
        event: RenewalStartEvent,
        delay: Duration,
    ) -> Result<()> {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        if delay.is_zero() {
            if self.inner.renewal_start.tx.send(event).is_err() {
                self.inner.message_done();
            }
        } else {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if inner.renewal_start.tx.send(event).is_err() {
                    inner.message_done();
                }
            });
        }
        Ok(())
    }

    async fn publish_subscription_cancel(&self, event: SubscriptionCancelEvent) -> Result<()> {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        if self.inner.subscription_cancel.tx.send(event).is_err() {
            self.inner.message_done();
        }
        Ok(())
    }

    async fn publish_transaction_cancel(&self, event: TransactionCancelEvent) -> Result<()> {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        if self.inner.transaction_cancel.tx.send(event).is_err() {
            self.inner.message_done();
        }
        Ok(())
    }

    async fn dead_letter(&self, payload: serde_json::Value, reason: String) -> Result<()> {
        tracing::warn!(%reason, "message dead-lettered");
        self.inner
            .dead_letters
            .lock()
            .await
            .push(DeadLetter { payload, reason });
        Ok(())
    }
}

// Pickup is serialized per queue by the receiver mutex; handling runs
// outside the lock, so up to `concurrency` deliveries are in flight at once.
async fn renewal_worker(
    broker: InProcessBroker,
    orchestrator: Arc<RenewalOrchestrator>,
    mut shutdown: watch::Receiver<bool>,
    worker: usize,
) {
    loop {
        let event = {
            let mut rx = broker.inner.renewal_start.rx.lock().await;
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(event) => event,
                    None => return,
                },
                _ = shutdown.changed() => return,
            }
        };
        tracing::debug!(worker, transaction = %event.transaction_id, "delivery picked up");
        let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
        if let Err(err) = orchestrator.handle_renewal_start(event).await {
            tracing::error!(error = %err, "renewal handler failed, dead-lettering");
            let _ = broker.dead_letter(payload, err.to_string()).await;
        }
        broker.inner.message_done();
    }
}

async fn subscription_cancel_worker(
    broker: InProcessBroker,
    orchestrator: Arc<RenewalOrchestrator>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = {
            let mut rx = broker.inner.subscription_cancel.rx.lock().await;
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(event) => event,
                    None => return,
                },
                _ = shutdown.changed() => return,
            }
        };
        let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
        if let Err(err) = orchestrator.handle_subscription_cancel(event).await {
            tracing::error!(error = %err, "subscription-cancel handler failed, dead-lettering");
            let _ = broker.dead_letter(payload, err.to_string()).await;
        }
        broker.inner.message_done();
    }
}

async fn transaction_cancel_worker(
    broker: InProcessBroker,
    orchestrator: Arc<RenewalOrchestrator>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = {
            let mut rx = broker.inner.transaction_cancel.rx.lock().await;
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(event) => event,
                    None => return,
                },
                _ = shutdown.changed() => return,
            }
        };
        let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
        if let Err(err) = orchestrator.handle_transaction_cancel(event).await {
            tracing::error!(error = %err, "transaction-cancel handler failed, dead-lettering");
            let _ = broker.dead_letter(payload, err.to_string()).await;
        }
        broker.inner.message_done();
    }
}
