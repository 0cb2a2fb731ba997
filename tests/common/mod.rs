#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Months, NaiveDate};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use subrenew::application::orchestrator::RenewalOrchestrator;
use subrenew::application::processor::TransactionProcessor;
use subrenew::application::renewal::SubscriptionRenewalService;
use subrenew::application::triggers::TriggerService;
use subrenew::config::RenewalConfig;
use subrenew::domain::ports::{
    ChargeOutcome, ChargeRequest, EventPublisherRef, PaymentGateway, PaymentGatewayRef,
};
use subrenew::domain::subscription::{Plan, Subscription};
use subrenew::error::{RenewalError, Result};
use subrenew::infrastructure::broker::InProcessBroker;
use subrenew::infrastructure::in_memory::{InMemorySubscriptionStore, InMemoryTransactionStore};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub enum ChargeReply {
    Approve,
    Decline,
    Unavailable,
}

/// Gateway double that pops one scripted reply per charge and falls back to
/// a fixed reply once the script runs dry. Counts every call.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<ChargeReply>>,
    fallback: ChargeReply,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn replies(script: Vec<ChargeReply>, fallback: ChargeReply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn approving() -> Self {
        Self::replies(Vec::new(), ChargeReply::Approve)
    }

    pub fn declining() -> Self {
        Self::replies(Vec::new(), ChargeReply::Decline)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(self.fallback);
        match reply {
            ChargeReply::Approve => Ok(ChargeOutcome::Approved {
                external_id: format!("ext-{}", request.correlation_id.simple()),
            }),
            ChargeReply::Decline => Ok(ChargeOutcome::Declined {
                code: "card_declined".to_string(),
                description: "insufficient funds".to_string(),
            }),
            ChargeReply::Unavailable => Err(RenewalError::GatewayUnavailable(
                "connection timed out".to_string(),
            )),
        }
    }
}

/// A subscription expiring exactly on `today`, immune to month-length
/// arithmetic surprises.
pub fn due_subscription(today: NaiveDate) -> Subscription {
    let mut subscription = Subscription::new(Uuid::new_v4(), Plan::Premium, today);
    subscription.start_date = today - Months::new(1);
    subscription.expiration_date = today;
    subscription
}

/// A fast test configuration: millisecond-scale retry and backoff delays.
pub fn fast_config() -> RenewalConfig {
    let mut config = RenewalConfig::default();
    config.retry_interval = std::time::Duration::from_millis(10);
    config.redelivery_backoff.initial_delay = std::time::Duration::from_millis(10);
    config.redelivery_backoff.max_delay = std::time::Duration::from_millis(50);
    config
}

/// Fully wired engine over in-memory infrastructure.
pub struct Harness {
    pub subscriptions: Arc<InMemorySubscriptionStore>,
    pub transactions: Arc<InMemoryTransactionStore>,
    pub broker: InProcessBroker,
    pub orchestrator: Arc<RenewalOrchestrator>,
    pub triggers: TriggerService,
}

pub fn harness(gateway: PaymentGatewayRef, config: &RenewalConfig) -> Harness {
    let subscriptions = Arc::new(InMemorySubscriptionStore::new());
    let transactions = Arc::new(InMemoryTransactionStore::new());
    let broker = InProcessBroker::new();
    let publisher: EventPublisherRef = Arc::new(broker.clone());

    let orchestrator = Arc::new(RenewalOrchestrator::new(
        TransactionProcessor::new(transactions.clone(), gateway),
        SubscriptionRenewalService::new(subscriptions.clone()),
        publisher.clone(),
        config,
    ));
    let triggers = TriggerService::new(subscriptions.clone(), transactions.clone(), publisher);

    Harness {
        subscriptions,
        transactions,
        broker,
        orchestrator,
        triggers,
    }
}
