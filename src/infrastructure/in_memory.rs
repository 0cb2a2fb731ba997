use crate::domain::ports::{ClaimedStart, SubscriptionStore, TransactionStore};
use crate::domain::subscription::Subscription;
use crate::domain::transaction::{PaymentTransaction, TransactionStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory subscription store.
///
/// Uses `Arc<RwLock<HashMap<…>>>` for shared concurrent access. Ideal for
/// tests and one-shot runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemorySubscriptionStore {
    subscriptions: Arc<RwLock<HashMap<Uuid, Subscription>>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn store(&self, subscription: Subscription) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(&id).cloned())
    }

    async fn find_due(&self, as_of: NaiveDate) -> Result<Vec<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .values()
            .filter(|s| s.is_due(as_of))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct TransactionTable {
    rows: HashMap<Uuid, PaymentTransaction>,
    /// (subscription, generation date) pairs already generated. The
    /// in-memory stand-in for a uniqueness constraint.
    generated: HashSet<(Uuid, NaiveDate)>,
}

/// A thread-safe in-memory transaction store. The single write lock is what
/// makes `create_due` and `claim_batch` atomic with respect to concurrent
/// callers.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    inner: Arc<RwLock<TransactionTable>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn store(&self, transaction: PaymentTransaction) -> Result<()> {
        let mut table = self.inner.write().await;
        table.rows.insert(transaction.id, transaction);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        let table = self.inner.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn begin_processing(&self, id: Uuid) -> Result<Option<ClaimedStart>> {
        let mut table = self.inner.write().await;
        let Some(row) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.status.is_terminal() {
            return Ok(Some(ClaimedStart::AlreadyFinal(row.clone())));
        }
        row.transition(TransactionStatus::Processing, Utc::now())?;
        Ok(Some(ClaimedStart::Started(row.clone())))
    }

    async fn create_due(
        &self,
        subscription: &Subscription,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentTransaction>> {
        let mut table = self.inner.write().await;
        if table.generated.contains(&(subscription.id, as_of)) {
            return Ok(None);
        }
        // At most one non-terminal transaction per subscription.
        let open = table
            .rows
            .values()
            .any(|t| t.subscription_id == subscription.id && !t.status.is_terminal());
        if open {
            return Ok(None);
        }

        let transaction = PaymentTransaction::new(subscription, now);
        table.generated.insert((subscription.id, as_of));
        table.rows.insert(transaction.id, transaction.clone());
        Ok(Some(transaction))
    }

    async fn claim_batch(&self, limit: usize) -> Result<Vec<PaymentTransaction>> {
        let mut table = self.inner.write().await;

        let mut candidates: Vec<(DateTime<Utc>, Uuid)> = table
            .rows
            .values()
            .filter(|t| t.status == TransactionStatus::Created)
            .map(|t| (t.started_at, t.id))
            .collect();
        candidates.sort();
        candidates.truncate(limit);

        let now = Utc::now();
        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            if let Some(row) = table.rows.get_mut(&id) {
                row.transition(TransactionStatus::Processing, now)?;
                claimed.push(row.clone());
            }
        }
        Ok(claimed)
    }

    async fn all(&self) -> Result<Vec<PaymentTransaction>> {
        let table = self.inner.read().await;
        Ok(table.rows.values().cloned().collect())
    }
}
