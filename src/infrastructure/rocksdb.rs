use crate::domain::ports::{ClaimedStart, SubscriptionStore, TransactionStore};
use crate::domain::subscription::Subscription;
use crate::domain::transaction::{PaymentTransaction, TransactionStatus};
use crate::error::{RenewalError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for subscription records.
pub const CF_SUBSCRIPTIONS: &str = "subscriptions";
/// Column Family for the payment-transaction audit trail.
pub const CF_TRANSACTIONS: &str = "transactions";

/// Persistent store backed by RocksDB.
///
/// Implements both store ports over separate column families, values encoded
/// as JSON. `Clone` shares the underlying `Arc<DB>`.
///
/// RocksDB has no row locks, so the claim-exclusivity contract of
/// `claim_batch` (and the insert-if-absent contract of `create_due`) is
/// provided by a single claim mutex: the embedded-store equivalent of
/// select-for-update-skip-locked for one process owning the database.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    claim_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, ensuring both column
    /// families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_subscriptions = ColumnFamilyDescriptor::new(CF_SUBSCRIPTIONS, Options::default());
        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_subscriptions, cf_transactions])?;

        Ok(Self {
            db: Arc::new(db),
            claim_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf_handle(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            RenewalError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        let cf = self.cf_handle(CF_SUBSCRIPTIONS)?;
        let value = serde_json::to_vec(subscription)?;
        self.db.put_cf(cf, subscription.id.as_bytes(), value)?;
        Ok(())
    }

    fn put_transaction(&self, transaction: &PaymentTransaction) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = serde_json::to_vec(transaction)?;
        self.db.put_cf(cf, transaction.id.as_bytes(), value)?;
        Ok(())
    }

    fn scan_transactions(&self) -> Result<Vec<PaymentTransaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let mut transactions = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            transactions.push(serde_json::from_slice(&value)?);
        }
        Ok(transactions)
    }
}

#[async_trait]
impl SubscriptionStore for RocksDBStore {
    async fn store(&self, subscription: Subscription) -> Result<()> {
        self.put_subscription(&subscription)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Subscription>> {
        let cf = self.cf_handle(CF_SUBSCRIPTIONS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn find_due(&self, as_of: NaiveDate) -> Result<Vec<Subscription>> {
        let cf = self.cf_handle(CF_SUBSCRIPTIONS)?;
        let mut due = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let subscription: Subscription = serde_json::from_slice(&value)?;
            if subscription.is_due(as_of) {
                due.push(subscription);
            }
        }
        Ok(due)
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn store(&self, transaction: PaymentTransaction) -> Result<()> {
        self.put_transaction(&transaction)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn begin_processing(&self, id: Uuid) -> Result<Option<ClaimedStart>> {
        let _guard = self.claim_lock.lock().await;

        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let Some(bytes) = self.db.get_cf(cf, id.as_bytes())? else {
            return Ok(None);
        };
        let mut row: PaymentTransaction = serde_json::from_slice(&bytes)?;
        if row.status.is_terminal() {
            return Ok(Some(ClaimedStart::AlreadyFinal(row)));
        }
        row.transition(TransactionStatus::Processing, Utc::now())?;
        self.put_transaction(&row)?;
        Ok(Some(ClaimedStart::Started(row)))
    }

    async fn create_due(
        &self,
        subscription: &Subscription,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentTransaction>> {
        let _guard = self.claim_lock.lock().await;

        // Full scan; the audit trail this store serves stays small enough
        // that a secondary index is not worth the bookkeeping.
        let existing = self.scan_transactions()?;
        let duplicate = existing.iter().any(|t| {
            t.subscription_id == subscription.id
                && (t.creation_date() == as_of || !t.status.is_terminal())
        });
        if duplicate {
            return Ok(None);
        }

        let transaction = PaymentTransaction::new(subscription, now);
        self.put_transaction(&transaction)?;
        Ok(Some(transaction))
    }

    async fn claim_batch(&self, limit: usize) -> Result<Vec<PaymentTransaction>> {
        let _guard = self.claim_lock.lock().await;

        let mut candidates: Vec<PaymentTransaction> = self
            .scan_transactions()?
            .into_iter()
            .filter(|t| t.status == TransactionStatus::Created)
            .collect();
        candidates.sort_by_key(|t| (t.started_at, t.id));
        candidates.truncate(limit);

        let now = Utc::now();
        let mut claimed = Vec::with_capacity(candidates.len());
        for mut transaction in candidates {
            transaction.transition(TransactionStatus::Processing, now)?;
            self.put_transaction(&transaction)?;
            claimed.push(transaction);
        }
        Ok(claimed)
    }

    async fn all(&self) -> Result<Vec<PaymentTransaction>> {
        self.scan_transactions()
    }
}
