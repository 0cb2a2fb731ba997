use crate::domain::subscription::{Plan, Subscription, SubscriptionStatus};
use crate::error::{RenewalError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;
use uuid::Uuid;

fn default_auto_renew() -> bool {
    true
}

/// One row of the subscriptions seed file. Ids are optional and generated
/// when absent; the price is always derived from the plan.
#[derive(Debug, Deserialize)]
pub struct SubscriptionRecord {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub plan: Plan,
    pub expiration_date: NaiveDate,
    #[serde(default = "default_auto_renew")]
    pub auto_renew: bool,
}

impl SubscriptionRecord {
    pub fn into_subscription(self) -> Subscription {
        let plan = self.plan;
        Subscription {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            user_id: self.user_id.unwrap_or_else(Uuid::new_v4),
            plan,
            price_in_cents: plan.price_in_cents(),
            auto_renew: self.auto_renew,
            start_date: self.expiration_date - plan.billing_period(),
            expiration_date: self.expiration_date,
            last_renewal_date: None,
            last_renewal_transaction: None,
            status: SubscriptionStatus::Active,
            cancel_reason: None,
        }
    }
}

/// Reads subscriptions from a CSV source.
///
/// Wraps `csv::Reader` and yields `Result<Subscription>` lazily, so large
/// seed files stream instead of loading into memory.
pub struct SubscriptionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SubscriptionReader<R> {
    /// Creates a reader from any `Read` source (e.g. File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn subscriptions(self) -> impl Iterator<Item = Result<Subscription>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map(SubscriptionRecord::into_subscription)
                .map_err(RenewalError::from)
        })
    }
}
