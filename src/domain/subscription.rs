use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

/// The plan catalogue. Prices are minor-currency units, snapshotted onto the
/// subscription at creation time.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    Basic,
    Premium,
    Family,
}

impl Plan {
    pub fn price_in_cents(&self) -> u32 {
        match self {
            Plan::Basic => 1990,
            Plan::Premium => 3990,
            Plan::Family => 5990,
        }
    }

    /// All plans bill monthly.
    pub fn billing_period(&self) -> Months {
        Months::new(1)
    }
}

/// A recurring subscription.
///
/// `expiration_date` only ever moves forward, and `Active -> Cancelled` is
/// one-way: a cancelled subscription is never reactivated in place.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan: Plan,
    pub price_in_cents: u32,
    pub auto_renew: bool,
    pub start_date: NaiveDate,
    pub expiration_date: NaiveDate,
    pub last_renewal_date: Option<NaiveDate>,
    /// Id of the payment transaction whose approval last extended this
    /// subscription. Guards against double-extension on duplicate delivery.
    pub last_renewal_transaction: Option<Uuid>,
    pub status: SubscriptionStatus,
    pub cancel_reason: Option<String>,
}

impl Subscription {
    pub fn new(user_id: Uuid, plan: Plan, today: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            plan,
            price_in_cents: plan.price_in_cents(),
            auto_renew: true,
            start_date: today,
            expiration_date: today + plan.billing_period(),
            last_renewal_date: None,
            last_renewal_transaction: None,
            status: SubscriptionStatus::Active,
            cancel_reason: None,
        }
    }

    /// Whether this subscription should have a renewal transaction generated
    /// for `as_of`.
    pub fn is_due(&self, as_of: NaiveDate) -> bool {
        self.status == SubscriptionStatus::Active
            && self.auto_renew
            && self.expiration_date == as_of
    }

    /// Applies an approved renewal payment: extends the expiration one
    /// billing period from `max(today, expiration_date)`, so a lapsed
    /// subscription is anchored at today rather than back-dated.
    ///
    /// Returns `false` (and changes nothing) when the same transaction
    /// already renewed this subscription.
    pub fn renew(&mut self, transaction_id: Uuid, today: NaiveDate) -> bool {
        if self.last_renewal_transaction == Some(transaction_id) {
            return false;
        }
        let anchor = self.expiration_date.max(today);
        self.expiration_date = anchor + self.plan.billing_period();
        self.last_renewal_date = Some(today);
        self.last_renewal_transaction = Some(transaction_id);
        self.status = SubscriptionStatus::Active;
        true
    }

    /// Cancels the subscription and disables auto-renew. Returns `false` when
    /// already cancelled; the original reason is kept.
    pub fn cancel(&mut self, reason: &str) -> bool {
        if self.status == SubscriptionStatus::Cancelled {
            return false;
        }
        self.status = SubscriptionStatus::Cancelled;
        self.cancel_reason = Some(reason.to_string());
        self.auto_renew = false;
        true
    }
}
