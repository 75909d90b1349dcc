use super::purchase::{PurchaseId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

/// Time-bounded entitlement. A user holds at most one active row.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Subscription {
    pub user_id: UserId,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Purchase whose completion wrote this row.
    #[serde(default)]
    pub purchase_id: Option<PurchaseId>,
}

impl Subscription {
    pub fn active(
        user_id: UserId,
        plan_id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            plan_id: plan_id.into(),
            status: SubscriptionStatus::Active,
            start,
            end,
            purchase_id: None,
        }
    }

    pub fn granted_by(mut self, purchase_id: PurchaseId) -> Self {
        self.purchase_id = Some(purchase_id);
        self
    }

    /// Stored status, downgraded to `Inactive` once the end date has passed.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        if self.status == SubscriptionStatus::Active && now < self.end {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Inactive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_effective_status_lapses_at_end() {
        let start = Utc::now();
        let sub = Subscription::active(UserId::new("u1"), "astral", start, start + Duration::days(30));
        assert_eq!(sub.effective_status(start), SubscriptionStatus::Active);
        assert_eq!(
            sub.effective_status(start + Duration::days(30)),
            SubscriptionStatus::Inactive
        );
    }
}
