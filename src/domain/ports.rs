use super::purchase::{Purchase, PurchaseId, PurchaseStatus, StatusChange, UserId};
use super::subscription::Subscription;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait PurchaseStore: Send + Sync {
    async fn create(&self, purchase: Purchase) -> Result<()>;
    async fn get(&self, id: PurchaseId) -> Result<Option<Purchase>>;
    /// Writes `change` only if the stored status still equals `expected`.
    ///
    /// Returns the updated record, or `PersistenceConflict` carrying the status
    /// actually found.
    async fn compare_and_swap_status(
        &self,
        id: PurchaseId,
        expected: PurchaseStatus,
        change: StatusChange,
    ) -> Result<Purchase>;
    async fn pending(&self) -> Result<Vec<PurchaseId>>;
    async fn all(&self) -> Result<Vec<Purchase>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Replaces the row of `subscription.user_id`, or inserts one if none exists.
    async fn upsert_active(&self, subscription: Subscription) -> Result<Subscription>;
    async fn get(&self, user_id: &UserId) -> Result<Option<Subscription>>;
    async fn all(&self) -> Result<Vec<Subscription>>;
}

/// Answer of the external payment network for one purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Paid { at: DateTime<Utc> },
    NotPaid,
    Unreachable,
}

#[async_trait]
pub trait ConfirmationOracle: Send + Sync {
    async fn query(&self, id: PurchaseId) -> Confirmation;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type PurchaseStoreRef = Arc<dyn PurchaseStore>;
pub type SubscriptionStoreRef = Arc<dyn SubscriptionStore>;
pub type OracleRef = Arc<dyn ConfirmationOracle>;
pub type ClockRef = Arc<dyn Clock>;
