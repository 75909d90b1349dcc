use crate::domain::ports::{PurchaseStore, SubscriptionStore};
use crate::domain::purchase::{Purchase, PurchaseId, PurchaseStatus, StatusChange, UserId};
use crate::domain::subscription::Subscription;
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for purchases.
///
/// The status swap runs entirely under the write lock, which makes it the single
/// serialization point for transitions of a purchase.
#[derive(Default, Clone)]
pub struct InMemoryPurchaseStore {
    purchases: Arc<RwLock<HashMap<PurchaseId, Purchase>>>,
}

impl InMemoryPurchaseStore {
    /// Creates a new, empty in-memory purchase store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PurchaseStore for InMemoryPurchaseStore {
    async fn create(&self, purchase: Purchase) -> Result<()> {
        let mut purchases = self.purchases.write().await;
        if purchases.contains_key(&purchase.id) {
            return Err(CheckoutError::InternalError(
                format!("purchase {} already exists", purchase.id).into(),
            ));
        }
        purchases.insert(purchase.id, purchase);
        Ok(())
    }

    async fn get(&self, id: PurchaseId) -> Result<Option<Purchase>> {
        let purchases = self.purchases.read().await;
        Ok(purchases.get(&id).cloned())
    }

    async fn compare_and_swap_status(
        &self,
        id: PurchaseId,
        expected: PurchaseStatus,
        change: StatusChange,
    ) -> Result<Purchase> {
        let mut purchases = self.purchases.write().await;
        let purchase = purchases
            .get_mut(&id)
            .ok_or(CheckoutError::PurchaseNotFound(id))?;
        if purchase.status != expected {
            return Err(CheckoutError::PersistenceConflict {
                id,
                expected,
                actual: purchase.status,
            });
        }
        purchase.apply(change)?;
        Ok(purchase.clone())
    }

    async fn pending(&self) -> Result<Vec<PurchaseId>> {
        let purchases = self.purchases.read().await;
        let mut pending: Vec<&Purchase> = purchases
            .values()
            .filter(|p| p.status == PurchaseStatus::Pending)
            .collect();
        pending.sort_by_key(|p| p.created_at);
        Ok(pending.into_iter().map(|p| p.id).collect())
    }

    async fn all(&self) -> Result<Vec<Purchase>> {
        let purchases = self.purchases.read().await;
        let mut all: Vec<Purchase> = purchases.values().cloned().collect();
        all.sort_by_key(|p| p.created_at);
        Ok(all)
    }
}

/// A thread-safe in-memory store for subscriptions, one row per user.
#[derive(Default, Clone)]
pub struct InMemorySubscriptionStore {
    subscriptions: Arc<RwLock<HashMap<UserId, Subscription>>>,
}

impl InMemorySubscriptionStore {
    /// Creates a new, empty in-memory subscription store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn upsert_active(&self, subscription: Subscription) -> Result<Subscription> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.user_id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(user_id).cloned())
    }

    async fn all(&self) -> Result<Vec<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        let mut all: Vec<Subscription> = subscriptions.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(all)
    }
}
