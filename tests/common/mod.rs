#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use pixvip::application::lifecycle::PurchaseLifecycle;
use pixvip::application::reconciler::PaymentReconciler;
use pixvip::domain::payload::{MerchantProfile, PayloadCodec};
use pixvip::domain::plan::PlanCatalog;
use pixvip::domain::ports::{Clock, PurchaseStore, SubscriptionStore};
use pixvip::domain::purchase::{Purchase, PurchaseId, PurchaseStatus, StatusChange, UserId};
use pixvip::domain::subscription::Subscription;
use pixvip::error::{CheckoutError, Result};
use pixvip::infrastructure::clock::ManualClock;
use pixvip::infrastructure::in_memory::{InMemoryPurchaseStore, InMemorySubscriptionStore};
use pixvip::infrastructure::oracle::ScriptedOracle;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Purchase store that counts write calls.
#[derive(Default)]
pub struct CountingPurchaseStore {
    inner: InMemoryPurchaseStore,
    pub swaps: AtomicUsize,
}

impl CountingPurchaseStore {
    pub fn swaps(&self) -> usize {
        self.swaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PurchaseStore for CountingPurchaseStore {
    async fn create(&self, purchase: Purchase) -> Result<()> {
        self.inner.create(purchase).await
    }

    async fn get(&self, id: PurchaseId) -> Result<Option<Purchase>> {
        self.inner.get(id).await
    }

    async fn compare_and_swap_status(
        &self,
        id: PurchaseId,
        expected: PurchaseStatus,
        change: StatusChange,
    ) -> Result<Purchase> {
        self.swaps.fetch_add(1, Ordering::SeqCst);
        self.inner.compare_and_swap_status(id, expected, change).await
    }

    async fn pending(&self) -> Result<Vec<PurchaseId>> {
        self.inner.pending().await
    }

    async fn all(&self) -> Result<Vec<Purchase>> {
        self.inner.all().await
    }
}

/// Subscription store that counts successful upserts and can be told to fail the next one.
#[derive(Default)]
pub struct CountingSubscriptionStore {
    inner: InMemorySubscriptionStore,
    pub upserts: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingSubscriptionStore {
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn fail_next_upsert(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionStore for CountingSubscriptionStore {
    async fn upsert_active(&self, subscription: Subscription) -> Result<Subscription> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CheckoutError::StorageUnavailable(
                "subscription store down".to_string(),
            ));
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_active(subscription).await
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Subscription>> {
        self.inner.get(user_id).await
    }

    async fn all(&self) -> Result<Vec<Subscription>> {
        self.inner.all().await
    }
}

pub struct Harness {
    pub reconciler: Arc<PaymentReconciler>,
    pub lifecycle: Arc<PurchaseLifecycle>,
    pub purchases: Arc<CountingPurchaseStore>,
    pub subscriptions: Arc<CountingSubscriptionStore>,
    pub oracle: Arc<ScriptedOracle>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let purchases = Arc::new(CountingPurchaseStore::default());
        let subscriptions = Arc::new(CountingSubscriptionStore::default());
        let oracle = Arc::new(ScriptedOracle::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let lifecycle = Arc::new(PurchaseLifecycle::new(
            purchases.clone(),
            PayloadCodec::new(MerchantProfile::default()),
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            lifecycle.clone(),
            oracle.clone(),
            subscriptions.clone(),
            clock.clone(),
        ));
        Self {
            reconciler,
            lifecycle,
            purchases,
            subscriptions,
            oracle,
            clock,
        }
    }

    /// Creates a pending purchase at the current clock time.
    pub async fn buy(&self, user: &str, plan: &str) -> Purchase {
        let plan = PlanCatalog::default().get(plan).unwrap().clone();
        self.lifecycle
            .create(UserId::new(user), &plan, self.clock.now())
            .await
            .unwrap()
    }

    pub fn at(&self, offset: Duration) {
        self.clock.set(t0() + offset);
    }
}

/// Writes an events CSV with `purchases` create/pay/reconcile triples.
pub fn generate_events_csv(path: &Path, purchases: usize) -> std::result::Result<(), Error> {
    let mut wtr = csv::WriterBuilder::new().from_path(path)?;
    wtr.write_record(["type", "purchase", "user", "plan", "at"])?;

    for i in 1..=purchases {
        let label = format!("p{i}");
        let user = format!("user{i}");
        wtr.write_record(["create", &label, &user, "cosmo", "2024-05-01T12:00:00Z"])?;
        wtr.write_record(["pay", &label, "", "", "2024-05-01T12:05:00Z"])?;
        wtr.write_record(["reconcile", &label, "", "", "2024-05-01T12:06:00Z"])?;
    }

    wtr.flush()?;
    Ok(())
}
