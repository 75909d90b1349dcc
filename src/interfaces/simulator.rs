use super::csv::event_reader::{Event, EventType};
use crate::application::lifecycle::PurchaseLifecycle;
use crate::application::reconciler::{PaymentReconciler, ReconcileOutcome};
use crate::config::CheckoutConfig;
use crate::domain::ports::{Clock, PurchaseStoreRef, SubscriptionStoreRef};
use crate::domain::purchase::{CancelReason, Purchase, PurchaseId, UserId};
use crate::domain::subscription::Subscription;
use crate::error::{CheckoutError, Result};
use crate::infrastructure::clock::ManualClock;
use crate::infrastructure::oracle::ScriptedOracle;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Replays scripted events against the checkout core.
///
/// Time only moves when an event says so, and payments clear only when a `pay`
/// event registers them with the scripted oracle.
pub struct Simulator {
    reconciler: PaymentReconciler,
    oracle: Arc<ScriptedOracle>,
    clock: Arc<ManualClock>,
    config: CheckoutConfig,
    purchases: PurchaseStoreRef,
    subscriptions: SubscriptionStoreRef,
    labels: HashMap<String, PurchaseId>,
}

impl Simulator {
    pub fn new(
        config: CheckoutConfig,
        purchases: PurchaseStoreRef,
        subscriptions: SubscriptionStoreRef,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
        let oracle = Arc::new(ScriptedOracle::new());
        let lifecycle = Arc::new(PurchaseLifecycle::from_config(purchases.clone(), &config));
        let reconciler = PaymentReconciler::new(
            lifecycle,
            oracle.clone(),
            subscriptions.clone(),
            clock.clone(),
        )
        .with_config(&config);
        Self {
            reconciler,
            oracle,
            clock,
            config,
            purchases,
            subscriptions,
            labels: HashMap::new(),
        }
    }

    pub async fn apply(&mut self, event: Event) -> Result<()> {
        self.clock.set(event.at);
        match event.r#type {
            EventType::Create => {
                let label = event.require_purchase()?.to_string();
                let user = event.user.as_deref().ok_or_else(|| {
                    CheckoutError::InvalidEvent(format!("create {label} needs a user"))
                })?;
                let plan_id = event.plan.as_deref().ok_or_else(|| {
                    CheckoutError::InvalidEvent(format!("create {label} needs a plan"))
                })?;
                let plan = self.config.plans.get(plan_id)?.clone();
                let purchase = self
                    .reconciler
                    .lifecycle()
                    .create(UserId::new(user), &plan, event.at)
                    .await?;
                self.labels.insert(label, purchase.id);
            }
            EventType::Pay => {
                let id = self.resolve(&event)?;
                self.oracle.settle(id, event.at);
            }
            EventType::Outage => self.oracle.set_online(false),
            EventType::Restore => self.oracle.set_online(true),
            EventType::Reconcile => match event.purchase.as_deref() {
                Some(_) => {
                    let id = self.resolve(&event)?;
                    let outcome = self.reconciler.reconcile(id).await?;
                    log_outcome(id, &outcome);
                }
                None => {
                    for (id, outcome) in self.reconciler.reconcile_pending().await? {
                        log_outcome(id, &outcome?);
                    }
                }
            },
            EventType::Cancel => {
                let id = self.resolve(&event)?;
                self.reconciler
                    .lifecycle()
                    .cancel(id, CancelReason::Requested)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn purchases(&self) -> Result<Vec<Purchase>> {
        self.purchases.all().await
    }

    pub async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        self.subscriptions.all().await
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Script label of a purchase, or its id if it was created in an earlier run.
    pub fn label_of(&self, purchase: &Purchase) -> String {
        self.labels
            .iter()
            .find(|(_, id)| **id == purchase.id)
            .map(|(label, _)| label.clone())
            .unwrap_or_else(|| purchase.id.to_string())
    }

    fn resolve(&self, event: &Event) -> Result<PurchaseId> {
        let label = event.require_purchase()?;
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| CheckoutError::InvalidEvent(format!("unknown purchase {label}")))
    }
}

fn log_outcome(id: PurchaseId, outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Completed { subscription, .. } => {
            info!(purchase = %id, until = %subscription.end, "reconciled: completed")
        }
        ReconcileOutcome::Expired(_) => info!(purchase = %id, "reconciled: expired"),
        ReconcileOutcome::StillPending(_) => info!(purchase = %id, "reconciled: still pending"),
        ReconcileOutcome::Finalized(status) => {
            info!(purchase = %id, %status, "reconciled: already final")
        }
    }
}
