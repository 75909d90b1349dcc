use super::bounded;
use super::lifecycle::PurchaseLifecycle;
use crate::config::CheckoutConfig;
use crate::domain::ports::{ClockRef, Confirmation, OracleRef, SubscriptionStoreRef};
use crate::domain::purchase::{Purchase, PurchaseId, PurchaseStatus, UserId};
use crate::domain::subscription::Subscription;
use crate::error::{CheckoutError, Result};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// This pass completed the purchase and granted the subscription.
    Completed {
        purchase: Purchase,
        subscription: Subscription,
    },
    /// This pass cancelled the purchase because its window closed unpaid.
    Expired(Purchase),
    /// Not paid yet and still inside its window.
    StillPending(Purchase),
    /// Already terminal, possibly finalized by a concurrent pass. Nothing was written.
    Finalized(PurchaseStatus),
}

/// Drives purchases to a terminal state from the confirmation oracle.
///
/// `reconcile` is idempotent and safe to call at any frequency and from any number
/// of tasks. Scheduling is left to the caller.
pub struct PaymentReconciler {
    lifecycle: Arc<PurchaseLifecycle>,
    oracle: OracleRef,
    subscriptions: SubscriptionStoreRef,
    clock: ClockRef,
    renewal: Duration,
    oracle_timeout: std::time::Duration,
    user_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl PaymentReconciler {
    pub fn new(
        lifecycle: Arc<PurchaseLifecycle>,
        oracle: OracleRef,
        subscriptions: SubscriptionStoreRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            lifecycle,
            oracle,
            subscriptions,
            clock,
            renewal: Duration::days(30),
            oracle_timeout: std::time::Duration::from_secs(5),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: &CheckoutConfig) -> Self {
        self.renewal = config.renewal_period();
        self.oracle_timeout = config.oracle_timeout();
        self
    }

    pub fn with_oracle_timeout(mut self, limit: std::time::Duration) -> Self {
        self.oracle_timeout = limit;
        self
    }

    pub fn lifecycle(&self) -> &Arc<PurchaseLifecycle> {
        &self.lifecycle
    }

    /// Queries the oracle for `id` and applies the resulting transition.
    ///
    /// Confirmation is checked before expiry, so a payment the oracle reports
    /// wins over an elapsed window as long as the purchase is still pending.
    /// An unreachable oracle surfaces `OracleUnreachable` and changes nothing.
    #[instrument(skip(self), fields(purchase = %id))]
    pub async fn reconcile(&self, id: PurchaseId) -> Result<ReconcileOutcome> {
        let purchase = self.lifecycle.get(id).await?;
        if purchase.status.is_terminal() {
            debug!(status = %purchase.status, "already finalized");
            return self.finalized(purchase).await;
        }

        let now = self.clock.now();
        match self.query_oracle(id).await {
            Confirmation::Paid { at } => {
                debug!(paid_at = %at, "oracle reports payment");
                match self.lifecycle.confirm_payment(id, now).await {
                    Ok(completed) => {
                        let subscription = self.grant(&completed).await?;
                        Ok(ReconcileOutcome::Completed {
                            purchase: completed,
                            subscription,
                        })
                    }
                    Err(CheckoutError::AlreadyFinalized { status, .. }) => {
                        debug!(%status, "confirmation rejected, purchase already finalized");
                        self.reread(id).await
                    }
                    Err(CheckoutError::PersistenceConflict { .. }) => self.reread(id).await,
                    Err(e) => Err(e),
                }
            }
            Confirmation::NotPaid if purchase.is_expired(now) => {
                match self.lifecycle.check_expiry(id, now).await {
                    Ok(Some(cancelled)) => Ok(ReconcileOutcome::Expired(cancelled)),
                    Ok(None) | Err(CheckoutError::PersistenceConflict { .. }) => {
                        self.reread(id).await
                    }
                    Err(e) => Err(e),
                }
            }
            Confirmation::NotPaid => Ok(ReconcileOutcome::StillPending(purchase)),
            Confirmation::Unreachable => Err(CheckoutError::OracleUnreachable(format!(
                "no answer for purchase {id}"
            ))),
        }
    }

    /// Reconciles every pending purchase once, in sequence.
    pub async fn reconcile_pending(&self) -> Result<Vec<(PurchaseId, Result<ReconcileOutcome>)>> {
        let ids = self.lifecycle.pending_ids().await?;
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.reconcile(id).await;
            if let Err(e) = &outcome {
                warn!(purchase = %id, error = %e, "reconciliation failed");
            }
            results.push((id, outcome));
        }
        Ok(results)
    }

    /// Grants the entitlement for a completed purchase.
    ///
    /// Replaces any existing row for the user; the new period always runs one
    /// renewal window from the time the grant is written, regardless of time left
    /// on the previous subscription. Idempotent: when the user's row was already
    /// written by this purchase, or by any grant at or after its completion, the
    /// row is returned unchanged.
    pub async fn grant(&self, purchase: &Purchase) -> Result<Subscription> {
        if purchase.status != PurchaseStatus::Completed {
            return Err(CheckoutError::InternalError(
                format!("grant requested for {} purchase {}", purchase.status, purchase.id).into(),
            ));
        }
        let lock = self.user_lock(&purchase.user_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.grant_locked(purchase).await
        };
        drop(lock);
        self.release_user_lock(&purchase.user_id).await;
        result
    }

    async fn grant_locked(&self, purchase: &Purchase) -> Result<Subscription> {
        let storage_timeout = self.lifecycle.storage_timeout();
        let existing = bounded(
            storage_timeout,
            "read subscription",
            self.subscriptions.get(&purchase.user_id),
        )
        .await?;
        if let Some(existing) = existing.filter(|row| covers(row, purchase)) {
            debug!(user = %purchase.user_id, "subscription already granted");
            return Ok(existing);
        }

        // Taken under the user lock so serialized grants never move the end date back.
        let start = self.clock.now();
        let end = start.checked_add_signed(self.renewal).ok_or_else(|| {
            CheckoutError::InternalError(
                format!("renewal period overflows from {start}").into(),
            )
        })?;
        let subscription = Subscription::active(
            purchase.user_id.clone(),
            purchase.plan_id.as_str(),
            start,
            end,
        )
        .granted_by(purchase.id);
        let subscription = bounded(
            storage_timeout,
            "upsert subscription",
            self.subscriptions.upsert_active(subscription),
        )
        .await?;

        info!(
            user = %purchase.user_id,
            plan = %purchase.plan_id,
            until = %subscription.end,
            "subscription granted"
        );
        Ok(subscription)
    }

    /// Terminal purchases write nothing, except that a completed one whose grant
    /// never landed gets it now.
    async fn finalized(&self, purchase: Purchase) -> Result<ReconcileOutcome> {
        if purchase.status == PurchaseStatus::Completed {
            self.grant(&purchase).await?;
        }
        Ok(ReconcileOutcome::Finalized(purchase.status))
    }

    /// A timed-out query counts as unreachable, never as not paid.
    async fn query_oracle(&self, id: PurchaseId) -> Confirmation {
        match tokio::time::timeout(self.oracle_timeout, self.oracle.query(id)).await {
            Ok(Confirmation::Unreachable) => {
                warn!("confirmation oracle unreachable");
                Confirmation::Unreachable
            }
            Ok(answer) => answer,
            Err(_) => {
                warn!(limit = ?self.oracle_timeout, "confirmation oracle timed out");
                Confirmation::Unreachable
            }
        }
    }

    async fn reread(&self, id: PurchaseId) -> Result<ReconcileOutcome> {
        let current = self.lifecycle.get(id).await?;
        if current.status.is_terminal() {
            self.finalized(current).await
        } else {
            Ok(ReconcileOutcome::StillPending(current))
        }
    }

    async fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the user's lock once no other grant holds or awaits it.
    async fn release_user_lock(&self, user_id: &UserId) {
        let mut locks = self.user_locks.lock().await;
        if locks
            .get(user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(user_id);
        }
    }
}

fn covers(existing: &Subscription, purchase: &Purchase) -> bool {
    existing.purchase_id == Some(purchase.id)
        || purchase
            .completed_at
            .is_some_and(|completed_at| existing.start >= completed_at)
}
