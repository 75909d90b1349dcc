use super::bounded;
use crate::config::CheckoutConfig;
use crate::domain::payload::{PayloadCodec, PaymentRequest, TransactionId};
use crate::domain::plan::Plan;
use crate::domain::ports::PurchaseStoreRef;
use crate::domain::purchase::{
    CancelReason, Purchase, PurchaseId, PurchaseStatus, StatusChange, UserId,
};
use crate::error::{CheckoutError, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// State machine over a purchase's status.
///
/// `Pending` moves to `Completed` or `Cancelled` exactly once. Every transition is
/// a compare-and-swap in the purchase store conditioned on the status observed
/// just before, so concurrent callers produce a single effective write.
pub struct PurchaseLifecycle {
    store: PurchaseStoreRef,
    codec: PayloadCodec,
    txid_prefix: String,
    window: Duration,
    storage_timeout: std::time::Duration,
}

impl PurchaseLifecycle {
    pub fn new(store: PurchaseStoreRef, codec: PayloadCodec) -> Self {
        Self {
            store,
            codec,
            txid_prefix: "AL".to_string(),
            window: Duration::hours(24),
            storage_timeout: std::time::Duration::from_secs(2),
        }
    }

    pub fn from_config(store: PurchaseStoreRef, config: &CheckoutConfig) -> Self {
        let codec = PayloadCodec::new(config.merchant.clone())
            .with_initiation_method(config.include_initiation_method);
        Self {
            store,
            codec,
            txid_prefix: config.txid_prefix.clone(),
            window: config.purchase_window(),
            storage_timeout: config.storage_timeout(),
        }
    }

    pub fn with_storage_timeout(mut self, limit: std::time::Duration) -> Self {
        self.storage_timeout = limit;
        self
    }

    pub fn storage_timeout(&self) -> std::time::Duration {
        self.storage_timeout
    }

    /// Issues a dynamic payment code for `plan` and records a pending purchase
    /// expiring one window after `now`.
    pub async fn create(&self, user_id: UserId, plan: &Plan, now: DateTime<Utc>) -> Result<Purchase> {
        let expires_at = now.checked_add_signed(self.window).ok_or_else(|| {
            CheckoutError::InternalError(format!("purchase window overflows from {now}").into())
        })?;
        let txid = TransactionId::generate(&self.txid_prefix, now);
        let payment_code = self.codec.build(&PaymentRequest::Dynamic {
            amount: plan.price,
            txid: txid.clone(),
        })?;

        let purchase = Purchase {
            id: PurchaseId::new(),
            user_id,
            plan_id: plan.id.clone(),
            amount: plan.price,
            status: PurchaseStatus::Pending,
            created_at: now,
            expires_at,
            completed_at: None,
            txid,
            payment_code,
        };
        bounded(
            self.storage_timeout,
            "create purchase",
            self.store.create(purchase.clone()),
        )
        .await?;

        info!(
            purchase = %purchase.id,
            user = %purchase.user_id,
            plan = %purchase.plan_id,
            amount = %purchase.amount,
            expires_at = %purchase.expires_at,
            "purchase created"
        );
        Ok(purchase)
    }

    pub async fn get(&self, id: PurchaseId) -> Result<Purchase> {
        bounded(self.storage_timeout, "get purchase", self.store.get(id))
            .await?
            .ok_or(CheckoutError::PurchaseNotFound(id))
    }

    pub async fn pending_ids(&self) -> Result<Vec<PurchaseId>> {
        bounded(self.storage_timeout, "list pending", self.store.pending()).await
    }

    /// Marks a pending purchase paid. Fails with `AlreadyFinalized` if it was no
    /// longer pending when the swap ran.
    pub async fn confirm_payment(&self, id: PurchaseId, now: DateTime<Utc>) -> Result<Purchase> {
        let purchase = self.transition(id, StatusChange::complete(now)).await?;
        info!(purchase = %id, user = %purchase.user_id, "payment confirmed");
        Ok(purchase)
    }

    /// Cancels a pending purchase on request or on expiry.
    pub async fn cancel(&self, id: PurchaseId, reason: CancelReason) -> Result<Purchase> {
        let purchase = self.transition(id, StatusChange::cancel()).await?;
        info!(purchase = %id, %reason, "purchase cancelled");
        Ok(purchase)
    }

    /// Cancels the purchase if its window has closed while still pending.
    ///
    /// Returns the cancelled record only to the caller whose swap took effect.
    pub async fn check_expiry(&self, id: PurchaseId, now: DateTime<Utc>) -> Result<Option<Purchase>> {
        let purchase = self.get(id).await?;
        if purchase.status.is_terminal() || !purchase.is_expired(now) {
            return Ok(None);
        }
        match self.cancel(id, CancelReason::Expired).await {
            Ok(cancelled) => Ok(Some(cancelled)),
            Err(CheckoutError::AlreadyFinalized { status, .. }) => {
                debug!(purchase = %id, %status, "expiry lost to a concurrent transition");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn transition(&self, id: PurchaseId, change: StatusChange) -> Result<Purchase> {
        let observed = self.get(id).await?;
        if observed.status.is_terminal() {
            debug!(purchase = %id, status = %observed.status, next = %change.next, "transition on finalized purchase");
            return Err(CheckoutError::AlreadyFinalized {
                id,
                status: observed.status,
            });
        }

        let swap = self
            .store
            .compare_and_swap_status(id, observed.status, change);
        match bounded(self.storage_timeout, "swap purchase status", swap).await {
            Err(CheckoutError::PersistenceConflict { actual, .. }) if actual.is_terminal() => {
                Err(CheckoutError::AlreadyFinalized { id, status: actual })
            }
            other => other,
        }
    }
}
