//! Application layer orchestrating the purchase lifecycle.
//!
//! `PurchaseLifecycle` owns every status transition of a purchase and
//! `PaymentReconciler` drives those transitions from the confirmation oracle,
//! granting the subscription once a purchase completes. Both receive their
//! stores, oracle and clock at construction; there is no process-wide handle.

pub mod lifecycle;
pub mod reconciler;

use crate::error::{CheckoutError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Runs a persistence call under `limit`. Elapsing is reported as `StorageUnavailable`.
pub(crate) async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, ?limit, "storage call timed out");
            Err(CheckoutError::StorageUnavailable(format!(
                "{operation} timed out after {limit:?}"
            )))
        }
    }
}
