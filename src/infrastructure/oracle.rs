use crate::domain::ports::{ClockRef, Confirmation, ConfirmationOracle, PurchaseStoreRef};
use crate::domain::purchase::PurchaseId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// An oracle whose settlements are registered explicitly.
///
/// Used by tests and the event simulator. Taking it offline makes every query
/// answer `Unreachable`.
#[derive(Debug)]
pub struct ScriptedOracle {
    settled: RwLock<HashMap<PurchaseId, DateTime<Utc>>>,
    online: AtomicBool,
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self {
            settled: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the transfer for `id` cleared at `at`.
    pub fn settle(&self, id: PurchaseId, at: DateTime<Utc>) {
        let mut settled = self.settled.write().unwrap_or_else(|e| e.into_inner());
        settled.insert(id, at);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConfirmationOracle for ScriptedOracle {
    async fn query(&self, id: PurchaseId) -> Confirmation {
        if !self.online.load(Ordering::SeqCst) {
            return Confirmation::Unreachable;
        }
        let settled = self.settled.read().unwrap_or_else(|e| e.into_inner());
        match settled.get(&id) {
            Some(at) => Confirmation::Paid { at: *at },
            None => Confirmation::NotPaid,
        }
    }
}

/// Sandbox oracle: reports a purchase paid once it is older than `settle_after`.
///
/// Stands in for a real payment network during development.
pub struct DelayedApprovalOracle {
    purchases: PurchaseStoreRef,
    clock: ClockRef,
    settle_after: Duration,
}

impl DelayedApprovalOracle {
    pub fn new(purchases: PurchaseStoreRef, clock: ClockRef, settle_after: Duration) -> Self {
        Self {
            purchases,
            clock,
            settle_after,
        }
    }
}

#[async_trait]
impl ConfirmationOracle for DelayedApprovalOracle {
    async fn query(&self, id: PurchaseId) -> Confirmation {
        match self.purchases.get(id).await {
            Ok(Some(purchase)) => {
                let settles_at = purchase.created_at + self.settle_after;
                if self.clock.now() >= settles_at {
                    Confirmation::Paid { at: settles_at }
                } else {
                    Confirmation::NotPaid
                }
            }
            Ok(None) => Confirmation::NotPaid,
            Err(_) => Confirmation::Unreachable,
        }
    }
}
