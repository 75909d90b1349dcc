use super::amount::Amount;
use super::payload::TransactionId;
use crate::error::CheckoutError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseId(Uuid);

impl PurchaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for PurchaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Purchase status. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Cancelled,
}

impl PurchaseStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PurchaseStatus::Pending)
    }

    /// The full transition table.
    pub fn can_transition_to(self, next: PurchaseStatus) -> bool {
        matches!(
            (self, next),
            (PurchaseStatus::Pending, PurchaseStatus::Completed)
                | (PurchaseStatus::Pending, PurchaseStatus::Cancelled)
        )
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Cancelled => "cancelled",
        })
    }
}

/// Why a purchase was cancelled. Both reasons end in [`PurchaseStatus::Cancelled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Requested,
    Expired,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CancelReason::Requested => "requested",
            CancelReason::Expired => "expired",
        })
    }
}

/// The write half of a compare-and-swap on a purchase's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub next: PurchaseStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    pub fn complete(at: DateTime<Utc>) -> Self {
        Self {
            next: PurchaseStatus::Completed,
            completed_at: Some(at),
        }
    }

    pub fn cancel() -> Self {
        Self {
            next: PurchaseStatus::Cancelled,
            completed_at: None,
        }
    }
}

/// A record of an attempted entitlement sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub user_id: UserId,
    pub plan_id: String,
    pub amount: Amount,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub txid: TransactionId,
    pub payment_code: String,
}

impl Purchase {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left before the payment code expires, zero once past.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    /// Applies `change` if the transition table allows it.
    pub fn apply(&mut self, change: StatusChange) -> Result<(), CheckoutError> {
        if !self.status.can_transition_to(change.next) {
            return Err(CheckoutError::AlreadyFinalized {
                id: self.id,
                status: self.status,
            });
        }
        self.status = change.next;
        self.completed_at = change.completed_at;
        Ok(())
    }
}
