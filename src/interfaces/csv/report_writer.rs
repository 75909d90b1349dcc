use crate::domain::purchase::{Purchase, PurchaseStatus};
use crate::domain::subscription::{Subscription, SubscriptionStatus};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct PurchaseRow<'a> {
    purchase: &'a str,
    user: &'a str,
    plan: &'a str,
    amount: String,
    status: PurchaseStatus,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct SubscriptionRow<'a> {
    user: &'a str,
    plan: &'a str,
    status: SubscriptionStatus,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Writes the final purchase and subscription state as two CSV tables.
pub struct ReportWriter<W: Write> {
    sink: W,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// `label` maps a purchase to the name shown in the first column.
    pub fn write_purchases<F>(&mut self, purchases: &[Purchase], label: F) -> Result<()>
    where
        F: Fn(&Purchase) -> String,
    {
        let mut writer = csv::Writer::from_writer(&mut self.sink);
        for purchase in purchases {
            let name = label(purchase);
            writer.serialize(PurchaseRow {
                purchase: &name,
                user: purchase.user_id.as_str(),
                plan: &purchase.plan_id,
                amount: purchase.amount.to_wire(),
                status: purchase.status,
                completed_at: purchase.completed_at,
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Status is evaluated at `now`, so lapsed subscriptions show as inactive.
    pub fn write_subscriptions(
        &mut self,
        subscriptions: &[Subscription],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut writer = csv::Writer::from_writer(&mut self.sink);
        for subscription in subscriptions {
            writer.serialize(SubscriptionRow {
                user: subscription.user_id.as_str(),
                plan: &subscription.plan_id,
                status: subscription.effective_status(now),
                start: subscription.start,
                end: subscription.end,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}
