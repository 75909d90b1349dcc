use crate::error::{CheckoutError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Pay,
    Outage,
    Restore,
    Reconcile,
    Cancel,
}

/// One line of a simulation script. `purchase` is a label chosen by the script
/// author, not a stored id.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Event {
    pub r#type: EventType,
    pub purchase: Option<String>,
    pub user: Option<String>,
    pub plan: Option<String>,
    pub at: DateTime<Utc>,
}

impl Event {
    pub fn require_purchase(&self) -> Result<&str> {
        self.purchase
            .as_deref()
            .ok_or_else(|| CheckoutError::InvalidEvent(format!("{:?} needs a purchase label", self.r#type)))
    }
}

/// Reads simulation events from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Event>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    /// Creates a new `EventReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes events.
    pub fn events(self) -> impl Iterator<Item = Result<Event>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(CheckoutError::from))
    }
}
