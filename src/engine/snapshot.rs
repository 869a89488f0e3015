//! The persisted workflow record and its processed-id ledger.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Complete state of one workflow instance, sufficient to resume after a restart.
///
/// Decoding is tolerant: everything except `state` and `reference_time` may be
/// missing and takes its default. The payload's fields are flattened into the
/// top-level record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S, P> {
    pub state: S,
    /// The instant the current cycle revolves around. Changed only by reset.
    #[serde(rename = "reference_time")]
    pub anchor: DateTime<Utc>,
    /// When the alarm is next due. `None` means no pending timer.
    #[serde(default)]
    pub next_event: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: P,
    #[serde(default, rename = "processed_email_ids")]
    pub processed_event_ids: Ledger,
}

impl<S, P> Snapshot<S, P>
where
    S: Serialize + DeserializeOwned,
    P: Serialize + DeserializeOwned,
{
    pub fn new(state: S, anchor: DateTime<Utc>, payload: P) -> Self {
        Self {
            state,
            anchor,
            next_event: None,
            payload,
            processed_event_ids: Ledger::default(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Append-only list of inbound event ids already handled this cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger(Vec<String>);

impl Ledger {
    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|seen| seen == id)
    }

    /// Record `id`. Recording an id twice keeps one entry.
    pub fn record(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.contains(&id) {
            self.0.push(id);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Ledger {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut ledger = Ledger::default();
        for id in iter {
            ledger.record(id);
        }
        ledger
    }
}
