//! Data a workflow keeps across cycles, under its own store key.
//!
//! The cycle snapshot is replaced on every reset; the roster is not. It is
//! read once at startup and written only when its encoding changes.

use tracing::{debug, error, info, warn};

use super::actor::Engine;
use super::workflow::Workflow;
use crate::clock::AlarmClock;

/// Move the roster from an outgoing payload into a fresh one.
pub(super) fn carry_roster<W: Workflow>(workflow: &W, from: &W::Payload, into: &mut W::Payload) {
    if workflow.roster_key().is_none() {
        return;
    }
    let carried = workflow
        .encode_roster(from)
        .and_then(|bytes| workflow.decode_roster(&bytes, into));
    if let Err(e) = carried {
        error!(workflow = workflow.key(), "failed to carry roster into the new cycle: {e}");
    }
}

impl<W: Workflow, C: AlarmClock> Engine<W, C> {
    /// Read the stored roster into the current payload. Returns a line for
    /// the startup report, or `None` when the workflow keeps no roster.
    pub(super) async fn load_roster(&mut self) -> Option<String> {
        let key = self.workflow.roster_key()?;
        let line = match self.store.get(key).await {
            Err(e) if e.is_not_found() => {
                info!(workflow = self.workflow.key(), key, "no roster found");
                self.roster = self.workflow.encode_roster(&self.snapshot.payload).ok();
                String::from("No roster found, starting from scratch.")
            }
            Err(e) => {
                warn!(workflow = self.workflow.key(), key, "failed to load roster: {e}");
                format!("Failed to load roster: {e}")
            }
            Ok(bytes) => match self.workflow.decode_roster(&bytes, &mut self.snapshot.payload) {
                Ok(()) => {
                    info!(workflow = self.workflow.key(), key, "roster loaded");
                    self.roster = Some(bytes);
                    String::from("Roster loaded.")
                }
                Err(e) => {
                    warn!(workflow = self.workflow.key(), key, "failed to decode roster: {e}");
                    format!("Failed to decode roster: {e}")
                }
            },
        };
        Some(line)
    }

    /// Write the roster if it differs from what the store last held.
    /// Failures are logged and retried after the next command.
    pub(super) async fn persist_roster(&mut self) {
        let Some(key) = self.workflow.roster_key() else {
            return;
        };
        let bytes = match self.workflow.encode_roster(&self.snapshot.payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(workflow = self.workflow.key(), key, "failed to encode roster: {e}");
                return;
            }
        };
        if self.roster.as_deref() == Some(bytes.as_slice()) {
            return;
        }

        match self.store.put(key, &bytes).await {
            Ok(()) => {
                let len = bytes.len();
                debug!(workflow = self.workflow.key(), key, bytes = len, "roster persisted");
                self.roster = Some(bytes);
            }
            Err(e) => error!(workflow = self.workflow.key(), key, "failed to persist roster: {e}"),
        }
    }
}
