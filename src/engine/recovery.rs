//! Startup: load, validate, then resume or discard the stored snapshot.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::actor::Engine;
use super::snapshot::Snapshot;
use super::workflow::Workflow;
use crate::clock::AlarmClock;
use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::store::SnapshotStore;

/// What the store held at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<S, P> {
    Missing,
    /// From a cycle whose anchor has already been superseded.
    Stale(Snapshot<S, P>),
    Current(Snapshot<S, P>),
}

/// Fetch and classify the stored snapshot for `workflow`.
///
/// # Errors
///
/// [`Error::Recovery`] for any store failure other than a missing key, and
/// for a blob that does not decode.
pub async fn load<W: Workflow>(
    workflow: &W,
    store: &dyn SnapshotStore,
    now: DateTime<Utc>,
) -> Result<Loaded<W::State, W::Payload>> {
    let bytes = match store.get(workflow.key()).await {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => return Ok(Loaded::Missing),
        Err(e) => return Err(Error::Recovery(format!("failed to load snapshot: {e}"))),
    };
    let snapshot: Snapshot<W::State, W::Payload> = Snapshot::decode(&bytes)
        .map_err(|e| Error::Recovery(format!("failed to decode snapshot: {e}")))?;

    if workflow.anchor(now) > snapshot.anchor {
        Ok(Loaded::Stale(snapshot))
    } else {
        Ok(Loaded::Current(snapshot))
    }
}

impl<W: Workflow, C: AlarmClock> Engine<W, C> {
    /// Establish the in-memory snapshot and arm the alarm, then tell the boss
    /// how it went.
    pub(super) async fn bootstrap(&mut self) -> Result<()> {
        let key = self.workflow.key().to_string();
        let now = self.clock.now();

        let mut report = match load(&self.workflow, self.store.as_ref(), now).await {
            Ok(Loaded::Missing) => {
                info!(workflow = %key, "no snapshot found, starting from scratch");
                self.reset(now);
                String::from("No snapshot found, starting from scratch.")
            }
            Ok(Loaded::Stale(old)) => {
                warn!(
                    workflow = %key,
                    anchor = %old.anchor,
                    "snapshot is from a previous cycle, resetting"
                );
                self.reset(now);
                String::from("Snapshot is from a previous cycle. Resetting.")
            }
            Ok(Loaded::Current(snapshot)) => {
                info!(
                    workflow = %key,
                    state = %snapshot.state,
                    next_event = ?snapshot.next_event,
                    "resuming from snapshot"
                );
                self.snapshot = snapshot;
                self.events.emit(
                    now,
                    EventKind::Resumed {
                        state: self.snapshot.state.to_string(),
                        next_event: self.snapshot.next_event,
                    },
                );
                match self.snapshot.next_event {
                    // May be in the past; it fires at once and the scheduled path catches up.
                    Some(at) => self.arm(at),
                    None => self.rearm_current(now),
                }
                String::from("Snapshot is good. Spinning up...")
            }
            Err(error) => {
                error!(workflow = %key, %error, "startup aborted");
                let notice = self
                    .workflow
                    .addresses()
                    .to_boss("startup_error")
                    .with_error(&error);
                let _ = self.deliver(&notice).await;
                return Err(error);
            }
        };

        if let Some(line) = self.load_roster().await {
            report.push('\n');
            report.push_str(&line);
        }

        if let Some((state, reason)) = self.workflow.resume_guard(&self.snapshot, now) {
            warn!(
                workflow = %key,
                state = %self.snapshot.state,
                forced = %state,
                reason = %reason,
                "resume guard tripped"
            );
            report.push('\n');
            report.push_str(&reason);
            self.transition_to(state, now);
        }

        let notice = self.workflow.addresses().to_boss("startup").with_message(report);
        let _ = self.deliver(&notice).await;
        Ok(())
    }
}
