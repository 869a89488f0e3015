//! Idempotent command dispatch.
//!
//! Every inbound event carries an id. A seen id is a logged no-op that never
//! reaches the outbox. An unseen one is handled, then recorded, so a crash
//! mid-handling leads to a redelivery rather than a silent drop.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::actor::{Engine, turn};
use super::policy::Trigger;
use super::workflow::{Effect, Intake, Workflow};
use crate::clock::AlarmClock;
use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::mail::Email;
use crate::telemetry::metrics;

impl<W: Workflow, C: AlarmClock> Engine<W, C> {
    fn is_duplicate(&self, id: &str) -> bool {
        if !self.snapshot.processed_event_ids.contains(id) {
            return false;
        }
        let key = self.workflow.key();
        info!(workflow = key, event_id = id, "already processed this event, ignoring");
        metrics::duplicate_events().add(1, &[KeyValue::new("workflow", key.to_string())]);
        self.events.emit(
            self.clock.now(),
            EventKind::DuplicateIgnored {
                event_id: id.to_string(),
            },
        );
        true
    }

    /// Route one typed command. `origin` is the message it came from, if any.
    pub(super) async fn dispatch(
        &mut self,
        id: String,
        command: W::Command,
        origin: Option<Email>,
    ) {
        if self.is_duplicate(&id) {
            return;
        }
        debug!(event_id = %id, ?command, state = %self.snapshot.state, "dispatching command");

        let now = self.clock.now();
        let outcome = match self.workflow.expected_state(&command) {
            Some(expected) if expected != self.snapshot.state => Err(Error::StaleReply {
                expected: expected.to_string(),
                actual: self.snapshot.state.to_string(),
            }),
            _ => {
                let handled = self.workflow.on_command(
                    command,
                    origin.as_ref(),
                    &mut turn(&self.workflow, &mut self.snapshot, now),
                );
                handled.and_then(|effects| self.check_postpones(&effects, now).map(|()| effects))
            }
        };

        match outcome {
            Ok(effects) => self.apply(effects, Trigger::Command, now).await,
            Err(error) => self.reject(&id, error, origin.as_ref(), now).await,
        }
        self.snapshot.processed_event_ids.record(id);
    }

    /// A postponement past the end of time is the sender's mistake, caught
    /// before any effect runs.
    fn check_postpones(&self, effects: &[Effect<W::State>], now: DateTime<Utc>) -> Result<()> {
        for effect in effects {
            if let Effect::Postpone(by) = effect {
                if self.postponed(*by, now).is_none() {
                    return Err(Error::MalformedCommand(format!(
                        "cannot postpone the next event by {} hours",
                        by.num_hours()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Tell the human why their command did nothing.
    async fn reject(
        &mut self,
        id: &str,
        error: Error,
        origin: Option<&Email>,
        now: DateTime<Utc>,
    ) {
        let template = match error {
            Error::StaleReply { .. } => "invalid_reply_state_email",
            Error::MalformedCommand(_) => "invalid_admin_email",
            _ => {
                error!(
                    workflow = self.workflow.key(),
                    event_id = id,
                    state = %self.snapshot.state,
                    %error,
                    "command handler failed"
                );
                "help"
            }
        };
        warn!(
            workflow = self.workflow.key(),
            event_id = id,
            state = %self.snapshot.state,
            %error,
            "command rejected"
        );
        self.events.emit(
            now,
            EventKind::CommandRejected {
                event_id: id.to_string(),
                reason: error.to_string(),
            },
        );

        let addresses = self.workflow.addresses();
        let notice = if template == "help" {
            addresses.to_boss(template).with_error(&error)
        } else {
            addresses.reply_or_boss(template, origin).with_error(&error)
        };
        // Failure already logged by deliver.
        let _ = self.deliver(&notice).await;
    }

    /// Classify and dispatch a raw message. Returns whether anything was
    /// dispatched and so needs persisting.
    pub(super) async fn on_raw_message(&mut self, email: Email) -> bool {
        let id = email.message_id.clone();
        match self.workflow.intake(&email, &self.snapshot) {
            Intake::Ignore => {
                debug!(event_id = %id, from = %email.from, "not a command, ignoring");
                false
            }
            Intake::Command(command) => {
                self.dispatch(id, command, Some(email)).await;
                true
            }
            Intake::Interpret(context) => {
                if self.is_duplicate(&id) {
                    return false;
                }
                let started = Instant::now();
                let classified = self.interpreter.classify(&email, &context).await;
                metrics::operation_duration_ms().record(
                    started.elapsed().as_secs_f64() * 1000.0,
                    &[KeyValue::new("operation", "interpreter.classify")],
                );
                let command = match classified {
                    Ok(command) => command,
                    Err(error) => {
                        warn!(
                            event_id = %id,
                            from = %email.from,
                            %error,
                            "could not classify message"
                        );
                        self.workflow.interpretation_failed(error)
                    }
                };
                self.dispatch(id, command, Some(email)).await;
                true
            }
        }
    }
}
