//! The single-writer worker and the handle adapters use to reach it.
//!
//! One tokio task owns the snapshot. Alarm fires, commands, raw messages and
//! queries all arrive through one select loop and are handled strictly one
//! at a time. The snapshot is persisted after every alarm or command, never
//! after a query.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use opentelemetry::KeyValue;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, warn};

use super::policy::Trigger;
use super::roster::carry_roster;
use super::snapshot::Snapshot;
use super::workflow::{Effect, Interpreter, Turn, Workflow};
use crate::clock::AlarmClock;
use crate::error::{Error, Result};
use crate::event::{Event, EventBus, EventKind};
use crate::mail::{Email, Outbox, Outgoing};
use crate::store::SnapshotStore;
use crate::telemetry::metrics;
use crate::telemetry::workflow::{record_state_transition, start_event_span};

const MAILBOX_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// The external collaborators an engine calls out to.
pub struct Collaborators<W: Workflow> {
    pub store: Arc<dyn SnapshotStore>,
    pub outbox: Arc<dyn Outbox>,
    pub interpreter: Arc<dyn Interpreter<W>>,
}

pub(super) enum Message<W: Workflow> {
    Command { id: String, command: W::Command },
    Raw(Email),
    Snapshot(oneshot::Sender<Snapshot<W::State, W::Payload>>),
    RenderData(oneshot::Sender<W::View>),
}

enum Wake<W: Workflow> {
    Alarm(DateTime<Utc>),
    Message(Message<W>),
    Shutdown,
}

pub struct Engine<W: Workflow, C: AlarmClock> {
    pub(super) workflow: W,
    pub(super) clock: C,
    pub(super) store: Arc<dyn SnapshotStore>,
    pub(super) outbox: Arc<dyn Outbox>,
    pub(super) interpreter: Arc<dyn Interpreter<W>>,
    pub(super) snapshot: Snapshot<W::State, W::Payload>,
    pub(super) events: EventBus,
    mailbox: mpsc::Receiver<Message<W>>,
    shutdown: CancellationToken,
    /// Mirrors what the clock is armed for.
    armed: Option<DateTime<Utc>>,
    /// The roster as last read from or written to the store.
    pub(super) roster: Option<Vec<u8>>,
}

/// Borrow the snapshot as a handler turn, with the workflow's threshold
/// evaluated against the payload as it stands.
pub(super) fn turn<'a, W: Workflow>(
    workflow: &W,
    snapshot: &'a mut Snapshot<W::State, W::Payload>,
    now: DateTime<Utc>,
) -> Turn<'a, W::State, W::Payload> {
    Turn {
        state: snapshot.state,
        anchor: snapshot.anchor,
        next_event: snapshot.next_event,
        now,
        threshold_met: workflow.threshold_met(&snapshot.payload),
        payload: &mut snapshot.payload,
    }
}

impl<W: Workflow, C: AlarmClock> Engine<W, C> {
    /// Recover (or begin) the workflow and spawn its worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recovery`] when a stored snapshot exists but cannot be
    /// loaded or decoded. The boss is notified on a best-effort basis and no
    /// worker is started.
    pub async fn start(
        workflow: W,
        clock: C,
        collaborators: Collaborators<W>,
    ) -> Result<EngineHandle<W>> {
        let now = clock.now();
        let snapshot = Snapshot::new(
            workflow.initial_state(),
            workflow.anchor(now),
            workflow.new_payload(),
        );
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let shutdown = CancellationToken::new();
        let key = workflow.key().to_string();

        let mut engine = Engine {
            events: EventBus::new(key.clone(), EVENT_CAPACITY),
            workflow,
            clock,
            store: collaborators.store,
            outbox: collaborators.outbox,
            interpreter: collaborators.interpreter,
            snapshot,
            mailbox: rx,
            shutdown: shutdown.clone(),
            armed: None,
            roster: None,
        };
        engine.bootstrap().await?;
        engine.persist().await;

        let events = engine.events.sender();
        let worker = tokio::spawn(engine.run());

        Ok(EngineHandle {
            key: key.into(),
            mailbox: tx,
            shutdown,
            events,
            worker: Arc::new(Mutex::new(Some(worker))),
        })
    }

    async fn run(mut self) {
        let key = self.workflow.key().to_string();
        info!(workflow = %key, state = %self.snapshot.state, "engine worker started");

        loop {
            // Alarm before mailbox, so a fire that is already due is handled
            // ahead of any query that raced it.
            let wake = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                at = self.clock.fired() => Wake::Alarm(at),
                message = self.mailbox.recv() => match message {
                    Some(message) => Wake::Message(message),
                    None => Wake::Shutdown,
                },
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Alarm(at) => {
                    self.on_alarm(at).await;
                    self.persist().await;
                }
                Wake::Message(Message::Command { id, command }) => {
                    let span = start_event_span(
                        &key,
                        "command",
                        Some(&id),
                        &self.snapshot.state.to_string(),
                    );
                    self.dispatch(id, command, None).instrument(span).await;
                    self.persist().await;
                    self.persist_roster().await;
                }
                Wake::Message(Message::Raw(email)) => {
                    let span = start_event_span(
                        &key,
                        "message",
                        Some(&email.message_id),
                        &self.snapshot.state.to_string(),
                    );
                    if self.on_raw_message(email).instrument(span).await {
                        self.persist().await;
                        self.persist_roster().await;
                    }
                }
                Wake::Message(Message::Snapshot(reply)) => {
                    let _ = reply.send(self.snapshot.clone());
                }
                Wake::Message(Message::RenderData(reply)) => {
                    let _ = reply.send(self.workflow.view(&self.snapshot));
                }
            }
        }

        self.disarm();
        info!(workflow = %key, "engine worker stopped");
    }

    async fn on_alarm(&mut self, at: DateTime<Utc>) {
        self.armed = None;
        let span = start_event_span(
            self.workflow.key(),
            "alarm",
            None,
            &self.snapshot.state.to_string(),
        );
        async {
            let now = self.clock.now();
            debug!(%at, %now, "alarm fired");
            let effects = self
                .workflow
                .on_deadline(&mut turn(&self.workflow, &mut self.snapshot, now));
            self.apply(effects, Trigger::Alarm, now).await;
            if self.armed.is_none() {
                self.rearm_current(now);
            }
        }
        .instrument(span)
        .await
    }

    /// Run a transition's effects in order.
    pub(super) async fn apply(
        &mut self,
        effects: Vec<Effect<W::State>>,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) {
        for effect in effects {
            match effect {
                Effect::Notify(message) => {
                    // Failure already logged; notifications never block a transition.
                    let _ = self.deliver(&message).await;
                }
                Effect::Send { message, next } => match self.deliver(&message).await {
                    Ok(()) => self.transition_to(next, now),
                    Err(error) => {
                        warn!(
                            workflow = self.workflow.key(),
                            state = %self.snapshot.state,
                            target = %next,
                            template = %message.template,
                            %trigger,
                            %error,
                            "send failed, state unchanged"
                        );
                        self.send_failed(trigger, &message, &error, now).await;
                        return;
                    }
                },
                Effect::Goto(next) => self.transition_to(next, now),
                Effect::Postpone(by) => self.postpone(by, now),
                Effect::Reset => self.reset(now),
            }
        }
    }

    /// Fill in render data and hand the message to the outbox.
    pub(super) async fn deliver(&self, message: &Outgoing) -> Result<()> {
        let mut message = message.clone();
        if message.view.is_null() {
            match serde_json::to_value(self.workflow.view(&self.snapshot)) {
                Ok(view) => message.view = view,
                Err(e) => error!(template = %message.template, "failed to render view: {e}"),
            }
        }

        let started = Instant::now();
        let result = self.outbox.send(&message).await;
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "outbox.send")],
        );

        match result {
            Ok(()) => {
                debug!(summary = %message.summary(), "message sent");
                Ok(())
            }
            Err(e) => {
                warn!(summary = %message.summary(), error = %e, "failed to send message");
                Err(e)
            }
        }
    }

    async fn send_failed(
        &mut self,
        trigger: Trigger,
        failed: &Outgoing,
        error: &Error,
        now: DateTime<Utc>,
    ) {
        let key = self.workflow.key().to_string();
        metrics::delivery_failures().add(
            1,
            &[
                KeyValue::new("workflow", key.clone()),
                KeyValue::new("trigger", trigger.as_str()),
            ],
        );
        self.events.emit(
            now,
            EventKind::DeliveryFailed {
                template: failed.template.clone(),
                trigger: trigger.to_string(),
                error: error.to_string(),
            },
        );

        let recourse = self.workflow.failure_policy().decide(
            trigger,
            self.workflow.addresses(),
            failed,
            error,
            now,
        );
        if self.deliver(&recourse.notice).await.is_err() {
            error!(workflow = %key, "could not tell the boss about a failed send");
        }

        if let Some(at) = recourse.retry_at {
            info!(workflow = %key, %at, "retrying scheduled transition later");
            self.snapshot.next_event = Some(at);
            self.arm(at);
            metrics::retries_scheduled().add(1, &[KeyValue::new("workflow", key)]);
            self.events.emit(now, EventKind::RetryScheduled { at });
        }
    }

    /// Enter `next` and arm its deadline.
    pub(super) fn transition_to(&mut self, next: W::State, now: DateTime<Utc>) {
        let from = self.snapshot.state;
        let deadline = self.workflow.deadline(next, &self.snapshot, now);
        self.snapshot.state = next;
        self.snapshot.next_event = deadline.resolve(self.snapshot.anchor, now);
        match self.snapshot.next_event {
            Some(at) => self.arm(at),
            None => self.disarm(),
        }

        let (from, to) = (from.to_string(), next.to_string());
        record_state_transition(&Span::current(), &from, &to);
        debug!(next_event = ?self.snapshot.next_event, "deadline set");
        metrics::state_transitions().add(
            1,
            &[
                KeyValue::new("workflow", self.workflow.key().to_string()),
                KeyValue::new("from", from.clone()),
                KeyValue::new("to", to.clone()),
            ],
        );
        self.events.emit(
            now,
            EventKind::StateTransition {
                from,
                to,
                next_event: self.snapshot.next_event,
            },
        );
    }

    /// Start a new cycle: fresh anchor, payload and ledger.
    pub(super) fn reset(&mut self, now: DateTime<Utc>) {
        self.disarm();
        let anchor = self.workflow.anchor(now);
        let fresh = Snapshot::new(
            self.workflow.initial_state(),
            anchor,
            self.workflow.new_payload(),
        );
        let previous = std::mem::replace(&mut self.snapshot, fresh);
        carry_roster(&self.workflow, &previous.payload, &mut self.snapshot.payload);
        info!(workflow = self.workflow.key(), %anchor, "starting a new cycle");
        self.events.emit(now, EventKind::CycleStarted { anchor });
        let initial = self.snapshot.state;
        self.transition_to(initial, now);
    }

    /// Where the pending deadline lands if pushed back by `by`, or `None` if
    /// that is past the end of representable time.
    pub(super) fn postponed(&self, by: Duration, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.snapshot.next_event.unwrap_or(now).checked_add_signed(by)
    }

    fn postpone(&mut self, by: Duration, now: DateTime<Utc>) {
        let Some(next) = self.postponed(by, now) else {
            error!(
                workflow = self.workflow.key(),
                minutes = by.num_minutes(),
                "postponement out of range, next event unchanged"
            );
            return;
        };
        info!(
            workflow = self.workflow.key(),
            minutes = by.num_minutes(),
            next_event = %next,
            "next event postponed"
        );
        self.snapshot.next_event = Some(next);
        self.arm(next);
        self.events.emit(
            now,
            EventKind::Postponed {
                minutes: by.num_minutes(),
                next_event: next,
            },
        );
    }

    /// Arm the deadline of the current state without transitioning. Used when
    /// a fire left nothing armed, so the machine never sleeps forever.
    pub(super) fn rearm_current(&mut self, now: DateTime<Utc>) {
        let state = self.snapshot.state;
        let resolved = self
            .workflow
            .deadline(state, &self.snapshot, now)
            .resolve(self.snapshot.anchor, now);
        let at = match resolved {
            Some(at) if at > now => at,
            _ => now + self.workflow.failure_policy().retry_delay,
        };
        warn!(workflow = self.workflow.key(), %state, %at, "no timer armed, rearming");
        self.snapshot.next_event = Some(at);
        self.arm(at);
    }

    pub(super) fn arm(&mut self, at: DateTime<Utc>) {
        self.clock.set_alarm(at);
        self.armed = Some(at);
    }

    fn disarm(&mut self) {
        self.clock.stop();
        self.armed = None;
    }

    /// Write the snapshot. Failures are logged; the in-memory state stands.
    pub(super) async fn persist(&self) {
        let key = self.workflow.key();
        let now = self.clock.now();
        let bytes = match self.snapshot.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    workflow = key,
                    state = %self.snapshot.state,
                    "failed to encode snapshot: {e}"
                );
                return;
            }
        };

        let started = Instant::now();
        let result = self.store.put(key, &bytes).await;
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "store.put")],
        );

        match result {
            Ok(()) => {
                debug!(workflow = key, bytes = bytes.len(), "snapshot persisted");
                metrics::snapshot_writes().add(
                    1,
                    &[
                        KeyValue::new("workflow", key.to_string()),
                        KeyValue::new("result", "ok"),
                    ],
                );
                self.events
                    .emit(now, EventKind::SnapshotPersisted { bytes: bytes.len() });
            }
            Err(e) => {
                error!(
                    workflow = key,
                    state = %self.snapshot.state,
                    "failed to persist snapshot: {e}"
                );
                metrics::snapshot_writes().add(
                    1,
                    &[
                        KeyValue::new("workflow", key.to_string()),
                        KeyValue::new("result", "error"),
                    ],
                );
                self.events.emit(
                    now,
                    EventKind::SnapshotPersistFailed {
                        error: e.to_string(),
                    },
                );
            }
        }
    }
}

/// Cheap, cloneable access to a running engine.
///
/// Commands and raw messages are fire-and-forget; queries ask the worker and
/// wait for its answer, so they observe every event enqueued before them.
pub struct EngineHandle<W: Workflow> {
    key: Arc<str>,
    mailbox: mpsc::Sender<Message<W>>,
    shutdown: CancellationToken,
    events: broadcast::Sender<Event>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<W: Workflow> Clone for EngineHandle<W> {
    fn clone(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
            mailbox: self.mailbox.clone(),
            shutdown: self.shutdown.clone(),
            events: self.events.clone(),
            worker: Arc::clone(&self.worker),
        }
    }
}

impl<W: Workflow> EngineHandle<W> {
    pub fn key(&self) -> &str {
        &self.key
    }

    async fn enqueue(&self, message: Message<W>) -> Result<()> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(Error::Shutdown),
            sent = self.mailbox.send(message) => sent.map_err(|_| Error::Shutdown),
        }
    }

    /// Queue a typed command under the caller-supplied event id.
    pub async fn submit_command(&self, id: impl Into<String>, command: W::Command) -> Result<()> {
        self.enqueue(Message::Command {
            id: id.into(),
            command,
        })
        .await
    }

    /// Queue a raw inbound message. Its `message_id` is the event id.
    pub async fn submit_raw_message(&self, email: Email) -> Result<()> {
        self.enqueue(Message::Raw(email)).await
    }

    /// Point-in-time copy of the snapshot.
    pub async fn snapshot(&self) -> Result<Snapshot<W::State, W::Payload>> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Message::Snapshot(tx)).await?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    pub async fn render_data(&self) -> Result<W::View> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Message::RenderData(tx)).await?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Engine events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.mailbox.is_closed()
    }

    /// Stop the worker and wait for it to exit. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(workflow = %self.key, "engine worker panicked: {e}");
            }
        }
    }
}
