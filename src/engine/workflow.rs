//! The seam between the generic engine and a concrete workflow.
//!
//! A [`Workflow`] is data plus pure decisions: its transition table is
//! expressed as lists of [`Effect`]s, its timers as [`Deadline`]s. The engine
//! owns every side effect and every clock read.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::policy::FailurePolicy;
use super::snapshot::Snapshot;
use crate::error::{Error, Result};
use crate::mail::{Email, EmailAddress, Outgoing};

/// Addresses a workflow sends as and to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addresses {
    /// The workflow's own mailbox; outbound mail is sent from here.
    pub own: EmailAddress,
    pub boss: EmailAddress,
    pub list: EmailAddress,
}

impl Addresses {
    pub fn to_boss(&self, template: &str) -> Outgoing {
        Outgoing::new(template, &self.own, &self.boss)
    }

    pub fn to_list(&self, template: &str) -> Outgoing {
        Outgoing::new(template, &self.own, &self.list)
    }

    /// Forward `origin` to the boss when there is one, otherwise just tell the boss.
    pub fn forward_or_boss(&self, template: &str, origin: Option<&Email>) -> Outgoing {
        match origin {
            Some(email) => Outgoing::forward(template, &self.own, &self.boss, email),
            None => self.to_boss(template),
        }
    }

    /// Reply to `origin` when there is one, otherwise tell the boss.
    pub fn reply_or_boss(&self, template: &str, origin: Option<&Email>) -> Outgoing {
        match origin {
            Some(email) => Outgoing::reply(template, &self.own, email),
            None => self.to_boss(template),
        }
    }
}

/// When the alarm should next fire, relative to what.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// No timer.
    None,
    /// Offset from the cycle's anchor.
    Anchored(Duration),
    /// Offset from the current clock reading.
    FromNow(Duration),
    At(DateTime<Utc>),
}

impl Deadline {
    pub fn resolve(self, anchor: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Deadline::None => None,
            Deadline::Anchored(offset) => Some(anchor + offset),
            Deadline::FromNow(delay) => Some(now + delay),
            Deadline::At(at) => Some(at),
        }
    }
}

/// One step of a transition. Effects run in order; the first failed
/// [`Effect::Send`] stops the rest.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect<S> {
    /// Best-effort send. Failure is logged and does not stop later effects.
    Notify(Outgoing),
    /// Send, and transition to `next` only if the send succeeds.
    Send { message: Outgoing, next: S },
    /// Transition without sending.
    Goto(S),
    /// Push the pending deadline back and rearm.
    Postpone(Duration),
    /// Start a new cycle.
    Reset,
}

impl<S> Effect<S> {
    pub fn send(message: Outgoing, next: S) -> Self {
        Effect::Send { message, next }
    }
}

/// What a raw inbound message turns into.
pub enum Intake<C, X> {
    /// Already structured; dispatch directly.
    Command(C),
    /// Free text; ask the interpreter with this context.
    Interpret(X),
    /// Not for us. Not recorded in the ledger.
    Ignore,
}

/// Read-only view of the snapshot plus mutable access to the payload, handed
/// to workflow handlers.
pub struct Turn<'a, S, P> {
    pub state: S,
    pub anchor: DateTime<Utc>,
    pub next_event: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    /// [`Workflow::threshold_met`] for the payload as the turn began.
    pub threshold_met: bool,
    pub payload: &'a mut P,
}

/// A state machine the engine can drive.
pub trait Workflow: Send + Sync + 'static {
    type State: Copy
        + Eq
        + fmt::Debug
        + fmt::Display
        + Serialize
        + DeserializeOwned
        + Send
        + Sync;
    type Payload: Clone
        + fmt::Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync;
    type Command: fmt::Debug + Send + 'static;
    /// What the interpreter is told about the current cycle.
    type Context: Send + Sync + 'static;
    /// Render-ready projection of the snapshot.
    type View: Serialize + Send + 'static;

    /// The store key and the name used in logs and metrics.
    fn key(&self) -> &str;

    fn addresses(&self) -> &Addresses;

    fn failure_policy(&self) -> FailurePolicy;

    fn initial_state(&self) -> Self::State;

    /// The anchor of the cycle that is current at `now`.
    fn anchor(&self, now: DateTime<Utc>) -> DateTime<Utc>;

    /// Payload for a fresh cycle.
    fn new_payload(&self) -> Self::Payload;

    /// The timer for entering `state`. `snapshot` is the record as it was
    /// just before the transition.
    fn deadline(
        &self,
        state: Self::State,
        snapshot: &Snapshot<Self::State, Self::Payload>,
        now: DateTime<Utc>,
    ) -> Deadline;

    /// Whether enough people have signed up. The engine evaluates it before
    /// every handler call and passes the answer in [`Turn::threshold_met`].
    fn threshold_met(&self, payload: &Self::Payload) -> bool;

    /// The alarm fired while in `turn.state`.
    fn on_deadline(
        &self,
        turn: &mut Turn<'_, Self::State, Self::Payload>,
    ) -> Vec<Effect<Self::State>>;

    /// The state a command answers, if it is a reply to an approval request.
    /// A command whose expected state differs from the current one is stale.
    fn expected_state(&self, command: &Self::Command) -> Option<Self::State>;

    /// Handle a command. `origin` is the message it was derived from, if any.
    ///
    /// Return [`Error::MalformedCommand`] to reject it; the engine replies to
    /// the sender and changes nothing.
    fn on_command(
        &self,
        command: Self::Command,
        origin: Option<&Email>,
        turn: &mut Turn<'_, Self::State, Self::Payload>,
    ) -> Result<Vec<Effect<Self::State>>>;

    /// Classify a raw inbound message.
    fn intake(
        &self,
        email: &Email,
        snapshot: &Snapshot<Self::State, Self::Payload>,
    ) -> Intake<Self::Command, Self::Context>;

    /// The command to dispatch when the interpreter fails.
    fn interpretation_failed(&self, error: Error) -> Self::Command;

    /// Checked once at startup, after the snapshot is loaded or a fresh cycle
    /// begun. Returns the state to force and the reason to tell the boss.
    fn resume_guard(
        &self,
        _snapshot: &Snapshot<Self::State, Self::Payload>,
        _now: DateTime<Utc>,
    ) -> Option<(Self::State, String)> {
        None
    }

    /// Store key for data that outlives each cycle, if the workflow keeps any.
    /// The engine loads it at startup, carries it into every fresh cycle and
    /// writes it back whenever it changes.
    fn roster_key(&self) -> Option<&str> {
        None
    }

    /// The cross-cycle part of `payload`, encoded for [`Workflow::roster_key`].
    fn encode_roster(&self, _payload: &Self::Payload) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Install a roster produced by [`Workflow::encode_roster`] into `payload`.
    fn decode_roster(&self, _bytes: &[u8], _payload: &mut Self::Payload) -> Result<()> {
        Ok(())
    }

    fn view(&self, snapshot: &Snapshot<Self::State, Self::Payload>) -> Self::View;
}

/// Turns free text into a typed command. May be slow and may fail.
#[async_trait]
pub trait Interpreter<W: Workflow>: Send + Sync {
    async fn classify(&self, email: &Email, context: &W::Context) -> Result<W::Command>;
}

/// Interpreter for deployments without one: every message is unclassifiable.
#[derive(Debug, Default, Clone)]
pub struct Unclassified;

#[async_trait]
impl<W: Workflow> Interpreter<W> for Unclassified {
    async fn classify(&self, email: &Email, _context: &W::Context) -> Result<W::Command> {
        Err(Error::Delivery(format!(
            "no interpreter configured for message {}",
            email.message_id
        )))
    }
}
