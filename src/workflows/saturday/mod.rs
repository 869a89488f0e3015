//! Saturday disco: the quorum- and approval-gated weekly game.
//!
//! Invite goes out Tuesday morning after the boss approves (or doesn't
//! answer within the approval window), sign-ups accumulate, a badger goes
//! out Thursday afternoon if quorum isn't reached, and on Friday morning the
//! boss is asked to approve game-on or no-game. Every decision point
//! re-checks quorum, since sign-ups change at any time.

mod intake;
pub mod participants;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::clock::AnchorRule;
use crate::config::WorkflowSettings;
use crate::engine::{Addresses, Deadline, Effect, FailurePolicy, Intake, Snapshot, Turn, Workflow};
use crate::error::{Error, Result};
use crate::mail::{Email, EmailAddress, Outgoing};

pub use participants::{MAX_COUNT, Participant, Participants};

pub const KEY: &str = "saturday-disco";

/// Game time: Saturday 10am, or 10:30 outside daylight saving.
pub const ANCHOR: AnchorRule = AnchorRule::SaturdayAt10Or1030;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Pending,
    RequestedInviteApproval,
    InviteSent,
    RequestedBadgerApproval,
    BadgerSent,
    BadgerNotSent,
    RequestedGameOnApproval,
    RequestedNoGameApproval,
    NoInviteSent,
    NoGameSent,
    GameOnSent,
    ReminderSent,
    Abort,
}

impl State {
    pub const ALL: [State; 13] = [
        State::Pending,
        State::RequestedInviteApproval,
        State::InviteSent,
        State::RequestedBadgerApproval,
        State::BadgerSent,
        State::BadgerNotSent,
        State::RequestedGameOnApproval,
        State::RequestedNoGameApproval,
        State::NoInviteSent,
        State::NoGameSent,
        State::GameOnSent,
        State::ReminderSent,
        State::Abort,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::RequestedInviteApproval => "requested_invite_approval",
            State::InviteSent => "invite_sent",
            State::RequestedBadgerApproval => "requested_badger_approval",
            State::BadgerSent => "badger_sent",
            State::BadgerNotSent => "badger_not_sent",
            State::RequestedGameOnApproval => "requested_game_on_approval",
            State::RequestedNoGameApproval => "requested_no_game_approval",
            State::NoInviteSent => "no_invite_sent",
            State::NoGameSent => "no_game_sent",
            State::GameOnSent => "game_on_sent",
            State::ReminderSent => "reminder_sent",
            State::Abort => "abort",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The approval request a boss reply answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRequest {
    Invite,
    Badger,
    GameOn,
    NoGame,
}

impl ApprovalRequest {
    pub fn state(self) -> State {
        match self {
            ApprovalRequest::Invite => State::RequestedInviteApproval,
            ApprovalRequest::Badger => State::RequestedBadgerApproval,
            ApprovalRequest::GameOn => State::RequestedGameOnApproval,
            ApprovalRequest::NoGame => State::RequestedNoGameApproval,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ApprovalRequest::Invite => "invite",
            ApprovalRequest::Badger => "badger",
            ApprovalRequest::GameOn => "game on",
            ApprovalRequest::NoGame => "no game",
        }
    }

    pub fn from_reply_subject(subject: &str) -> Option<Self> {
        [
            ("Re: [invite-approval-request]", ApprovalRequest::Invite),
            ("Re: [badger-approval-request]", ApprovalRequest::Badger),
            ("Re: [game-on-approval-request]", ApprovalRequest::GameOn),
            ("Re: [no-game-approval-request]", ApprovalRequest::NoGame),
        ]
        .into_iter()
        .find_map(|(prefix, request)| subject.starts_with(prefix).then_some(request))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Approve,
    Deny,
    /// Push the pending deadline back this many hours.
    Delay(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Reply {
        to: ApprovalRequest,
        verb: Verb,
        additional: Option<String>,
    },
    AdminStatus,
    AdminDebug,
    AdminAbort,
    AdminReset,
    AdminGameOn {
        additional: Option<String>,
    },
    AdminNoGame {
        additional: Option<String>,
    },
    AdminSetCount {
        address: EmailAddress,
        count: u32,
    },
    PlayerSetCount {
        address: EmailAddress,
        count: u32,
    },
    PlayerIgnore,
    PlayerError {
        error: String,
    },
    /// Unparseable admin syntax.
    Invalid {
        reason: String,
    },
}

impl Command {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Command::Invalid {
            reason: reason.into(),
        }
    }
}

/// What the interpreter knows about a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerContext {
    pub current_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payload {
    pub participants: Participants,
}

/// Render data for templates.
#[derive(Debug, Clone, Serialize)]
pub struct View {
    pub state: State,
    pub game_date: String,
    pub game_time: String,
    pub next_event: Option<String>,
    pub has_quorum: bool,
    pub game_on: bool,
    pub game_off: bool,
    pub total_count: u32,
    pub quorum: u32,
    pub public_participants: String,
    pub participants: Participants,
    pub disco_email: String,
}

pub struct SaturdayDisco {
    addresses: Addresses,
    tz: Tz,
    quorum: u32,
    approval_wait: Duration,
    policy: FailurePolicy,
}

impl SaturdayDisco {
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a configured duration is out of range.
    pub fn new(addresses: Addresses, tz: Tz, settings: &WorkflowSettings) -> Result<Self> {
        Ok(Self {
            addresses,
            tz,
            quorum: settings.quorum,
            approval_wait: settings.approval_wait()?,
            policy: FailurePolicy::new(settings.retry_delay()?),
        })
    }

    fn request(&self, template: &str, now: DateTime<Utc>) -> Outgoing {
        self.addresses
            .to_boss(template)
            .with_next_event(now + self.approval_wait)
    }

    fn request_game_on(&self, now: DateTime<Utc>) -> Effect<State> {
        Effect::send(
            self.request("request_game_on_approval", now),
            State::RequestedGameOnApproval,
        )
    }

    fn request_no_game(&self, now: DateTime<Utc>) -> Effect<State> {
        Effect::send(
            self.request("request_no_game_approval", now),
            State::RequestedNoGameApproval,
        )
    }

    fn list(&self, template: &str, message: Option<String>) -> Outgoing {
        self.addresses.to_list(template).with_optional_message(message)
    }

    fn on_reply(
        &self,
        to: ApprovalRequest,
        verb: Verb,
        additional: Option<String>,
        origin: Option<&Email>,
        turn: &Turn<'_, State, Payload>,
    ) -> Vec<Effect<State>> {
        let reply = |template: &str| self.addresses.reply_or_boss(template, origin);
        let quorum = turn.threshold_met;

        let approved = match verb {
            Verb::Delay(hours) => {
                return vec![
                    Effect::Postpone(Duration::hours(i64::from(hours))),
                    Effect::Notify(reply("acknowledge_delay").with_message(format!(
                        "the {} email by {hours} hours",
                        to.describe()
                    ))),
                ];
            }
            Verb::Approve => true,
            Verb::Deny => false,
        };

        match (to, approved) {
            (ApprovalRequest::Invite, true) => {
                vec![Effect::send(self.list("invitation", additional), State::InviteSent)]
            }
            (ApprovalRequest::Invite, false) => {
                vec![Effect::send(self.list("no_invitation", additional), State::NoInviteSent)]
            }
            (ApprovalRequest::Badger, true) => {
                vec![Effect::send(self.list("badger", additional), State::BadgerSent)]
            }
            (ApprovalRequest::Badger, false) => vec![Effect::Goto(State::BadgerNotSent)],
            (ApprovalRequest::GameOn, true) if quorum => {
                vec![Effect::send(self.list("game_on", additional), State::GameOnSent)]
            }
            (ApprovalRequest::GameOn, true) => vec![
                Effect::Notify(reply("invalid_admin_email").with_error(QUORUM_LOST)),
                self.request_no_game(turn.now),
            ],
            (ApprovalRequest::GameOn, false) => {
                vec![Effect::send(self.list("no_game", additional), State::NoGameSent)]
            }
            (ApprovalRequest::NoGame, _) if quorum => vec![
                Effect::Notify(reply("invalid_admin_email").with_error(QUORUM_GAINED)),
                self.request_game_on(turn.now),
            ],
            (ApprovalRequest::NoGame, true) => {
                vec![Effect::send(self.list("no_game", additional), State::NoGameSent)]
            }
            (ApprovalRequest::NoGame, false) => {
                vec![Effect::send(reply("abort"), State::Abort)]
            }
        }
    }
}

const QUORUM_LOST: &str =
    "Quorum was lost before this approval came in.  Starting the No-Game flow soon.";
const QUORUM_GAINED: &str =
    "Quorum was gained before this came in.  Starting the Game-On flow soon.";
const LATE_INVITE: &str = "It's after Thursday at 2pm and we haven't sent the invite yet.  \
    Aborting.  You'll need to take over, boss.";

fn count_out_of_range(address: &EmailAddress, count: u32) -> String {
    format!("count {count} for {address} is out of range, must be at most {MAX_COUNT}")
}

impl Workflow for SaturdayDisco {
    type State = State;
    type Payload = Payload;
    type Command = Command;
    type Context = PlayerContext;
    type View = View;

    fn key(&self) -> &str {
        KEY
    }

    fn addresses(&self) -> &Addresses {
        &self.addresses
    }

    fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    fn initial_state(&self) -> State {
        State::Pending
    }

    fn anchor(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        ANCHOR.next_after(now, self.tz)
    }

    fn new_payload(&self) -> Payload {
        Payload::default()
    }

    fn deadline(
        &self,
        state: State,
        _snapshot: &Snapshot<State, Payload>,
        _now: DateTime<Utc>,
    ) -> Deadline {
        match state {
            // Tuesday 6am
            State::Pending => Deadline::Anchored(-Duration::days(4) - Duration::hours(4)),
            // Thursday 2pm
            State::InviteSent => Deadline::Anchored(-Duration::days(2) + Duration::hours(4)),
            // Friday 6am
            State::BadgerSent | State::BadgerNotSent => {
                Deadline::Anchored(-Duration::days(1) - Duration::hours(4))
            }
            State::RequestedInviteApproval
            | State::RequestedBadgerApproval
            | State::RequestedGameOnApproval
            | State::RequestedNoGameApproval => Deadline::FromNow(self.approval_wait),
            // Saturday 6am
            State::GameOnSent => Deadline::Anchored(-Duration::hours(4)),
            State::NoInviteSent | State::NoGameSent | State::ReminderSent | State::Abort => {
                Deadline::Anchored(Duration::hours(2))
            }
        }
    }

    fn threshold_met(&self, payload: &Payload) -> bool {
        payload.participants.total() >= self.quorum
    }

    fn on_deadline(&self, turn: &mut Turn<'_, State, Payload>) -> Vec<Effect<State>> {
        let now = turn.now;
        let quorum = turn.threshold_met;
        let effect = match turn.state {
            State::Pending => Effect::send(
                self.request("request_invite_approval", now),
                State::RequestedInviteApproval,
            ),
            State::RequestedInviteApproval => {
                Effect::send(self.list("invitation", None), State::InviteSent)
            }
            State::InviteSent if quorum => self.request_game_on(now),
            State::InviteSent => Effect::send(
                self.request("request_badger_approval", now),
                State::RequestedBadgerApproval,
            ),
            State::RequestedBadgerApproval if quorum => self.request_game_on(now),
            State::RequestedBadgerApproval => {
                Effect::send(self.list("badger", None), State::BadgerSent)
            }
            State::BadgerSent | State::BadgerNotSent if quorum => self.request_game_on(now),
            State::BadgerSent | State::BadgerNotSent => self.request_no_game(now),
            State::RequestedGameOnApproval if quorum => {
                Effect::send(self.list("game_on", None), State::GameOnSent)
            }
            State::RequestedGameOnApproval => self.request_no_game(now),
            State::RequestedNoGameApproval if quorum => self.request_game_on(now),
            State::RequestedNoGameApproval => {
                Effect::send(self.list("no_game", None), State::NoGameSent)
            }
            State::GameOnSent => Effect::send(self.list("reminder", None), State::ReminderSent),
            State::NoInviteSent | State::NoGameSent | State::ReminderSent | State::Abort => {
                Effect::Reset
            }
        };
        vec![effect]
    }

    fn expected_state(&self, command: &Command) -> Option<State> {
        match command {
            Command::Reply { to, .. } => Some(to.state()),
            _ => None,
        }
    }

    fn on_command(
        &self,
        command: Command,
        origin: Option<&Email>,
        turn: &mut Turn<'_, State, Payload>,
    ) -> Result<Vec<Effect<State>>> {
        let addrs = &self.addresses;
        let effects = match command {
            Command::Reply {
                to,
                verb,
                additional,
            } => self.on_reply(to, verb, additional, origin, turn),
            Command::AdminStatus => {
                vec![Effect::Notify(addrs.reply_or_boss("boss_status", origin))]
            }
            Command::AdminDebug => vec![Effect::Notify(
                addrs
                    .reply_or_boss("boss_debug", origin)
                    .with_message("Here's what a **multiline message** looks like.\n\n_Woohoo!_")
                    .with_error("And this is what an error looks like!"),
            )],
            Command::AdminAbort => {
                vec![Effect::send(addrs.reply_or_boss("abort", origin), State::Abort)]
            }
            Command::AdminReset => vec![
                Effect::Notify(addrs.reply_or_boss("reset", origin)),
                Effect::Reset,
            ],
            Command::AdminGameOn { additional } => {
                vec![Effect::send(self.list("game_on", additional), State::GameOnSent)]
            }
            Command::AdminNoGame { additional } => {
                vec![Effect::send(self.list("no_game", additional), State::NoGameSent)]
            }
            Command::AdminSetCount { address, count } => {
                if count > MAX_COUNT {
                    return Err(Error::MalformedCommand(count_out_of_range(&address, count)));
                }
                turn.payload
                    .participants
                    .update_count(&address, count, origin);
                vec![Effect::Notify(
                    addrs
                        .reply_or_boss("acknowledge_admin_set_count", origin)
                        .with_message(format!("{address} to {count}")),
                )]
            }
            Command::PlayerSetCount { address, count } if count > MAX_COUNT => {
                vec![Effect::Notify(
                    addrs
                        .forward_or_boss("error_player_command", origin)
                        .with_error(count_out_of_range(&address, count)),
                )]
            }
            Command::PlayerSetCount { address, count } => {
                turn.payload
                    .participants
                    .update_count(&address, count, origin);
                vec![Effect::Notify(
                    addrs
                        .forward_or_boss("acknowledge_player_set_count", origin)
                        .with_message(count.to_string()),
                )]
            }
            Command::PlayerIgnore => Vec::new(),
            Command::PlayerError { error } => vec![Effect::Notify(
                addrs
                    .forward_or_boss("error_player_command", origin)
                    .with_error(error),
            )],
            Command::Invalid { reason } => return Err(Error::MalformedCommand(reason)),
        };
        Ok(effects)
    }

    fn intake(
        &self,
        email: &Email,
        snapshot: &Snapshot<State, Payload>,
    ) -> Intake<Command, PlayerContext> {
        intake::classify(&self.addresses, &snapshot.payload.participants, email)
    }

    fn interpretation_failed(&self, error: Error) -> Command {
        Command::PlayerError {
            error: error.to_string(),
        }
    }

    fn resume_guard(
        &self,
        snapshot: &Snapshot<State, Payload>,
        now: DateTime<Utc>,
    ) -> Option<(State, String)> {
        let invite_cutoff = snapshot.anchor - Duration::days(2) + Duration::hours(4);
        let early = matches!(
            snapshot.state,
            State::Pending | State::RequestedInviteApproval
        );
        (early && now >= invite_cutoff).then(|| (State::Abort, String::from(LATE_INVITE)))
    }

    fn view(&self, snapshot: &Snapshot<State, Payload>) -> View {
        let anchor = snapshot.anchor.with_timezone(&self.tz);
        let participants = &snapshot.payload.participants;
        View {
            state: snapshot.state,
            game_date: anchor.format("%-m/%-d").to_string(),
            game_time: anchor.format("%-I:%M%P").to_string(),
            next_event: snapshot.next_event.map(|at| {
                at.with_timezone(&self.tz)
                    .format("%A %-m/%-d %-I:%M%P")
                    .to_string()
            }),
            has_quorum: self.threshold_met(&snapshot.payload),
            game_on: matches!(snapshot.state, State::GameOnSent | State::ReminderSent),
            game_off: matches!(snapshot.state, State::NoInviteSent | State::NoGameSent),
            total_count: participants.total(),
            quorum: self.quorum,
            public_participants: participants.public(),
            participants: participants.clone(),
            disco_email: self.addresses.own.to_string(),
        }
    }
}
