//! Lunchtime disco: players pick from sixteen weekday slots, the boss picks
//! the game.
//!
//! The workflow pings the boss every morning until it sends an invite or a
//! no-invite, then waits for a game-on (with the chosen slot) or no-game.
//! Game-on schedules a reminder for the morning of the game. List mail goes
//! out from the boss, threaded under the first list email the boss sent.

pub mod games;
pub mod participants;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::clock::{AnchorRule, day_of_at_6am};
use crate::config::WorkflowSettings;
use crate::engine::{Addresses, Deadline, Effect, FailurePolicy, Intake, Snapshot, Turn, Workflow};
use crate::error::{Error, Result};
use crate::mail::{Email, EmailAddress, Outgoing};

pub use games::{Game, GameKey, build_games};
pub use participants::{HistoricalParticipants, Participant, Participants, Selection};

pub const KEY: &str = "lunchtime-disco";

/// Store key for [`HistoricalParticipants`].
pub const ROSTER_KEY: &str = "lunchtime-participants";

/// Game slots are offsets back from Saturday 10am.
pub const ANCHOR: AnchorRule = AnchorRule::SaturdayAt10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Pending,
    InviteSent,
    NoInviteSent,
    NoGameSent,
    GameOnSent,
    ReminderSent,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::InviteSent => "invite_sent",
            State::NoInviteSent => "no_invite_sent",
            State::NoGameSent => "no_game_sent",
            State::GameOnSent => "game_on_sent",
            State::ReminderSent => "reminder_sent",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Boss mail to the list; the first one becomes the thread.
    CaptureThreadEmail {
        email: Email,
    },
    AdminBadger {
        additional: Option<String>,
    },
    AdminGameOn {
        key: GameKey,
        /// Free-form time of day, e.g. `12:30pm`, overriding the slot's.
        adjusted_time: Option<String>,
        additional: Option<String>,
    },
    AdminNoGame {
        additional: Option<String>,
    },
    AdminInvite {
        additional: Option<String>,
    },
    AdminNoInvite {
        additional: Option<String>,
    },
    /// A structured submission from the picker.
    SubmitGames {
        participant: Participant,
    },
    /// A text selection such as `A,B-D,!C`.
    SetGames {
        address: EmailAddress,
        selection: String,
    },
    PlayerError {
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payload {
    pub guid: String,
    pub boss_guid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_email: Option<Email>,
    pub participants: Participants,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_on_game_key: Option<GameKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_on_adjusted_time: Option<String>,
    /// Stored under [`ROSTER_KEY`], not in the cycle snapshot.
    #[serde(skip)]
    pub historical_participants: HistoricalParticipants,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub key: GameKey,
    pub day: String,
    pub date: String,
    pub time: String,
    pub count: usize,
    pub public_participants: String,
}

/// Render data for templates.
#[derive(Debug, Clone, Serialize)]
pub struct View {
    pub state: State,
    pub guid: String,
    pub boss_guid: String,
    pub week_of: String,
    pub next_event: Option<String>,
    pub games: Vec<GameView>,
    pub game_on_game: Option<GameView>,
    pub game_on_full_start_time: Option<String>,
    pub game_on_adjusted_time: Option<String>,
    pub game_off: bool,
    pub has_viable_game: bool,
    pub participants: Participants,
    pub historical_participants: HistoricalParticipants,
    pub disco_email: String,
}

pub struct LunchtimeDisco {
    addresses: Addresses,
    tz: Tz,
    /// Players needed for a slot to count as viable.
    quorum: u32,
    policy: FailurePolicy,
}

impl LunchtimeDisco {
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the retry delay is out of range.
    pub fn new(addresses: Addresses, tz: Tz, settings: &WorkflowSettings) -> Result<Self> {
        Ok(Self {
            addresses,
            tz,
            quorum: settings.quorum,
            policy: FailurePolicy::new(settings.retry_delay()?),
        })
    }

    /// List mail goes out as the boss, copying the boss, in the captured thread.
    fn list(&self, template: &str, payload: &Payload, message: Option<String>) -> Outgoing {
        let mut out = Outgoing::new(template, &self.addresses.boss, &self.addresses.list)
            .with_optional_message(message);
        out.cc.push(self.addresses.boss.clone());
        match &payload.thread_email {
            Some(thread) => out.in_thread(thread),
            None => out,
        }
    }

    fn game_view(&self, game: &Game) -> GameView {
        let local = game.start_time.with_timezone(&self.tz);
        GameView {
            key: game.key,
            day: local.format("%a").to_string(),
            date: local.format("%A %-m/%-d").to_string(),
            time: local.format("%-I%p").to_string(),
            count: game.count(),
            public_participants: game.public_participants(),
        }
    }
}

impl Workflow for LunchtimeDisco {
    type State = State;
    type Payload = Payload;
    type Command = Command;
    type Context = ();
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
        Payload {
            guid: Uuid::new_v4().to_string(),
            boss_guid: Uuid::new_v4().to_string(),
            ..Payload::default()
        }
    }

    fn deadline(
        &self,
        state: State,
        snapshot: &Snapshot<State, Payload>,
        now: DateTime<Utc>,
    ) -> Deadline {
        match state {
            // First ping on Sunday morning, then every morning after.
            State::Pending | State::InviteSent => match snapshot.next_event {
                None => Deadline::At(day_of_at_6am(snapshot.anchor - Duration::days(6), self.tz)),
                Some(_) => Deadline::At(day_of_at_6am(now + Duration::days(1), self.tz)),
            },
            // Morning of the chosen game.
            State::GameOnSent => {
                let offset = snapshot
                    .payload
                    .game_on_game_key
                    .map_or_else(Duration::zero, GameKey::offset);
                Deadline::At(day_of_at_6am(snapshot.anchor + offset, self.tz))
            }
            State::NoInviteSent | State::NoGameSent | State::ReminderSent => {
                Deadline::Anchored(Duration::hours(2))
            }
        }
    }

    fn threshold_met(&self, payload: &Payload) -> bool {
        let quorum = usize::try_from(self.quorum).unwrap_or(usize::MAX);
        GameKey::ALL.iter().any(|key| {
            payload
                .participants
                .iter()
                .filter(|p| p.game_keys.contains(key))
                .count()
                >= quorum
        })
    }

    fn on_deadline(&self, turn: &mut Turn<'_, State, Payload>) -> Vec<Effect<State>> {
        let effect = match turn.state {
            State::Pending | State::InviteSent => {
                Effect::send(self.addresses.to_boss("monitor"), turn.state)
            }
            State::GameOnSent => Effect::send(
                self.list("reminder", turn.payload, None),
                State::ReminderSent,
            ),
            State::NoInviteSent | State::NoGameSent | State::ReminderSent => Effect::Reset,
        };
        vec![effect]
    }

    fn expected_state(&self, _command: &Command) -> Option<State> {
        None
    }

    fn on_command(
        &self,
        command: Command,
        origin: Option<&Email>,
        turn: &mut Turn<'_, State, Payload>,
    ) -> Result<Vec<Effect<State>>> {
        let payload = &mut *turn.payload;
        let effects = match command {
            Command::CaptureThreadEmail { email } => {
                if payload.thread_email.is_none() {
                    info!(workflow = KEY, subject = %email.subject, "capturing thread email");
                    payload.thread_email = Some(email);
                }
                Vec::new()
            }
            Command::AdminBadger { additional } => {
                vec![Effect::Notify(self.list("badger", payload, additional))]
            }
            Command::AdminGameOn {
                key,
                adjusted_time,
                additional,
            } => {
                payload.game_on_game_key = Some(key);
                payload.game_on_adjusted_time = adjusted_time;
                vec![Effect::send(
                    self.list("game_on", payload, additional),
                    State::GameOnSent,
                )]
            }
            Command::AdminNoGame { additional } => {
                payload.game_on_game_key = None;
                payload.game_on_adjusted_time = None;
                vec![Effect::send(
                    self.list("no_game", payload, additional),
                    State::NoGameSent,
                )]
            }
            Command::AdminInvite { additional } => vec![Effect::send(
                self.list("invitation", payload, additional),
                State::InviteSent,
            )],
            Command::AdminNoInvite { additional } => vec![Effect::send(
                self.list("no_invitation", payload, additional),
                State::NoInviteSent,
            )],
            Command::SubmitGames { participant } => {
                let mut message = participant.games_ack_message();
                if let Some(comments) = &participant.comments {
                    message.push_str("\n\n");
                    message.push_str(comments);
                }
                payload
                    .historical_participants
                    .add_or_update(&participant.address);
                payload.participants.add_or_update(participant);
                vec![Effect::Notify(
                    self.addresses
                        .to_boss("acknowledge_set_games")
                        .with_message(message),
                )]
            }
            Command::SetGames { address, selection } => {
                let selection = Selection::parse(&selection)?;
                payload.historical_participants.add_or_update(&address);
                let result = payload.participants.select(&address, selection);
                vec![Effect::Notify(
                    self.addresses
                        .reply_or_boss("acknowledge_set_games", origin)
                        .with_message(format!("{address} {result}")),
                )]
            }
            Command::PlayerError { error } => vec![Effect::Notify(
                self.addresses
                    .forward_or_boss("error_player_command", origin)
                    .with_error(error),
            )],
        };
        Ok(effects)
    }

    fn intake(&self, email: &Email, _snapshot: &Snapshot<State, Payload>) -> Intake<Command, ()> {
        if email.from.equals(&self.addresses.own) {
            return Intake::Ignore;
        }
        if email.from.equals(&self.addresses.boss) && email.includes(&self.addresses.list) {
            return Intake::Command(Command::CaptureThreadEmail {
                email: email.clone(),
            });
        }
        Intake::Ignore
    }

    fn interpretation_failed(&self, error: Error) -> Command {
        Command::PlayerError {
            error: error.to_string(),
        }
    }

    fn roster_key(&self) -> Option<&str> {
        Some(ROSTER_KEY)
    }

    fn encode_roster(&self, payload: &Payload) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&payload.historical_participants)?)
    }

    fn decode_roster(&self, bytes: &[u8], payload: &mut Payload) -> Result<()> {
        payload.historical_participants = serde_json::from_slice(bytes)?;
        Ok(())
    }

    fn view(&self, snapshot: &Snapshot<State, Payload>) -> View {
        let payload = &snapshot.payload;
        let games = build_games(snapshot.anchor, &payload.participants);
        let game_on = payload
            .game_on_game_key
            .and_then(|key| games.iter().find(|game| game.key == key));
        View {
            state: snapshot.state,
            guid: payload.guid.clone(),
            boss_guid: payload.boss_guid.clone(),
            week_of: (snapshot.anchor - Duration::days(5))
                .with_timezone(&self.tz)
                .format("%-m/%-d")
                .to_string(),
            next_event: snapshot.next_event.map(|at| {
                at.with_timezone(&self.tz)
                    .format("%A %-m/%-d %-I:%M%P")
                    .to_string()
            }),
            game_on_game: game_on.map(|game| self.game_view(game)),
            game_on_full_start_time: game_on.map(|game| {
                game.full_start_time(self.tz, payload.game_on_adjusted_time.as_deref())
            }),
            game_on_adjusted_time: payload.game_on_adjusted_time.clone(),
            game_off: matches!(snapshot.state, State::NoInviteSent | State::NoGameSent),
            has_viable_game: self.threshold_met(payload),
            games: games.iter().map(|game| self.game_view(game)).collect(),
            participants: payload.participants.clone(),
            historical_participants: payload.historical_participants.clone(),
            disco_email: self.addresses.own.to_string(),
        }
    }
}
