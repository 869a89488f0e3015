//! Shared fixtures: a hand-driven clock, recording fakes, and a scripted
//! interpreter.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::America::Denver;
use chrono_tz::Tz;
use disco_rs::clock::ManualAlarmClock;
use disco_rs::config::{Settings, WorkflowSettings};
use disco_rs::engine::{Addresses, Collaborators, Engine, EngineHandle, Interpreter};
use disco_rs::error::{Error, Result};
use disco_rs::mail::{Email, EmailAddress, RecordingOutbox};
use disco_rs::store::MemoryStore;
use disco_rs::workflows::saturday::{self, PlayerContext, SaturdayDisco};
use disco_rs::workflows::lunchtime::LunchtimeDisco;

pub const TZ: Tz = Denver;
pub const BOSS: &str = "Boss <boss@example.com>";
pub const SATURDAY: &str = "Saturday Disco <saturday@example.com>";
pub const SATURDAY_LIST: &str = "saturday-list@example.com";
pub const LUNCHTIME: &str = "Lunchtime Disco <lunchtime@example.com>";
pub const LUNCHTIME_LIST: &str = "lunchtime-list@example.com";

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// Sunday 10/11/2026, noon in Denver. The cycle anchor is Saturday 10/17 at
/// 10:00 MDT.
pub fn sunday_noon() -> DateTime<Utc> {
    utc(2026, 10, 11, 18, 0)
}

pub fn saturday_anchor() -> DateTime<Utc> {
    utc(2026, 10, 17, 16, 0)
}

pub fn saturday_addresses() -> Addresses {
    Addresses {
        own: EmailAddress::new(SATURDAY),
        boss: EmailAddress::new(BOSS),
        list: EmailAddress::new(SATURDAY_LIST),
    }
}

pub fn lunchtime_addresses() -> Addresses {
    Addresses {
        own: EmailAddress::new(LUNCHTIME),
        boss: EmailAddress::new(BOSS),
        list: EmailAddress::new(LUNCHTIME_LIST),
    }
}

/// Reads a player's first line as their new count: a bare number sets it,
/// `boom` fails, anything else is ignored.
pub struct ScriptedInterpreter;

#[async_trait]
impl Interpreter<SaturdayDisco> for ScriptedInterpreter {
    async fn classify(&self, email: &Email, _context: &PlayerContext) -> Result<saturday::Command> {
        let line = email.command_line();
        if line == "boom" {
            return Err(Error::Delivery("interpreter unavailable".into()));
        }
        Ok(match line.parse::<u32>() {
            Ok(count) => saturday::Command::PlayerSetCount {
                address: email.from.clone(),
                count,
            },
            Err(_) => saturday::Command::PlayerIgnore,
        })
    }
}

pub struct Harness<W: disco_rs::engine::Workflow> {
    pub handle: EngineHandle<W>,
    pub clock: ManualAlarmClock,
    pub store: MemoryStore,
    pub outbox: RecordingOutbox,
}

impl<W: disco_rs::engine::Workflow> Harness<W> {
    /// Fire the armed alarm and wait until the worker has handled it.
    ///
    /// Alarms win over queued messages, so drain the mailbox first.
    pub async fn fire(&self) -> DateTime<Utc> {
        self.handle.snapshot().await.expect("engine should answer");
        let at = self.clock.fire().expect("alarm should be armed");
        self.handle.snapshot().await.expect("engine should answer");
        at
    }
}

pub async fn start_saturday(
    now: DateTime<Utc>,
    store: MemoryStore,
    settings: WorkflowSettings,
) -> Result<Harness<SaturdayDisco>> {
    let clock = ManualAlarmClock::new(now);
    let outbox = RecordingOutbox::new();
    let handle = Engine::start(
        SaturdayDisco::new(saturday_addresses(), TZ, &settings)?,
        clock.clone(),
        Collaborators {
            store: Arc::new(store.clone()),
            outbox: Arc::new(outbox.clone()),
            interpreter: Arc::new(ScriptedInterpreter),
        },
    )
    .await?;
    Ok(Harness {
        handle,
        clock,
        store,
        outbox,
    })
}

pub async fn saturday_at(now: DateTime<Utc>) -> Harness<SaturdayDisco> {
    start_saturday(now, MemoryStore::new(), WorkflowSettings::default())
        .await
        .expect("saturday engine should start")
}

pub async fn lunchtime_at(now: DateTime<Utc>) -> Harness<LunchtimeDisco> {
    start_lunchtime(now, MemoryStore::new()).await
}

/// Boot lunchtime over a store that may already hold a snapshot or roster.
pub async fn start_lunchtime(now: DateTime<Utc>, store: MemoryStore) -> Harness<LunchtimeDisco> {
    let clock = ManualAlarmClock::new(now);
    let outbox = RecordingOutbox::new();
    let handle = Engine::start(
        LunchtimeDisco::new(lunchtime_addresses(), TZ, &Settings::default().lunchtime)
            .expect("default lunchtime settings are valid"),
        clock.clone(),
        Collaborators {
            store: Arc::new(store.clone()),
            outbox: Arc::new(outbox.clone()),
            interpreter: Arc::new(disco_rs::engine::Unclassified),
        },
    )
    .await
    .expect("lunchtime engine should start");
    Harness {
        handle,
        clock,
        store,
        outbox,
    }
}

/// A player's sign-up mail.
pub fn player_email(id: &str, from: &str, text: &str) -> Email {
    Email::new()
        .with_message_id(id)
        .with_from(from)
        .with_to(SATURDAY)
        .with_subject("Saturday")
        .with_text(text)
}

/// A boss mail addressed only to the Saturday workflow.
pub fn boss_email(id: &str, subject: &str, text: &str) -> Email {
    Email::new()
        .with_message_id(id)
        .with_from(BOSS)
        .with_to(SATURDAY)
        .with_subject(subject)
        .with_text(text)
}
