//! Wall clock, anchor calculation, and the alarm the engine sleeps on.

pub mod alarm;
pub mod anchor;
pub mod manual;

use std::future::Future;

use chrono::{DateTime, Utc};

pub use alarm::Alarm;
pub use anchor::{AnchorRule, day_of_at_6am, next_saturday_at_10, next_saturday_at_10_or_1030};
pub use manual::ManualAlarmClock;

/// The engine's view of time: read the clock, arm or stop the single alarm,
/// and wait for it to go off.
///
/// Only the engine worker calls these methods, so implementations may assume
/// a single caller.
pub trait AlarmClock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Arm for `at`, replacing any earlier arm.
    fn set_alarm(&mut self, at: DateTime<Utc>);

    /// Disarm. Once this returns, no fire for an earlier arm is delivered.
    fn stop(&mut self);

    /// Resolves when the current arm fires; pends forever while disarmed.
    /// Must be cancel-safe.
    fn fired(&mut self) -> impl Future<Output = DateTime<Utc>> + Send;
}

/// Real time, backed by a tokio timer.
#[derive(Default)]
pub struct SystemAlarmClock {
    alarm: Alarm,
}

impl SystemAlarmClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlarmClock for SystemAlarmClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn set_alarm(&mut self, at: DateTime<Utc>) {
        self.alarm.arm(at);
    }

    fn stop(&mut self) {
        self.alarm.stop();
    }

    fn fired(&mut self) -> impl Future<Output = DateTime<Utc>> + Send {
        self.alarm.fired()
    }
}
