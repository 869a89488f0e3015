//! What happens when a send fails, by what triggered it.
//!
//! A scheduled transition keeps its state and is retried after a short delay.
//! A command-triggered transition is not retried; the boss re-issues it.
//! Either way the boss is told.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use super::workflow::Addresses;
use crate::error::Error;
use crate::mail::Outgoing;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::minutes(5);
pub const DEFAULT_APPROVAL_WAIT: Duration = Duration::hours(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Alarm,
    Command,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Alarm => "alarm",
            Trigger::Command => "command",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recourse {
    /// Proactive notice for the boss.
    pub notice: Outgoing,
    /// When to attempt the same transition again, if at all.
    pub retry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    pub retry_delay: Duration,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl FailurePolicy {
    pub fn new(retry_delay: Duration) -> Self {
        Self { retry_delay }
    }

    pub fn decide(
        &self,
        trigger: Trigger,
        addresses: &Addresses,
        failed: &Outgoing,
        error: &Error,
        now: DateTime<Utc>,
    ) -> Recourse {
        let (what, retry_at) = match trigger {
            Trigger::Alarm => (
                "failed to send a message during a scheduled transition",
                Some(now + self.retry_delay),
            ),
            Trigger::Command => ("failed while trying to handle a command", None),
        };
        let notice = addresses
            .to_boss("help")
            .with_message(format!("{what}. Trying to send: {}", failed.summary()))
            .with_error(error);
        Recourse { notice, retry_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::EmailAddress;
    use chrono::TimeZone;

    fn addresses() -> Addresses {
        Addresses {
            own: EmailAddress::new("disco@example.com"),
            boss: EmailAddress::new("boss@example.com"),
            list: EmailAddress::new("list@example.com"),
        }
    }

    #[test]
    fn alarm_failures_retry_after_the_delay() {
        let now = Utc.with_ymd_and_hms(2023, 9, 26, 6, 0, 0).unwrap();
        let addrs = addresses();
        let failed = addrs.to_list("invitation");
        let err = Error::Delivery("smtp down".into());

        let recourse = FailurePolicy::default().decide(Trigger::Alarm, &addrs, &failed, &err, now);
        assert_eq!(recourse.retry_at, Some(now + Duration::minutes(5)));
        assert_eq!(recourse.notice.template, "help");
        assert_eq!(recourse.notice.to, vec![addrs.boss.clone()]);
        assert!(recourse.notice.error.as_deref().unwrap_or_default().contains("smtp down"));
        let message = recourse.notice.message.as_deref().unwrap_or_default();
        assert!(message.contains("[invitation]"));
    }

    #[test]
    fn command_failures_are_surfaced_only() {
        let now = Utc.with_ymd_and_hms(2023, 9, 26, 6, 0, 0).unwrap();
        let addrs = addresses();
        let failed = addrs.to_list("game_on");
        let err = Error::Delivery("smtp down".into());

        let policy = FailurePolicy::new(Duration::minutes(1));
        let recourse = policy.decide(Trigger::Command, &addrs, &failed, &err, now);
        assert_eq!(recourse.retry_at, None);
        assert_eq!(recourse.notice.to, vec![addrs.boss]);
    }
}
