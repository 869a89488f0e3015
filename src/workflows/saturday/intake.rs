//! Structured classification of inbound Saturday mail.
//!
//! Boss mail addressed only to the workflow is an admin command, or a reply
//! when its subject answers an approval request. Everyone else's mail goes to
//! the interpreter. Anything else is ignored.

use super::participants::Participants;
use super::{ApprovalRequest, Command, PlayerContext, Verb};
use crate::engine::{Addresses, Intake};
use crate::mail::{Email, EmailAddress};

const REPLY_VERBS: &str = "invalid command in reply, must be one of /approve, /yes, /shipit, \
    /deny, /no, /delay <int>, /abort, or /RESET-RESET-RESET";

/// A week: longer than any approval window.
const MAX_DELAY_HOURS: u32 = 7 * 24;

pub(super) fn classify(
    addresses: &Addresses,
    participants: &Participants,
    email: &Email,
) -> Intake<Command, PlayerContext> {
    if email.from.equals(&addresses.own) {
        return Intake::Ignore;
    }

    let from_boss = email.from.equals(&addresses.boss);
    let admin = from_boss
        && email.cc.is_empty()
        && email.to.len() == 1
        && email.to[0].equals(&addresses.own);

    if admin && email.subject.starts_with("Re: [") {
        Intake::Command(reply(email))
    } else if admin {
        Intake::Command(admin_command(email))
    } else if !from_boss {
        Intake::Interpret(PlayerContext {
            current_count: participants.count_for(&email.from),
        })
    } else {
        Intake::Ignore
    }
}

fn reply(email: &Email) -> Command {
    let to = match ApprovalRequest::from_reply_subject(&email.subject) {
        Some(to) => to,
        None => return Command::invalid(format!("invalid reply subject: {}", email.subject)),
    };

    let line = email.command_line();
    let verb = if ["/approve", "/yes", "/shipit"].iter().any(|v| line.starts_with(v)) {
        Verb::Approve
    } else if line.starts_with("/deny") || line.starts_with("/no") {
        Verb::Deny
    } else if let Some(hours) = delay_argument(line) {
        match hours.parse::<u32>() {
            Ok(0) => {
                return Command::invalid(format!(
                    "invalid delay count for /delay command: {hours} - must be > 0"
                ));
            }
            Ok(hours) if hours <= MAX_DELAY_HOURS => Verb::Delay(hours),
            _ => {
                return Command::invalid(format!(
                    "invalid delay count for /delay command: {hours} - \
                     must be at most {MAX_DELAY_HOURS}"
                ));
            }
        }
    } else if line.starts_with("/RESET-RESET-RESET") {
        return Command::AdminReset;
    } else if line.starts_with("/abort") {
        return Command::AdminAbort;
    } else {
        return Command::invalid(REPLY_VERBS.to_string());
    };

    Command::Reply {
        to,
        verb,
        additional: email.additional_content(),
    }
}

fn admin_command(email: &Email) -> Command {
    let line = email.command_line();
    if let Some((address, count)) = set_arguments(line) {
        return match count.parse::<u32>() {
            Ok(count) => Command::AdminSetCount {
                address: EmailAddress::new(address),
                count,
            },
            Err(_) => Command::invalid(format!("invalid count for /set command: {count}")),
        };
    }

    if line.starts_with("/status") {
        Command::AdminStatus
    } else if line.starts_with("/debug") {
        Command::AdminDebug
    } else if line.starts_with("/abort") {
        Command::AdminAbort
    } else if line.starts_with("/RESET-RESET-RESET") {
        Command::AdminReset
    } else if line.starts_with("/game-on") {
        Command::AdminGameOn {
            additional: email.additional_content(),
        }
    } else if line.starts_with("/no-game") {
        Command::AdminNoGame {
            additional: email.additional_content(),
        }
    } else {
        Command::invalid(format!("invalid command: {line}"))
    }
}

/// The text after `keyword`, if `line` is `keyword` followed by whitespace.
fn argument<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `/delay <digits>`.
fn delay_argument(line: &str) -> Option<&str> {
    argument(line, "/delay").filter(|hours| is_number(hours))
}

/// `/set <address> <digits>`, split on the last run of whitespace.
fn set_arguments(line: &str) -> Option<(&str, &str)> {
    let rest = argument(line, "/set")?;
    let (address, count) = rest.rsplit_once(char::is_whitespace)?;
    let address = address.trim_end();
    (!address.is_empty() && is_number(count)).then_some((address, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_arguments_take_the_last_token_as_count() {
        assert_eq!(
            set_arguments("/set Jane Doe <jane@example.com>  3"),
            Some(("Jane Doe <jane@example.com>", "3"))
        );
        assert_eq!(set_arguments("/set jane@example.com"), None);
        assert_eq!(set_arguments("/settings jane@example.com 3"), None);
        assert_eq!(set_arguments("/set jane@example.com three"), None);
    }

    #[test]
    fn delay_hours_are_bounded() {
        let mail = |text: &str| {
            Email::new()
                .with_subject("Re: [invite-approval-request] Invite?")
                .with_text(text)
        };
        assert!(matches!(
            reply(&mail("/delay 168")),
            Command::Reply { verb: Verb::Delay(168), .. }
        ));
        for text in ["/delay 0", "/delay 169", "/delay 4000000000", "/delay 99999999999"] {
            assert!(
                matches!(reply(&mail(text)), Command::Invalid { .. }),
                "{text}"
            );
        }
    }

    #[test]
    fn delay_argument_requires_digits() {
        assert_eq!(delay_argument("/delay 2"), Some("2"));
        assert_eq!(delay_argument("/delay 0"), Some("0"));
        assert_eq!(delay_argument("/delay soon"), None);
        assert_eq!(delay_argument("/delayed 2"), None);
    }
}
