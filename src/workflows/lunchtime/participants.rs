use serde::{Deserialize, Serialize};

use super::games::{GameKey, join};
use crate::error::{Error, Result};
use crate::mail::EmailAddress;

const ALL_WORDS: [&str; 2] = ["ALL", "YES"];
const CLEAR_WORDS: [&str; 4] = ["CLEAR", "NONE", "NO", "0"];
const SELECTION_HELP: &str = "Must be a comma separated list of single-letters or ranges \
    (e.g. A,B-D,E).  Negation is supported (e.g. A-J,!C,!E-F)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub address: EmailAddress,
    #[serde(default)]
    pub game_keys: Vec<GameKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl Participant {
    pub fn new(address: impl Into<EmailAddress>, game_keys: Vec<GameKey>) -> Self {
        Self {
            address: address.into(),
            game_keys,
            comments: None,
        }
    }

    pub fn games_ack_message(&self) -> String {
        if self.game_keys.is_empty() {
            format!("{} can't make any games", self.address)
        } else {
            format!("{} can play {}", self.address, join(&self.game_keys))
        }
    }
}

/// A parsed game selection like `A,B-D,!C`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Clear,
    Keys(Vec<GameKey>),
}

impl Selection {
    /// Parse a comma separated list of keys and ranges. Negated entries are
    /// removed from the result regardless of order. Case-insensitive.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedCommand`] for an unknown key or range, or when
    /// negation leaves nothing selected.
    pub fn parse(input: &str) -> Result<Selection> {
        let input = input.trim().to_uppercase();
        if CLEAR_WORDS.contains(&input.as_str()) {
            return Ok(Selection::Clear);
        }

        let mut selected: Vec<GameKey> = Vec::new();
        let mut negated: Vec<GameKey> = Vec::new();
        for component in input.split(',') {
            let (keys, negate) = parse_component(component).ok_or_else(|| {
                let reason = format!("{component} is not a valid game-key.  {SELECTION_HELP}");
                Error::MalformedCommand(format!("invalid input: {input} - {reason}"))
            })?;
            for key in keys {
                if negate {
                    negated.push(key);
                } else if !selected.contains(&key) {
                    selected.push(key);
                }
            }
        }

        selected.retain(|key| !negated.contains(key));
        if selected.is_empty() {
            return Err(Error::MalformedCommand(format!(
                "invalid input: {input} - no game-keys were left after processing"
            )));
        }
        Ok(Selection::Keys(selected))
    }
}

/// One entry of a selection: its keys and whether it was negated.
fn parse_component(component: &str) -> Option<(Vec<GameKey>, bool)> {
    let component = component.trim();
    if ALL_WORDS.contains(&component) {
        return Some((GameKey::ALL.to_vec(), false));
    }

    let (component, negate) = match component.strip_prefix('!') {
        Some(rest) => (rest.trim(), true),
        None => (component, false),
    };
    if let Ok(key) = component.parse::<GameKey>() {
        return Some((vec![key], negate));
    }

    let (start, end) = component.split_once('-')?;
    let start = start.trim().parse::<GameKey>().ok()?;
    let end = end.trim().parse::<GameKey>().ok()?;
    GameKey::range(start, end).map(|keys| (keys, negate))
}

/// Who can play which games this week, in sign-up order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Participants(Vec<Participant>);

impl Participants {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, address: &EmailAddress) -> Option<usize> {
        self.0.iter().position(|p| p.address.equals(address))
    }

    /// Comma separated keys for `address`; empty if they haven't picked.
    pub fn games_for(&self, address: &EmailAddress) -> String {
        self.position(address)
            .map(|idx| join(&self.0[idx].game_keys))
            .unwrap_or_default()
    }

    /// Apply a structured submission. No keys drops the participant.
    pub fn add_or_update(&mut self, participant: Participant) {
        match self.position(&participant.address) {
            Some(idx) if participant.game_keys.is_empty() => {
                self.0.remove(idx);
            }
            Some(idx) => {
                let existing = &mut self.0[idx];
                if !existing.address.has_display_name() || participant.address.has_display_name() {
                    existing.address = participant.address;
                }
                existing.game_keys = participant.game_keys;
                existing.comments = participant.comments;
            }
            None if participant.game_keys.is_empty() => {}
            None => self.0.push(participant),
        }
    }

    /// Apply a parsed selection for `address` and describe what changed.
    pub fn select(&mut self, address: &EmailAddress, selection: Selection) -> String {
        let keys = match selection {
            Selection::Clear => {
                return match self.position(address) {
                    Some(idx) => {
                        self.0.remove(idx);
                        String::from("cleared")
                    }
                    None => String::from("(nothing to clear)"),
                };
            }
            Selection::Keys(keys) => keys,
        };

        let joined = join(&keys);
        match self.position(address) {
            Some(idx) => {
                let existing = &mut self.0[idx];
                if !existing.address.has_display_name() {
                    existing.address = address.clone();
                }
                existing.game_keys = keys;
                format!("updated to {joined}")
            }
            None => {
                self.0.push(Participant::new(address.clone(), keys));
                format!("set to {joined}")
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everyone who has ever signed up, kept across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoricalParticipants(Vec<EmailAddress>);

impl HistoricalParticipants {
    /// Remember `address`, replacing an earlier spelling of the same mailbox.
    pub fn add_or_update(&mut self, address: &EmailAddress) {
        match self.0.iter_mut().find(|known| known.equals(address)) {
            Some(known) => *known = address.clone(),
            None => self.0.push(address.clone()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmailAddress> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
