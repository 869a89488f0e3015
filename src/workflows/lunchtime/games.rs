//! Game slots: sixteen keys, four per weekday from Tuesday to Friday,
//! hourly from 10:00.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::participants::Participants;
use crate::error::{Error, Result};
use crate::mail::EmailAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GameKey {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
}

impl GameKey {
    pub const ALL: [GameKey; 16] = [
        GameKey::A,
        GameKey::B,
        GameKey::C,
        GameKey::D,
        GameKey::E,
        GameKey::F,
        GameKey::G,
        GameKey::H,
        GameKey::I,
        GameKey::J,
        GameKey::K,
        GameKey::L,
        GameKey::M,
        GameKey::N,
        GameKey::O,
        GameKey::P,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        const NAMES: [&str; 16] = [
            "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P",
        ];
        NAMES[self.index()]
    }

    /// Offset of the slot's start from the Saturday anchor.
    pub fn offset(self) -> Duration {
        let idx = self.index() as i64;
        -Duration::days(4 - idx / 4) + Duration::hours(idx % 4)
    }

    /// Keys from `start` to `end` inclusive, or `None` when reversed.
    pub fn range(start: GameKey, end: GameKey) -> Option<Vec<GameKey>> {
        (start <= end).then(|| GameKey::ALL[start.index()..=end.index()].to_vec())
    }
}

impl fmt::Display for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GameKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::MalformedCommand(format!("{s} is not a valid game-key")))
    }
}

pub fn join(keys: &[GameKey]) -> String {
    keys.iter().copied().map(GameKey::as_str).collect::<Vec<_>>().join(",")
}

/// One game slot with the players who picked it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Game {
    pub key: GameKey,
    pub start_time: DateTime<Utc>,
    pub players: Vec<EmailAddress>,
}

impl Game {
    pub fn count(&self) -> usize {
        self.players.len()
    }

    /// `Tuesday 3/5 at 10:00am`, or with the boss's adjusted time of day.
    pub fn full_start_time(&self, tz: Tz, adjusted_time: Option<&str>) -> String {
        let local = self.start_time.with_timezone(&tz);
        match adjusted_time {
            Some(time) => format!("{} at {time}", local.format("%A %-m/%-d")),
            None => local.format("%A %-m/%-d at %-I:%M%P").to_string(),
        }
    }

    pub fn public_participants(&self) -> String {
        if self.players.is_empty() {
            return String::from("No one's signed up yet");
        }
        let names: Vec<&str> = self.players.iter().map(EmailAddress::name).collect();
        match names.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} and {last}", rest.join(", ")),
            _ => names.join(""),
        }
    }
}

/// Every slot for the cycle anchored at `anchor`, in key order.
pub fn build_games(anchor: DateTime<Utc>, participants: &Participants) -> Vec<Game> {
    GameKey::ALL
        .into_iter()
        .map(|key| Game {
            key,
            start_time: anchor + key.offset(),
            players: participants
                .iter()
                .filter(|p| p.game_keys.contains(&key))
                .map(|p| p.address.clone())
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_cover_tuesday_through_friday() {
        assert_eq!(GameKey::A.offset(), -Duration::days(4));
        assert_eq!(GameKey::D.offset(), -Duration::days(4) + Duration::hours(3));
        assert_eq!(GameKey::E.offset(), -Duration::days(3));
        assert_eq!(GameKey::K.offset(), -Duration::days(2) + Duration::hours(2));
        assert_eq!(GameKey::P.offset(), -Duration::days(1) + Duration::hours(3));
    }

    #[test]
    fn ranges_are_inclusive_and_ordered() {
        assert_eq!(
            GameKey::range(GameKey::B, GameKey::D),
            Some(vec![GameKey::B, GameKey::C, GameKey::D])
        );
        assert_eq!(GameKey::range(GameKey::C, GameKey::C), Some(vec![GameKey::C]));
        assert_eq!(GameKey::range(GameKey::D, GameKey::B), None);
    }

    #[test]
    fn keys_parse_from_their_names() {
        assert_eq!("M".parse::<GameKey>().ok(), Some(GameKey::M));
        assert!("Q".parse::<GameKey>().is_err());
        assert_eq!(join(&[GameKey::A, GameKey::C]), "A,C");
    }
}
