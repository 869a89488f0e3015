use serde::{Deserialize, Serialize};

use crate::mail::{Email, EmailAddress};

/// Largest count one sign-up may claim.
pub const MAX_COUNT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub address: EmailAddress,
    pub count: u32,
    #[serde(default)]
    pub relevant_emails: Vec<Email>,
}

/// Sign-ups in the order they first arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Participants(Vec<Participant>);

impl Participants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the count for `address`, or add a new participant.
    ///
    /// Matches on the bare address. A stored address without a display name
    /// adopts the incoming one.
    pub fn update_count(&mut self, address: &EmailAddress, count: u32, relevant: Option<&Email>) {
        if let Some(existing) = self.0.iter_mut().find(|p| p.address.equals(address)) {
            if !existing.address.has_display_name() {
                existing.address = address.clone();
            }
            existing.count = count;
            existing.relevant_emails.extend(relevant.cloned());
            return;
        }
        self.0.push(Participant {
            address: address.clone(),
            count,
            relevant_emails: relevant.cloned().into_iter().collect(),
        });
    }

    pub fn count_for(&self, address: &EmailAddress) -> u32 {
        self.0
            .iter()
            .find(|p| p.address.equals(address))
            .map_or(0, |p| p.count)
    }

    pub fn total(&self) -> u32 {
        self.0.iter().fold(0, |sum, p| sum.saturating_add(p.count))
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

    /// Human list of who's coming: `Ann, Bob **(2)** and Cat`.
    pub fn public(&self) -> String {
        let coming: Vec<&Participant> = self.0.iter().filter(|p| p.count > 0).collect();
        if coming.is_empty() {
            return String::from("No one's signed up yet");
        }

        let mut out = String::new();
        for (i, participant) in coming.iter().enumerate() {
            out.push_str(participant.address.name());
            if participant.count > 1 {
                out.push_str(&format!(" **({})**", participant.count));
            }
            if i + 2 < coming.len() {
                out.push_str(", ");
            } else if i + 2 == coming.len() {
                out.push_str(" and ");
            }
        }
        out
    }
}
