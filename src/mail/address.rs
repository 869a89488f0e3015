use std::fmt;

use serde::{Deserialize, Serialize};

/// A mailbox as written in a header: `Name <user@host>` or a bare `user@host`.
///
/// Two addresses are the same participant when their bare addresses match,
/// ignoring ASCII case and the display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare `user@host` part.
    pub fn address(&self) -> &str {
        let tail = match self.0.rfind(' ') {
            Some(idx) => &self.0[idx + 1..],
            None => self.0.as_str(),
        };
        tail.trim_matches(['<', '>'])
    }

    /// The first word of the display name, or the local part when there is none.
    pub fn name(&self) -> &str {
        if self.has_display_name() {
            let first = self.0.split(' ').next().unwrap_or_default();
            first.trim_matches(['<', '>', '"'])
        } else {
            self.address().split('@').next().unwrap_or_default()
        }
    }

    pub fn has_display_name(&self) -> bool {
        self.0.contains(' ')
    }

    pub fn equals(&self, other: &EmailAddress) -> bool {
        self.address().eq_ignore_ascii_case(other.address())
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmailAddress {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for EmailAddress {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_display_form() {
        let addr = EmailAddress::new(" Onsi Fakhouri <onsi@example.com> ");
        assert_eq!(addr.address(), "onsi@example.com");
        assert_eq!(addr.name(), "Onsi");
        assert!(addr.has_display_name());
    }

    #[test]
    fn bare_address_names_after_local_part() {
        let addr = EmailAddress::new("player@example.com");
        assert_eq!(addr.address(), "player@example.com");
        assert_eq!(addr.name(), "player");
        assert!(!addr.has_display_name());
    }

    #[test]
    fn equality_ignores_display_name_and_case() {
        let a = EmailAddress::new("Jane <Jane@Example.com>");
        let b = EmailAddress::new("jane@example.com");
        assert!(a.equals(&b));
        assert!(!a.equals(&EmailAddress::new("john@example.com")));
    }
}
