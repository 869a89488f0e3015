use serde::{Deserialize, Serialize};

use super::EmailAddress;

/// An inbound or archived message. `message_id` is the dedup identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Email {
    pub message_id: String,
    pub in_reply_to: String,
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub subject: String,
    pub date: String,
    pub text: String,
    pub html: String,
}

impl Email {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = id.into();
        self
    }

    pub fn with_from(mut self, from: impl Into<EmailAddress>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_to(mut self, to: impl Into<EmailAddress>) -> Self {
        self.to.push(to.into());
        self
    }

    pub fn with_cc(mut self, cc: impl Into<EmailAddress>) -> Self {
        self.cc.push(cc.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    /// Whether `addr` appears in To or CC.
    pub fn includes(&self, addr: &EmailAddress) -> bool {
        self.to.iter().chain(self.cc.iter()).any(|a| a.equals(addr))
    }

    /// First line of the trimmed body, where commands live.
    pub fn command_line(&self) -> &str {
        self.text.trim().lines().next().unwrap_or_default().trim_end()
    }

    /// Everything after the first line of the body, with surrounding newlines
    /// stripped. `None` for a single-line body.
    pub fn additional_content(&self) -> Option<String> {
        let idx = self.text.find('\n')?;
        let rest = self.text[idx..].trim_matches(['\n', '\r']);
        Some(rest.to_string())
    }
}
