//! Outbound message descriptions and the delivery contract.
//!
//! An [`Outgoing`] names a template and carries the envelope plus the
//! render-data view; turning it into a body is the outbox adapter's job.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Email, EmailAddress};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Fresh,
    Reply,
    ReplyAll,
    Forward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outgoing {
    pub template: String,
    pub kind: Kind,
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<EmailAddress>,
    /// Explicit subject. Fresh mail leaves this to the template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// The message being replied to or forwarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<Email>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Overrides the "next event" shown in the body, e.g. an approval deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_event: Option<DateTime<Utc>>,
    /// Render data, filled in by the engine right before sending.
    #[serde(default)]
    pub view: serde_json::Value,
}

impl Outgoing {
    pub fn new(template: impl Into<String>, from: &EmailAddress, to: &EmailAddress) -> Self {
        Self {
            template: template.into(),
            kind: Kind::Fresh,
            from: from.clone(),
            to: vec![to.clone()],
            cc: Vec::new(),
            subject: None,
            in_reply_to: None,
            original: None,
            message: None,
            error: None,
            next_event: None,
            view: serde_json::Value::Null,
        }
    }

    /// Reply to the sender of `email` only.
    pub fn reply(template: impl Into<String>, from: &EmailAddress, email: &Email) -> Self {
        let mut out = Self::new(template, from, &email.from);
        out.kind = Kind::Reply;
        out.subject = Some(format!("Re: {}", email.subject));
        out.in_reply_to = Some(email.message_id.clone());
        out.original = Some(email.clone());
        out
    }

    /// Reply to the sender, copying everyone else on the original except ourselves.
    pub fn reply_all(template: impl Into<String>, from: &EmailAddress, email: &Email) -> Self {
        let mut out = Self::reply(template, from, email);
        out.kind = Kind::ReplyAll;
        out.cc = email
            .to
            .iter()
            .chain(email.cc.iter())
            .filter(|a| !a.equals(from) && !a.equals(&email.from))
            .cloned()
            .collect();
        out
    }

    pub fn forward(
        template: impl Into<String>,
        from: &EmailAddress,
        to: &EmailAddress,
        email: &Email,
    ) -> Self {
        let mut out = Self::new(template, from, to);
        out.kind = Kind::Forward;
        out.subject = Some(format!("Fwd: {}", email.subject));
        out.original = Some(email.clone());
        out
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_optional_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_next_event(mut self, at: DateTime<Utc>) -> Self {
        self.next_event = Some(at);
        self
    }

    /// Thread this message under an earlier one.
    pub fn in_thread(mut self, email: &Email) -> Self {
        self.in_reply_to = Some(email.message_id.clone());
        if self.subject.is_none() {
            self.subject = Some(if email.subject.starts_with("Re: ") {
                email.subject.clone()
            } else {
                format!("Re: {}", email.subject)
            });
        }
        self
    }

    /// One-line description for logs and failure reports.
    pub fn summary(&self) -> String {
        let to: Vec<&str> = self.to.iter().map(EmailAddress::as_str).collect();
        format!("[{}] {:?} to {}", self.template, self.kind, to.join(", "))
    }
}

/// Delivery contract. An error means the message was not sent.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn send(&self, message: &Outgoing) -> Result<()>;
}

/// Writes every message to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogOutbox;

#[async_trait]
impl Outbox for LogOutbox {
    async fn send(&self, message: &Outgoing) -> Result<()> {
        let body = serde_json::to_string(message)?;
        info!(
            template = %message.template,
            from = %message.from,
            to = ?message.to,
            body = %body,
            "outgoing message"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<Outgoing>,
    attempts: usize,
    error: Option<String>,
}

/// Test outbox: keeps delivered messages and fails on demand.
/// Clones share the same record.
#[derive(Debug, Default, Clone)]
pub struct RecordingOutbox {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every send fail with `error` until [`heal`](Self::heal) is called.
    pub fn set_error(&self, error: impl Into<String>) {
        self.lock().error = Some(error.into());
    }

    pub fn heal(&self) {
        self.lock().error = None;
    }

    /// Messages delivered so far, oldest first.
    pub fn sent(&self) -> Vec<Outgoing> {
        self.lock().sent.clone()
    }

    pub fn last(&self) -> Option<Outgoing> {
        self.lock().sent.last().cloned()
    }

    pub fn templates(&self) -> Vec<String> {
        self.lock().sent.iter().map(|m| m.template.clone()).collect()
    }

    /// Every call to `send`, successful or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.sent.clear();
        inner.attempts = 0;
    }
}

#[async_trait]
impl Outbox for RecordingOutbox {
    async fn send(&self, message: &Outgoing) -> Result<()> {
        let mut inner = self.lock();
        inner.attempts += 1;
        if let Some(ref error) = inner.error {
            return Err(Error::Delivery(error.clone()));
        }
        inner.sent.push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_all_drops_sender_and_self() {
        let me = EmailAddress::new("disco@example.com");
        let email = Email::new()
            .with_message_id("m1")
            .with_from("Boss <boss@example.com>")
            .with_to("disco@example.com")
            .with_to("list@example.com")
            .with_cc("boss@example.com")
            .with_cc("friend@example.com")
            .with_subject("Saturday?");

        let out = Outgoing::reply_all("ack", &me, &email);
        assert_eq!(out.to, vec![EmailAddress::new("Boss <boss@example.com>")]);
        assert_eq!(
            out.cc,
            vec![
                EmailAddress::new("list@example.com"),
                EmailAddress::new("friend@example.com")
            ]
        );
        assert_eq!(out.subject.as_deref(), Some("Re: Saturday?"));
        assert_eq!(out.in_reply_to.as_deref(), Some("m1"));
    }
}
