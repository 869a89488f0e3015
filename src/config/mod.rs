//! Typed configuration from environment variables, plus optional per-workflow
//! tuning from a TOML file.
//!
//! Loads once at startup, fails fast if required vars are missing.

use std::path::{Path, PathBuf};

use chrono::Duration;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::engine::Addresses;
use crate::engine::policy::{DEFAULT_APPROVAL_WAIT, DEFAULT_RETRY_DELAY};
use crate::error::{Error, Result};
use crate::mail::EmailAddress;

const DEFAULT_TIMEZONE: &str = "America/Denver";

/// Upper bound on any configured wait: one week.
pub const MAX_WAIT_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub env: String,
    pub boss_email: EmailAddress,
    pub saturday_email: EmailAddress,
    pub saturday_list: EmailAddress,
    pub lunchtime_email: EmailAddress,
    pub lunchtime_list: EmailAddress,
    pub store_dir: PathBuf,
    pub timezone: Tz,
    pub settings: Settings,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let timezone =
            optional_var("DISCO_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone.parse().map_err(|_| {
            Error::Config(format!("DISCO_TIMEZONE is not a known IANA zone: {timezone}"))
        })?;

        let settings = match optional_var("DISCO_SETTINGS") {
            Some(path) => Settings::load(Path::new(&path))?,
            None => Settings::default(),
        };

        Ok(Self {
            env: optional_var("DISCO_ENV").unwrap_or_else(|| "dev".to_string()),
            boss_email: required_address("DISCO_BOSS_EMAIL")?,
            saturday_email: required_address("DISCO_SATURDAY_EMAIL")?,
            saturday_list: required_address("DISCO_SATURDAY_LIST")?,
            lunchtime_email: required_address("DISCO_LUNCHTIME_EMAIL")?,
            lunchtime_list: required_address("DISCO_LUNCHTIME_LIST")?,
            store_dir: optional_var("DISCO_STORE_DIR")
                .map_or_else(|| PathBuf::from("./disco-data"), PathBuf::from),
            timezone,
            settings,
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn saturday_addresses(&self) -> Addresses {
        Addresses {
            own: self.saturday_email.clone(),
            boss: self.boss_email.clone(),
            list: self.saturday_list.clone(),
        }
    }

    pub fn lunchtime_addresses(&self) -> Addresses {
        Addresses {
            own: self.lunchtime_email.clone(),
            boss: self.boss_email.clone(),
            list: self.lunchtime_list.clone(),
        }
    }
}

/// Per-workflow tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Sign-ups needed for a game.
    pub quorum: u32,
    /// How long an approval request waits before the default is taken.
    pub approval_wait_minutes: i64,
    /// Delay before retrying a scheduled send that failed.
    pub retry_delay_minutes: i64,
}

impl WorkflowSettings {
    /// # Errors
    ///
    /// [`Error::Config`] unless the wait is between one minute and a week.
    pub fn approval_wait(&self) -> Result<Duration> {
        minutes("approval_wait_minutes", self.approval_wait_minutes)
    }

    /// # Errors
    ///
    /// [`Error::Config`] unless the delay is between one minute and a week.
    pub fn retry_delay(&self) -> Result<Duration> {
        minutes("retry_delay_minutes", self.retry_delay_minutes)
    }

    fn lunchtime() -> Self {
        Self {
            quorum: 5,
            ..Self::default()
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        for checked in [self.approval_wait(), self.retry_delay()] {
            if let Err(Error::Config(reason)) = checked {
                return Err(Error::Config(format!("[{section}] {reason}")));
            }
        }
        Ok(())
    }
}

fn minutes(name: &str, value: i64) -> Result<Duration> {
    if !(1..=MAX_WAIT_MINUTES).contains(&value) {
        return Err(Error::Config(format!(
            "{name} must be between 1 and {MAX_WAIT_MINUTES}, got {value}"
        )));
    }
    Duration::try_minutes(value)
        .ok_or_else(|| Error::Config(format!("{name} is out of range: {value}")))
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            quorum: 8,
            approval_wait_minutes: DEFAULT_APPROVAL_WAIT.num_minutes(),
            retry_delay_minutes: DEFAULT_RETRY_DELAY.num_minutes(),
        }
    }
}

/// Contents of the `DISCO_SETTINGS` file:
///
/// ```toml
/// [saturday]
/// quorum = 8
/// approval_wait_minutes = 240
///
/// [lunchtime]
/// retry_delay_minutes = 10
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "SettingsFile")]
pub struct Settings {
    pub saturday: WorkflowSettings,
    pub lunchtime: WorkflowSettings,
}

/// A section as written: anything left out keeps that workflow's default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SectionFile {
    quorum: Option<u32>,
    approval_wait_minutes: Option<i64>,
    retry_delay_minutes: Option<i64>,
}

impl SectionFile {
    fn over(self, base: WorkflowSettings) -> WorkflowSettings {
        WorkflowSettings {
            quorum: self.quorum.unwrap_or(base.quorum),
            approval_wait_minutes: self
                .approval_wait_minutes
                .unwrap_or(base.approval_wait_minutes),
            retry_delay_minutes: self.retry_delay_minutes.unwrap_or(base.retry_delay_minutes),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    saturday: SectionFile,
    lunchtime: SectionFile,
}

impl From<SettingsFile> for Settings {
    fn from(file: SettingsFile) -> Self {
        Self {
            saturday: file.saturday.over(WorkflowSettings::default()),
            lunchtime: file.lunchtime.over(WorkflowSettings::lunchtime()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            saturday: WorkflowSettings::default(),
            lunchtime: WorkflowSettings::lunchtime(),
        }
    }
}

impl Settings {
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid settings: {e}")))?;
        settings.saturday.validate("saturday")?;
        settings.lunchtime.validate("lunchtime")?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read settings {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

fn required_address(name: &str) -> Result<EmailAddress> {
    let value = required_var(name)?;
    if !value.contains('@') {
        return Err(Error::Config(format!("{name} is not an email address: {value}")));
    }
    Ok(EmailAddress::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_take_defaults() {
        let settings = Settings::parse("[saturday]\nquorum = 6\n").unwrap();
        assert_eq!(settings.saturday.quorum, 6);
        assert_eq!(settings.saturday.approval_wait().unwrap(), Duration::hours(4));
        assert_eq!(settings.lunchtime, WorkflowSettings::lunchtime());
    }

    #[test]
    fn partial_sections_keep_their_own_defaults() {
        let settings = Settings::parse("[lunchtime]\nretry_delay_minutes = 10\n").unwrap();
        assert_eq!(settings.lunchtime.quorum, 5);
        assert_eq!(settings.lunchtime.retry_delay().unwrap(), Duration::minutes(10));
        assert_eq!(settings.saturday, WorkflowSettings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Settings::parse("[saturday]\nquorom = 6\n").is_err());
    }

    #[test]
    fn non_positive_durations_are_rejected() {
        assert!(Settings::parse("[lunchtime]\nretry_delay_minutes = 0\n").is_err());
    }

    #[test]
    fn durations_past_a_week_are_rejected() {
        let err = Settings::parse("[saturday]\napproval_wait_minutes = 9223372036854775807\n")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
        assert!(err.to_string().contains("approval_wait_minutes"), "{err}");
        assert!(Settings::parse("[lunchtime]\nretry_delay_minutes = 10081\n").is_err());
        assert!(Settings::parse("[lunchtime]\nretry_delay_minutes = 10080\n").is_ok());

        let settings = WorkflowSettings {
            retry_delay_minutes: i64::MAX,
            ..WorkflowSettings::default()
        };
        assert!(settings.retry_delay().is_err());
    }
}
