use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How often the scheduler should take an unattended snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    Off,
    Daily,
    Weekly,
    /// A stored value this build does not understand. Kept verbatim so it can
    /// be reported instead of silently treated as `Off`.
    Unknown(String),
}

impl Frequency {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "off" => Frequency::Off,
            "daily" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            other => Frequency::Unknown(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Frequency::Off => "off",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Unknown(raw) => raw,
        }
    }
}

impl From<String> for Frequency {
    fn from(raw: String) -> Self {
        Frequency::parse(&raw)
    }
}

impl From<Frequency> for String {
    fn from(freq: Frequency) -> Self {
        freq.as_str().to_owned()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote target, schedule and last-run outcome as persisted in the settings
/// table. Every field is `None` when its key is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub frequency: Option<Frequency>,
    pub last_backup_time: Option<DateTime<Utc>>,
    pub last_backup_status: Option<String>,
}

impl BackupConfig {
    /// URL and both credentials are present and non-empty.
    pub fn is_complete(&self) -> bool {
        [&self.url, &self.username, &self.password]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }

    pub fn credentials(&self) -> Option<Credentials> {
        if !self.is_complete() {
            return None;
        }
        Some(Credentials {
            url: self.url.clone()?,
            username: self.username.clone()?,
            password: self.password.clone()?,
        })
    }
}

/// Partial update for [`BackupConfig`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfigUpdate {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub frequency: Option<Frequency>,
}

/// What a transport session needs to reach the remote store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A snapshot file found on the remote store. Rebuilt from listings on every
/// call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFileRef {
    pub filename: String,
    pub size: u64,
    pub last_modified: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOutcome {
    pub filename: String,
    /// Where the upload landed; the root path when the directory upload failed.
    pub path: String,
    pub time: DateTime<Utc>,
    pub size_bytes: u64,
    pub content_hash: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub categories: usize,
    pub sites: usize,
    pub settings: usize,
}
