/// Data models shared across PlayOn DL crates.
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A recording in the remote library.
///
/// `(name, release_year)` is the item's identity for dedup purposes. The
/// service is loose about types: IDs and years arrive as strings or numbers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LibraryItem {
    #[serde(rename = "ID", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(
        rename = "ReleaseYear",
        default,
        deserialize_with = "optional_string_or_number"
    )]
    pub release_year: Option<String>,
}

impl LibraryItem {
    /// Display title: `Name` or `Name (Year)`.
    pub fn title(&self) -> String {
        match &self.release_year {
            Some(year) => format!("{} ({})", self.name, year),
            None => self.name.clone(),
        }
    }
}

/// Signed URL plus the cookie set needed to fetch one recording.
/// Only valid for a short window chosen by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub url: String,
    pub cookies: BTreeMap<String, String>,
}

impl DownloadDescriptor {
    /// Value for a `Cookie` request header, or `None` when there are no cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// A recording recorded as downloaded.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntry {
    pub name: String,
    pub release_year: Option<String>,
    pub downloaded_at: NaiveDateTime,
}

/// Progress events emitted while a single recording streams to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Response headers received. `total` is `None` when the size is unknown.
    Started { total: Option<u64> },
    /// Another block has been written.
    Advanced { downloaded: u64, total: Option<u64> },
    /// Body fully written and verified.
    Finished { downloaded: u64 },
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<PathBuf>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} downloaded, {} already present, {} failed",
            self.downloaded, self.skipped, self.failed
        )
    }
}

fn json_to_string<E: serde::de::Error>(value: serde_json::Value) -> Result<Option<String>, E> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(E::custom(format!("expected string or number, found {}", other))),
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    json_to_string(value)?.ok_or_else(|| serde::de::Error::custom("unexpected null"))
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    json_to_string(value)
}
