//! Sender resolution.
//!
//! Turns a raw sender string into a display name and an email address. An
//! address embedded in angle brackets always wins; otherwise the
//! [`KnownSendersTable`] is consulted.

use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Address enclosed in angle brackets, e.g. `<jane@example.com>`.
static BRACKETED_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(.*?)>").expect("bracketed email regex"));

/// Sender name and address derived from a raw sender string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderInfo {
    /// Display name with the bracketed address and quotes removed.
    pub name: String,
    /// Email address, empty if none could be determined.
    pub email: String,
    /// Whether `email` is non-empty.
    pub has_email: bool,
}

impl SenderInfo {
    fn new(name: String, email: String) -> Self {
        let has_email = !email.is_empty();
        Self {
            name,
            email,
            has_email,
        }
    }
}

/// One row of the known-senders table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KnownSender {
    /// Display name (or a fragment of it) as it appears in sender strings.
    #[serde(rename = "sender_name")]
    pub name: String,
    /// Address to use for that sender.
    #[serde(rename = "sender_email")]
    pub email: String,
}

impl KnownSender {
    /// Creates a new table row.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Read-only lookup from sender display name to email address.
///
/// Loaded once by the orchestrator and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct KnownSendersTable {
    rows: Vec<KnownSender>,
}

impl KnownSendersTable {
    /// Builds a table from rows, keeping their order.
    #[must_use]
    pub fn from_rows(rows: impl IntoIterator<Item = KnownSender>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    /// Reads a CSV table with `sender_name` and `sender_email` columns.
    ///
    /// Extra columns are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid CSV or a required column is
    /// missing.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let rows = csv
            .deserialize::<KnownSender>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    /// Loads the table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        info!(path = %path.display(), rows = table.len(), "Loaded known senders");
        Ok(table)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the first row whose stored name occurs in `display_name`.
    ///
    /// Matching is a plain, case-sensitive substring test. Rows with an empty
    /// name never match, and an empty display name matches nothing.
    #[must_use]
    pub fn lookup(&self, display_name: &str) -> Option<&KnownSender> {
        if display_name.is_empty() {
            return None;
        }
        self.rows
            .iter()
            .find(|row| !row.name.is_empty() && display_name.contains(row.name.as_str()))
    }
}

/// Resolves a raw sender string to a [`SenderInfo`].
#[must_use]
pub fn resolve_sender(raw: Option<&str>, known: Option<&KnownSendersTable>) -> SenderInfo {
    let Some(raw) = raw else {
        return SenderInfo::default();
    };

    let email = BRACKETED_EMAIL
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let name = BRACKETED_EMAIL
        .replace_all(raw, "")
        .trim()
        .replace('"', "")
        .trim()
        .to_string();

    if !email.is_empty() {
        debug!(%email, "Sender address embedded in sender string");
        return SenderInfo::new(name, email);
    }

    let Some(table) = known else {
        debug!(sender = raw, "No sender address and no known-senders table");
        return SenderInfo::new(name, String::new());
    };

    match table.lookup(&name) {
        Some(row) => {
            debug!(%name, email = %row.email, "Sender address from known-senders table");
            let email = row.email.clone();
            SenderInfo::new(name, email)
        }
        None => {
            warn!(sender = raw, "No sender address found in known-senders table");
            SenderInfo::new(name, String::new())
        }
    }
}
