//! Target file names for archived messages.
//!
//! Names follow `<timestamp>_<sender-email>_<subject>.msg`. Empty components
//! stay in place as empty strings, so a message without a send date yields a
//! name starting with `_`. If the full path exceeds the length budget the
//! name is cut and a truncation marker is appended.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::metadata::MessageMetadata;
use crate::sanitize::{SanitizedText, replace_reserved, sanitize};
use crate::sender::{KnownSendersTable, SenderInfo, resolve_sender};

/// `strftime` format of the timestamp component (e.g. `20240305-14uhr30`).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%Huhr%M";

/// File extension of archived messages.
pub const MSG_EXTENSION: &str = "msg";

/// Default maximum path length in characters.
pub const DEFAULT_MAX_PATH_LENGTH: usize = 260;

/// Default marker appended to truncated names.
pub const DEFAULT_TRUNCATION_MARKER: &str = "...msg";

/// Formats a send date as the timestamp component.
///
/// The wall-clock time in the message's own offset is used; the offset is
/// dropped, not converted.
#[must_use]
pub fn format_timestamp(sent_at: &DateTime<FixedOffset>) -> String {
    sent_at.naive_local().format(TIMESTAMP_FORMAT).to_string()
}

/// Builds `<timestamp>_<sender-email>_<subject>.msg`.
///
/// Reserved filesystem characters in the email segment are replaced with `_`.
#[must_use]
pub fn compose_filename(timestamp: &str, sender: &SenderInfo, subject: &SanitizedText) -> String {
    let email = replace_reserved(&sender.email);
    format!("{timestamp}_{email}_{subject}.{MSG_EXTENSION}")
}

/// Path length budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthLimit {
    /// Maximum length of the full path in characters.
    pub max_length: usize,
    /// Marker appended to a truncated file name; counts against the budget.
    pub marker: String,
}

impl Default for LengthLimit {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_PATH_LENGTH,
            marker: DEFAULT_TRUNCATION_MARKER.to_string(),
        }
    }
}

/// A path after the length budget has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedPath {
    /// Resulting full path.
    pub path: PathBuf,
    /// File name component of `path`.
    pub file_name: String,
    /// Whether the file name was shortened.
    pub is_truncated: bool,
    /// Whether the directory alone left no room for any of the original name.
    /// The path may still exceed the budget in that case.
    pub clamped: bool,
}

/// Shortens the file name of `path` so the full path fits `limit`.
///
/// The directory is kept as is. When the path is too long, the first
/// `max_length - len(dir) - len(marker) - 1` characters of the file name are
/// kept and the marker is appended.
#[must_use]
pub fn enforce_path_length(path: &Path, limit: &LengthLimit) -> BoundedPath {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let total_length = path.to_string_lossy().chars().count();

    if total_length <= limit.max_length {
        return BoundedPath {
            path: path.to_path_buf(),
            file_name,
            is_truncated: false,
            clamped: false,
        };
    }

    let directory = path.parent().unwrap_or_else(|| Path::new(""));
    let directory_length = directory.to_string_lossy().chars().count();
    let reserved = directory_length + limit.marker.chars().count() + 1;
    let (keep, clamped) = match limit.max_length.checked_sub(reserved) {
        Some(keep) if keep > 0 => (keep, false),
        _ => (0, true),
    };

    let mut truncated: String = file_name.chars().take(keep).collect();
    truncated.push_str(&limit.marker);

    debug!(
        original = %file_name,
        truncated = %truncated,
        clamped,
        "File name truncated to fit path length"
    );

    BoundedPath {
        path: directory.join(&truncated),
        file_name: truncated,
        is_truncated: true,
        clamped,
    }
}

/// Everything derived for one message's target file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePlan {
    /// Resolved sender.
    pub sender: SenderInfo,
    /// Send date, if known.
    pub sent_at: Option<DateTime<FixedOffset>>,
    /// Timestamp component (empty if the send date is unknown).
    pub timestamp: String,
    /// Subject as read from the message (empty if unknown).
    pub subject: String,
    /// Sanitized subject component.
    pub sanitized_subject: SanitizedText,
    /// Name before the length budget was applied.
    pub composed_name: String,
    /// Name after the length budget was applied.
    pub truncated_name: String,
    /// Whether `truncated_name` differs from `composed_name`.
    pub is_truncated: bool,
    /// Whether truncation had to clamp the kept name to zero characters.
    pub clamped: bool,
    /// Full target path (`directory` joined with `truncated_name`).
    pub target_path: PathBuf,
}

/// Derives the target file name for a message to be stored in `directory`.
///
/// Fields whose metadata tag reports them missing are treated as empty.
#[must_use]
pub fn plan_filename(
    metadata: &MessageMetadata,
    known: Option<&KnownSendersTable>,
    directory: &Path,
    limit: &LengthLimit,
) -> FilenamePlan {
    let sender = resolve_sender(metadata.sender_raw(), known);
    let sent_at = metadata.sent_at();
    let timestamp = sent_at.as_ref().map(format_timestamp).unwrap_or_default();
    let subject = metadata.subject().unwrap_or_default().to_string();
    let sanitized_subject = sanitize(&subject);

    let composed_name = compose_filename(&timestamp, &sender, &sanitized_subject);
    let bounded = enforce_path_length(&directory.join(&composed_name), limit);

    debug!(
        composed = %composed_name,
        target = %bounded.path.display(),
        truncated = bounded.is_truncated,
        "Planned file name"
    );

    FilenamePlan {
        sender,
        sent_at,
        timestamp,
        subject,
        sanitized_subject,
        composed_name,
        truncated_name: bounded.file_name,
        is_truncated: bounded.is_truncated,
        clamped: bounded.clamped,
        target_path: bounded.path,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::{MessageFields, extract_metadata};
    use crate::sender::KnownSender;
    use proptest::prelude::*;

    fn sent(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    #[test]
    fn test_timestamp_keeps_wall_clock() {
        assert_eq!(
            format_timestamp(&sent("2024-03-05T14:30:00+01:00")),
            "20240305-14uhr30"
        );
        assert_eq!(
            format_timestamp(&sent("2024-12-31T09:05:59-05:00")),
            "20241231-09uhr05"
        );
    }

    #[test]
    fn test_compose_keeps_empty_components() {
        let name = compose_filename("", &SenderInfo::default(), &SanitizedText::default());
        assert_eq!(name, "__.msg");
    }

    #[test]
    fn test_compose_filters_email_segment() {
        let sender = SenderInfo {
            name: String::new(),
            email: "odd/addr@example.com".to_string(),
            has_email: true,
        };
        let name = compose_filename("20240101-00uhr00", &sender, &sanitize("Hi"));
        assert_eq!(name, "20240101-00uhr00_odd_addr@example.com_Hi.msg");
    }

    #[test]
    fn test_plan_full_scenario() {
        let fields = MessageFields {
            subject: Some("Invoice #42: Q1/Q2".to_string()),
            sender: Some("Jane Doe <jane@example.com>".to_string()),
            sent_at: Some(sent("2024-03-05T14:30:00+00:00")),
            ..MessageFields::default()
        };
        let metadata = extract_metadata(&fields);
        let plan = plan_filename(&metadata, None, Path::new("/export"), &LengthLimit::default());

        assert_eq!(plan.sanitized_subject.as_str(), "Invoice_42_Q1_Q2");
        assert_eq!(
            plan.composed_name,
            "20240305-14uhr30_jane@example.com_Invoice_42_Q1_Q2.msg"
        );
        assert_eq!(plan.truncated_name, plan.composed_name);
        assert!(!plan.is_truncated);
        assert_eq!(
            plan.target_path,
            Path::new("/export").join("20240305-14uhr30_jane@example.com_Invoice_42_Q1_Q2.msg")
        );
    }

    #[test]
    fn test_plan_missing_date_and_known_sender() {
        let fields = MessageFields {
            subject: Some("Hello".to_string()),
            sender: Some("Jane Doe".to_string()),
            ..MessageFields::default()
        };
        let table = KnownSendersTable::from_rows([KnownSender::new("Jane", "jane@example.com")]);
        let plan = plan_filename(
            &extract_metadata(&fields),
            Some(&table),
            Path::new("out"),
            &LengthLimit::default(),
        );

        assert_eq!(plan.timestamp, "");
        assert_eq!(plan.composed_name, "_jane@example.com_Hello.msg");
    }

    #[test]
    fn test_long_path_is_cut_to_exact_budget() {
        let directory = format!("/{}", "d".repeat(49));
        let name = format!("{}.msg", "n".repeat(310 - 50 - 1 - 4));
        let path = Path::new(&directory).join(&name);
        assert_eq!(path.to_string_lossy().chars().count(), 310);

        let bounded = enforce_path_length(&path, &LengthLimit::default());

        assert!(bounded.is_truncated);
        assert!(!bounded.clamped);
        assert_eq!(bounded.path.to_string_lossy().chars().count(), 260);
        assert!(bounded.file_name.ends_with("...msg"));
        assert_eq!(bounded.path.parent().unwrap(), Path::new(&directory));
    }

    #[test]
    fn test_short_path_is_unchanged() {
        let path = Path::new("/tmp/short.msg");
        let bounded = enforce_path_length(path, &LengthLimit::default());
        assert_eq!(bounded.path, path);
        assert_eq!(bounded.file_name, "short.msg");
        assert!(!bounded.is_truncated);
    }

    #[test]
    fn test_deep_directory_is_clamped() {
        let directory = format!("/{}", "d".repeat(300));
        let path = Path::new(&directory).join("name.msg");
        let bounded = enforce_path_length(&path, &LengthLimit::default());

        assert!(bounded.is_truncated);
        assert!(bounded.clamped);
        assert_eq!(bounded.file_name, DEFAULT_TRUNCATION_MARKER);
    }

    #[test]
    fn test_multibyte_names_are_cut_on_char_boundaries() {
        let limit = LengthLimit {
            max_length: 20,
            marker: "~".to_string(),
        };
        let path = Path::new("/ab").join("äöüäöüäöüäöüäöüäöüäöü.msg");
        let bounded = enforce_path_length(&path, &limit);
        assert_eq!(bounded.path.to_string_lossy().chars().count(), 20);
        assert_eq!(bounded.file_name, "äöüäöüäöüäöüäöü~");
    }

    proptest! {
        #[test]
        fn prop_truncation_respects_budget(
            dir in "[a-z]{1,40}",
            name in "[a-zA-Z0-9_]{0,300}",
            extra in 0usize..200,
        ) {
            let directory = format!("/{dir}");
            let limit = LengthLimit::default();
            let marker_length = limit.marker.chars().count();
            let max_length = directory.chars().count() + marker_length + 2 + extra;
            let limit = LengthLimit { max_length, ..limit };

            let path = Path::new(&directory).join(format!("{name}.msg"));
            let bounded = enforce_path_length(&path, &limit);

            prop_assert!(bounded.path.to_string_lossy().chars().count() <= max_length);
            prop_assert!(!bounded.clamped);
        }
    }
}
