//! Per-message metadata extraction.
//!
//! A [`MessageHandle`] is whatever the mail-store connector hands back for a
//! single message. Every field is read independently: a missing or broken
//! field is recorded as a [`MetadataOutcome`] tag and never aborts the
//! extraction of the remaining fields.

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

/// Placeholder used for attachments that carry no file name at all.
const UNNAMED_ATTACHMENT: &str = "unnamed";

/// Why a single field accessor failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// The accessor itself failed (property absent from the object model).
    #[error("Field accessor failed: {0}")]
    Attribute(String),

    /// The stored value could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The value could not be re-encoded for the caller.
    #[error("Encode error: {0}")]
    Encode(String),
}

/// Result of reading one field: `Ok(None)` means the field is absent.
pub type FieldResult<T> = std::result::Result<Option<T>, FieldError>;

/// Read access to one message as exposed by the mail-store connector.
pub trait MessageHandle {
    /// Subject line.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the property cannot be read.
    fn subject(&self) -> FieldResult<String>;

    /// Raw sender string, e.g. `"Jane Doe" <jane@example.com>`.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the property cannot be read.
    fn sender(&self) -> FieldResult<String>;

    /// Raw recipient (`To`) string.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the property cannot be read.
    fn recipients(&self) -> FieldResult<String>;

    /// Send date with the offset recorded in the message.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the property cannot be read.
    fn sent_at(&self) -> FieldResult<DateTime<FixedOffset>>;

    /// Body text. Only its presence is tracked.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the body cannot be decoded.
    fn body(&self) -> FieldResult<String>;

    /// Attachment file names.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the attachment table cannot be read.
    fn attachments(&self) -> FieldResult<Vec<String>>;
}

/// Outcome tag for metadata extraction.
///
/// Tags accumulate: a message may carry `Success` together with any number
/// of field-specific tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataOutcome {
    /// At least one field was extracted.
    Success,
    /// Subject absent or unreadable.
    SubjectMissing,
    /// Sender absent or unreadable.
    SenderMissing,
    /// Recipient absent or unreadable.
    RecipientMissing,
    /// Send date absent or unreadable.
    DateMissing,
    /// Body absent or unreadable.
    BodyMissing,
    /// No attachments, or the attachment table was unreadable.
    AttachmentsMissing,
    /// A field accessor failed.
    AttributeError,
    /// A field could not be decoded.
    DecodeError,
    /// A field could not be encoded.
    EncodeError,
    /// The message handle itself could not be obtained.
    Unavailable,
}

impl MetadataOutcome {
    /// Stable string representation, used in logs and reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SubjectMissing => "subject_missing",
            Self::SenderMissing => "sender_missing",
            Self::RecipientMissing => "recipient_missing",
            Self::DateMissing => "date_missing",
            Self::BodyMissing => "body_missing",
            Self::AttachmentsMissing => "attachments_missing",
            Self::AttributeError => "attribute_error",
            Self::DecodeError => "decode_error",
            Self::EncodeError => "encode_error",
            Self::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for MetadataOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&FieldError> for MetadataOutcome {
    fn from(err: &FieldError) -> Self {
        match err {
            FieldError::Attribute(_) => Self::AttributeError,
            FieldError::Decode(_) => Self::DecodeError,
            FieldError::Encode(_) => Self::EncodeError,
        }
    }
}

/// Metadata of one message, built once by [`extract_metadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    subject: Option<String>,
    sender_raw: Option<String>,
    sent_at: Option<DateTime<FixedOffset>>,
    recipient: Option<String>,
    attachments: Vec<String>,
    outcomes: BTreeSet<MetadataOutcome>,
}

impl MessageMetadata {
    /// Metadata for a message whose handle could not be obtained at all.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            subject: None,
            sender_raw: None,
            sent_at: None,
            recipient: None,
            attachments: Vec::new(),
            outcomes: BTreeSet::from([MetadataOutcome::Unavailable]),
        }
    }

    /// Subject, if it was extracted.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.usable(MetadataOutcome::SubjectMissing, self.subject.as_deref())
    }

    /// Raw sender string, if it was extracted.
    #[must_use]
    pub fn sender_raw(&self) -> Option<&str> {
        self.usable(MetadataOutcome::SenderMissing, self.sender_raw.as_deref())
    }

    /// Send date, if it was extracted.
    #[must_use]
    pub fn sent_at(&self) -> Option<DateTime<FixedOffset>> {
        self.usable(MetadataOutcome::DateMissing, self.sent_at)
    }

    /// Raw recipient string, if it was extracted.
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        self.usable(MetadataOutcome::RecipientMissing, self.recipient.as_deref())
    }

    /// Attachment file names (empty when none were found).
    #[must_use]
    pub fn attachments(&self) -> &[String] {
        &self.attachments
    }

    /// All outcome tags recorded for this message.
    #[must_use]
    pub const fn outcomes(&self) -> &BTreeSet<MetadataOutcome> {
        &self.outcomes
    }

    /// Returns true if the given tag was recorded.
    #[must_use]
    pub fn has(&self, outcome: MetadataOutcome) -> bool {
        self.outcomes.contains(&outcome)
    }

    /// Returns true if at least one field was extracted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.has(MetadataOutcome::Success)
    }

    fn usable<T>(&self, missing: MetadataOutcome, value: Option<T>) -> Option<T> {
        if self.is_success() && !self.has(missing) {
            value
        } else {
            None
        }
    }
}

/// A value that counts as "present" only when it is non-empty.
trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for Vec<String> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for DateTime<FixedOffset> {
    fn is_present(&self) -> bool {
        true
    }
}

/// Records the outcome of one field read and returns the value if present.
fn read_field<T: Presence>(
    field: &'static str,
    result: FieldResult<T>,
    missing: MetadataOutcome,
    outcomes: &mut BTreeSet<MetadataOutcome>,
) -> Option<T> {
    match result {
        Ok(Some(value)) if value.is_present() => {
            outcomes.insert(MetadataOutcome::Success);
            Some(value)
        }
        Ok(_) => {
            debug!(field, "Field missing");
            outcomes.insert(missing);
            None
        }
        Err(e) => {
            warn!(field, error = %e, "Field unreadable");
            outcomes.insert(missing);
            outcomes.insert(MetadataOutcome::from(&e));
            None
        }
    }
}

/// Extracts all tracked fields from a message handle.
///
/// Never fails: each field is attempted independently and every missing or
/// unreadable field adds its own tag. `Success` is present iff at least one
/// field was read.
pub fn extract_metadata<H: MessageHandle + ?Sized>(handle: &H) -> MessageMetadata {
    let mut outcomes = BTreeSet::new();

    let subject = read_field(
        "subject",
        handle.subject(),
        MetadataOutcome::SubjectMissing,
        &mut outcomes,
    );
    let sender_raw = read_field(
        "sender",
        handle.sender(),
        MetadataOutcome::SenderMissing,
        &mut outcomes,
    );
    let recipient = read_field(
        "recipient",
        handle.recipients(),
        MetadataOutcome::RecipientMissing,
        &mut outcomes,
    );
    let sent_at = read_field(
        "date",
        handle.sent_at(),
        MetadataOutcome::DateMissing,
        &mut outcomes,
    );
    let _ = read_field(
        "body",
        handle.body(),
        MetadataOutcome::BodyMissing,
        &mut outcomes,
    );
    let attachments = read_field(
        "attachments",
        handle.attachments(),
        MetadataOutcome::AttachmentsMissing,
        &mut outcomes,
    )
    .map(|names| {
        names
            .into_iter()
            .map(|name| {
                if name.trim().is_empty() {
                    UNNAMED_ATTACHMENT.to_string()
                } else {
                    name
                }
            })
            .collect()
    })
    .unwrap_or_default();

    debug!(
        outcomes = ?outcomes.iter().map(MetadataOutcome::as_str).collect::<Vec<_>>(),
        "Metadata extracted"
    );

    MessageMetadata {
        subject,
        sender_raw,
        sent_at,
        recipient,
        attachments,
        outcomes,
    }
}

/// A message whose fields are already known.
///
/// Used when metadata comes from somewhere other than a live store, such as
/// command-line arguments or a table row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFields {
    /// Subject line.
    pub subject: Option<String>,
    /// Raw sender string.
    pub sender: Option<String>,
    /// Raw recipient string.
    pub recipient: Option<String>,
    /// Send date.
    pub sent_at: Option<DateTime<FixedOffset>>,
    /// Body text.
    pub body: Option<String>,
    /// Attachment file names.
    pub attachments: Vec<String>,
}

impl MessageHandle for MessageFields {
    fn subject(&self) -> FieldResult<String> {
        Ok(self.subject.clone())
    }

    fn sender(&self) -> FieldResult<String> {
        Ok(self.sender.clone())
    }

    fn recipients(&self) -> FieldResult<String> {
        Ok(self.recipient.clone())
    }

    fn sent_at(&self) -> FieldResult<DateTime<FixedOffset>> {
        Ok(self.sent_at)
    }

    fn body(&self) -> FieldResult<String> {
        Ok(self.body.clone())
    }

    fn attachments(&self) -> FieldResult<Vec<String>> {
        Ok(Some(self.attachments.clone()))
    }
}
