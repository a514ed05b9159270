//! Archiving messages from a mail store.
//!
//! For each message: fetch it, read its metadata, save it as a file, derive
//! the target name and move the file there. A message that fails at any step
//! is recorded in the [`ArchiveReport`] and the batch continues.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::config::ArchiverConfig;
use crate::filename::{FilenamePlan, LengthLimit, plan_filename};
use crate::metadata::{MessageMetadata, MetadataOutcome, extract_metadata};
use crate::relocate::{FileOperationOutcome, FileRelocator, FileTimeKind, set_file_time_to};
use crate::retry::RetryPolicy;
use crate::sender::KnownSendersTable;
use crate::store::{MessageStore, StoreError, fetch_with_retry, save_with_retry};

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveStatus {
    /// Saved and moved to its target name.
    Archived,
    /// The target already held the file from an earlier run.
    AlreadyArchived,
    /// The message could not be fetched from the store.
    FetchFailed(StoreError),
    /// The message could not be saved as a file.
    SaveFailed(StoreError),
    /// No metadata field could be read, so no name could be derived. The
    /// saved file is left where the store put it.
    NoMetadata,
    /// The saved file could not be moved.
    RelocationFailed(FileOperationOutcome),
}

impl ArchiveStatus {
    /// Whether the message ended up at its target path.
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        matches!(self, Self::Archived | Self::AlreadyArchived)
    }
}

/// Per-message record of an archive run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Store identifier of the message.
    pub id: String,
    /// Final status.
    pub status: ArchiveStatus,
    /// Metadata outcome tags.
    pub outcomes: BTreeSet<MetadataOutcome>,
    /// Where the store saved the file.
    pub saved_path: Option<PathBuf>,
    /// Name plan, if one was derived.
    pub plan: Option<FilenamePlan>,
    /// Result of stamping the send date on the file, if attempted.
    pub timestamp_outcome: Option<FileOperationOutcome>,
}

impl ArchiveEntry {
    fn new(id: &str, status: ArchiveStatus, metadata: &MessageMetadata) -> Self {
        Self {
            id: id.to_string(),
            status,
            outcomes: metadata.outcomes().clone(),
            saved_path: None,
            plan: None,
            timestamp_outcome: None,
        }
    }

    /// Final path of the archived file.
    #[must_use]
    pub fn final_path(&self) -> Option<&Path> {
        if self.status.is_archived() {
            self.plan.as_ref().map(|plan| plan.target_path.as_path())
        } else {
            None
        }
    }
}

/// Result of an archive batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    /// One entry per requested message, in request order.
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveReport {
    /// Number of messages now at their target path.
    #[must_use]
    pub fn archived_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status.is_archived())
            .count()
    }

    /// Number of messages that were skipped.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.archived_count()
    }

    /// Entries whose file name had to be truncated.
    pub fn truncated(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.plan.as_ref().is_some_and(|plan| plan.is_truncated))
    }
}

/// Runs the archival pipeline against a mail store.
pub struct Archiver<'a, S: ?Sized> {
    store: &'a S,
    known_senders: Option<&'a KnownSendersTable>,
    relocator: FileRelocator,
    export_dir: PathBuf,
    limit: LengthLimit,
    fetch_policy: RetryPolicy,
    stamp_sent_date: bool,
}

impl<'a, S: MessageStore + ?Sized> Archiver<'a, S> {
    /// Creates an archiver from configuration.
    #[must_use]
    pub fn new(
        store: &'a S,
        config: &ArchiverConfig,
        known_senders: Option<&'a KnownSendersTable>,
    ) -> Self {
        Self {
            store,
            known_senders,
            relocator: FileRelocator::new(config.move_policy()),
            export_dir: config.export_dir.clone(),
            limit: config.length_limit(),
            fetch_policy: config.fetch_policy(),
            stamp_sent_date: config.stamp_sent_date,
        }
    }

    /// Archives one message.
    pub fn archive_message(&self, id: &str) -> ArchiveEntry {
        let handle = match fetch_with_retry(self.store, id, &self.fetch_policy) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(id, error = %e, "Skipping message, fetch failed");
                return ArchiveEntry::new(
                    id,
                    ArchiveStatus::FetchFailed(e),
                    &MessageMetadata::unavailable(),
                );
            }
        };

        let metadata = extract_metadata(&handle);

        let saved = match save_with_retry(self.store, &handle, &self.export_dir, &self.fetch_policy)
        {
            Ok(path) => path,
            Err(e) => {
                warn!(id, error = %e, "Skipping message, save failed");
                return ArchiveEntry::new(id, ArchiveStatus::SaveFailed(e), &metadata);
            }
        };

        if !metadata.is_success() {
            warn!(id, path = %saved.display(), "Skipping message, no metadata to name it by");
            let mut entry = ArchiveEntry::new(id, ArchiveStatus::NoMetadata, &metadata);
            entry.saved_path = Some(saved);
            return entry;
        }

        let directory = saved.parent().unwrap_or(self.export_dir.as_path());
        let plan = plan_filename(&metadata, self.known_senders, directory, &self.limit);
        if plan.is_truncated {
            info!(id, name = %plan.truncated_name, "Target name truncated");
        }

        let relocation = self.relocator.relocate(&saved, &plan.target_path);
        let status = if relocation.outcome == FileOperationOutcome::Success {
            ArchiveStatus::Archived
        } else if relocation.is_done() {
            ArchiveStatus::AlreadyArchived
        } else {
            warn!(id, outcome = relocation.outcome.as_str(), "Skipping message, move failed");
            ArchiveStatus::RelocationFailed(relocation.outcome)
        };

        let timestamp_outcome = match plan.sent_at {
            Some(sent_at) if self.stamp_sent_date && status.is_archived() => Some(set_file_time_to(
                &plan.target_path,
                FileTimeKind::Modified,
                SystemTime::from(sent_at),
            )),
            _ => None,
        };

        let mut entry = ArchiveEntry::new(id, status, &metadata);
        entry.saved_path = Some(saved);
        entry.plan = Some(plan);
        entry.timestamp_outcome = timestamp_outcome;
        entry
    }

    /// Archives each message in turn, continuing past failures.
    pub fn archive_batch<I>(&self, ids: I) -> ArchiveReport
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let entries: Vec<_> = ids
            .into_iter()
            .map(|id| self.archive_message(id.as_ref()))
            .collect();
        let report = ArchiveReport { entries };
        info!(
            archived = report.archived_count(),
            failed = report.failed_count(),
            "Archive batch finished"
        );
        report
    }
}
