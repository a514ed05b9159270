//! Moving message files to their target names.
//!
//! [`FileRelocator`] moves one file per call. Permanent failures
//! (`NotFound`, `PermissionDenied`, `DestinationExists`, `InvalidTarget`)
//! are returned at once; anything else is retried according to the
//! [`RetryPolicy`]. The source is never deleted except by the move itself,
//! and an existing destination is never overwritten.

mod outcome;
mod times;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use crate::retry::RetryPolicy;

pub use outcome::FileOperationOutcome;
pub use times::{
    FILE_DATE_FORMAT, FileTimeKind, parse_file_date, set_creation_time, set_file_time,
    set_file_time_to, set_modification_time,
};

/// The platform's "move file from A to B" primitive.
pub trait FileMover {
    /// Moves `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns the platform error if the move fails.
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Moves files with [`std::fs::rename`], copying across filesystems.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMover;

impl FileMover for FsMover {
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!(from = %from.display(), to = %to.display(), "Cross-device move, copying");
                fs::copy(from, to)?;
                if let Err(e) = fs::remove_file(from) {
                    // Leave exactly one copy behind: the source.
                    let _ = fs::remove_file(to);
                    return Err(e);
                }
                Ok(())
            }
            result => result,
        }
    }
}

/// Result of one [`FileRelocator::relocate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Final outcome.
    pub outcome: FileOperationOutcome,
    /// Number of move attempts made (zero if rejected before moving).
    pub attempts: u32,
    /// Whether the destination existed when the source turned out to be
    /// missing.
    pub destination_present: bool,
}

impl Relocation {
    const fn rejected(outcome: FileOperationOutcome) -> Self {
        Self {
            outcome,
            attempts: 0,
            destination_present: false,
        }
    }

    /// Whether the file is at its target path.
    ///
    /// A missing source with an existing destination is treated as done: an
    /// earlier call already moved it.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.outcome, FileOperationOutcome::Success)
            || (matches!(self.outcome, FileOperationOutcome::NotFound) && self.destination_present)
    }
}

/// Moves files with bounded retries.
///
/// Destinations being moved to are tracked so that two concurrent calls
/// targeting the same path cannot race: the second one reports
/// `DestinationExists` without touching either file.
#[derive(Debug, Default)]
pub struct FileRelocator<M = FsMover> {
    mover: M,
    policy: RetryPolicy,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl FileRelocator<FsMover> {
    /// Creates a relocator that uses the real filesystem.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_mover(FsMover, policy)
    }
}

impl<M: FileMover> FileRelocator<M> {
    /// Creates a relocator with a custom move primitive.
    #[must_use]
    pub fn with_mover(mover: M, policy: RetryPolicy) -> Self {
        Self {
            mover,
            policy,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Moves `source` to `target`.
    pub fn relocate(&self, source: &Path, target: &Path) -> Relocation {
        if source == target {
            return if source.is_file() {
                debug!(path = %source.display(), "File already has its target name");
                Relocation::rejected(FileOperationOutcome::Success)
            } else {
                Relocation::rejected(FileOperationOutcome::NotFound)
            };
        }

        let Some(_claim) = DestinationClaim::acquire(&self.in_flight, target) else {
            warn!(target = %target.display(), "Destination is already being moved to");
            return Relocation::rejected(FileOperationOutcome::DestinationExists);
        };

        let (result, attempts) = self.policy.run(
            |attempt| {
                debug!(
                    attempt,
                    source = %source.display(),
                    target = %target.display(),
                    "Moving file"
                );
                check_source(source)?;
                check_destination(target)?;
                self.mover
                    .move_file(source, target)
                    .map_err(|e| {
                        let outcome = match FileOperationOutcome::from_io_error(&e) {
                            // The source is still there, so the target path is at fault.
                            FileOperationOutcome::NotFound if source.exists() => {
                                FileOperationOutcome::InvalidTarget
                            }
                            other => other,
                        };
                        if outcome.is_retryable() {
                            warn!(attempt, error = %e, "Move failed");
                        }
                        outcome
                    })
            },
            FileOperationOutcome::is_retryable,
        );

        let outcome = match result {
            Ok(()) => FileOperationOutcome::Success,
            Err(outcome) => outcome,
        };

        let destination_present =
            outcome == FileOperationOutcome::NotFound && target.exists();

        match outcome {
            FileOperationOutcome::Success => {
                info!(target = %target.display(), attempts, "File moved");
            }
            FileOperationOutcome::NotFound if destination_present => {
                info!(
                    source = %source.display(),
                    target = %target.display(),
                    "Source missing but destination present, already moved"
                );
            }
            other => {
                error!(
                    source = %source.display(),
                    target = %target.display(),
                    outcome = other.as_str(),
                    attempts,
                    "File could not be moved"
                );
            }
        }

        Relocation {
            outcome,
            attempts,
            destination_present,
        }
    }
}

/// Rejects a source that is known to be gone or inaccessible.
fn check_source(source: &Path) -> Result<(), FileOperationOutcome> {
    match fs::symlink_metadata(source) {
        Ok(_) => Ok(()),
        Err(e) => match FileOperationOutcome::from_io_error(&e) {
            FileOperationOutcome::UnknownError => Ok(()),
            other => Err(other),
        },
    }
}

/// Rejects destinations that exist or cannot be created.
///
/// A missing parent directory is `InvalidTarget`, never `NotFound`: the
/// latter is reserved for a source that is gone.
fn check_destination(target: &Path) -> Result<(), FileOperationOutcome> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        match fs::metadata(parent) {
            Ok(meta) if !meta.is_dir() => return Err(FileOperationOutcome::InvalidTarget),
            Ok(_) => {}
            Err(e) => match FileOperationOutcome::from_io_error(&e) {
                FileOperationOutcome::UnknownError => {}
                FileOperationOutcome::NotFound => return Err(FileOperationOutcome::InvalidTarget),
                other => return Err(other),
            },
        }
    }
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => Err(FileOperationOutcome::InvalidTarget),
        Ok(_) => Err(FileOperationOutcome::DestinationExists),
        Err(e) => match FileOperationOutcome::from_io_error(&e) {
            // Nothing there yet: this is the expected case.
            FileOperationOutcome::NotFound | FileOperationOutcome::UnknownError => Ok(()),
            other => Err(other),
        },
    }
}

/// Marks a destination as in use for as long as the claim lives.
struct DestinationClaim<'a> {
    in_flight: &'a Mutex<HashSet<PathBuf>>,
    target: PathBuf,
}

impl<'a> DestinationClaim<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<PathBuf>>, target: &Path) -> Option<Self> {
        let mut set = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(target.to_path_buf()) {
            return None;
        }
        Some(Self {
            in_flight,
            target: target.to_path_buf(),
        })
    }
}

impl Drop for DestinationClaim<'_> {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        set.remove(&self.target);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    /// Fails with a transient error until the given attempt, then renames.
    struct FlakyMover {
        succeed_on: u32,
        calls: Cell<u32>,
        moves: Cell<u32>,
    }

    impl FlakyMover {
        fn new(succeed_on: u32) -> Self {
            Self {
                succeed_on,
                calls: Cell::new(0),
                moves: Cell::new(0),
            }
        }
    }

    impl FileMover for FlakyMover {
        fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            if call < self.succeed_on {
                return Err(io::Error::other("sharing violation"));
            }
            fs::rename(from, to)?;
            self.moves.set(self.moves.get() + 1);
            Ok(())
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    fn write_file(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_move_success() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        let target = dir.path().join("renamed.msg");
        write_file(&source, "body");

        let relocation = FileRelocator::new(policy(3)).relocate(&source, &target);

        assert_eq!(relocation.outcome, FileOperationOutcome::Success);
        assert_eq!(relocation.attempts, 1);
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "body");
    }

    #[test]
    fn test_destination_exists_leaves_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        let target = dir.path().join("renamed.msg");
        write_file(&source, "new");
        write_file(&target, "old");

        let relocation = FileRelocator::new(policy(3)).relocate(&source, &target);

        assert_eq!(relocation.outcome, FileOperationOutcome::DestinationExists);
        assert_eq!(fs::read_to_string(&source).unwrap(), "new");
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
    }

    #[test]
    fn test_target_is_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        let target = dir.path().join("folder");
        write_file(&source, "body");
        fs::create_dir(&target).unwrap();

        let relocation = FileRelocator::new(policy(3)).relocate(&source, &target);

        assert_eq!(relocation.outcome, FileOperationOutcome::InvalidTarget);
        assert!(source.exists());
    }

    #[test]
    fn test_missing_target_directory_is_invalid_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        let target = dir.path().join("nope").join("renamed.msg");
        write_file(&source, "body");

        let relocation = FileRelocator::new(policy(3)).relocate(&source, &target);

        assert_eq!(relocation.outcome, FileOperationOutcome::InvalidTarget);
        assert!(!relocation.destination_present);
        assert!(!relocation.is_done());
        assert_eq!(fs::read_to_string(&source).unwrap(), "body");
    }

    #[test]
    fn test_target_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        let blocker = dir.path().join("blocker");
        write_file(&source, "body");
        write_file(&blocker, "not a directory");

        let target = blocker.join("renamed.msg");

        let relocation = FileRelocator::new(policy(3)).relocate(&source, &target);

        assert_eq!(relocation.outcome, FileOperationOutcome::InvalidTarget);
        assert!(source.exists());
    }

    /// Reports `NotFound` without touching anything, as when the target
    /// directory disappears between the checks and the move.
    struct VanishedDirMover;

    impl FileMover for VanishedDirMover {
        fn move_file(&self, _from: &Path, _to: &Path) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
    }

    #[test]
    fn test_not_found_with_source_present_is_invalid_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        let target = dir.path().join("renamed.msg");
        write_file(&source, "body");

        let relocation =
            FileRelocator::with_mover(VanishedDirMover, policy(3)).relocate(&source, &target);

        assert_eq!(relocation.outcome, FileOperationOutcome::InvalidTarget);
        assert_eq!(relocation.attempts, 1);
        assert!(!relocation.is_done());
        assert!(source.exists());
    }

    #[test]
    fn test_missing_source_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("missing.msg");
        let target = dir.path().join("renamed.msg");

        let relocation = FileRelocator::new(policy(3)).relocate(&source, &target);

        assert_eq!(relocation.outcome, FileOperationOutcome::NotFound);
        assert_eq!(relocation.attempts, 1);
        assert!(!relocation.is_done());
    }

    #[test]
    fn test_second_call_reports_already_moved() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        let target = dir.path().join("renamed.msg");
        write_file(&source, "body");
        let relocator = FileRelocator::new(policy(3));

        assert!(relocator.relocate(&source, &target).is_done());
        let again = relocator.relocate(&source, &target);

        assert_eq!(again.outcome, FileOperationOutcome::NotFound);
        assert!(again.destination_present);
        assert!(again.is_done());
        assert_eq!(fs::read_to_string(&target).unwrap(), "body");
    }

    /// Another party moves the file just before our move runs.
    struct RacingMover;

    impl FileMover for RacingMover {
        fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
            fs::rename(from, to)?;
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
    }

    #[test]
    fn test_source_vanishing_during_move() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        let target = dir.path().join("renamed.msg");
        write_file(&source, "body");

        let relocation = FileRelocator::with_mover(RacingMover, policy(3)).relocate(&source, &target);

        assert_eq!(relocation.outcome, FileOperationOutcome::NotFound);
        assert_eq!(relocation.attempts, 1);
        assert!(relocation.destination_present);
        assert!(relocation.is_done());
    }

    #[test]
    fn test_same_path_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        write_file(&source, "body");

        let relocation = FileRelocator::new(policy(3)).relocate(&source, &source);

        assert_eq!(relocation.outcome, FileOperationOutcome::Success);
        assert_eq!(relocation.attempts, 0);
        assert!(source.exists());
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        let target = dir.path().join("renamed.msg");
        write_file(&source, "body");

        let relocator = FileRelocator::with_mover(FlakyMover::new(3), policy(3));
        let relocation = relocator.relocate(&source, &target);

        assert_eq!(relocation.outcome, FileOperationOutcome::Success);
        assert_eq!(relocation.attempts, 3);
        assert_eq!(relocator.mover.moves.get(), 1);
        assert!(target.exists());
        assert!(!source.exists());
    }

    #[test]
    fn test_retries_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("message.msg");
        let target = dir.path().join("renamed.msg");
        write_file(&source, "body");

        let relocator = FileRelocator::with_mover(FlakyMover::new(10), policy(3));
        let relocation = relocator.relocate(&source, &target);

        assert_eq!(relocation.outcome, FileOperationOutcome::UnknownError);
        assert_eq!(relocation.attempts, 3);
        assert_eq!(relocator.mover.calls.get(), 3);
        assert!(source.exists());
        assert!(!target.exists());
    }

    #[test]
    fn test_destination_claim_blocks_concurrent_move() {
        let in_flight = Mutex::new(HashSet::new());
        let target = Path::new("/tmp/claimed.msg");

        let first = DestinationClaim::acquire(&in_flight, target);
        assert!(first.is_some());
        assert!(DestinationClaim::acquire(&in_flight, target).is_none());

        drop(first);
        assert!(DestinationClaim::acquire(&in_flight, target).is_some());
    }
}
