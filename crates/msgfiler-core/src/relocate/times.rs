//! Setting a file's creation or modification time.

use std::fs::{self, FileTimes, OpenOptions};
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, error, warn};

use super::FileOperationOutcome;

/// Format of date strings accepted by [`set_file_time`] (local time).
pub const FILE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which timestamp of a file to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTimeKind {
    /// Last modification time.
    Modified,
    /// Creation time.
    Created,
}

impl FileTimeKind {
    /// Stable string representation, used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Created => "created",
        }
    }
}

/// Parses a `YYYY-MM-DD HH:MM:SS` string as local time.
///
/// Returns `None` for malformed strings and for local times that do not
/// exist (skipped by a daylight-saving change).
#[must_use]
pub fn parse_file_date(value: &str) -> Option<SystemTime> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), FILE_DATE_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(SystemTime::from)
}

/// Sets the modification time from a `YYYY-MM-DD HH:MM:SS` string.
pub fn set_modification_time(path: &Path, value: &str) -> FileOperationOutcome {
    set_file_time(path, FileTimeKind::Modified, value)
}

/// Sets the creation time from a `YYYY-MM-DD HH:MM:SS` string.
pub fn set_creation_time(path: &Path, value: &str) -> FileOperationOutcome {
    set_file_time(path, FileTimeKind::Created, value)
}

/// Sets a file timestamp from a `YYYY-MM-DD HH:MM:SS` string.
///
/// A malformed date yields `InvalidTarget`.
pub fn set_file_time(path: &Path, kind: FileTimeKind, value: &str) -> FileOperationOutcome {
    let Some(time) = parse_file_date(value) else {
        error!(date = value, "Invalid date format");
        return FileOperationOutcome::InvalidTarget;
    };
    set_file_time_to(path, kind, time)
}

/// Sets a file timestamp.
///
/// Returns `TimestampAlreadyMatches` without touching the file if the
/// current value already equals `time` to the second.
pub fn set_file_time_to(path: &Path, kind: FileTimeKind, time: SystemTime) -> FileOperationOutcome {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            let outcome = FileOperationOutcome::from_io_error(&e);
            error!(path = %path.display(), error = %e, "Cannot read file metadata");
            return outcome;
        }
    };
    if meta.is_dir() {
        return FileOperationOutcome::InvalidTarget;
    }

    let current = match kind {
        FileTimeKind::Modified => meta.modified(),
        FileTimeKind::Created => meta.created(),
    };
    if current.is_ok_and(|current| whole_seconds(current) == whole_seconds(time)) {
        debug!(path = %path.display(), kind = kind.as_str(), "Timestamp already matches");
        return FileOperationOutcome::TimestampAlreadyMatches;
    }

    let times = FileTimes::new();
    let times = match kind {
        FileTimeKind::Modified => times.set_modified(time),
        FileTimeKind::Created => match with_created(times, time) {
            Some(times) => times,
            None => {
                warn!(path = %path.display(), "Creation time cannot be set on this platform");
                return FileOperationOutcome::UnknownError;
            }
        },
    };

    let result = OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_times(times));
    match result {
        Ok(()) => {
            debug!(path = %path.display(), kind = kind.as_str(), "Timestamp set");
            FileOperationOutcome::Success
        }
        Err(e) => {
            error!(path = %path.display(), kind = kind.as_str(), error = %e, "Cannot set timestamp");
            FileOperationOutcome::from_io_error(&e)
        }
    }
}

fn whole_seconds(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

#[cfg(windows)]
fn with_created(times: FileTimes, time: SystemTime) -> Option<FileTimes> {
    use std::os::windows::fs::FileTimesExt;
    Some(times.set_created(time))
}

#[cfg(target_os = "macos")]
fn with_created(times: FileTimes, time: SystemTime) -> Option<FileTimes> {
    use std::os::macos::fs::FileTimesExt;
    Some(times.set_created(time))
}

#[cfg(not(any(windows, target_os = "macos")))]
#[allow(clippy::unnecessary_wraps, clippy::needless_pass_by_value)]
fn with_created(_times: FileTimes, _time: SystemTime) -> Option<FileTimes> {
    None
}
