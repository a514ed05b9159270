//! Result of a filesystem-mutating operation.

use std::io;

/// Closed set of outcomes for file moves and timestamp updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum FileOperationOutcome {
    /// The operation completed.
    Success,
    /// The source file does not exist.
    NotFound,
    /// The destination already exists.
    DestinationExists,
    /// The platform denied access.
    PermissionDenied,
    /// The target is not usable: it is a directory, a path segment is not a
    /// directory, the name is invalid, or the supplied date is malformed.
    InvalidTarget,
    /// The file already carries the requested timestamp; nothing was changed.
    TimestampAlreadyMatches,
    /// Any other failure.
    UnknownError,
}

impl FileOperationOutcome {
    /// Classifies a platform error.
    pub fn from_io_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::AlreadyExists => Self::DestinationExists,
            io::ErrorKind::IsADirectory
            | io::ErrorKind::NotADirectory
            | io::ErrorKind::InvalidFilename => Self::InvalidTarget,
            _ => Self::UnknownError,
        }
    }

    /// Whether an operation that ended this way may succeed if tried again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::UnknownError)
    }

    /// Whether the requested state has been reached.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::TimestampAlreadyMatches)
    }

    /// Stable string representation, used in logs and reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::DestinationExists => "destination_exists",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidTarget => "invalid_target",
            Self::TimestampAlreadyMatches => "timestamp_already_matches",
            Self::UnknownError => "unknown_error",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::NotFound => "File not found",
            Self::DestinationExists => "Destination file already exists",
            Self::PermissionDenied => "Permission denied",
            Self::InvalidTarget => "Invalid target",
            Self::TimestampAlreadyMatches => "Timestamp already matches",
            Self::UnknownError => "Unknown error",
        }
    }
}

impl std::fmt::Display for FileOperationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}
