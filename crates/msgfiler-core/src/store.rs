//! Mail-store connector seam.
//!
//! The connector is implemented outside this crate (it talks to the mail
//! client). It exposes two primitives: fetch a message by identifier and
//! persist it as a file. Both are wrapped with a bounded retry here to ride
//! out short periods in which the store is unavailable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::metadata::MessageHandle;
use crate::retry::RetryPolicy;

/// Default number of attempts for store calls.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Default delay between store call attempts.
pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(500);

/// Errors reported by a mail-store connector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store is busy or temporarily unreachable; worth retrying.
    #[error("Mail store temporarily unavailable: {0}")]
    Transient(String),

    /// No message with that identifier.
    #[error("Message not found: {0}")]
    NotFound(String),

    /// Any other failure.
    #[error("Mail store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Whether the call may succeed if repeated.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Access to messages in a mail store.
pub trait MessageStore {
    /// Handle to one message.
    type Handle: MessageHandle;

    /// Looks up a message by its store identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the message cannot be retrieved.
    fn fetch(&self, id: &str) -> Result<Self::Handle, StoreError>;

    /// Persists the message as a file inside `directory` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the message cannot be saved.
    fn save_as_file(&self, handle: &Self::Handle, directory: &Path)
    -> Result<PathBuf, StoreError>;
}

/// Fetches a message, retrying transient failures.
///
/// # Errors
///
/// Returns the last [`StoreError`] if every attempt failed or a
/// non-transient error occurred.
pub fn fetch_with_retry<S: MessageStore + ?Sized>(
    store: &S,
    id: &str,
    policy: &RetryPolicy,
) -> Result<S::Handle, StoreError> {
    let (result, attempts) = policy.run(
        |attempt| {
            debug!(id, attempt, "Fetching message");
            store.fetch(id).inspect_err(|e| warn!(id, attempt, error = %e, "Fetch failed"))
        },
        StoreError::is_transient,
    );
    if result.is_ok() && attempts > 1 {
        debug!(id, attempts, "Message fetched after retries");
    }
    result
}

/// Saves a message as a file, retrying transient failures.
///
/// # Errors
///
/// Returns the last [`StoreError`] if every attempt failed or a
/// non-transient error occurred.
pub fn save_with_retry<S: MessageStore + ?Sized>(
    store: &S,
    handle: &S::Handle,
    directory: &Path,
    policy: &RetryPolicy,
) -> Result<PathBuf, StoreError> {
    let (result, _) = policy.run(
        |attempt| {
            store
                .save_as_file(handle, directory)
                .inspect_err(|e| warn!(attempt, error = %e, "Save failed"))
        },
        StoreError::is_transient,
    );
    result
}
