//! # msgfiler-core
//!
//! Archival pipeline for saved mail messages.
//!
//! This crate provides:
//! - Per-message metadata extraction with accumulated outcome tags
//! - Sender resolution, with a known-senders table as fallback
//! - Subject sanitization into filesystem-safe text
//! - File name composition and path length enforcement
//! - Safe file relocation with retries, plus timestamp setters
//! - A batch archiver driving a mail-store connector

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod config;
mod error;
pub mod filename;
pub mod metadata;
pub mod relocate;
pub mod retry;
pub mod sanitize;
pub mod sender;
pub mod store;

pub use archive::{ArchiveEntry, ArchiveReport, ArchiveStatus, Archiver};
pub use config::ArchiverConfig;
pub use error::{Error, Result};
pub use filename::{
    BoundedPath, FilenamePlan, LengthLimit, compose_filename, enforce_path_length,
    format_timestamp, plan_filename,
};
pub use metadata::{
    FieldError, FieldResult, MessageFields, MessageHandle, MessageMetadata, MetadataOutcome,
    extract_metadata,
};
pub use relocate::{
    FileMover, FileOperationOutcome, FileRelocator, FileTimeKind, FsMover, Relocation,
    set_creation_time, set_file_time, set_file_time_to, set_modification_time,
};
pub use retry::RetryPolicy;
pub use sanitize::{SanitizedText, sanitize};
pub use sender::{KnownSender, KnownSendersTable, SenderInfo, resolve_sender};
pub use store::{MessageStore, StoreError};
