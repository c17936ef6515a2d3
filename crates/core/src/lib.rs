//! Core domain types and shared logic for the parcel upload service.
//!
//! This crate defines the data model used across all other crates:
//! - Upload session identifiers, status and progress arithmetic
//! - Storage keys and the object layout derived from them
//! - Catalog and tag wire types
//! - Configuration shared by the server and tooling

pub mod catalog;
pub mod config;
pub mod error;
pub mod storage_key;
pub mod upload;

pub use catalog::{FileEntry, Tag, TagId};
pub use error::{Error, Result};
pub use storage_key::StorageKey;
pub use upload::{ChunkReceipt, ProgressReport, SessionId, UploadSession, UploadStatus};

/// Default chunk size handed to clients: 5 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum accepted chunk payload: 32 MiB
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Minimum configurable chunk size: 64 KiB
pub const MIN_CHUNK_SIZE: u64 = 64 * 1024;

/// Progress value reported for sessions the registry does not know.
pub const UNKNOWN_PROGRESS: i32 = -1;
