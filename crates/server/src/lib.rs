//! HTTP API server for parcel.
//!
//! This crate provides:
//! - The assembly engine turning independently uploaded chunks into one artifact
//! - Progress reporting for in-flight uploads
//! - The HTTP surface for uploads, the file catalog and tags

pub mod engine;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod metrics;
pub mod progress;
pub mod routes;
pub mod state;

pub use engine::AssemblyEngine;
pub use error::{ApiError, UploadError};
pub use progress::ProgressTracker;
pub use routes::create_router;
pub use state::AppState;
