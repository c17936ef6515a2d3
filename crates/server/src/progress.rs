//! Read-side progress reporting.

use parcel_core::{ProgressReport, SessionId};
use parcel_metadata::MetadataStore;
use std::sync::Arc;

/// Answers progress queries from the session registry.
///
/// Never fails: an unknown session, or one the registry cannot read,
/// reports [`ProgressReport::unknown`].
#[derive(Clone)]
pub struct ProgressTracker {
    metadata: Arc<dyn MetadataStore>,
}

impl ProgressTracker {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    pub async fn progress_of(&self, id: SessionId) -> ProgressReport {
        let row = match self.metadata.get_session(*id.as_uuid()).await {
            Ok(Some(row)) => row,
            Ok(None) => return ProgressReport::unknown(),
            Err(e) => {
                tracing::warn!(upload_id = %id, error = %e, "progress lookup failed");
                return ProgressReport::unknown();
            }
        };

        match row.into_session() {
            Ok(session) => ProgressReport::of(&session),
            Err(e) => {
                tracing::warn!(upload_id = %id, error = %e, "unreadable session record");
                ProgressReport::unknown()
            }
        }
    }
}
