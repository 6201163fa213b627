// retention/mod.rs — Retention & Erasure Engine.
//
// Enforces data-minimization policy over time (scheduled cleanup) and on
// explicit subject request (export / anonymize / delete-account). All writes
// go through atomic batches or idempotent updates — no cross-request locking.

pub mod cleanup;
pub mod erasure;
pub mod export;

pub use cleanup::{run_retention_job, CleanupReport};
pub use export::ExportArtifact;

use std::sync::Arc;

use crate::blobs::BlobStore;
use crate::store::Storage;

/// Subcollections included in a subject-access export.
pub const EXPORT_COLLECTIONS: [&str; 5] = [
    "enrolledCourses",
    "achievements",
    "certificates",
    "payments",
    "progress",
];

/// Subcollections purged on account deletion — the export set plus the
/// consent and privacy records that only matter while the account exists.
pub const PURGE_COLLECTIONS: [&str; 7] = [
    "enrolledCourses",
    "achievements",
    "certificates",
    "payments",
    "progress",
    "consent",
    "privacy",
];

pub struct RetentionEngine {
    storage: Arc<Storage>,
    blobs: Arc<BlobStore>,
}

impl RetentionEngine {
    pub fn new(storage: Arc<Storage>, blobs: Arc<BlobStore>) -> Self {
        Self { storage, blobs }
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    pub(crate) fn blobs(&self) -> &BlobStore {
        &self.blobs
    }
}
