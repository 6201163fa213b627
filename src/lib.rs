pub mod ai;
pub mod auth;
pub mod blobs;
pub mod certificates;
pub mod config;
pub mod errors;
pub mod rest;
pub mod retention;
pub mod retry;
pub mod store;
pub mod validate;

use std::sync::Arc;

use blobs::BlobStore;
use certificates::GenerationTask;
use config::{HotConfig, ServiceConfig};
use retention::RetentionEngine;
use store::Storage;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;

/// Shared application state passed to every request handler and background job.
///
/// Constructed once at process start — there are no module-level singletons.
/// Tests build their own context over a temp directory.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServiceConfig>,
    pub storage: Arc<Storage>,
    pub blobs: Arc<BlobStore>,
    pub retention: Arc<RetentionEngine>,
    /// Handle for enqueueing certificate-generation tasks. The worker on the
    /// other end drives every `pending` certificate to a terminal state.
    pub cert_queue: UnboundedSender<GenerationTask>,
    /// Config fields that can change without a restart (retention periods).
    pub hot: Arc<RwLock<HotConfig>>,
    pub started_at: std::time::Instant,
}
