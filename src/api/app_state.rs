use crate::security::pipeline::SecurityPipeline;
use crate::storage::files::{FileStore, MemoryFileStore};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared by the handlers and the pipeline layer
#[derive(Clone)]
pub struct AppState {
    /// Request-defense pipeline
    pub pipeline: Arc<SecurityPipeline>,
    /// Store for screened uploads
    pub files: Arc<dyn FileStore>,
    /// Service version reported by the health check
    pub version: String,
    /// Process start, for uptime
    pub start_time: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("pipeline", &self.pipeline)
            .field("files", &"Arc<dyn FileStore>")
            .field("version", &self.version)
            .finish()
    }
}

impl AppState {
    /// Create new application state
    pub fn new(pipeline: Arc<SecurityPipeline>, files: Arc<dyn FileStore>) -> Self {
        Self {
            pipeline,
            files,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    /// Application state backed by the in-memory file store
    pub fn in_memory(pipeline: Arc<SecurityPipeline>) -> Self {
        Self::new(pipeline, Arc::new(MemoryFileStore::new()))
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}
