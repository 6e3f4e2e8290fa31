//! Application state for API handlers

use crate::render::Renderer;
use quill_review::{DocumentLibrary, ProposalEngine, ProposalQuery};
use quill_storage::{LifecycleStore, QuillStorage};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: ProposalEngine,
    pub query: ProposalQuery,
    pub library: DocumentLibrary,

    /// Optional image renderer
    pub renderer: Option<Arc<dyn Renderer>>,

    /// Storage backend label, reported by the health check
    pub backend: &'static str,

    pub version: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(storage: Arc<dyn QuillStorage>, renderer: Option<Arc<dyn Renderer>>) -> Self {
        Self {
            engine: ProposalEngine::new(storage.clone()),
            query: ProposalQuery::new(storage.clone()),
            library: DocumentLibrary::new(storage.clone()),
            renderer,
            backend: storage.backend_label(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
