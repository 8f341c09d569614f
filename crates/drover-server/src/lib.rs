use std::sync::Arc;

use drover_client::DEFAULT_BASE_URL;
use drover_core::{EventBus, Orchestrator, WorkflowStore};

mod http;

pub use http::{app_router, serve};

#[derive(Clone)]
pub struct AppState {
    pub store: WorkflowStore,
    pub orchestrator: Arc<Orchestrator>,
    /// Base URL of the RPA provider; per-request override via `apiBaseUrl`.
    pub api_base_url: String,
}

impl AppState {
    pub fn new(api_base_url: Option<String>) -> Self {
        let store = WorkflowStore::new(EventBus::new());
        let orchestrator = Arc::new(Orchestrator::new(store.clone()));
        Self {
            store,
            orchestrator,
            api_base_url: api_base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}
