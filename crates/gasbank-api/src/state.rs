use gasbank_core::GasBankService;
use gasbank_store::{GasBankStore, MemoryStore};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GasBankService>,
}

impl AppState {
    /// State over an in-memory store (demo and tests).
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn GasBankStore>) -> Self {
        AppState {
            service: Arc::new(GasBankService::new(store)),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
