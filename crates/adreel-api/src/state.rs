//! Application state.

use std::sync::Arc;

use adreel_engine::AdEngine;
use adreel_store::MemoryStore;
use adreel_storage::DeliveryUrlGenerator;

use crate::auth::SessionVerifier;
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub engine: Arc<AdEngine>,
    pub store: Arc<MemoryStore>,
    /// Signed download URLs; `None` when no blob store is configured.
    pub delivery: Option<Arc<DeliveryUrlGenerator>>,
    pub verifier: Arc<dyn SessionVerifier>,
}
