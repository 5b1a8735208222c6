use crate::config::MutationConfig;
use std::sync::Arc;

/// Shared by every request handler. The rules are never mutated after startup,
/// so concurrent admissions need no locking.
#[derive(Clone)]
pub struct AppState {
    pub(crate) config: Arc<MutationConfig>,
}

impl AppState {
    pub fn new(config: MutationConfig) -> Self {
        AppState {
            config: Arc::new(config),
        }
    }
}
