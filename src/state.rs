use std::sync::Arc;

use crate::config::Config;
use crate::services::{AccessGuard, CodeRedeemer, RegistrantIssuer};
use crate::store::Backend;

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub issuer: Arc<RegistrantIssuer>,
    pub redeemer: Arc<CodeRedeemer>,
    pub guard: AccessGuard,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Self {
        let issuer = RegistrantIssuer::new(
            backend.clone(),
            config.code_length,
            config.max_mint_attempts,
        );
        let redeemer = CodeRedeemer::new(backend.clone(), config.search_limit);
        let guard = AccessGuard::new(backend.clone(), config.guard_timeout);

        Self {
            backend,
            issuer: Arc::new(issuer),
            redeemer: Arc::new(redeemer),
            guard,
            config: Arc::new(config),
        }
    }
}
