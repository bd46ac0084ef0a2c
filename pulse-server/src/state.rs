//! Shared request-handling state.

use std::sync::Arc;

use pulse_core::net::Cidr;
use pulse_core::{MetricsService, PersistentStorage};
use rsa::RsaPrivateKey;
use sqlx::PgPool;

/// Everything the HTTP handlers and middleware stages need. Optional
/// fields correspond to features that are off when unconfigured; each
/// middleware stage checks its own field and forwards when absent.
#[derive(Clone)]
pub struct AppState {
    pub service: MetricsService,
    pub db: Option<PgPool>,
    pub hash_key: Option<Arc<Vec<u8>>>,
    pub private_key: Option<Arc<RsaPrivateKey>>,
    pub trusted_subnet: Option<Cidr>,
    pub storage: Option<Arc<dyn PersistentStorage>>,
    /// Save after every successful update (store-interval 0).
    pub sync_save: bool,
}

impl AppState {
    /// A bare state with only the aggregation service, as used by
    /// tests and by servers running without persistence or crypto.
    pub fn bare(service: MetricsService) -> Self {
        Self {
            service,
            db: None,
            hash_key: None,
            private_key: None,
            trusted_subnet: None,
            storage: None,
            sync_save: false,
        }
    }
}
