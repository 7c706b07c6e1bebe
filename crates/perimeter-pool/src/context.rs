//! Shared protocol collaborators
//!
//! Everything a pool or loan needs beyond its own state: configuration, the
//! role table, the pool-admin allow-list, the terms-of-service registry and
//! the asset ledger.

use perimeter_access::{AcceptanceRegistry, AccessController, ServiceConfiguration};
use perimeter_common::{AssetLedger, EventBus, ProtocolConfig};
use std::sync::Arc;

/// Handles shared by every pool and loan of one deployment
#[derive(Clone)]
pub struct ProtocolContext {
    pub config: ProtocolConfig,
    pub services: Arc<ServiceConfiguration>,
    pub pool_admins: Arc<AccessController>,
    pub terms: Arc<AcceptanceRegistry>,
    pub assets: Arc<dyn AssetLedger>,
}

impl ProtocolContext {
    pub fn events(&self) -> &EventBus {
        self.services.events()
    }
}

impl std::fmt::Debug for ProtocolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolContext")
            .field("config", &self.config)
            .field("paused", &self.services.is_paused())
            .finish_non_exhaustive()
    }
}
