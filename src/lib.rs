//! # Perimeter
//!
//! Permissioned capital pooling and loan underwriting.
//!
//! ```text
//!                       ┌──────────────────────┐
//!                       │ ServiceConfiguration │  roles, pause, liquidity assets
//!                       └──────────┬───────────┘
//!            ┌─────────────────────┼─────────────────────┐
//!            ▼                     ▼                     ▼
//!  ┌───────────────────┐ ┌───────────────────┐ ┌───────────────────┐
//!  │ AcceptanceRegistry│ │ AccessController  │ │    PoolFactory    │
//!  │  terms of service │ │   (pool admins)   │ │  Pool ─ Pool ─ …  │
//!  └───────────────────┘ └───────────────────┘ └─────────┬─────────┘
//!                                                        ▼
//!                                              ┌───────────────────┐
//!                                              │    LoanFactory    │
//!                                              └───────────────────┘
//! ```
//!
//! [`Deployment`] wires one instance of each component around a shared
//! [`AssetLedger`] and [`EventBus`].

use std::sync::Arc;
use tracing::info;

pub use perimeter_access as access;
pub use perimeter_common as common;
pub use perimeter_loan as loan;
pub use perimeter_pool as pool;

pub use perimeter_access::{
    AcceptanceRegistry, AccessController, AttestationSignature, Role, ServiceConfiguration,
    VerificationResult,
};
pub use perimeter_common::{
    Account, AssetId, AssetLedger, Clock, ErrorKind, EventBus, LoanId, ManualClock,
    PerimeterError, PoolId, ProtocolConfig, ProtocolEvent, Result, SystemClock, Timestamp,
};
pub use perimeter_loan::{LoanFactory, LoanState, LoanTerms, LoanType};
pub use perimeter_pool::{Pool, PoolFactory, PoolRequest, PoolState, ProtocolContext};

/// One fully wired protocol instance
#[derive(Debug)]
pub struct Deployment {
    pub services: Arc<ServiceConfiguration>,
    pub terms: Arc<AcceptanceRegistry>,
    pub pool_admins: Arc<AccessController>,
    pub pools: Arc<PoolFactory>,
    pub loans: Arc<LoanFactory>,
}

impl Deployment {
    /// Deploy with `deployer` holding the Deployer and Operator roles
    pub fn new(
        deployer: Account,
        config: ProtocolConfig,
        assets: Arc<dyn AssetLedger>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_channel_capacity);
        let services = Arc::new(ServiceConfiguration::new(deployer, events));
        let terms = Arc::new(AcceptanceRegistry::new(services.clone()));
        let pool_admins = Arc::new(AccessController::pool_admin(
            services.clone(),
            terms.clone(),
        ));

        let ctx = ProtocolContext {
            config,
            services: services.clone(),
            pool_admins: pool_admins.clone(),
            terms: terms.clone(),
            assets,
        };
        let pools = Arc::new(PoolFactory::new(ctx));
        let loans = Arc::new(LoanFactory::new(pools.clone()));

        info!(deployer = %deployer.short(), version = perimeter_common::VERSION, "Perimeter deployed");
        Ok(Self {
            services,
            terms,
            pool_admins,
            pools,
            loans,
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.pools.context().config
    }

    pub fn events(&self) -> &EventBus {
        self.services.events()
    }

    pub fn pool(&self, pool_id: &PoolId) -> Result<Arc<Pool>> {
        self.pools.pool(pool_id)
    }
}
