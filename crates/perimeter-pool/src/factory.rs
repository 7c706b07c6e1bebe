//! Pool factory
//!
//! Creates pools in the Initialized state, each wired to a fresh participant
//! access controller, and keeps the registry of every pool it created.

use crate::context::ProtocolContext;
use crate::pool::Pool;
use crate::state::PoolSettings;
use dashmap::DashMap;
use perimeter_access::AccessController;
use perimeter_common::error::PoolError;
use perimeter_common::{
    Account, AssetId, PerimeterError, PoolId, ProtocolEvent, Result, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Parameters for a new pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRequest {
    pub asset: AssetId,
    pub min_first_loss: Decimal,
    pub activation_deadline: Timestamp,
    #[serde(default = "default_pool_type")]
    pub pool_type: String,
    #[serde(default)]
    pub max_capacity: Option<Decimal>,
    /// Falls back to the configured default when absent
    #[serde(default)]
    pub service_fee_bps: Option<u32>,
}

fn default_pool_type() -> String {
    "fixed-term".to_string()
}

impl PoolRequest {
    pub fn new(asset: AssetId, min_first_loss: Decimal, activation_deadline: Timestamp) -> Self {
        Self {
            asset,
            min_first_loss,
            activation_deadline,
            pool_type: default_pool_type(),
            max_capacity: None,
            service_fee_bps: None,
        }
    }

    pub fn with_pool_type(mut self, pool_type: impl Into<String>) -> Self {
        self.pool_type = pool_type.into();
        self
    }

    pub fn with_max_capacity(mut self, capacity: Decimal) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    pub fn with_service_fee_bps(mut self, bps: u32) -> Self {
        self.service_fee_bps = Some(bps);
        self
    }
}

/// Creation record returned by [`PoolFactory::create_pool`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolCreation {
    pub pool_id: PoolId,
    pub admin: Account,
    pub vault: Account,
}

/// Pool registry
#[derive(Debug)]
pub struct PoolFactory {
    ctx: ProtocolContext,
    pools: DashMap<PoolId, Arc<Pool>>,
}

impl PoolFactory {
    pub fn new(ctx: ProtocolContext) -> Self {
        Self {
            ctx,
            pools: DashMap::new(),
        }
    }

    pub fn context(&self) -> &ProtocolContext {
        &self.ctx
    }

    /// Create a pool administered by `admin`
    ///
    /// Validation only: the asset must be an allowed liquidity asset, the
    /// first-loss minimum non-negative, and the activation deadline ahead.
    #[instrument(skip(self, request), fields(admin = %admin.short(), asset = %request.asset))]
    pub fn create_pool(
        &self,
        admin: &Account,
        request: PoolRequest,
        now: Timestamp,
    ) -> Result<PoolCreation> {
        self.ctx.services.ensure_not_paused()?;

        if !self.ctx.services.is_liquidity_asset(&request.asset) {
            return Err(PoolError::InvalidSettings(format!(
                "{} is not an allowed liquidity asset",
                request.asset
            ))
            .into());
        }

        let settings = PoolSettings {
            min_first_loss: request.min_first_loss,
            activation_deadline: request.activation_deadline,
            max_capacity: request.max_capacity,
            service_fee_bps: request
                .service_fee_bps
                .unwrap_or(self.ctx.config.default_service_fee_bps),
            pool_type: request.pool_type,
        };
        settings.validate(now, &self.ctx.config)?;

        let pool_id = PoolId::new();
        let participants = Arc::new(AccessController::participant(
            pool_id,
            *admin,
            self.ctx.pool_admins.clone(),
        ));
        let pool = Arc::new(Pool::new(
            pool_id,
            *admin,
            request.asset.clone(),
            settings,
            participants,
            self.ctx.clone(),
        ));
        let vault = pool.vault();
        self.pools.insert(pool_id, pool);

        info!(pool_id = %pool_id, "Pool created");
        self.ctx.events().publish(ProtocolEvent::PoolCreated {
            pool_id,
            admin: *admin,
            asset: request.asset,
        });

        Ok(PoolCreation {
            pool_id,
            admin: *admin,
            vault,
        })
    }

    pub fn pool(&self, pool_id: &PoolId) -> Result<Arc<Pool>> {
        self.pools
            .get(pool_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PerimeterError::NotFound(pool_id.to_string()))
    }

    /// Every pool, ordered by id
    pub fn pools(&self) -> Vec<Arc<Pool>> {
        let mut pools: Vec<_> = self.pools.iter().map(|entry| entry.value().clone()).collect();
        pools.sort_by_key(|pool| pool.id());
        pools
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}
