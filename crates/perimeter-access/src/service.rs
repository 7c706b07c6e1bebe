//! Service configuration
//!
//! Holds the protocol-wide capability table. Every privileged operation in
//! the workspace starts with an explicit role check against this mapping.

use parking_lot::RwLock;
use perimeter_common::error::AccessError;
use perimeter_common::{Account, AssetId, EventBus, ProtocolEvent, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Protocol roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Manages registries, liquidity assets, and terms of service
    Operator,
    /// May toggle the protocol-wide pause
    Pauser,
    /// Grants and revokes roles
    Deployer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Operator => write!(f, "operator"),
            Role::Pauser => write!(f, "pauser"),
            Role::Deployer => write!(f, "deployer"),
        }
    }
}

/// Protocol-wide roles, pause switch, and liquidity-asset allow-list
#[derive(Debug)]
pub struct ServiceConfiguration {
    roles: RwLock<HashMap<Account, HashSet<Role>>>,
    paused: RwLock<bool>,
    liquidity_assets: RwLock<HashSet<AssetId>>,
    events: EventBus,
}

impl ServiceConfiguration {
    /// Create a configuration whose deployer also holds the operator role
    pub fn new(deployer: Account, events: EventBus) -> Self {
        let mut roles = HashMap::new();
        roles.insert(deployer, HashSet::from([Role::Deployer, Role::Operator]));

        Self {
            roles: RwLock::new(roles),
            paused: RwLock::new(false),
            liquidity_assets: RwLock::new(HashSet::new()),
            events,
        }
    }

    /// Notification stream shared by every component
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn has_role(&self, account: &Account, role: Role) -> bool {
        self.roles
            .read()
            .get(account)
            .map(|held| held.contains(&role))
            .unwrap_or(false)
    }

    /// Fail with `Unauthorized` unless `caller` holds `role`
    pub fn require_role(&self, caller: &Account, role: Role) -> Result<()> {
        if self.has_role(caller, role) {
            Ok(())
        } else {
            warn!(caller = %caller.short(), role = %role, "Role check failed");
            Err(AccessError::Unauthorized {
                account: *caller,
                role: role.to_string(),
            }
            .into())
        }
    }

    fn require_role_admin(&self, caller: &Account) -> Result<()> {
        if self.has_role(caller, Role::Deployer) {
            return Ok(());
        }
        self.require_role(caller, Role::Operator)
    }

    /// Grant `role` to `account`; deployer or operator
    pub fn grant_role(&self, caller: &Account, account: Account, role: Role) -> Result<()> {
        self.require_role_admin(caller)?;

        let inserted = self.roles.write().entry(account).or_default().insert(role);
        if inserted {
            info!(account = %account.short(), role = %role, "Role granted");
            self.events.publish(ProtocolEvent::RoleGranted {
                account,
                role: role.to_string(),
            });
        }
        Ok(())
    }

    /// Revoke `role` from `account`; deployer or operator
    pub fn revoke_role(&self, caller: &Account, account: &Account, role: Role) -> Result<()> {
        self.require_role_admin(caller)?;

        let removed = self
            .roles
            .write()
            .get_mut(account)
            .map(|held| held.remove(&role))
            .unwrap_or(false);
        if removed {
            info!(account = %account.short(), role = %role, "Role revoked");
            self.events.publish(ProtocolEvent::RoleRevoked {
                account: *account,
                role: role.to_string(),
            });
        }
        Ok(())
    }

    /// Toggle the protocol-wide pause; pauser or operator
    pub fn set_paused(&self, caller: &Account, paused: bool) -> Result<()> {
        if !self.has_role(caller, Role::Pauser) {
            self.require_role(caller, Role::Operator)?;
        }

        *self.paused.write() = paused;
        info!(paused, "Protocol pause toggled");
        self.events.publish(ProtocolEvent::PauseToggled { paused });
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.read()
    }

    /// Fail with `ProtocolPaused` while the protocol is paused
    pub fn ensure_not_paused(&self) -> Result<()> {
        if self.is_paused() {
            return Err(AccessError::ProtocolPaused.into());
        }
        Ok(())
    }

    /// Allow or disallow a liquidity asset; operator only
    pub fn set_liquidity_asset(&self, caller: &Account, asset: AssetId, allowed: bool) -> Result<()> {
        self.require_role(caller, Role::Operator)?;

        {
            let mut assets = self.liquidity_assets.write();
            if allowed {
                assets.insert(asset.clone());
            } else {
                assets.remove(&asset);
            }
        }

        info!(asset = %asset, allowed, "Liquidity asset updated");
        self.events
            .publish(ProtocolEvent::LiquidityAssetSet { asset, allowed });
        Ok(())
    }

    pub fn is_liquidity_asset(&self, asset: &AssetId) -> bool {
        self.liquidity_assets.read().contains(asset)
    }
}
