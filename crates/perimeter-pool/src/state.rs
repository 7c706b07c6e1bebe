//! Pool lifecycle state and settings

use perimeter_common::error::PoolError;
use perimeter_common::{ProtocolConfig, Timestamp, BPS_DENOMINATOR};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Pool lifecycle state
///
/// Numeric codes and labels are part of the diagnostic read surface and
/// must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PoolState {
    Initialized = 0,
    Active = 1,
    Paused = 2,
    Closed = 3,
}

impl PoolState {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PoolState::Initialized),
            1 => Some(PoolState::Active),
            2 => Some(PoolState::Paused),
            3 => Some(PoolState::Closed),
            _ => None,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            PoolState::Initialized => "Initialized",
            PoolState::Active => "Active",
            PoolState::Paused => "Paused",
            PoolState::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Pool configuration chosen at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// First-loss capital required before activation
    pub min_first_loss: Decimal,
    /// Activation must happen before this timestamp
    pub activation_deadline: Timestamp,
    /// Ceiling on lender value accepted through deposits
    pub max_capacity: Option<Decimal>,
    /// Share of interest kept by the pool admin, in bps
    pub service_fee_bps: u32,
    /// Free-form pool classification
    pub pool_type: String,
}

impl PoolSettings {
    pub fn validate(&self, now: Timestamp, config: &ProtocolConfig) -> Result<(), PoolError> {
        if self.min_first_loss < Decimal::ZERO {
            return Err(PoolError::InvalidSettings(
                "min_first_loss must not be negative".into(),
            ));
        }
        if self.activation_deadline <= now {
            return Err(PoolError::InvalidSettings(format!(
                "activation deadline {} is not in the future",
                self.activation_deadline
            )));
        }
        if let Some(capacity) = self.max_capacity {
            if capacity <= Decimal::ZERO {
                return Err(PoolError::InvalidSettings("max_capacity must be positive".into()));
            }
        }
        validate_service_fee(self.service_fee_bps, config)
    }
}

pub(crate) fn validate_service_fee(bps: u32, config: &ProtocolConfig) -> Result<(), PoolError> {
    if bps > config.max_service_fee_bps || bps > BPS_DENOMINATOR {
        return Err(PoolError::InvalidSettings(format!(
            "service fee {} bps exceeds maximum {}",
            bps, config.max_service_fee_bps
        )));
    }
    Ok(())
}
