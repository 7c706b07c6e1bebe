//! Protocol configuration

use crate::error::{PerimeterError, Result};
use serde::{Deserialize, Serialize};

/// Protocol-wide parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Days used to annualise APRs
    pub days_per_year: u32,
    /// Consecutive missed payment periods tolerated before default,
    /// applied to loans whose terms do not override it
    pub max_missed_periods: u32,
    /// Service fee assigned to newly created pools (bps of interest)
    pub default_service_fee_bps: u32,
    /// Upper bound on any pool's service fee
    pub max_service_fee_bps: u32,
    /// Capacity of the notification channel
    pub event_channel_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            days_per_year: crate::DAYS_PER_YEAR,
            max_missed_periods: crate::DEFAULT_MAX_MISSED_PERIODS,
            default_service_fee_bps: 0,
            max_service_fee_bps: crate::BPS_DENOMINATOR,
            event_channel_capacity: crate::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl ProtocolConfig {
    /// Load configuration from `.env` and `PERIMETER_*` variables
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        if let Some(v) = env_parse("PERIMETER_DAYS_PER_YEAR")? {
            cfg.days_per_year = v;
        }
        if let Some(v) = env_parse("PERIMETER_MAX_MISSED_PERIODS")? {
            cfg.max_missed_periods = v;
        }
        if let Some(v) = env_parse("PERIMETER_DEFAULT_SERVICE_FEE_BPS")? {
            cfg.default_service_fee_bps = v;
        }
        if let Some(v) = env_parse("PERIMETER_MAX_SERVICE_FEE_BPS")? {
            cfg.max_service_fee_bps = v;
        }
        if let Some(v) = env_parse("PERIMETER_EVENT_CHANNEL_CAPACITY")? {
            cfg.event_channel_capacity = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject inconsistent parameter combinations
    pub fn validate(&self) -> Result<()> {
        if self.days_per_year == 0 {
            return Err(PerimeterError::Config("days_per_year must be positive".into()));
        }
        if self.max_service_fee_bps > crate::BPS_DENOMINATOR {
            return Err(PerimeterError::Config(format!(
                "max_service_fee_bps {} exceeds {}",
                self.max_service_fee_bps,
                crate::BPS_DENOMINATOR
            )));
        }
        if self.default_service_fee_bps > self.max_service_fee_bps {
            return Err(PerimeterError::Config(
                "default_service_fee_bps exceeds max_service_fee_bps".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PerimeterError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}
