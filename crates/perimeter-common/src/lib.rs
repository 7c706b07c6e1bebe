//! # Perimeter Common
//!
//! Shared types, errors, and collaborator seams for the Perimeter lending engine.
//!
//! ## Core Types
//!
//! - [`Account`]: opaque 32-byte participant identity (`did:key` when key-derived)
//! - [`AssetId`]: fungible asset symbol
//! - [`PoolId`]/[`LoanId`]: time-ordered entity identifiers
//! - [`Clock`]: caller-supplied time source
//!
//! ## Seams
//!
//! - [`asset::AssetLedger`]: external fungible-asset transfer primitive
//! - [`events::EventBus`]: notification stream for external observers
//! - [`config::ProtocolConfig`]: environment-driven protocol parameters

pub mod asset;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod types;

// Re-export commonly used types at crate root
pub use asset::{AssetLedger, InMemoryAssetLedger};
pub use config::ProtocolConfig;
pub use error::{ErrorKind, PerimeterError, Result};
pub use events::{EventBus, ProtocolEvent};
pub use types::{
    account::{Account, AssetId},
    amount::{bps_of, BPS_DENOMINATOR},
    ids::{AccessScope, LoanId, PoolId},
    time::{days, Clock, ManualClock, SystemClock, Timestamp, SECONDS_PER_DAY},
};

/// Perimeter version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Days used to annualise loan APRs
pub const DAYS_PER_YEAR: u32 = 365;

/// Consecutive missed payment periods tolerated before a loan defaults
pub const DEFAULT_MAX_MISSED_PERIODS: u32 = 2;

/// Capacity of the notification channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
