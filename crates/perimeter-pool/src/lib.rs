//! # Perimeter Pool
//!
//! Lending pools for the Perimeter engine.
//!
//! ## Components
//!
//! - **PoolState**: Initialized → Active ⇄ Paused → Closed lifecycle
//! - **PoolController**: lifecycle transitions, settings, first-loss capital
//! - **ShareLedger**: lender shares priced against total lender value
//! - **Pool**: synchronized handle that moves assets and publishes events
//! - **PoolFactory**: creates pools and their participant access controllers
//!
//! ## Capital model
//!
//! ```text
//!   lender value  = liquid + outstanding principal
//!   share price   = lender value / total shares       (1:1 when empty)
//!   first-loss    = junior buffer, absorbs defaults before lenders
//!   admin fees    = service fee skimmed from interest
//! ```
//!
//! All four balances sit in the pool's vault account on the asset ledger.

pub mod accounting;
pub mod context;
pub mod controller;
pub mod factory;
pub mod pool;
pub mod state;

pub use accounting::ShareLedger;
pub use context::ProtocolContext;
pub use controller::PoolController;
pub use factory::{PoolCreation, PoolFactory, PoolRequest};
pub use pool::{Pool, PoolSnapshot};
pub use state::{PoolSettings, PoolState};
