//! # Perimeter Loan
//!
//! Loans drawn against Perimeter pools.
//!
//! ## Lifecycle
//!
//! ```text
//!   Requested ──post_collateral──▶ Collateralized
//!       │                               │
//!       └──────────── fund ─────────────┤
//!                                       ▼
//!                                    Active ──▶ Repaid
//!                                       └─────▶ Defaulted
//!
//!   Requested / Collateralized ──drop-dead──▶ Expired
//!   Requested / Collateralized ──cancel─────▶ Canceled
//! ```
//!
//! Expiry and default are driven by time. [`effective_state`] derives them
//! from a loan and the current timestamp without mutating anything; the
//! [`LoanFactory`] materialises them at the start of every operation.

pub mod factory;
pub mod loan;
pub mod schedule;
pub mod terms;

pub use factory::{LoanCreation, LoanFactory};
pub use loan::{effective_state, Loan, LoanState};
pub use schedule::{LoanBalance, PaymentDue, PaymentSchedule, PaymentSplit};
pub use terms::{Collateral, LatePaymentPolicy, LoanTerms, LoanType};
