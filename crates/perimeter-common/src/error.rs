//! Error types for the Perimeter engine
//!
//! Each component reports a domain-specific error; all of them fold into
//! [`PerimeterError`], and every error maps onto a flat [`ErrorKind`] for
//! callers that only care about the failure category.

use crate::types::account::Account;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using PerimeterError
pub type Result<T> = std::result::Result<T, PerimeterError>;

/// Unified error type for Perimeter operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PerimeterError {
    // Role and allow-list failures
    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    // Attestation failures
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    // Pool accounting and lifecycle failures
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    // Loan lifecycle failures
    #[error("Loan error: {0}")]
    Loan(#[from] LoanError),

    // External asset transfer failures
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Caller-facing failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    InvalidAmount,
    InvalidTerms,
    PoolNotActive,
    InvalidState,
    InsufficientLiquidity,
    Expired,
    InvalidSignature,
    UntrustedVerifier,
    UnknownSchema,
    ReplayedVerification,
    ProtocolPaused,
    CapacityExceeded,
    NotFound,
    TransferFailed,
    Config,
}

/// Role and allow-list errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccessError {
    #[error("Account {account} lacks the {role} role")]
    Unauthorized { account: Account, role: String },

    #[error("Account {account} is not on the allow-list")]
    NotAllowed { account: Account },

    #[error("Account {account} has not accepted the terms of service")]
    TermsNotAccepted { account: Account },

    #[error("Protocol is paused")]
    ProtocolPaused,
}

/// Credential verification errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CredentialError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signer {signer} is not a trusted verifier")]
    UntrustedVerifier { signer: Account },

    #[error("Credential schema not registered: {schema}")]
    UnknownSchema { schema: String },

    #[error("Verification result expired at {expiration} (now {now})")]
    Expired { expiration: i64, now: i64 },

    #[error("Verification id already consumed: {verification_id}")]
    ReplayedVerification { verification_id: String },
}

/// Pool accounting and lifecycle errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoolError {
    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Pool is not active (state: {state})")]
    PoolNotActive { state: String },

    #[error("{operation} is invalid while the pool is {state}")]
    InvalidState { operation: String, state: String },

    #[error("Insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: Decimal, available: Decimal },

    #[error("Insufficient shares: requested {requested}, balance {balance}")]
    InsufficientShares { requested: Decimal, balance: Decimal },

    /// Activation refused while first-loss capital is under the minimum
    ///
    /// Reported as [`ErrorKind::InvalidState`]: the pool stays Initialized
    /// and only the Initialized → Active transition is refused. Match on this
    /// variant to tell it apart from other lifecycle refusals.
    #[error("First-loss capital below minimum: required {required}, deposited {deposited}")]
    InsufficientFirstLoss { required: Decimal, deposited: Decimal },

    #[error("Pool capacity exceeded: capacity {capacity}, resulting {resulting}")]
    CapacityExceeded { capacity: Decimal, resulting: Decimal },

    #[error("Loan principal still outstanding: {principal}")]
    LoansOutstanding { principal: Decimal },

    #[error("Activation deadline passed at {deadline}")]
    ActivationExpired { deadline: i64 },

    #[error("Invalid pool settings: {0}")]
    InvalidSettings(String),
}

/// Loan lifecycle errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoanError {
    #[error("Borrower {borrower} is not an allowed participant")]
    UnauthorizedBorrower { borrower: Account },

    #[error("Caller {caller} is not the borrower")]
    NotBorrower { caller: Account },

    #[error("Invalid loan terms: {0}")]
    InvalidTerms(String),

    #[error("Loan expired at drop-dead timestamp {drop_dead}")]
    Expired { drop_dead: i64 },

    #[error("Insufficient pool liquidity: required {required}, available {available}")]
    InsufficientPoolLiquidity { required: Decimal, available: Decimal },

    #[error("Funding vault holds {available}, requested {requested}")]
    InsufficientFunds { requested: Decimal, available: Decimal },

    #[error("{operation} is invalid while the loan is {state}")]
    InvalidState { operation: String, state: String },

    #[error("Payment amount must be positive")]
    InvalidAmount,

    #[error("Payment {amount} exceeds payoff amount {payoff}")]
    Overpayment { amount: Decimal, payoff: Decimal },
}

/// External asset transfer errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransferError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

impl PerimeterError {
    /// Flat failure category for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PerimeterError::Access(err) => match err {
                AccessError::ProtocolPaused => ErrorKind::ProtocolPaused,
                _ => ErrorKind::Unauthorized,
            },
            PerimeterError::Credential(err) => match err {
                CredentialError::InvalidSignature => ErrorKind::InvalidSignature,
                CredentialError::UntrustedVerifier { .. } => ErrorKind::UntrustedVerifier,
                CredentialError::UnknownSchema { .. } => ErrorKind::UnknownSchema,
                CredentialError::Expired { .. } => ErrorKind::Expired,
                CredentialError::ReplayedVerification { .. } => ErrorKind::ReplayedVerification,
            },
            PerimeterError::Pool(err) => match err {
                PoolError::InvalidAmount | PoolError::InvalidSettings(_) => ErrorKind::InvalidAmount,
                PoolError::PoolNotActive { .. } => ErrorKind::PoolNotActive,
                PoolError::InvalidState { .. }
                | PoolError::InsufficientFirstLoss { .. }
                | PoolError::LoansOutstanding { .. } => ErrorKind::InvalidState,
                PoolError::InsufficientLiquidity { .. } | PoolError::InsufficientShares { .. } => {
                    ErrorKind::InsufficientLiquidity
                }
                PoolError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
                PoolError::ActivationExpired { .. } => ErrorKind::Expired,
            },
            PerimeterError::Loan(err) => match err {
                LoanError::UnauthorizedBorrower { .. } | LoanError::NotBorrower { .. } => {
                    ErrorKind::Unauthorized
                }
                LoanError::InvalidTerms(_) => ErrorKind::InvalidTerms,
                LoanError::Expired { .. } => ErrorKind::Expired,
                LoanError::InsufficientPoolLiquidity { .. } | LoanError::InsufficientFunds { .. } => {
                    ErrorKind::InsufficientLiquidity
                }
                LoanError::InvalidState { .. } => ErrorKind::InvalidState,
                LoanError::InvalidAmount | LoanError::Overpayment { .. } => ErrorKind::InvalidAmount,
            },
            PerimeterError::Transfer(_) => ErrorKind::TransferFailed,
            PerimeterError::NotFound(_) => ErrorKind::NotFound,
            PerimeterError::Config(_) | PerimeterError::Serialization(_) => ErrorKind::Config,
        }
    }
}

impl From<serde_json::Error> for PerimeterError {
    fn from(err: serde_json::Error) -> Self {
        PerimeterError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_display() {
        let err = PerimeterError::Pool(PoolError::InsufficientLiquidity {
            required: dec!(100),
            available: dec!(40),
        });
        assert!(err.to_string().contains("required 100"));
    }

    #[test]
    fn test_error_kinds() {
        let paused: PerimeterError = AccessError::ProtocolPaused.into();
        assert_eq!(paused.kind(), ErrorKind::ProtocolPaused);

        let replay: PerimeterError = CredentialError::ReplayedVerification {
            verification_id: "abc".into(),
        }
        .into();
        assert_eq!(replay.kind(), ErrorKind::ReplayedVerification);

        let shares: PerimeterError = PoolError::InsufficientShares {
            requested: dec!(2),
            balance: dec!(1),
        }
        .into();
        assert_eq!(shares.kind(), ErrorKind::InsufficientLiquidity);

        let expired: PerimeterError = LoanError::Expired { drop_dead: 10 }.into();
        assert_eq!(expired.kind(), ErrorKind::Expired);
    }

    #[test]
    fn test_short_first_loss_is_a_lifecycle_refusal() {
        let err: PerimeterError = PoolError::InsufficientFirstLoss {
            required: dec!(5000000),
            deposited: dec!(0),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(err.to_string().contains("required 5000000, deposited 0"));
    }
}
