//! Entity identifiers
//!
//! Pools and loans are keyed by UUIDv7 so identifiers sort by creation time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pool identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(pub Uuid);

impl PoolId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pool-{}", self.0)
    }
}

/// Loan identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoanId(pub Uuid);

impl LoanId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LoanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loan-{}", self.0)
    }
}

/// Which access controller an allow-list belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessScope {
    /// Process-wide controller gating pool administrators
    PoolAdmin,
    /// Per-pool controller gating lenders and borrowers
    Participant(PoolId),
}

impl AccessScope {
    /// Stable bytes used for signature domain separation
    pub fn domain_bytes(&self) -> Vec<u8> {
        match self {
            AccessScope::PoolAdmin => b"pool-admin".to_vec(),
            AccessScope::Participant(pool_id) => {
                let mut bytes = b"participant:".to_vec();
                bytes.extend_from_slice(pool_id.0.as_bytes());
                bytes
            }
        }
    }
}

impl std::fmt::Display for AccessScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessScope::PoolAdmin => write!(f, "pool-admin"),
            AccessScope::Participant(pool_id) => write!(f, "participant:{}", pool_id),
        }
    }
}
