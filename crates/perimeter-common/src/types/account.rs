//! Account - opaque participant identity
//!
//! Every participant (operator, pool admin, lender, borrower, verifier) is an
//! [`Account`]. Accounts are only ever compared. Two flavours exist:
//! - Key accounts: the 32 bytes are an Ed25519 verifying key, rendered as `did:key`
//! - Derived accounts: protocol-owned vaults and escrows, a BLAKE3 derivation

use crate::crypto::did::{decode_did_key, encode_did_key, DidError};
use crate::error::PerimeterError;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Opaque 32-byte account identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Account([u8; 32]);

impl Account {
    /// Wrap raw identifier bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw identifier bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Account controlled by an Ed25519 key
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    /// Generate a fresh key account
    ///
    /// # Returns
    /// Tuple of (Account, SigningKey) - keep the signing key secure!
    ///
    /// # Example
    /// ```
    /// use perimeter_common::Account;
    ///
    /// let (account, _key) = Account::generate();
    /// assert!(account.to_did().starts_with("did:key:z6Mk"));
    /// ```
    pub fn generate() -> (Self, SigningKey) {
        let signing_key = SigningKey::generate(&mut OsRng);
        (Self::from_verifying_key(&signing_key.verifying_key()), signing_key)
    }

    /// Protocol-owned account derived from a domain and seed
    ///
    /// Derived accounts have no signing key; they hold assets on behalf of
    /// pools and loans.
    pub fn derive(domain: &str, seed: &[u8]) -> Self {
        let context = format!("perimeter 2024 account {}", domain);
        Self(blake3::derive_key(&context, seed))
    }

    /// Parse a did:key string
    pub fn from_did(did: &str) -> Result<Self, DidError> {
        decode_did_key(did).map(Self)
    }

    /// did:key rendering of this account
    pub fn to_did(&self) -> String {
        encode_did_key(&self.0)
    }

    /// Short hex prefix for logs
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_did())
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Account({})", self.short())
    }
}

/// Fungible asset symbol (e.g. "USDC")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    /// Create an asset id, rejecting empty symbols
    pub fn new(symbol: impl Into<String>) -> Result<Self, PerimeterError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(PerimeterError::Config("asset symbol must not be empty".into()));
        }
        Ok(Self(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AssetId {
    type Error = PerimeterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AssetId> for String {
    fn from(value: AssetId) -> Self {
        value.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_account_is_did_key() {
        let (account, signing_key) = Account::generate();
        assert_eq!(account.as_bytes(), &signing_key.verifying_key().to_bytes());
        assert_eq!(Account::from_did(&account.to_did()).unwrap(), account);
    }

    #[test]
    fn test_derived_accounts_are_domain_separated() {
        let vault = Account::derive("pool-vault", b"seed");
        let escrow = Account::derive("loan-escrow", b"seed");
        assert_ne!(vault, escrow);
        assert_eq!(vault, Account::derive("pool-vault", b"seed"));
    }

    #[test]
    fn test_asset_id_rejects_empty() {
        assert!(AssetId::new("USDC").is_ok());
        assert!(AssetId::new("  ").is_err());
        assert!(serde_json::from_str::<AssetId>("\"\"").is_err());
    }
}
