//! Credential verification
//!
//! A trusted verifier attests that a subject satisfies a credential schema by
//! signing a [`VerificationResult`]. The signature envelope carries the
//! verifier's Ed25519 key; recovering the signer means decoding that key and
//! checking the signature over the result's canonical hash for the target
//! access scope.
//!
//! ## Canonical encoding
//!
//! ```text
//! BLAKE3(
//!     "perimeter.verification.v1"
//!  || len(scope) || scope
//!  || len(schema) || schema
//!  || subject (32 bytes)
//!  || expiration (i64 LE)
//!  || len(verification_id) || verification_id
//! )
//! ```
//!
//! Lengths are little-endian u64. Binding the scope prevents an attestation
//! issued for one pool from being replayed against another.

use ed25519_dalek::SigningKey;
use perimeter_common::crypto::{sign_digest, verify_digest};
use perimeter_common::error::CredentialError;
use perimeter_common::{AccessScope, Account, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Domain tag for verification hashes
const VERIFICATION_DOMAIN: &[u8] = b"perimeter.verification.v1";

/// Attested claim about a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Credential schema URI
    pub schema: String,
    /// Account the claim is about
    pub subject: Account,
    /// Unix seconds after which the attestation is void
    pub expiration: Timestamp,
    /// Unique identifier, accepted at most once per subject
    pub verification_id: String,
}

impl VerificationResult {
    pub fn new(
        schema: impl Into<String>,
        subject: Account,
        expiration: Timestamp,
        verification_id: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            subject,
            expiration,
            verification_id: verification_id.into(),
        }
    }

    /// Canonical hash signed by the verifier
    pub fn canonical_hash(&self, scope: &AccessScope) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(VERIFICATION_DOMAIN);
        write_field(&mut hasher, &scope.domain_bytes());
        write_field(&mut hasher, self.schema.as_bytes());
        hasher.update(self.subject.as_bytes());
        hasher.update(&self.expiration.to_le_bytes());
        write_field(&mut hasher, self.verification_id.as_bytes());
        *hasher.finalize().as_bytes()
    }
}

fn write_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Detached signature over a [`VerificationResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationSignature {
    /// Verifier's Ed25519 public key
    pub signer_key: [u8; 32],

    /// Ed25519 signature over the canonical hash
    #[serde(with = "signature_bytes")]
    pub signature: [u8; 64],
}

/// Serde helper for [u8; 64] arrays
mod signature_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec: Vec<u8> = Vec::deserialize(deserializer)?;
        <[u8; 64]>::try_from(vec.as_slice()).map_err(|_| {
            serde::de::Error::custom(format!("expected 64 bytes, got {}", vec.len()))
        })
    }
}

impl AttestationSignature {
    /// Sign `result` for `scope` with a verifier key
    pub fn sign(result: &VerificationResult, scope: &AccessScope, key: &SigningKey) -> Self {
        let digest = result.canonical_hash(scope);
        Self {
            signer_key: key.verifying_key().to_bytes(),
            signature: sign_digest(key, &digest),
        }
    }

    /// Recover the signing account
    ///
    /// Fails with `InvalidSignature` when the key is malformed or the
    /// signature does not cover `result` under `scope`.
    pub fn recover(
        &self,
        result: &VerificationResult,
        scope: &AccessScope,
    ) -> Result<Account, CredentialError> {
        let digest = result.canonical_hash(scope);
        match verify_digest(&self.signer_key, &digest, &self.signature) {
            Ok(true) => Ok(Account::from_bytes(self.signer_key)),
            _ => Err(CredentialError::InvalidSignature),
        }
    }
}

/// Registered schemas and trusted verifiers for one access scope
#[derive(Debug, Clone, Default)]
pub struct CredentialVerifier {
    schemas: HashSet<String>,
    verifiers: HashSet<Account>,
}

impl CredentialVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if newly inserted
    pub fn add_schema(&mut self, schema: &str) -> bool {
        self.schemas.insert(schema.to_string())
    }

    pub fn remove_schema(&mut self, schema: &str) -> bool {
        self.schemas.remove(schema)
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        self.schemas.contains(schema)
    }

    /// Returns `true` if newly inserted
    pub fn add_verifier(&mut self, verifier: Account) -> bool {
        self.verifiers.insert(verifier)
    }

    pub fn remove_verifier(&mut self, verifier: &Account) -> bool {
        self.verifiers.remove(verifier)
    }

    pub fn is_trusted(&self, verifier: &Account) -> bool {
        self.verifiers.contains(verifier)
    }

    pub fn schemas(&self) -> Vec<String> {
        let mut schemas: Vec<_> = self.schemas.iter().cloned().collect();
        schemas.sort();
        schemas
    }

    pub fn verifiers(&self) -> Vec<Account> {
        let mut verifiers: Vec<_> = self.verifiers.iter().copied().collect();
        verifiers.sort();
        verifiers
    }

    /// Check an attestation, returning the verifier that signed it
    ///
    /// Checks run in order: signature, verifier trust, schema, expiry. The
    /// replay guard is stateful and lives with the allow-list.
    pub fn check(
        &self,
        result: &VerificationResult,
        signature: &AttestationSignature,
        scope: &AccessScope,
        now: Timestamp,
    ) -> Result<Account, CredentialError> {
        let signer = signature.recover(result, scope)?;

        if !self.is_trusted(&signer) {
            return Err(CredentialError::UntrustedVerifier { signer });
        }

        if !self.has_schema(&result.schema) {
            return Err(CredentialError::UnknownSchema {
                schema: result.schema.clone(),
            });
        }

        if result.expiration <= now {
            return Err(CredentialError::Expired {
                expiration: result.expiration,
                now,
            });
        }

        Ok(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perimeter_common::PoolId;

    const SCHEMA: &str = "https://verite.id/definitions/processes/kycaml/0.0.1/usa";

    fn setup() -> (CredentialVerifier, SigningKey, VerificationResult) {
        let (verifier, key) = Account::generate();
        let mut registry = CredentialVerifier::new();
        registry.add_schema(SCHEMA);
        registry.add_verifier(verifier);

        let subject = Account::derive("test", b"subject");
        let result = VerificationResult::new(SCHEMA, subject, 1_000, "vid-1");
        (registry, key, result)
    }

    #[test]
    fn test_check_valid_attestation() {
        let (registry, key, result) = setup();
        let scope = AccessScope::PoolAdmin;
        let signature = AttestationSignature::sign(&result, &scope, &key);

        let signer = registry.check(&result, &signature, &scope, 500).unwrap();
        assert_eq!(signer, Account::from_verifying_key(&key.verifying_key()));
    }

    #[test]
    fn test_tampered_result_fails_signature() {
        let (registry, key, result) = setup();
        let scope = AccessScope::PoolAdmin;
        let signature = AttestationSignature::sign(&result, &scope, &key);

        let mut tampered = result.clone();
        tampered.expiration = 9_999;
        assert_eq!(
            registry.check(&tampered, &signature, &scope, 500),
            Err(CredentialError::InvalidSignature)
        );
    }

    #[test]
    fn test_signature_bound_to_scope() {
        let (registry, key, result) = setup();
        let signature = AttestationSignature::sign(&result, &AccessScope::PoolAdmin, &key);
        let other = AccessScope::Participant(PoolId::new());

        assert_eq!(
            registry.check(&result, &signature, &other, 500),
            Err(CredentialError::InvalidSignature)
        );
    }

    #[test]
    fn test_check_order() {
        let (mut registry, key, result) = setup();
        let scope = AccessScope::PoolAdmin;

        // Untrusted signer wins over an unknown schema
        let (_, stranger_key) = Account::generate();
        let mut unknown = result.clone();
        unknown.schema = "unregistered".into();
        let signature = AttestationSignature::sign(&unknown, &scope, &stranger_key);
        assert!(matches!(
            registry.check(&unknown, &signature, &scope, 500),
            Err(CredentialError::UntrustedVerifier { .. })
        ));

        // Unknown schema wins over expiry
        let signature = AttestationSignature::sign(&unknown, &scope, &key);
        assert!(matches!(
            registry.check(&unknown, &signature, &scope, 5_000),
            Err(CredentialError::UnknownSchema { .. })
        ));

        // Expiration equal to now is already expired
        let signature = AttestationSignature::sign(&result, &scope, &key);
        assert_eq!(
            registry.check(&result, &signature, &scope, 1_000),
            Err(CredentialError::Expired {
                expiration: 1_000,
                now: 1_000
            })
        );

        registry.remove_schema(SCHEMA);
        assert!(matches!(
            registry.check(&result, &signature, &scope, 500),
            Err(CredentialError::UnknownSchema { .. })
        ));
    }

    #[test]
    fn test_signature_serialization() {
        let (_, key, result) = setup();
        let signature = AttestationSignature::sign(&result, &AccessScope::PoolAdmin, &key);

        let json = serde_json::to_string(&signature).unwrap();
        let back: AttestationSignature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, signature);
    }
}
