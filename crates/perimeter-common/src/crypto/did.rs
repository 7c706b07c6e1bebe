//! did:key encoding and detached signatures
//!
//! Accounts backed by an Ed25519 key render as W3C `did:key` identifiers
//! (multicodec `0xed01` + base58btc, `z` multibase prefix).
//!
//! Reference: https://w3c-ccg.github.io/did-method-key/

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

/// Ed25519 multicodec prefix for did:key
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

const DID_KEY_PREFIX: &str = "did:key:";

/// DID operation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DidError {
    #[error("Invalid DID format: {0}")]
    InvalidFormat(String),

    #[error("Invalid encoding")]
    InvalidEncoding,

    #[error("Invalid multicodec prefix")]
    InvalidMulticodec,

    #[error("Invalid public key")]
    InvalidPublicKey,
}

/// Encode an Ed25519 public key as a did:key string
pub fn encode_did_key(public_key: &[u8; 32]) -> String {
    let mut prefixed = Vec::with_capacity(34);
    prefixed.extend_from_slice(&ED25519_MULTICODEC);
    prefixed.extend_from_slice(public_key);

    let encoded = bs58::encode(&prefixed).into_string();
    format!("{}z{}", DID_KEY_PREFIX, encoded)
}

/// Decode a did:key string to the Ed25519 public key bytes
pub fn decode_did_key(did: &str) -> Result<[u8; 32], DidError> {
    let identifier = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| DidError::InvalidFormat("DID must start with 'did:key:'".into()))?;

    let encoded = identifier
        .strip_prefix('z')
        .ok_or_else(|| DidError::InvalidFormat("expected base58btc multibase".into()))?;

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| DidError::InvalidEncoding)?;

    if decoded.len() != 34 || decoded[..2] != ED25519_MULTICODEC {
        return Err(DidError::InvalidMulticodec);
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded[2..]);
    Ok(key)
}

/// Sign a 32-byte digest, returning signature bytes
pub fn sign_digest(signing_key: &SigningKey, digest: &[u8; 32]) -> [u8; 64] {
    signing_key.sign(digest).to_bytes()
}

/// Verify a detached signature over a digest
///
/// Fails with [`DidError::InvalidPublicKey`] when the key bytes are not a
/// valid curve point; returns `Ok(false)` for a well-formed key whose
/// signature does not check out.
pub fn verify_digest(
    public_key: &[u8; 32],
    digest: &[u8; 32],
    signature: &[u8; 64],
) -> Result<bool, DidError> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key).map_err(|_| DidError::InvalidPublicKey)?;
    let sig = Signature::from_bytes(signature);

    Ok(verifying_key.verify_strict(digest, &sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_did_key_roundtrip() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = signing_key.verifying_key().to_bytes();

        let did = encode_did_key(&public_key);
        assert!(did.starts_with("did:key:z6Mk"));
        assert_eq!(decode_did_key(&did).unwrap(), public_key);
    }

    #[test]
    fn test_invalid_did() {
        assert!(matches!(
            decode_did_key("did:web:example.com"),
            Err(DidError::InvalidFormat(_))
        ));
        assert!(matches!(
            decode_did_key("did:key:z0OIl"),
            Err(DidError::InvalidEncoding)
        ));
    }

    #[test]
    fn test_sign_and_verify() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = signing_key.verifying_key().to_bytes();

        let digest = *blake3::hash(b"attestation").as_bytes();
        let signature = sign_digest(&signing_key, &digest);

        assert!(verify_digest(&public_key, &digest, &signature).unwrap());

        let other = *blake3::hash(b"tampered").as_bytes();
        assert!(!verify_digest(&public_key, &other, &signature).unwrap());
    }
}
