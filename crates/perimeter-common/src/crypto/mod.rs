//! Cryptographic primitives for Perimeter
//!
//! This module provides:
//! - did:key encoding for Ed25519-derived accounts
//! - Detached Ed25519 signatures over canonical hashes

pub mod did;

// Re-export commonly used items
pub use did::{decode_did_key, encode_did_key, sign_digest, verify_digest, DidError};
