//! # Perimeter Access
//!
//! Participation gating for the Perimeter lending engine.
//!
//! ## Components
//!
//! - **Service configuration**: caller → role mapping, protocol pause, liquidity assets
//! - **Acceptance registry**: terms-of-service acknowledgements
//! - **Credential verification**: signed attestations from trusted verifiers
//! - **Access controllers**: allow-lists for pool admins and per-pool participants
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   ServiceConfiguration                       │
//! │            (roles, pause switch, liquidity assets)           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐   ┌────────────────────────────────┐   │
//! │  │ AcceptanceRegistry│   │        AccessController        │   │
//! │  │   (ToS consent)   │   │ allow-list ── CredentialVerifier│   │
//! │  └──────────────────┘   └────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod controller;
pub mod credential;
pub mod service;
pub mod tos;

pub use controller::{AccessController, AllowEntry, AllowSource, VerificationReceipt};
pub use credential::{AttestationSignature, CredentialVerifier, VerificationResult};
pub use service::{Role, ServiceConfiguration};
pub use tos::{AcceptanceRecord, AcceptanceRegistry};
