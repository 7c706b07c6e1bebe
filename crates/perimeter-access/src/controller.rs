//! Access controller
//!
//! Allow-list of accounts admitted to a scope. Two flavours share this type:
//! the process-wide pool-admin controller, administered by operators, and one
//! participant controller per pool, administered by that pool's admin (and
//! operators).
//!
//! Entries are granted directly by an admin or as a side effect of a
//! successful credential verification. They are never implicitly destroyed;
//! an attestation's expiration only bounds when it may be submitted.
//!
//! Admission alone does not let an account move capital. Operations gate on
//! [`AccessController::require_admitted`], which also demands terms-of-service
//! acceptance, so an account may be verified before or after it accepts.

use crate::credential::{AttestationSignature, CredentialVerifier, VerificationResult};
use crate::service::{Role, ServiceConfiguration};
use crate::tos::AcceptanceRegistry;
use parking_lot::RwLock;
use perimeter_common::error::{AccessError, CredentialError};
use perimeter_common::{AccessScope, Account, PoolId, ProtocolEvent, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// How an allow-list entry was granted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllowSource {
    /// Admin override
    Direct { granted_by: Account },
    /// Accepted credential attestation
    Verified {
        verification_id: String,
        verifier: Account,
        expiration: Timestamp,
    },
}

/// Allow-list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowEntry {
    pub source: AllowSource,
    pub granted_at: Timestamp,
}

/// Outcome of a successful `verify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReceipt {
    pub subject: Account,
    pub verifier: Account,
    pub verification_id: String,
}

#[derive(Debug, Default)]
struct ControllerState {
    verifier: CredentialVerifier,
    allowed: HashMap<Account, AllowEntry>,
    /// Consumed verification ids, per subject
    consumed: HashMap<Account, HashSet<String>>,
}

/// Allow-list for one access scope
#[derive(Debug)]
pub struct AccessController {
    scope: AccessScope,
    /// Pool admin for participant controllers
    admin: Option<Account>,
    /// Controller the pool admin must stay admitted by
    pool_admins: Option<Arc<AccessController>>,
    services: Arc<ServiceConfiguration>,
    terms: Arc<AcceptanceRegistry>,
    state: RwLock<ControllerState>,
}

impl AccessController {
    /// Controller gating who may create and administer pools
    pub fn pool_admin(services: Arc<ServiceConfiguration>, terms: Arc<AcceptanceRegistry>) -> Self {
        Self {
            scope: AccessScope::PoolAdmin,
            admin: None,
            pool_admins: None,
            services,
            terms,
            state: RwLock::new(ControllerState::default()),
        }
    }

    /// Controller gating lenders and borrowers of one pool
    ///
    /// `admin` administers it only while `pool_admins` admits them.
    pub fn participant(pool_id: PoolId, admin: Account, pool_admins: Arc<AccessController>) -> Self {
        Self {
            scope: AccessScope::Participant(pool_id),
            admin: Some(admin),
            services: pool_admins.services.clone(),
            terms: pool_admins.terms.clone(),
            pool_admins: Some(pool_admins),
            state: RwLock::new(ControllerState::default()),
        }
    }

    pub fn scope(&self) -> AccessScope {
        self.scope
    }

    pub fn admin(&self) -> Option<Account> {
        self.admin
    }

    /// Fail with `Unauthorized` unless `caller` administers this controller
    pub fn require_admin(&self, caller: &Account) -> Result<()> {
        let admitted = self
            .pool_admins
            .as_ref()
            .map_or(true, |pool_admins| pool_admins.is_admitted(caller));
        if self.admin.as_ref() == Some(caller) && admitted {
            return Ok(());
        }
        self.services.require_role(caller, Role::Operator)
    }

    /// Register a credential schema; idempotent
    pub fn add_credential_schema(&self, caller: &Account, schema: &str) -> Result<()> {
        self.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        if self.state.write().verifier.add_schema(schema) {
            info!(scope = %self.scope, schema, "Credential schema added");
            self.services.events().publish(ProtocolEvent::CredentialSchemaAdded {
                scope: self.scope,
                schema: schema.to_string(),
            });
        }
        Ok(())
    }

    pub fn remove_credential_schema(&self, caller: &Account, schema: &str) -> Result<()> {
        self.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        if self.state.write().verifier.remove_schema(schema) {
            info!(scope = %self.scope, schema, "Credential schema removed");
            self.services.events().publish(ProtocolEvent::CredentialSchemaRemoved {
                scope: self.scope,
                schema: schema.to_string(),
            });
        }
        Ok(())
    }

    /// Trust a verifier; idempotent
    pub fn add_trusted_verifier(&self, caller: &Account, verifier: Account) -> Result<()> {
        self.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        if self.state.write().verifier.add_verifier(verifier) {
            info!(scope = %self.scope, verifier = %verifier.short(), "Trusted verifier added");
            self.services.events().publish(ProtocolEvent::TrustedVerifierAdded {
                scope: self.scope,
                verifier,
            });
        }
        Ok(())
    }

    /// Stop trusting a verifier
    ///
    /// Entries already granted through its attestations remain.
    pub fn remove_trusted_verifier(&self, caller: &Account, verifier: &Account) -> Result<()> {
        self.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        if self.state.write().verifier.remove_verifier(verifier) {
            info!(scope = %self.scope, verifier = %verifier.short(), "Trusted verifier removed");
            self.services.events().publish(ProtocolEvent::TrustedVerifierRemoved {
                scope: self.scope,
                verifier: *verifier,
            });
        }
        Ok(())
    }

    pub fn has_credential_schema(&self, schema: &str) -> bool {
        self.state.read().verifier.has_schema(schema)
    }

    pub fn is_trusted_verifier(&self, verifier: &Account) -> bool {
        self.state.read().verifier.is_trusted(verifier)
    }

    /// Snapshot of the registered schemas and verifiers
    pub fn credential_verifier(&self) -> CredentialVerifier {
        self.state.read().verifier.clone()
    }

    /// Admit `result.subject` on the strength of a signed attestation
    ///
    /// The replay check and the grant happen under one write lock, so
    /// concurrent submissions of the same verification id admit at most once.
    #[instrument(skip(self, result, signature), fields(scope = %self.scope, subject = %result.subject.short()))]
    pub fn verify(
        &self,
        result: &VerificationResult,
        signature: &AttestationSignature,
        now: Timestamp,
    ) -> Result<VerificationReceipt> {
        self.services.ensure_not_paused()?;

        let mut state = self.state.write();
        let verifier = state
            .verifier
            .check(result, signature, &self.scope, now)
            .inspect_err(|err| warn!(error = %err, "Verification rejected"))?;

        let consumed = state.consumed.entry(result.subject).or_default();
        if !consumed.insert(result.verification_id.clone()) {
            warn!(verification_id = %result.verification_id, "Replayed verification");
            return Err(CredentialError::ReplayedVerification {
                verification_id: result.verification_id.clone(),
            }
            .into());
        }

        state.allowed.insert(
            result.subject,
            AllowEntry {
                source: AllowSource::Verified {
                    verification_id: result.verification_id.clone(),
                    verifier,
                    expiration: result.expiration,
                },
                granted_at: now,
            },
        );
        drop(state);

        info!(verifier = %verifier.short(), "Verification result confirmed");
        self.services
            .events()
            .publish(ProtocolEvent::VerificationResultConfirmed {
                scope: self.scope,
                subject: result.subject,
                verification_id: result.verification_id.clone(),
            });

        Ok(VerificationReceipt {
            subject: result.subject,
            verifier,
            verification_id: result.verification_id.clone(),
        })
    }

    /// Admit `account` directly, bypassing credential verification
    pub fn allow_participant(&self, caller: &Account, account: Account, now: Timestamp) -> Result<()> {
        self.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        self.state.write().allowed.insert(
            account,
            AllowEntry {
                source: AllowSource::Direct { granted_by: *caller },
                granted_at: now,
            },
        );

        info!(scope = %self.scope, account = %account.short(), "Participant allowed");
        self.services.events().publish(ProtocolEvent::ParticipantAllowed {
            scope: self.scope,
            account,
        });
        Ok(())
    }

    /// Revoke `account`; takes effect on its next operation
    ///
    /// Consumed verification ids stay consumed.
    pub fn remove_participant(&self, caller: &Account, account: &Account) -> Result<()> {
        self.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        if self.state.write().allowed.remove(account).is_some() {
            info!(scope = %self.scope, account = %account.short(), "Participant removed");
            self.services.events().publish(ProtocolEvent::ParticipantRemoved {
                scope: self.scope,
                account: *account,
            });
        }
        Ok(())
    }

    pub fn is_allowed(&self, account: &Account) -> bool {
        self.state.read().allowed.contains_key(account)
    }

    /// Fail with `NotAllowed` unless `account` is on the allow-list
    pub fn require_allowed(&self, account: &Account) -> Result<()> {
        if self.is_allowed(account) {
            Ok(())
        } else {
            Err(AccessError::NotAllowed { account: *account }.into())
        }
    }

    /// Allowed and bound by the terms of service
    ///
    /// Fails with `NotAllowed` first, then `TermsNotAccepted`.
    pub fn require_admitted(&self, account: &Account) -> Result<()> {
        self.require_allowed(account)?;
        if self.terms.has_accepted(account) {
            return Ok(());
        }
        warn!(scope = %self.scope, account = %account.short(), "Terms of service not accepted");
        Err(AccessError::TermsNotAccepted { account: *account }.into())
    }

    pub fn is_admitted(&self, account: &Account) -> bool {
        self.is_allowed(account) && self.terms.has_accepted(account)
    }

    pub fn entry(&self, account: &Account) -> Option<AllowEntry> {
        self.state.read().allowed.get(account).cloned()
    }

    pub fn allowed_accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<_> = self.state.read().allowed.keys().copied().collect();
        accounts.sort();
        accounts
    }
}
