//! Terms-of-service acceptance registry
//!
//! One boolean per account. Acceptance is permanent; there is no revocation.

use crate::service::{Role, ServiceConfiguration};
use parking_lot::RwLock;
use perimeter_common::{Account, PerimeterError, ProtocolEvent, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// What an account accepted, and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceRecord {
    pub accepted_at: Timestamp,
    /// Terms-of-service URL in force at acceptance, if one was published
    pub terms_url: Option<String>,
}

/// Tracks which accounts have acknowledged the terms of service
#[derive(Debug)]
pub struct AcceptanceRegistry {
    services: Arc<ServiceConfiguration>,
    terms_url: RwLock<Option<String>>,
    entries: RwLock<HashMap<Account, AcceptanceRecord>>,
}

impl AcceptanceRegistry {
    pub fn new(services: Arc<ServiceConfiguration>) -> Self {
        Self {
            services,
            terms_url: RwLock::new(None),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Record acceptance for `account`
    ///
    /// Idempotent: returns `false` without error when already accepted.
    pub fn accept_terms_of_service(&self, account: &Account, now: Timestamp) -> Result<bool> {
        self.services.ensure_not_paused()?;

        let mut entries = self.entries.write();
        if entries.contains_key(account) {
            return Ok(false);
        }

        entries.insert(
            *account,
            AcceptanceRecord {
                accepted_at: now,
                terms_url: self.terms_url.read().clone(),
            },
        );
        drop(entries);

        info!(account = %account.short(), "Terms of service accepted");
        self.services.events().publish(ProtocolEvent::AcceptanceRecorded {
            account: *account,
            at: now,
        });
        Ok(true)
    }

    pub fn has_accepted(&self, account: &Account) -> bool {
        self.entries.read().contains_key(account)
    }

    pub fn acceptance(&self, account: &Account) -> Option<AcceptanceRecord> {
        self.entries.read().get(account).cloned()
    }

    /// Publish a new terms-of-service URL; operator only
    pub fn update_terms_of_service(&self, caller: &Account, url: &str) -> Result<()> {
        self.services.require_role(caller, Role::Operator)?;
        if url.trim().is_empty() {
            return Err(PerimeterError::Config("terms of service URL must not be empty".into()));
        }

        *self.terms_url.write() = Some(url.to_string());
        info!(url, "Terms of service updated");
        self.services
            .events()
            .publish(ProtocolEvent::TermsOfServiceUpdated { url: url.to_string() });
        Ok(())
    }

    pub fn terms_of_service(&self) -> Option<String> {
        self.terms_url.read().clone()
    }
}
