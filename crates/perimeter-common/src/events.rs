//! Protocol notifications
//!
//! Every successful state change publishes a [`ProtocolEvent`]. Events are
//! informational: created-entity identifiers are also returned synchronously
//! from the creating operation, so observers are optional.

use crate::types::account::{Account, AssetId};
use crate::types::ids::{AccessScope, LoanId, PoolId};
use crate::types::time::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Notification emitted after a successful state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProtocolEvent {
    // Service configuration
    RoleGranted { account: Account, role: String },
    RoleRevoked { account: Account, role: String },
    PauseToggled { paused: bool },
    LiquidityAssetSet { asset: AssetId, allowed: bool },

    // Terms of service
    TermsOfServiceUpdated { url: String },
    AcceptanceRecorded { account: Account, at: Timestamp },

    // Access control
    CredentialSchemaAdded { scope: AccessScope, schema: String },
    CredentialSchemaRemoved { scope: AccessScope, schema: String },
    TrustedVerifierAdded { scope: AccessScope, verifier: Account },
    TrustedVerifierRemoved { scope: AccessScope, verifier: Account },
    VerificationResultConfirmed {
        scope: AccessScope,
        subject: Account,
        verification_id: String,
    },
    ParticipantAllowed { scope: AccessScope, account: Account },
    ParticipantRemoved { scope: AccessScope, account: Account },

    // Pools
    PoolCreated {
        pool_id: PoolId,
        admin: Account,
        asset: AssetId,
    },
    PoolLifecycleChanged {
        pool_id: PoolId,
        from: String,
        to: String,
    },
    PoolSettingsUpdated { pool_id: PoolId },
    FirstLossDeposited {
        pool_id: PoolId,
        depositor: Account,
        amount: Decimal,
    },
    FirstLossWithdrawn {
        pool_id: PoolId,
        receiver: Account,
        amount: Decimal,
    },
    Deposit {
        pool_id: PoolId,
        lender: Account,
        assets: Decimal,
        shares: Decimal,
    },
    Withdraw {
        pool_id: PoolId,
        lender: Account,
        assets: Decimal,
        shares: Decimal,
    },
    AdminFeesWithdrawn {
        pool_id: PoolId,
        receiver: Account,
        amount: Decimal,
    },
    FirstLossApplied {
        pool_id: PoolId,
        loan_id: LoanId,
        amount: Decimal,
    },

    // Loans
    LoanCreated {
        loan_id: LoanId,
        pool_id: PoolId,
        borrower: Account,
        principal: Decimal,
    },
    CollateralPosted { loan_id: LoanId, amount: Decimal },
    LoanCanceled { loan_id: LoanId },
    LoanExpired { loan_id: LoanId },
    LoanFunded {
        loan_id: LoanId,
        pool_id: PoolId,
        principal: Decimal,
        drawn: Decimal,
    },
    PaymentMade {
        loan_id: LoanId,
        late_fees: Decimal,
        interest: Decimal,
        principal: Decimal,
    },
    LoanRepaid { loan_id: LoanId },
    LoanDrawdown { loan_id: LoanId, amount: Decimal },
    PrincipalPaidDown { loan_id: LoanId, amount: Decimal },
    LoanFundsReclaimed {
        loan_id: LoanId,
        pool_id: PoolId,
        amount: Decimal,
    },
    LoanCalledBack { loan_id: LoanId, due_at: Timestamp },
    LoanDefaulted {
        loan_id: LoanId,
        pool_id: PoolId,
        principal_written_off: Decimal,
    },
}

impl ProtocolEvent {
    /// Short event name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::RoleGranted { .. } => "RoleGranted",
            ProtocolEvent::RoleRevoked { .. } => "RoleRevoked",
            ProtocolEvent::PauseToggled { .. } => "PauseToggled",
            ProtocolEvent::LiquidityAssetSet { .. } => "LiquidityAssetSet",
            ProtocolEvent::TermsOfServiceUpdated { .. } => "TermsOfServiceUpdated",
            ProtocolEvent::AcceptanceRecorded { .. } => "AcceptanceRecorded",
            ProtocolEvent::CredentialSchemaAdded { .. } => "CredentialSchemaAdded",
            ProtocolEvent::CredentialSchemaRemoved { .. } => "CredentialSchemaRemoved",
            ProtocolEvent::TrustedVerifierAdded { .. } => "TrustedVerifierAdded",
            ProtocolEvent::TrustedVerifierRemoved { .. } => "TrustedVerifierRemoved",
            ProtocolEvent::VerificationResultConfirmed { .. } => "VerificationResultConfirmed",
            ProtocolEvent::ParticipantAllowed { .. } => "ParticipantAllowed",
            ProtocolEvent::ParticipantRemoved { .. } => "ParticipantRemoved",
            ProtocolEvent::PoolCreated { .. } => "PoolCreated",
            ProtocolEvent::PoolLifecycleChanged { .. } => "PoolLifecycleChanged",
            ProtocolEvent::PoolSettingsUpdated { .. } => "PoolSettingsUpdated",
            ProtocolEvent::FirstLossDeposited { .. } => "FirstLossDeposited",
            ProtocolEvent::FirstLossWithdrawn { .. } => "FirstLossWithdrawn",
            ProtocolEvent::Deposit { .. } => "Deposit",
            ProtocolEvent::Withdraw { .. } => "Withdraw",
            ProtocolEvent::AdminFeesWithdrawn { .. } => "AdminFeesWithdrawn",
            ProtocolEvent::FirstLossApplied { .. } => "FirstLossApplied",
            ProtocolEvent::LoanCreated { .. } => "LoanCreated",
            ProtocolEvent::CollateralPosted { .. } => "CollateralPosted",
            ProtocolEvent::LoanCanceled { .. } => "LoanCanceled",
            ProtocolEvent::LoanExpired { .. } => "LoanExpired",
            ProtocolEvent::LoanFunded { .. } => "LoanFunded",
            ProtocolEvent::PaymentMade { .. } => "PaymentMade",
            ProtocolEvent::LoanRepaid { .. } => "LoanRepaid",
            ProtocolEvent::LoanDrawdown { .. } => "LoanDrawdown",
            ProtocolEvent::PrincipalPaidDown { .. } => "PrincipalPaidDown",
            ProtocolEvent::LoanFundsReclaimed { .. } => "LoanFundsReclaimed",
            ProtocolEvent::LoanCalledBack { .. } => "LoanCalledBack",
            ProtocolEvent::LoanDefaulted { .. } => "LoanDefaulted",
        }
    }
}

/// Broadcast channel for protocol notifications
///
/// Cloning an `EventBus` shares the same channel. Publishing never blocks and
/// never fails; with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ProtocolEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every current subscriber
    pub fn publish(&self, event: ProtocolEvent) {
        debug!(event = event.name(), "Publishing protocol event");
        // An error only means nobody is listening
        let _ = self.sender.send(event);
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let pool_id = PoolId::new();
        bus.publish(ProtocolEvent::PoolSettingsUpdated { pool_id });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, ProtocolEvent::PoolSettingsUpdated { pool_id });
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(ProtocolEvent::PauseToggled { paused: true });
    }

    #[test]
    fn test_event_serialization() {
        let event = ProtocolEvent::LoanRepaid {
            loan_id: LoanId::new(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"LoanRepaid\""));

        let deposit = ProtocolEvent::Deposit {
            pool_id: PoolId::new(),
            lender: Account::derive("test", b"lender"),
            assets: dec!(10),
            shares: dec!(10),
        };
        let back: ProtocolEvent =
            serde_json::from_str(&serde_json::to_string(&deposit).unwrap()).unwrap();
        assert_eq!(back, deposit);
    }
}
