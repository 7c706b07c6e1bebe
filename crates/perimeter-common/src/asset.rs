//! Fungible asset transfer collaborator
//!
//! Value moves through an external ledger. The core calls
//! [`AssetLedger::transfer_from`] at most once per operation, before touching
//! its own state, so a failed transfer leaves nothing to roll back.

use crate::error::TransferError;
use crate::types::account::{Account, AssetId};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

/// External fungible-asset transfer primitive
pub trait AssetLedger: Send + Sync {
    /// Move `amount` of `asset` from `from` to `to`
    fn transfer_from(
        &self,
        asset: &AssetId,
        from: &Account,
        to: &Account,
        amount: Decimal,
    ) -> Result<(), TransferError>;

    /// Current balance of `account`
    fn balance_of(&self, asset: &AssetId, account: &Account) -> Decimal;
}

/// In-memory asset ledger for simulations and tests
#[derive(Debug, Default)]
pub struct InMemoryAssetLedger {
    balances: RwLock<HashMap<(AssetId, Account), Decimal>>,
}

impl InMemoryAssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit freshly issued units to an account
    pub fn mint(&self, asset: &AssetId, account: &Account, amount: Decimal) {
        let mut balances = self.balances.write();
        *balances
            .entry((asset.clone(), *account))
            .or_insert(Decimal::ZERO) += amount;
    }

    /// Total units of `asset` across all accounts
    pub fn supply(&self, asset: &AssetId) -> Decimal {
        self.balances
            .read()
            .iter()
            .filter(|((a, _), _)| a == asset)
            .map(|(_, balance)| *balance)
            .sum()
    }
}

impl AssetLedger for InMemoryAssetLedger {
    fn transfer_from(
        &self,
        asset: &AssetId,
        from: &Account,
        to: &Account,
        amount: Decimal,
    ) -> Result<(), TransferError> {
        if amount < Decimal::ZERO {
            return Err(TransferError::Rejected("negative amount".into()));
        }

        let mut balances = self.balances.write();
        let available = balances
            .get(&(asset.clone(), *from))
            .copied()
            .unwrap_or(Decimal::ZERO);

        if available < amount {
            warn!(
                asset = %asset,
                from = %from.short(),
                required = %amount,
                available = %available,
                "Transfer rejected"
            );
            return Err(TransferError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        balances.insert((asset.clone(), *from), available - amount);
        *balances
            .entry((asset.clone(), *to))
            .or_insert(Decimal::ZERO) += amount;

        debug!(asset = %asset, from = %from.short(), to = %to.short(), amount = %amount, "Transfer");
        Ok(())
    }

    fn balance_of(&self, asset: &AssetId, account: &Account) -> Decimal {
        self.balances
            .read()
            .get(&(asset.clone(), *account))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transfer() {
        let ledger = InMemoryAssetLedger::new();
        let usdc = AssetId::new("USDC").unwrap();
        let alice = Account::derive("test", b"alice");
        let bob = Account::derive("test", b"bob");

        ledger.mint(&usdc, &alice, dec!(100));
        ledger.transfer_from(&usdc, &alice, &bob, dec!(30)).unwrap();

        assert_eq!(ledger.balance_of(&usdc, &alice), dec!(70));
        assert_eq!(ledger.balance_of(&usdc, &bob), dec!(30));
        assert_eq!(ledger.supply(&usdc), dec!(100));
    }

    #[test]
    fn test_insufficient_balance_leaves_balances_untouched() {
        let ledger = InMemoryAssetLedger::new();
        let usdc = AssetId::new("USDC").unwrap();
        let alice = Account::derive("test", b"alice");
        let bob = Account::derive("test", b"bob");

        ledger.mint(&usdc, &alice, dec!(10));
        let result = ledger.transfer_from(&usdc, &alice, &bob, dec!(11));

        assert!(matches!(result, Err(TransferError::InsufficientBalance { .. })));
        assert_eq!(ledger.balance_of(&usdc, &alice), dec!(10));
        assert_eq!(ledger.balance_of(&usdc, &bob), dec!(0));
    }
}
