//! Share accounting
//!
//! Lender value is the vault's lender-owned cash plus principal out on loan.
//! Shares are claims on that value. All conversions round down to whole base
//! units and whole shares, except [`ShareLedger::preview_withdraw`] which
//! rounds up so a lender can never redeem more than they own.

use perimeter_common::Account;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Per-lender shares and the lender-side balance sheet of one pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShareLedger {
    /// Share balances; an entry persists at zero once a lender has deposited
    balances: BTreeMap<Account, Decimal>,
    total_shares: Decimal,
    /// Lender-owned assets sitting in the vault, free to withdraw or lend
    liquid: Decimal,
    /// Principal drawn by active loans
    outstanding_principal: Decimal,
    /// Principal written off over the pool's life
    total_defaults: Decimal,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total lender value
    #[inline]
    pub fn total_assets(&self) -> Decimal {
        self.liquid + self.outstanding_principal
    }

    #[inline]
    pub fn total_shares(&self) -> Decimal {
        self.total_shares
    }

    #[inline]
    pub fn liquid(&self) -> Decimal {
        self.liquid
    }

    #[inline]
    pub fn outstanding_principal(&self) -> Decimal {
        self.outstanding_principal
    }

    pub fn total_defaults(&self) -> Decimal {
        self.total_defaults
    }

    pub fn balance_of(&self, lender: &Account) -> Decimal {
        self.balances.get(lender).copied().unwrap_or(Decimal::ZERO)
    }

    /// Whether `lender` has ever deposited
    pub fn has_position(&self, lender: &Account) -> bool {
        self.balances.contains_key(lender)
    }

    /// Lenders with a non-zero balance
    pub fn lenders(&self) -> Vec<(Account, Decimal)> {
        self.balances
            .iter()
            .filter(|(_, shares)| !shares.is_zero())
            .map(|(lender, shares)| (*lender, *shares))
            .collect()
    }

    /// Lender value per share; 1 for an empty pool
    pub fn share_price(&self) -> Decimal {
        if self.total_shares.is_zero() {
            Decimal::ONE
        } else {
            self.total_assets() / self.total_shares
        }
    }

    /// Shares minted for `assets` at the current price
    ///
    /// 1:1 when no shares exist. Zero when shares exist but lender value has
    /// been written down to nothing; such a pool cannot price new deposits.
    pub fn convert_to_shares(&self, assets: Decimal) -> Decimal {
        if self.total_shares.is_zero() {
            return assets.floor();
        }
        let total_assets = self.total_assets();
        if total_assets.is_zero() {
            return Decimal::ZERO;
        }
        (assets * self.total_shares / total_assets).floor()
    }

    /// Assets redeemable for `shares` at the current price
    pub fn convert_to_assets(&self, shares: Decimal) -> Decimal {
        if self.total_shares.is_zero() {
            return Decimal::ZERO;
        }
        (shares * self.total_assets() / self.total_shares).floor()
    }

    /// Shares a deposit of `assets` would mint now
    pub fn preview_deposit(&self, assets: Decimal) -> Decimal {
        self.convert_to_shares(assets)
    }

    /// Shares that must be burned to withdraw `assets`
    pub fn preview_withdraw(&self, assets: Decimal) -> Decimal {
        let total_assets = self.total_assets();
        if self.total_shares.is_zero() || total_assets.is_zero() {
            return assets.ceil();
        }
        (assets * self.total_shares / total_assets).ceil()
    }

    /// Assets `lender` could withdraw right now
    pub fn max_withdraw(&self, lender: &Account) -> Decimal {
        self.convert_to_assets(self.balance_of(lender)).min(self.liquid)
    }

    /// Credit a deposit
    pub(crate) fn mint(&mut self, lender: &Account, assets: Decimal, shares: Decimal) {
        *self.balances.entry(*lender).or_insert(Decimal::ZERO) += shares;
        self.total_shares += shares;
        self.liquid += assets;
    }

    /// Debit a withdrawal; the caller has checked balance and liquidity
    pub(crate) fn burn(&mut self, lender: &Account, shares: Decimal, assets: Decimal) {
        if let Some(balance) = self.balances.get_mut(lender) {
            *balance -= shares;
        }
        self.total_shares -= shares;
        self.liquid -= assets;
    }

    /// Lend `principal`, of which `drawn` leaves the vault
    ///
    /// The difference is the origination fee, which stays as lender income.
    pub(crate) fn draw(&mut self, principal: Decimal, drawn: Decimal) {
        self.liquid -= drawn;
        self.outstanding_principal += principal;
    }

    /// Receive repaid principal plus lender income
    pub(crate) fn repay(&mut self, principal: Decimal, income: Decimal) {
        self.outstanding_principal -= principal;
        self.liquid += principal + income;
    }

    /// Write off defaulted principal, partly made good by `recovered`
    pub(crate) fn write_off(&mut self, principal: Decimal, recovered: Decimal) {
        self.outstanding_principal -= principal;
        self.total_defaults += principal;
        self.liquid += recovered;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn lender(seed: &[u8]) -> Account {
        Account::derive("test", seed)
    }

    #[test]
    fn test_first_deposit_is_one_to_one() {
        let mut ledger = ShareLedger::new();
        let alice = lender(b"alice");

        let shares = ledger.preview_deposit(dec!(10000000));
        assert_eq!(shares, dec!(10000000));

        ledger.mint(&alice, dec!(10000000), shares);
        assert_eq!(ledger.total_assets(), dec!(10000000));
        assert_eq!(ledger.balance_of(&alice), dec!(10000000));
        assert_eq!(ledger.share_price(), Decimal::ONE);
    }

    #[test]
    fn test_income_raises_share_price() {
        let mut ledger = ShareLedger::new();
        let alice = lender(b"alice");
        let bob = lender(b"bob");
        ledger.mint(&alice, dec!(1000), dec!(1000));

        ledger.draw(dec!(500), dec!(490));
        ledger.repay(dec!(500), dec!(40));
        // 10 origination + 40 interest
        assert_eq!(ledger.total_assets(), dec!(1050));

        let shares = ledger.convert_to_shares(dec!(105));
        assert_eq!(shares, dec!(100));
        ledger.mint(&bob, dec!(105), shares);

        assert_eq!(ledger.convert_to_assets(dec!(1000)), dec!(1050));
        assert_eq!(ledger.max_withdraw(&bob), dec!(105));
    }

    #[test]
    fn test_conversions_round_down() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&lender(b"alice"), dec!(3), dec!(2));

        // price 1.5
        assert_eq!(ledger.convert_to_shares(dec!(2)), dec!(1));
        assert_eq!(ledger.convert_to_assets(dec!(1)), dec!(1));
        assert_eq!(ledger.preview_withdraw(dec!(2)), dec!(2));
    }

    #[test]
    fn test_max_withdraw_bounded_by_liquidity() {
        let mut ledger = ShareLedger::new();
        let alice = lender(b"alice");
        ledger.mint(&alice, dec!(1000), dec!(1000));
        ledger.draw(dec!(800), dec!(800));

        assert_eq!(ledger.total_assets(), dec!(1000));
        assert_eq!(ledger.max_withdraw(&alice), dec!(200));
    }

    #[test]
    fn test_write_off() {
        let mut ledger = ShareLedger::new();
        let alice = lender(b"alice");
        ledger.mint(&alice, dec!(1000), dec!(1000));
        ledger.draw(dec!(600), dec!(600));

        // 600 defaulted, 250 made good by first-loss
        ledger.write_off(dec!(600), dec!(250));
        assert_eq!(ledger.total_assets(), dec!(650));
        assert_eq!(ledger.total_defaults(), dec!(600));
        assert_eq!(ledger.convert_to_assets(dec!(1000)), dec!(650));
    }

    #[test]
    fn test_wiped_out_pool_prices_no_shares() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&lender(b"alice"), dec!(100), dec!(100));
        ledger.draw(dec!(100), dec!(100));
        ledger.write_off(dec!(100), Decimal::ZERO);

        assert_eq!(ledger.convert_to_shares(dec!(50)), Decimal::ZERO);
    }

    #[test]
    fn test_zero_balances_are_remembered() {
        let mut ledger = ShareLedger::new();
        let alice = lender(b"alice");
        ledger.mint(&alice, dec!(10), dec!(10));
        ledger.burn(&alice, dec!(10), dec!(10));

        assert!(ledger.has_position(&alice));
        assert!(ledger.lenders().is_empty());
        assert_eq!(ledger.total_shares(), Decimal::ZERO);
    }

    proptest! {
        #[test]
        fn prop_deposit_then_withdraw_never_gains(
            seed in 1u64..1_000_000_000,
            income in 0u64..1_000_000,
            amount in 1u64..1_000_000_000,
        ) {
            let mut ledger = ShareLedger::new();
            let alice = lender(b"alice");
            let bob = lender(b"bob");

            let seed = Decimal::from(seed);
            ledger.mint(&alice, seed, seed);
            ledger.repay(Decimal::ZERO, Decimal::from(income));

            let amount = Decimal::from(amount);
            let price = ledger.share_price();
            let shares = ledger.convert_to_shares(amount);
            prop_assume!(shares > Decimal::ZERO);
            ledger.mint(&bob, amount, shares);

            let back = ledger.convert_to_assets(shares);
            prop_assert!(back <= amount);
            prop_assert!(amount - back <= price.ceil() + Decimal::ONE);
        }

        #[test]
        fn prop_shares_imply_value(
            deposits in proptest::collection::vec(1u64..1_000_000, 1..8),
            drawn_pct in 0u64..100,
        ) {
            let mut ledger = ShareLedger::new();
            for (i, amount) in deposits.iter().enumerate() {
                let amount = Decimal::from(*amount);
                let shares = ledger.convert_to_shares(amount);
                prop_assume!(shares > Decimal::ZERO);
                ledger.mint(&lender(&[i as u8]), amount, shares);
            }

            let principal = (ledger.liquid() * Decimal::from(drawn_pct) / Decimal::ONE_HUNDRED).floor();
            ledger.draw(principal, principal);

            prop_assert!(ledger.total_shares() > Decimal::ZERO);
            prop_assert!(ledger.total_assets() > Decimal::ZERO);
            let sum: Decimal = ledger.lenders().iter().map(|(_, s)| *s).sum();
            prop_assert_eq!(sum, ledger.total_shares());
        }
    }
}
