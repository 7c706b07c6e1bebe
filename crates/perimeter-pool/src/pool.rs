//! Pool handle
//!
//! A [`Pool`] serialises every mutation behind one mutex. Each operation
//! validates first, performs at most one asset transfer, and only then
//! updates the ledger, so a rejected transfer leaves the pool untouched.

use crate::accounting::ShareLedger;
use crate::context::ProtocolContext;
use crate::controller::PoolController;
use crate::state::{PoolSettings, PoolState};
use parking_lot::Mutex;
use perimeter_access::{AccessController, Role};
use perimeter_common::error::{LoanError, PoolError};
use perimeter_common::{
    bps_of, Account, AssetId, LoanId, PoolId, ProtocolEvent, Result, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
struct PoolInner {
    controller: PoolController,
    ledger: ShareLedger,
}

/// Point-in-time view of a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub pool_id: PoolId,
    pub admin: Account,
    pub asset: AssetId,
    pub state: PoolState,
    pub settings: PoolSettings,
    pub first_loss: Decimal,
    pub first_loss_applied: Decimal,
    pub liquid: Decimal,
    pub outstanding_principal: Decimal,
    pub total_assets: Decimal,
    pub total_shares: Decimal,
    pub share_price: Decimal,
    pub admin_fees: Decimal,
    pub total_defaults: Decimal,
}

/// A lending pool
pub struct Pool {
    id: PoolId,
    admin: Account,
    asset: AssetId,
    /// Account holding the pool's assets on the ledger
    vault: Account,
    participants: Arc<AccessController>,
    ctx: ProtocolContext,
    inner: Mutex<PoolInner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("admin", &self.admin)
            .field("asset", &self.asset)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Pool {
    /// Vault account for a pool id
    pub fn vault_for(id: &PoolId) -> Account {
        Account::derive("pool vault", id.0.as_bytes())
    }

    pub(crate) fn new(
        id: PoolId,
        admin: Account,
        asset: AssetId,
        settings: PoolSettings,
        participants: Arc<AccessController>,
        ctx: ProtocolContext,
    ) -> Self {
        Self {
            id,
            admin,
            asset,
            vault: Self::vault_for(&id),
            participants,
            ctx,
            inner: Mutex::new(PoolInner {
                controller: PoolController::new(settings),
                ledger: ShareLedger::new(),
            }),
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn admin(&self) -> Account {
        self.admin
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    pub fn vault(&self) -> Account {
        self.vault
    }

    /// Participant allow-list for lenders and borrowers
    pub fn participants(&self) -> &Arc<AccessController> {
        &self.participants
    }

    pub fn state(&self) -> PoolState {
        self.inner.lock().controller.state()
    }

    pub fn settings(&self) -> PoolSettings {
        self.inner.lock().controller.settings().clone()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let inner = self.inner.lock();
        PoolSnapshot {
            pool_id: self.id,
            admin: self.admin,
            asset: self.asset.clone(),
            state: inner.controller.state(),
            settings: inner.controller.settings().clone(),
            first_loss: inner.controller.first_loss(),
            first_loss_applied: inner.controller.first_loss_applied(),
            liquid: inner.ledger.liquid(),
            outstanding_principal: inner.ledger.outstanding_principal(),
            total_assets: inner.ledger.total_assets(),
            total_shares: inner.ledger.total_shares(),
            share_price: inner.ledger.share_price(),
            admin_fees: inner.controller.admin_fees(),
            total_defaults: inner.ledger.total_defaults(),
        }
    }

    /// Fail with `Unauthorized` unless `caller` is the pool admin or an operator
    ///
    /// The pool admin keeps its authority only while admitted by the
    /// pool-admin controller; revoking it there revokes it here.
    pub fn require_admin(&self, caller: &Account) -> Result<()> {
        if *caller != self.admin {
            return self.ctx.services.require_role(caller, Role::Operator);
        }
        let admitted = self.ctx.pool_admins.require_admitted(caller);
        if admitted.is_err() && self.ctx.services.has_role(caller, Role::Operator) {
            return Ok(());
        }
        admitted.inspect_err(|err| warn!(pool_id = %self.id, error = %err, "Pool admin not admitted"))
    }

    fn publish_transition(&self, from: PoolState, to: PoolState) {
        info!(pool_id = %self.id, from = %from, to = %to, "Pool lifecycle changed");
        self.ctx.events().publish(ProtocolEvent::PoolLifecycleChanged {
            pool_id: self.id,
            from: from.label().to_string(),
            to: to.label().to_string(),
        });
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Initialized → Active once first-loss capital meets the minimum
    #[instrument(skip(self), fields(pool_id = %self.id))]
    pub fn activate(&self, caller: &Account, now: Timestamp) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        let from = self
            .inner
            .lock()
            .controller
            .activate(now)
            .inspect_err(|err| warn!(error = %err, "Activation rejected"))?;
        self.publish_transition(from, PoolState::Active);
        Ok(())
    }

    pub fn pause(&self, caller: &Account) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        let from = self.inner.lock().controller.pause()?;
        self.publish_transition(from, PoolState::Paused);
        Ok(())
    }

    pub fn unpause(&self, caller: &Account) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        let from = self.inner.lock().controller.unpause()?;
        self.publish_transition(from, PoolState::Active);
        Ok(())
    }

    /// Close the pool for good; requires no outstanding principal
    pub fn close(&self, caller: &Account) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        let mut inner = self.inner.lock();
        let outstanding = inner.ledger.outstanding_principal();
        let from = inner.controller.close(outstanding)?;
        drop(inner);

        self.publish_transition(from, PoolState::Closed);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    pub fn set_service_fee_bps(&self, caller: &Account, bps: u32) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        self.inner
            .lock()
            .controller
            .set_service_fee_bps(bps, &self.ctx.config)?;

        info!(pool_id = %self.id, bps, "Service fee updated");
        self.ctx
            .events()
            .publish(ProtocolEvent::PoolSettingsUpdated { pool_id: self.id });
        Ok(())
    }

    /// Change the deposit ceiling; `None` removes it
    pub fn set_max_capacity(&self, caller: &Account, capacity: Option<Decimal>) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        let mut inner = self.inner.lock();
        let total_assets = inner.ledger.total_assets();
        inner.controller.set_max_capacity(capacity, total_assets)?;
        drop(inner);

        info!(pool_id = %self.id, capacity = ?capacity, "Max capacity updated");
        self.ctx
            .events()
            .publish(ProtocolEvent::PoolSettingsUpdated { pool_id: self.id });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // First-loss capital
    // ---------------------------------------------------------------------

    /// Contribute junior capital; depositor must be an admitted pool admin
    #[instrument(skip(self), fields(pool_id = %self.id, depositor = %depositor.short()))]
    pub fn deposit_first_loss(&self, depositor: &Account, amount: Decimal) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        self.ctx.pool_admins.require_admitted(depositor)?;

        let mut inner = self.inner.lock();
        inner.controller.check_first_loss_deposit(amount)?;

        self.ctx
            .assets
            .transfer_from(&self.asset, depositor, &self.vault, amount)?;
        inner.controller.add_first_loss(amount);
        let balance = inner.controller.first_loss();
        drop(inner);

        info!(amount = %amount, balance = %balance, "First-loss capital deposited");
        self.ctx.events().publish(ProtocolEvent::FirstLossDeposited {
            pool_id: self.id,
            depositor: *depositor,
            amount,
        });
        Ok(())
    }

    /// Release all first-loss capital to `receiver`; Closed pools only
    pub fn withdraw_first_loss(&self, caller: &Account, receiver: &Account) -> Result<Decimal> {
        self.ctx.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        let mut inner = self.inner.lock();
        let amount = inner.controller.check_first_loss_withdrawal()?;

        self.ctx
            .assets
            .transfer_from(&self.asset, &self.vault, receiver, amount)?;
        inner.controller.take_first_loss();
        drop(inner);

        info!(pool_id = %self.id, amount = %amount, "First-loss capital withdrawn");
        self.ctx.events().publish(ProtocolEvent::FirstLossWithdrawn {
            pool_id: self.id,
            receiver: *receiver,
            amount,
        });
        Ok(amount)
    }

    pub fn first_loss(&self) -> Decimal {
        self.inner.lock().controller.first_loss()
    }

    // ---------------------------------------------------------------------
    // Lender capital
    // ---------------------------------------------------------------------

    /// Deposit `assets` from `lender`, returning the shares minted
    ///
    /// The lender must be on the participant allow-list and must have
    /// accepted the terms of service.
    #[instrument(skip(self), fields(pool_id = %self.id, lender = %lender.short()))]
    pub fn deposit(&self, lender: &Account, assets: Decimal) -> Result<Decimal> {
        self.ctx.services.ensure_not_paused()?;
        if assets <= Decimal::ZERO {
            return Err(PoolError::InvalidAmount.into());
        }
        self.participants.require_admitted(lender)?;

        let mut inner = self.inner.lock();
        inner.controller.require_active()?;

        inner
            .controller
            .check_capacity(inner.ledger.total_assets(), assets)?;

        let shares = inner.ledger.convert_to_shares(assets);
        if shares.is_zero() {
            return Err(PoolError::InvalidAmount.into());
        }

        self.ctx
            .assets
            .transfer_from(&self.asset, lender, &self.vault, assets)?;
        inner.ledger.mint(lender, assets, shares);
        let total_assets = inner.ledger.total_assets();
        drop(inner);

        info!(assets = %assets, shares = %shares, total_assets = %total_assets, "Deposit");
        self.ctx.events().publish(ProtocolEvent::Deposit {
            pool_id: self.id,
            lender: *lender,
            assets,
            shares,
        });
        Ok(shares)
    }

    /// Redeem `shares` for assets, returning the assets paid out
    ///
    /// Allowed while Active or Closed, bounded by unreserved liquidity.
    #[instrument(skip(self), fields(pool_id = %self.id, lender = %lender.short()))]
    pub fn withdraw(&self, lender: &Account, shares: Decimal) -> Result<Decimal> {
        self.ctx.services.ensure_not_paused()?;
        if shares <= Decimal::ZERO {
            return Err(PoolError::InvalidAmount.into());
        }
        self.participants.require_allowed(lender)?;

        let mut inner = self.inner.lock();
        inner
            .controller
            .require_state("withdraw", &[PoolState::Active, PoolState::Closed])?;

        let balance = inner.ledger.balance_of(lender);
        if balance < shares {
            return Err(PoolError::InsufficientShares {
                requested: shares,
                balance,
            }
            .into());
        }

        let assets = inner.ledger.convert_to_assets(shares);
        if assets.is_zero() {
            return Err(PoolError::InvalidAmount.into());
        }
        let available = inner.ledger.liquid();
        if assets > available {
            return Err(PoolError::InsufficientLiquidity {
                required: assets,
                available,
            }
            .into());
        }

        self.ctx
            .assets
            .transfer_from(&self.asset, &self.vault, lender, assets)?;
        inner.ledger.burn(lender, shares, assets);
        drop(inner);

        info!(assets = %assets, shares = %shares, "Withdraw");
        self.ctx.events().publish(ProtocolEvent::Withdraw {
            pool_id: self.id,
            lender: *lender,
            assets,
            shares,
        });
        Ok(assets)
    }

    /// Pay accrued service fees to `receiver`
    pub fn withdraw_admin_fees(&self, caller: &Account, receiver: &Account) -> Result<Decimal> {
        self.ctx.services.ensure_not_paused()?;
        self.require_admin(caller)?;

        let mut inner = self.inner.lock();
        let amount = inner.controller.admin_fees();
        if amount.is_zero() {
            return Err(PoolError::InvalidAmount.into());
        }

        self.ctx
            .assets
            .transfer_from(&self.asset, &self.vault, receiver, amount)?;
        inner.controller.take_admin_fees();
        drop(inner);

        info!(pool_id = %self.id, amount = %amount, "Admin fees withdrawn");
        self.ctx.events().publish(ProtocolEvent::AdminFeesWithdrawn {
            pool_id: self.id,
            receiver: *receiver,
            amount,
        });
        Ok(amount)
    }

    // ---------------------------------------------------------------------
    // Previews
    // ---------------------------------------------------------------------

    pub fn preview_deposit(&self, assets: Decimal) -> Decimal {
        self.inner.lock().ledger.preview_deposit(assets)
    }

    pub fn preview_withdraw(&self, assets: Decimal) -> Decimal {
        self.inner.lock().ledger.preview_withdraw(assets)
    }

    pub fn convert_to_shares(&self, assets: Decimal) -> Decimal {
        self.inner.lock().ledger.convert_to_shares(assets)
    }

    pub fn convert_to_assets(&self, shares: Decimal) -> Decimal {
        self.inner.lock().ledger.convert_to_assets(shares)
    }

    pub fn max_withdraw(&self, lender: &Account) -> Decimal {
        let inner = self.inner.lock();
        match inner.controller.state() {
            PoolState::Active | PoolState::Closed => inner.ledger.max_withdraw(lender),
            _ => Decimal::ZERO,
        }
    }

    pub fn max_deposit(&self) -> Decimal {
        let inner = self.inner.lock();
        inner.controller.max_deposit(inner.ledger.total_assets())
    }

    pub fn balance_of(&self, lender: &Account) -> Decimal {
        self.inner.lock().ledger.balance_of(lender)
    }

    /// Lenders with a non-zero share balance
    pub fn lenders(&self) -> Vec<(Account, Decimal)> {
        self.inner.lock().ledger.lenders()
    }

    pub fn total_assets(&self) -> Decimal {
        self.inner.lock().ledger.total_assets()
    }

    pub fn total_shares(&self) -> Decimal {
        self.inner.lock().ledger.total_shares()
    }

    /// Lender-owned cash not committed to loans
    pub fn liquid_assets(&self) -> Decimal {
        self.inner.lock().ledger.liquid()
    }

    pub fn outstanding_principal(&self) -> Decimal {
        self.inner.lock().ledger.outstanding_principal()
    }

    // ---------------------------------------------------------------------
    // Loan servicing
    // ---------------------------------------------------------------------

    /// Lend `principal`, withholding `origination_fee`
    ///
    /// `recipient` is the borrower for a fixed-term loan or the loan's
    /// funding vault for an open-term one. Returns the amount transferred.
    #[instrument(skip(self), fields(pool_id = %self.id))]
    pub fn fund_loan(
        &self,
        loan_id: LoanId,
        recipient: &Account,
        principal: Decimal,
        origination_fee: Decimal,
    ) -> Result<Decimal> {
        self.ctx.services.ensure_not_paused()?;

        let mut inner = self.inner.lock();
        inner.controller.require_active()?;

        let available = inner.ledger.liquid();
        if principal > available {
            warn!(required = %principal, available = %available, "Insufficient pool liquidity");
            return Err(LoanError::InsufficientPoolLiquidity {
                required: principal,
                available,
            }
            .into());
        }

        let drawn = principal - origination_fee;
        self.ctx
            .assets
            .transfer_from(&self.asset, &self.vault, recipient, drawn)?;
        inner.ledger.draw(principal, drawn);
        drop(inner);

        info!(loan_id = %loan_id, principal = %principal, drawn = %drawn, "Loan funded from pool");
        Ok(drawn)
    }

    /// Take a loan payment from `payer`
    ///
    /// The service fee is skimmed from `interest`; late fees and the rest of
    /// the interest accrue to lenders.
    pub fn receive_payment(
        &self,
        loan_id: LoanId,
        payer: &Account,
        late_fees: Decimal,
        interest: Decimal,
        principal: Decimal,
    ) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;

        let mut inner = self.inner.lock();
        inner.controller.require_state(
            "receive_payment",
            &[PoolState::Active, PoolState::Paused, PoolState::Closed],
        )?;

        let total = late_fees + interest + principal;
        let fee = bps_of(interest, inner.controller.settings().service_fee_bps);

        self.ctx
            .assets
            .transfer_from(&self.asset, payer, &self.vault, total)?;
        inner.controller.accrue_admin_fees(fee);
        inner.ledger.repay(principal, late_fees + interest - fee);
        drop(inner);

        debug!(
            pool_id = %self.id,
            loan_id = %loan_id,
            total = %total,
            service_fee = %fee,
            "Loan payment received"
        );
        Ok(())
    }

    /// Return idle open-term funds from `funding_vault` to the pool
    ///
    /// The amount leaves outstanding principal and becomes liquid again.
    pub fn reclaim_loan_funds(&self, loan_id: LoanId, funding_vault: &Account, amount: Decimal) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;

        let mut inner = self.inner.lock();
        inner
            .controller
            .require_state("reclaim_loan_funds", &[PoolState::Active, PoolState::Paused])?;
        if amount <= Decimal::ZERO || amount > inner.ledger.outstanding_principal() {
            return Err(PoolError::InvalidAmount.into());
        }

        self.ctx
            .assets
            .transfer_from(&self.asset, funding_vault, &self.vault, amount)?;
        inner.ledger.repay(amount, Decimal::ZERO);
        drop(inner);

        info!(pool_id = %self.id, loan_id = %loan_id, amount = %amount, "Loan funds reclaimed");
        Ok(())
    }

    /// Fail with `PoolNotActive` unless the pool can lend
    pub fn require_active(&self) -> Result<()> {
        Ok(self.inner.lock().controller.require_active()?)
    }

    /// Write off a defaulted loan's outstanding principal
    ///
    /// First-loss capital covers the loss first; lenders absorb the rest.
    /// Returns the amount covered by first-loss capital.
    #[instrument(skip(self), fields(pool_id = %self.id))]
    pub fn record_default(&self, loan_id: LoanId, principal: Decimal) -> Result<Decimal> {
        self.ctx.services.ensure_not_paused()?;

        let mut inner = self.inner.lock();
        let covered = inner.controller.apply_first_loss(principal);
        inner.ledger.write_off(principal, covered);
        let total_assets = inner.ledger.total_assets();
        drop(inner);

        warn!(
            loan_id = %loan_id,
            principal = %principal,
            first_loss_applied = %covered,
            total_assets = %total_assets,
            "Loan default written off"
        );
        if covered > Decimal::ZERO {
            self.ctx.events().publish(ProtocolEvent::FirstLossApplied {
                pool_id: self.id,
                loan_id,
                amount: covered,
            });
        }
        Ok(covered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{PoolFactory, PoolRequest};
    use mockall::mock;
    use perimeter_access::{AcceptanceRegistry, ServiceConfiguration};
    use perimeter_common::error::{AccessError, TransferError};
    use perimeter_common::{
        AssetLedger, ErrorKind, EventBus, InMemoryAssetLedger, PerimeterError, ProtocolConfig,
    };
    use rust_decimal_macros::dec;

    mock! {
        pub Ledger {}

        impl AssetLedger for Ledger {
            fn transfer_from(
                &self,
                asset: &AssetId,
                from: &Account,
                to: &Account,
                amount: Decimal,
            ) -> std::result::Result<(), TransferError>;

            fn balance_of(&self, asset: &AssetId, account: &Account) -> Decimal;
        }
    }

    struct Fixture {
        ctx: ProtocolContext,
        ledger: Arc<InMemoryAssetLedger>,
        operator: Account,
        admin: Account,
        lender: Account,
        usdc: AssetId,
        pool: Arc<Pool>,
    }

    fn context(assets: Arc<dyn AssetLedger>) -> (ProtocolContext, Account) {
        let operator = Account::derive("test", b"operator");
        let services = Arc::new(ServiceConfiguration::new(operator, EventBus::default()));
        let terms = Arc::new(AcceptanceRegistry::new(services.clone()));
        let ctx = ProtocolContext {
            config: ProtocolConfig::default(),
            pool_admins: Arc::new(AccessController::pool_admin(services.clone(), terms.clone())),
            terms,
            services,
            assets,
        };
        (ctx, operator)
    }

    fn build(
        ctx: ProtocolContext,
        operator: Account,
        min_first_loss: Decimal,
    ) -> (Arc<Pool>, Account, Account, AssetId) {
        let usdc = AssetId::new("USDC").unwrap();
        ctx.services
            .set_liquidity_asset(&operator, usdc.clone(), true)
            .unwrap();

        let admin = Account::derive("test", b"admin");
        let lender = Account::derive("test", b"lender");
        ctx.terms.accept_terms_of_service(&admin, 0).unwrap();
        ctx.terms.accept_terms_of_service(&lender, 0).unwrap();
        ctx.pool_admins.allow_participant(&operator, admin, 0).unwrap();

        let factory = PoolFactory::new(ctx.clone());
        let request = PoolRequest::new(usdc.clone(), min_first_loss, 10_000);
        let created = factory.create_pool(&admin, request, 0).unwrap();
        let pool = factory.pool(&created.pool_id).unwrap();

        pool.participants().allow_participant(&admin, lender, 0).unwrap();
        (pool, admin, lender, usdc)
    }

    fn fixture(min_first_loss: Decimal) -> Fixture {
        let ledger = Arc::new(InMemoryAssetLedger::new());
        let (ctx, operator) = context(ledger.clone());
        let (pool, admin, lender, usdc) = build(ctx.clone(), operator, min_first_loss);

        ledger.mint(&usdc, &admin, dec!(10000000));
        ledger.mint(&usdc, &lender, dec!(100000000));
        Fixture {
            ctx,
            ledger,
            operator,
            admin,
            lender,
            usdc,
            pool,
        }
    }

    fn active(min_first_loss: Decimal) -> Fixture {
        let fx = fixture(min_first_loss);
        if min_first_loss > Decimal::ZERO {
            fx.pool.deposit_first_loss(&fx.admin, min_first_loss).unwrap();
        }
        fx.pool.activate(&fx.admin, 1).unwrap();
        fx
    }

    #[test]
    fn test_activation_requires_min_first_loss() {
        let fx = fixture(dec!(5000000));

        let err = fx.pool.activate(&fx.admin, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(
            err,
            PerimeterError::from(PoolError::InsufficientFirstLoss {
                required: dec!(5000000),
                deposited: Decimal::ZERO,
            })
        );
        assert_eq!(fx.pool.state(), PoolState::Initialized);

        fx.pool.deposit_first_loss(&fx.admin, dec!(5000000)).unwrap();
        fx.pool.activate(&fx.admin, 1).unwrap();
        assert_eq!(fx.pool.state(), PoolState::Active);
        assert_eq!(fx.pool.state().label(), "Active");
        assert_eq!(fx.ledger.balance_of(&fx.usdc, &fx.pool.vault()), dec!(5000000));
    }

    #[test]
    fn test_first_loss_requires_allowed_admin() {
        let fx = fixture(dec!(100));
        let stranger = Account::derive("test", b"stranger");
        fx.ledger.mint(&fx.usdc, &stranger, dec!(100));

        let err = fx.pool.deposit_first_loss(&stranger, dec!(100)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = fx.pool.deposit_first_loss(&fx.admin, dec!(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
    }

    #[test]
    fn test_first_loss_requires_terms() {
        let fx = fixture(dec!(100));
        let co_admin = Account::derive("test", b"co-admin");
        fx.ledger.mint(&fx.usdc, &co_admin, dec!(100));
        fx.ctx.pool_admins.allow_participant(&fx.operator, co_admin, 0).unwrap();

        let err = fx.pool.deposit_first_loss(&co_admin, dec!(100)).unwrap_err();
        assert_eq!(
            err,
            PerimeterError::from(AccessError::TermsNotAccepted { account: co_admin })
        );
        assert_eq!(fx.pool.first_loss(), Decimal::ZERO);

        fx.ctx.terms.accept_terms_of_service(&co_admin, 1).unwrap();
        fx.pool.deposit_first_loss(&co_admin, dec!(100)).unwrap();
        assert_eq!(fx.pool.first_loss(), dec!(100));
    }

    #[test]
    fn test_first_deposit_mints_one_to_one() {
        let fx = active(dec!(0));

        let shares = fx.pool.deposit(&fx.lender, dec!(10000000)).unwrap();
        assert_eq!(shares, dec!(10000000));
        assert_eq!(fx.pool.total_assets(), dec!(10000000));
        assert_eq!(fx.pool.balance_of(&fx.lender), dec!(10000000));
    }

    #[test]
    fn test_deposit_requires_active_pool() {
        let fx = fixture(dec!(0));

        let err = fx.pool.deposit(&fx.lender, dec!(100)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PoolNotActive);
        assert_eq!(fx.ledger.balance_of(&fx.usdc, &fx.lender), dec!(100000000));
    }

    #[test]
    fn test_deposit_requires_terms() {
        let fx = active(dec!(0));
        let newcomer = Account::derive("test", b"newcomer");
        fx.ledger.mint(&fx.usdc, &newcomer, dec!(100));
        fx.pool.participants().allow_participant(&fx.admin, newcomer, 0).unwrap();

        let err = fx.pool.deposit(&newcomer, dec!(100)).unwrap_err();
        assert_eq!(
            err,
            PerimeterError::from(AccessError::TermsNotAccepted { account: newcomer })
        );

        fx.ctx.terms.accept_terms_of_service(&newcomer, 1).unwrap();
        assert_eq!(fx.pool.deposit(&newcomer, dec!(100)).unwrap(), dec!(100));
    }

    #[test]
    fn test_removed_participant_is_blocked() {
        let fx = active(dec!(0));
        fx.pool.deposit(&fx.lender, dec!(1000)).unwrap();

        fx.pool.participants().remove_participant(&fx.admin, &fx.lender).unwrap();

        let err = fx.pool.deposit(&fx.lender, dec!(1000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let err = fx.pool.withdraw(&fx.lender, dec!(1000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_deposit_then_withdraw() {
        let fx = active(dec!(0));
        let before = fx.ledger.balance_of(&fx.usdc, &fx.lender);

        let shares = fx.pool.deposit(&fx.lender, dec!(2500)).unwrap();
        let assets = fx.pool.withdraw(&fx.lender, shares).unwrap();

        assert_eq!(assets, dec!(2500));
        assert_eq!(fx.ledger.balance_of(&fx.usdc, &fx.lender), before);
        assert_eq!(fx.pool.total_shares(), Decimal::ZERO);
    }

    #[test]
    fn test_withdraw_bounded_by_liquidity() {
        let fx = active(dec!(0));
        let borrower = Account::derive("test", b"borrower");
        fx.pool.deposit(&fx.lender, dec!(1000)).unwrap();
        fx.pool
            .fund_loan(LoanId::new(), &borrower, dec!(700), Decimal::ZERO)
            .unwrap();

        assert_eq!(fx.pool.max_withdraw(&fx.lender), dec!(300));
        let err = fx.pool.withdraw(&fx.lender, dec!(301)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientLiquidity);

        let err = fx.pool.withdraw(&fx.lender, dec!(1001)).unwrap_err();
        assert!(matches!(err, PerimeterError::Pool(PoolError::InsufficientShares { .. })));

        assert_eq!(fx.pool.withdraw(&fx.lender, dec!(300)).unwrap(), dec!(300));
    }

    #[test]
    fn test_paused_pool_blocks_capital_movement() {
        let fx = active(dec!(0));
        fx.pool.deposit(&fx.lender, dec!(1000)).unwrap();
        fx.pool.pause(&fx.admin).unwrap();
        assert_eq!(fx.pool.state().label(), "Paused");

        assert_eq!(
            fx.pool.deposit(&fx.lender, dec!(1)).unwrap_err().kind(),
            ErrorKind::PoolNotActive
        );
        assert_eq!(
            fx.pool.withdraw(&fx.lender, dec!(1)).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(fx.pool.max_withdraw(&fx.lender), Decimal::ZERO);

        fx.pool.unpause(&fx.admin).unwrap();
        assert!(fx.pool.withdraw(&fx.lender, dec!(1)).is_ok());
    }

    #[test]
    fn test_lifecycle_requires_admin() {
        let fx = active(dec!(0));
        let stranger = Account::derive("test", b"stranger");

        assert_eq!(
            fx.pool.pause(&stranger).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        // Operators may act on any pool
        fx.pool.pause(&fx.operator).unwrap();
        fx.pool.unpause(&fx.operator).unwrap();
    }

    #[test]
    fn test_revoked_admin_loses_control() {
        let fx = active(dec!(0));
        fx.ctx.pool_admins.remove_participant(&fx.operator, &fx.admin).unwrap();

        let err = fx.pool.pause(&fx.admin).unwrap_err();
        assert_eq!(err, PerimeterError::from(AccessError::NotAllowed { account: fx.admin }));
        assert_eq!(
            fx.pool.set_service_fee_bps(&fx.admin, 100).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(fx.pool.state(), PoolState::Active);

        // Operators keep their override
        fx.pool.pause(&fx.operator).unwrap();
        assert_eq!(fx.pool.state(), PoolState::Paused);

        // Re-admission restores authority
        fx.ctx.pool_admins.allow_participant(&fx.operator, fx.admin, 2).unwrap();
        fx.pool.unpause(&fx.admin).unwrap();
    }

    #[test]
    fn test_close_requires_repaid_principal() {
        let fx = active(dec!(1000));
        let borrower = Account::derive("test", b"borrower");
        let loan_id = LoanId::new();
        fx.pool.deposit(&fx.lender, dec!(5000)).unwrap();
        fx.pool
            .fund_loan(loan_id, &borrower, dec!(2000), Decimal::ZERO)
            .unwrap();

        assert_eq!(
            fx.pool.close(&fx.admin).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            fx.pool.withdraw_first_loss(&fx.admin, &fx.admin).unwrap_err().kind(),
            ErrorKind::InvalidState
        );

        fx.ledger.mint(&fx.usdc, &borrower, dec!(100));
        fx.pool
            .receive_payment(loan_id, &borrower, Decimal::ZERO, dec!(50), dec!(2000))
            .unwrap();
        fx.pool.close(&fx.admin).unwrap();
        assert_eq!(fx.pool.state().label(), "Closed");

        // Lenders and the admin can still exit
        assert_eq!(fx.pool.withdraw(&fx.lender, dec!(5000)).unwrap(), dec!(5050));
        assert_eq!(
            fx.pool.withdraw_first_loss(&fx.admin, &fx.admin).unwrap(),
            dec!(1000)
        );
        assert_eq!(fx.ledger.balance_of(&fx.usdc, &fx.pool.vault()), Decimal::ZERO);
    }

    #[test]
    fn test_capacity_enforced() {
        let fx = active(dec!(0));
        fx.pool.set_max_capacity(&fx.admin, Some(dec!(1000))).unwrap();

        fx.pool.deposit(&fx.lender, dec!(600)).unwrap();
        let err = fx.pool.deposit(&fx.lender, dec!(401)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(fx.pool.max_deposit(), dec!(400));

        assert!(fx.pool.set_max_capacity(&fx.admin, Some(dec!(500))).is_err());
    }

    #[test]
    fn test_service_fee_accrues_to_admin() {
        let fx = active(dec!(0));
        let borrower = Account::derive("test", b"borrower");
        let loan_id = LoanId::new();
        fx.pool.set_service_fee_bps(&fx.admin, 1000).unwrap();
        fx.pool.deposit(&fx.lender, dec!(10000)).unwrap();
        fx.pool
            .fund_loan(loan_id, &borrower, dec!(5000), dec!(50))
            .unwrap();
        assert_eq!(fx.ledger.balance_of(&fx.usdc, &borrower), dec!(4950));

        fx.ledger.mint(&fx.usdc, &borrower, dec!(500));
        fx.pool
            .receive_payment(loan_id, &borrower, dec!(10), dec!(200), dec!(5000))
            .unwrap();

        let snapshot = fx.pool.snapshot();
        assert_eq!(snapshot.admin_fees, dec!(20));
        // 10000 + 50 origination + 10 late fee + 180 net interest
        assert_eq!(snapshot.total_assets, dec!(10240));

        let receiver = Account::derive("test", b"treasury");
        assert_eq!(
            fx.pool.withdraw_admin_fees(&fx.admin, &receiver).unwrap(),
            dec!(20)
        );
        assert_eq!(fx.ledger.balance_of(&fx.usdc, &receiver), dec!(20));
    }

    #[test]
    fn test_default_consumes_first_loss_first() {
        let fx = active(dec!(1000));
        let borrower = Account::derive("test", b"borrower");
        let loan_id = LoanId::new();
        fx.pool.deposit(&fx.lender, dec!(10000)).unwrap();
        fx.pool
            .fund_loan(loan_id, &borrower, dec!(4000), Decimal::ZERO)
            .unwrap();

        let covered = fx.pool.record_default(loan_id, dec!(4000)).unwrap();
        assert_eq!(covered, dec!(1000));

        let snapshot = fx.pool.snapshot();
        assert_eq!(snapshot.first_loss, Decimal::ZERO);
        assert_eq!(snapshot.outstanding_principal, Decimal::ZERO);
        assert_eq!(snapshot.total_assets, dec!(7000));
        assert_eq!(snapshot.total_defaults, dec!(4000));
        assert_eq!(fx.pool.convert_to_assets(dec!(10000)), dec!(7000));
    }

    #[test]
    fn test_reclaim_returns_funds_to_liquidity() {
        let fx = active(dec!(0));
        let funding_vault = Account::derive("test", b"funding-vault");
        let loan_id = LoanId::new();
        fx.pool.deposit(&fx.lender, dec!(10000)).unwrap();
        fx.pool
            .fund_loan(loan_id, &funding_vault, dec!(4000), Decimal::ZERO)
            .unwrap();
        assert_eq!(fx.ledger.balance_of(&fx.usdc, &funding_vault), dec!(4000));

        fx.pool.reclaim_loan_funds(loan_id, &funding_vault, dec!(1500)).unwrap();
        let snapshot = fx.pool.snapshot();
        assert_eq!(snapshot.outstanding_principal, dec!(2500));
        assert_eq!(snapshot.liquid, dec!(7500));
        assert_eq!(snapshot.total_assets, dec!(10000));

        let err = fx
            .pool
            .reclaim_loan_funds(loan_id, &funding_vault, dec!(3000))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        assert_eq!(fx.ledger.balance_of(&fx.usdc, &funding_vault), dec!(2500));
    }

    #[test]
    fn test_fund_requires_liquidity() {
        let fx = active(dec!(0));
        let borrower = Account::derive("test", b"borrower");
        fx.pool.deposit(&fx.lender, dec!(100)).unwrap();

        let err = fx
            .pool
            .fund_loan(LoanId::new(), &borrower, dec!(101), Decimal::ZERO)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientLiquidity);
    }

    #[test]
    fn test_protocol_pause_blocks_pool() {
        let fx = active(dec!(0));
        fx.ctx.services.set_paused(&fx.operator, true).unwrap();

        assert_eq!(
            fx.pool.deposit(&fx.lender, dec!(100)).unwrap_err().kind(),
            ErrorKind::ProtocolPaused
        );
        // Reads continue
        assert_eq!(fx.pool.state(), PoolState::Active);
    }

    #[test]
    fn test_failed_transfer_leaves_pool_untouched() {
        let mut mock = MockLedger::new();
        mock.expect_transfer_from()
            .returning(|_, _, _, _| Err(TransferError::Rejected("frozen".into())));
        mock.expect_balance_of().returning(|_, _| Decimal::ZERO);

        let (ctx, operator) = context(Arc::new(mock));
        let (pool, admin, lender, _) = build(ctx, operator, Decimal::ZERO);
        pool.activate(&admin, 1).unwrap();

        let err = pool.deposit(&lender, dec!(1000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransferFailed);

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.total_assets, Decimal::ZERO);
        assert_eq!(snapshot.total_shares, Decimal::ZERO);
        assert_eq!(pool.balance_of(&lender), Decimal::ZERO);

        let err = pool.deposit_first_loss(&admin, dec!(10)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransferFailed);
        assert_eq!(pool.first_loss(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let fx = fixture(dec!(0));
        let mut rx = fx.ctx.events().subscribe();

        fx.pool.activate(&fx.admin, 1).unwrap();
        fx.pool.deposit(&fx.lender, dec!(10)).unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            ProtocolEvent::PoolLifecycleChanged {
                pool_id: fx.pool.id(),
                from: "Initialized".into(),
                to: "Active".into(),
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ProtocolEvent::Deposit {
                pool_id: fx.pool.id(),
                lender: fx.lender,
                assets: dec!(10),
                shares: dec!(10),
            }
        );
    }
}
