//! Loan factory
//!
//! Creates loans against registered pools and runs every loan operation.
//! Each operation locks the loan first and then, through the [`Pool`]
//! handle, the pool; time-driven transitions are materialised before the
//! operation's own checks.
//!
//! Borrower-side operations, payments included, require the borrower to
//! still be admitted to the pool: on its allow-list and bound by the terms
//! of service. Removing a borrower freezes the loan from their side until
//! they are re-admitted.

use crate::loan::{effective_state, Loan, LoanState};
use crate::schedule::{PaymentDue, PaymentSplit};
use crate::terms::LoanTerms;
use dashmap::DashMap;
use parking_lot::Mutex;
use perimeter_common::error::LoanError;
use perimeter_common::{
    Account, AssetId, LoanId, PerimeterError, PoolId, ProtocolEvent, Result, Timestamp,
};
use perimeter_pool::{Pool, PoolFactory, ProtocolContext};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Creation record returned by [`LoanFactory::create_loan`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanCreation {
    pub loan_id: LoanId,
    pub pool_id: PoolId,
    pub borrower: Account,
    /// Escrow account for posted collateral
    pub escrow: Account,
}

/// Loan registry and servicer
#[derive(Debug)]
pub struct LoanFactory {
    ctx: ProtocolContext,
    pools: Arc<PoolFactory>,
    loans: DashMap<LoanId, Arc<Mutex<Loan>>>,
}

impl LoanFactory {
    pub fn new(pools: Arc<PoolFactory>) -> Self {
        Self {
            ctx: pools.context().clone(),
            pools,
            loans: DashMap::new(),
        }
    }

    fn handle(&self, loan_id: &LoanId) -> Result<Arc<Mutex<Loan>>> {
        self.loans
            .get(loan_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PerimeterError::NotFound(loan_id.to_string()))
    }

    /// Commit time-driven transitions, with their pool side effects
    ///
    /// Works on a copy so a failed write-down leaves the loan unchanged.
    fn settle(&self, loan: &mut Loan, pool: &Pool, now: Timestamp) -> Result<Option<LoanState>> {
        let mut next = loan.clone();
        let transition = next.refresh(now, &self.ctx.config);

        match transition {
            Some(LoanState::Expired) => {
                info!(loan_id = %next.id, drop_dead = next.terms.drop_dead, "Loan expired unfunded");
                *loan = next;
                self.ctx
                    .events()
                    .publish(ProtocolEvent::LoanExpired { loan_id: loan.id });
            }
            Some(LoanState::Defaulted) => {
                pool.record_default(next.id, next.written_off)?;
                warn!(
                    loan_id = %next.id,
                    missed_periods = next.balance.missed_periods,
                    written_off = %next.written_off,
                    "Loan defaulted on missed payments"
                );
                *loan = next;
                self.publish_default(loan);
            }
            Some(LoanState::Repaid) => {
                info!(loan_id = %next.id, "Open-term loan settled");
                *loan = next;
                self.ctx
                    .events()
                    .publish(ProtocolEvent::LoanRepaid { loan_id: loan.id });
            }
            _ => *loan = next,
        }
        Ok(transition)
    }

    /// Fail unless `borrower` is admitted to `pool`
    ///
    /// `UnauthorizedBorrower` when off the allow-list, `TermsNotAccepted`
    /// when on it without terms acceptance.
    fn require_admitted_borrower(pool: &Pool, borrower: &Account) -> Result<()> {
        if !pool.participants().is_allowed(borrower) {
            warn!(pool_id = %pool.id(), borrower = %borrower.short(), "Borrower not allowed");
            return Err(LoanError::UnauthorizedBorrower {
                borrower: *borrower,
            }
            .into());
        }
        pool.participants().require_admitted(borrower)
    }

    fn publish_default(&self, loan: &Loan) {
        self.ctx.events().publish(ProtocolEvent::LoanDefaulted {
            loan_id: loan.id,
            pool_id: loan.pool_id,
            principal_written_off: loan.written_off,
        });
    }

    // ---------------------------------------------------------------------
    // Underwriting
    // ---------------------------------------------------------------------

    /// Request a loan from `pool_id`
    ///
    /// The borrower must be admitted to the pool and the asset must be the
    /// pool's liquidity asset.
    #[instrument(skip(self, terms), fields(borrower = %borrower.short(), pool_id = %pool_id))]
    pub fn create_loan(
        &self,
        borrower: &Account,
        pool_id: PoolId,
        asset: AssetId,
        terms: LoanTerms,
        now: Timestamp,
    ) -> Result<LoanCreation> {
        self.ctx.services.ensure_not_paused()?;
        let pool = self.pools.pool(&pool_id)?;

        Self::require_admitted_borrower(&pool, borrower)?;
        if &asset != pool.asset() {
            return Err(LoanError::InvalidTerms(format!(
                "asset {} does not match pool asset {}",
                asset,
                pool.asset()
            ))
            .into());
        }
        terms.validate(now)?;

        let loan_id = LoanId::new();
        let principal = terms.principal;
        let loan = Loan::new(loan_id, pool_id, *borrower, asset, terms, now);
        let escrow = loan.escrow();
        self.loans.insert(loan_id, Arc::new(Mutex::new(loan)));

        info!(loan_id = %loan_id, principal = %principal, "Loan requested");
        self.ctx.events().publish(ProtocolEvent::LoanCreated {
            loan_id,
            pool_id,
            borrower: *borrower,
            principal,
        });

        Ok(LoanCreation {
            loan_id,
            pool_id,
            borrower: *borrower,
            escrow,
        })
    }

    /// Move the required collateral from the borrower into escrow
    pub fn post_collateral(&self, caller: &Account, loan_id: LoanId, now: Timestamp) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        loan.require_borrower(caller)?;
        Self::require_admitted_borrower(&pool, &loan.borrower)?;

        self.settle(&mut loan, &pool, now)?;
        loan.require_state("post_collateral", &[LoanState::Requested])?;
        let collateral = loan
            .terms
            .collateral
            .clone()
            .ok_or_else(|| LoanError::InvalidTerms("loan requires no collateral".into()))?;

        self.ctx.assets.transfer_from(
            &collateral.asset,
            caller,
            &loan.escrow(),
            collateral.amount,
        )?;
        loan.collateral_held = collateral.amount;
        loan.state = LoanState::Collateralized;

        info!(loan_id = %loan_id, asset = %collateral.asset, amount = %collateral.amount, "Collateral posted");
        self.ctx.events().publish(ProtocolEvent::CollateralPosted {
            loan_id,
            amount: collateral.amount,
        });
        Ok(())
    }

    /// Withdraw an unfunded loan request, returning any collateral
    pub fn cancel(&self, caller: &Account, loan_id: LoanId, now: Timestamp) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        loan.require_borrower(caller)?;
        Self::require_admitted_borrower(&pool, &loan.borrower)?;

        self.settle(&mut loan, &pool, now)?;
        loan.require_state("cancel", &[LoanState::Requested, LoanState::Collateralized])?;

        if let Some(collateral) = loan.terms.collateral.clone() {
            if loan.collateral_held > Decimal::ZERO {
                self.ctx.assets.transfer_from(
                    &collateral.asset,
                    &loan.escrow(),
                    &loan.borrower,
                    loan.collateral_held,
                )?;
                loan.collateral_held = Decimal::ZERO;
            }
        }
        loan.state = LoanState::Canceled;

        info!(loan_id = %loan_id, "Loan canceled");
        self.ctx
            .events()
            .publish(ProtocolEvent::LoanCanceled { loan_id });
        Ok(())
    }

    /// Fund a loan from its pool, returning the amount sent to the borrower
    ///
    /// Pool admin only. Fails with `Expired` at or after the drop-dead
    /// timestamp, leaving the loan Expired. An open-term loan's principal
    /// goes to its funding vault instead, so nothing reaches the borrower
    /// until they draw down.
    #[instrument(skip(self), fields(caller = %caller.short(), loan_id = %loan_id))]
    pub fn fund(&self, caller: &Account, loan_id: LoanId, now: Timestamp) -> Result<Decimal> {
        self.ctx.services.ensure_not_paused()?;
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        pool.require_admin(caller)?;

        self.settle(&mut loan, &pool, now)?;
        if loan.state == LoanState::Expired {
            return Err(LoanError::Expired {
                drop_dead: loan.terms.drop_dead,
            }
            .into());
        }
        loan.require_state("fund", &[LoanState::Requested, LoanState::Collateralized])?;
        if loan.requires_collateral() {
            loan.require_state("fund", &[LoanState::Collateralized])?;
        }
        Self::require_admitted_borrower(&pool, &loan.borrower)?;

        let principal = loan.terms.principal;
        let recipient = if loan.terms.is_open() {
            loan.funding_vault()
        } else {
            loan.borrower
        };
        let released = pool.fund_loan(
            loan_id,
            &recipient,
            principal,
            loan.terms.origination_fee(),
        )?;
        loan.activate(now, released, &self.ctx.config);
        let drawn = loan.drawn;

        info!(principal = %principal, released = %released, open = loan.terms.is_open(), "Loan funded");
        self.ctx.events().publish(ProtocolEvent::LoanFunded {
            loan_id,
            pool_id: loan.pool_id,
            principal,
            drawn,
        });
        Ok(drawn)
    }

    // ---------------------------------------------------------------------
    // Servicing
    // ---------------------------------------------------------------------

    /// Pay `amount` towards an active loan from `payer`
    ///
    /// The payment covers late fees, then interest, then principal, and may
    /// not exceed the payoff amount. Anyone may pay, but only while the
    /// borrower is admitted to the pool. Principal paid here goes back to
    /// the pool even on an open-term loan; see [`Self::paydown_principal`]
    /// for returning it to the funding vault.
    #[instrument(skip(self), fields(payer = %payer.short(), loan_id = %loan_id))]
    pub fn make_payment(
        &self,
        payer: &Account,
        loan_id: LoanId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<PaymentSplit> {
        self.ctx.services.ensure_not_paused()?;
        if amount <= Decimal::ZERO {
            return Err(LoanError::InvalidAmount.into());
        }
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        Self::require_admitted_borrower(&pool, &loan.borrower)?;

        self.settle(&mut loan, &pool, now)?;
        loan.require_state("make_payment", &[LoanState::Active])?;
        let schedule = loan.schedule.ok_or_else(|| LoanError::InvalidState {
            operation: "make_payment".into(),
            state: "unscheduled".into(),
        })?;

        let split = loan.balance.allocate(amount)?;
        pool.receive_payment(loan_id, payer, split.late_fees, split.interest, split.principal)?;
        let repaid = loan.balance.apply(&split, &schedule);

        debug!(
            late_fees = %split.late_fees,
            interest = %split.interest,
            principal = %split.principal,
            outstanding = %loan.balance.principal_outstanding,
            "Payment applied"
        );
        self.ctx.events().publish(ProtocolEvent::PaymentMade {
            loan_id,
            late_fees: split.late_fees,
            interest: split.interest,
            principal: split.principal,
        });

        // An open-term line stays Active while it can still be drawn
        let closed = if loan.terms.is_open() {
            loan.close_if_settled(now)
        } else if repaid {
            loan.state = LoanState::Repaid;
            true
        } else {
            false
        };
        if closed {
            info!(repaid = %loan.amount_repaid(), "Loan repaid");
            self.ctx
                .events()
                .publish(ProtocolEvent::LoanRepaid { loan_id });
        }
        Ok(split)
    }

    // ---------------------------------------------------------------------
    // Open-term lines
    // ---------------------------------------------------------------------

    fn require_open(loan: &Loan, operation: &str) -> Result<()> {
        if loan.terms.is_open() {
            Ok(())
        } else {
            Err(LoanError::InvalidTerms(format!("{operation} applies to open-term loans only")).into())
        }
    }

    /// Draw `amount` from an open-term loan's funding vault
    ///
    /// Borrower only, before maturity and before any callback, while the
    /// pool is Active. Interest starts accruing on the drawn amount at once.
    #[instrument(skip(self), fields(caller = %caller.short(), loan_id = %loan_id))]
    pub fn drawdown(&self, caller: &Account, loan_id: LoanId, amount: Decimal, now: Timestamp) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        if amount <= Decimal::ZERO {
            return Err(LoanError::InvalidAmount.into());
        }
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        loan.require_borrower(caller)?;
        Self::require_admitted_borrower(&pool, &loan.borrower)?;

        self.settle(&mut loan, &pool, now)?;
        loan.require_state("drawdown", &[LoanState::Active])?;
        Self::require_open(&loan, "drawdown")?;
        if !loan.is_drawable(now) {
            let state = if loan.callback_at.is_some() { "called" } else { "matured" };
            return Err(LoanError::InvalidState {
                operation: "drawdown".into(),
                state: state.into(),
            }
            .into());
        }
        pool.require_active()?;
        if amount > loan.funding_available {
            return Err(LoanError::InsufficientFunds {
                requested: amount,
                available: loan.funding_available,
            }
            .into());
        }

        self.ctx
            .assets
            .transfer_from(&loan.asset, &loan.funding_vault(), &loan.borrower, amount)?;
        loan.funding_available -= amount;
        loan.drawn += amount;
        loan.balance.draw(amount);

        info!(amount = %amount, outstanding = %loan.balance.principal_outstanding, "Loan drawdown");
        self.ctx
            .events()
            .publish(ProtocolEvent::LoanDrawdown { loan_id, amount });
        Ok(())
    }

    /// Return drawn principal to an open-term loan's funding vault
    ///
    /// Borrower only. The amount may be drawn again while the line is open.
    /// Once nothing is owed on a line that can no longer be drawn, the loan
    /// is Repaid.
    #[instrument(skip(self), fields(caller = %caller.short(), loan_id = %loan_id))]
    pub fn paydown_principal(
        &self,
        caller: &Account,
        loan_id: LoanId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        if amount <= Decimal::ZERO {
            return Err(LoanError::InvalidAmount.into());
        }
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        loan.require_borrower(caller)?;
        Self::require_admitted_borrower(&pool, &loan.borrower)?;

        self.settle(&mut loan, &pool, now)?;
        loan.require_state("paydown_principal", &[LoanState::Active])?;
        Self::require_open(&loan, "paydown_principal")?;
        let schedule = loan.schedule.ok_or_else(|| LoanError::InvalidState {
            operation: "paydown_principal".into(),
            state: "unscheduled".into(),
        })?;
        let outstanding = loan.balance.principal_outstanding;
        if amount > outstanding {
            return Err(LoanError::Overpayment {
                amount,
                payoff: outstanding,
            }
            .into());
        }

        self.ctx
            .assets
            .transfer_from(&loan.asset, caller, &loan.funding_vault(), amount)?;
        loan.balance.pay_down(amount, &schedule);
        loan.funding_available += amount;

        debug!(amount = %amount, outstanding = %loan.balance.principal_outstanding, "Principal paid down");
        self.ctx
            .events()
            .publish(ProtocolEvent::PrincipalPaidDown { loan_id, amount });

        if loan.close_if_settled(now) {
            info!("Open-term loan settled");
            self.ctx
                .events()
                .publish(ProtocolEvent::LoanRepaid { loan_id });
        }
        Ok(())
    }

    /// Return idle funds from an open-term loan's funding vault to the pool
    ///
    /// Pool admin only; allowed while the loan is Active and after it is
    /// Repaid or Defaulted.
    #[instrument(skip(self), fields(caller = %caller.short(), loan_id = %loan_id))]
    pub fn reclaim_funds(&self, caller: &Account, loan_id: LoanId, amount: Decimal, now: Timestamp) -> Result<()> {
        self.ctx.services.ensure_not_paused()?;
        if amount <= Decimal::ZERO {
            return Err(LoanError::InvalidAmount.into());
        }
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        pool.require_admin(caller)?;

        self.settle(&mut loan, &pool, now)?;
        loan.require_state(
            "reclaim_funds",
            &[LoanState::Active, LoanState::Repaid, LoanState::Defaulted],
        )?;
        Self::require_open(&loan, "reclaim_funds")?;
        if amount > loan.funding_available {
            return Err(LoanError::InsufficientFunds {
                requested: amount,
                available: loan.funding_available,
            }
            .into());
        }

        pool.reclaim_loan_funds(loan_id, &loan.funding_vault(), amount)?;
        loan.funding_available -= amount;
        loan.funds_reclaimed += amount;

        self.ctx.events().publish(ProtocolEvent::LoanFundsReclaimed {
            loan_id,
            pool_id: loan.pool_id,
            amount,
        });
        Ok(())
    }

    /// Call an open-term loan back; pool admin only
    ///
    /// Ends drawing at once. Outstanding principal falls due at the first
    /// due date on or after one payment period from now. Returns that notice
    /// end; calling again keeps the first notice.
    #[instrument(skip(self), fields(caller = %caller.short(), loan_id = %loan_id))]
    pub fn mark_callback(&self, caller: &Account, loan_id: LoanId, now: Timestamp) -> Result<Timestamp> {
        self.ctx.services.ensure_not_paused()?;
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        pool.require_admin(caller)?;

        self.settle(&mut loan, &pool, now)?;
        loan.require_state("mark_callback", &[LoanState::Active])?;
        Self::require_open(&loan, "mark_callback")?;

        let already_called = loan.callback_at.is_some();
        let due_at = loan.call_back(now).ok_or_else(|| LoanError::InvalidState {
            operation: "mark_callback".into(),
            state: "unscheduled".into(),
        })?;
        if !already_called {
            info!(due_at, "Loan called back");
            self.ctx
                .events()
                .publish(ProtocolEvent::LoanCalledBack { loan_id, due_at });
        }
        Ok(due_at)
    }

    /// Default an active loan; pool admin only
    ///
    /// Outstanding principal is written off against the pool and any escrowed
    /// collateral goes to the pool admin for recovery. Returns the principal
    /// written off.
    #[instrument(skip(self), fields(caller = %caller.short(), loan_id = %loan_id))]
    pub fn mark_defaulted(&self, caller: &Account, loan_id: LoanId, now: Timestamp) -> Result<Decimal> {
        self.ctx.services.ensure_not_paused()?;
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        pool.require_admin(caller)?;

        let transition = self.settle(&mut loan, &pool, now)?;
        let already_defaulted = transition == Some(LoanState::Defaulted);
        if !already_defaulted {
            loan.require_state("mark_defaulted", &[LoanState::Active])?;
        }

        if let Some(collateral) = loan.terms.collateral.clone() {
            if loan.collateral_held > Decimal::ZERO {
                self.ctx.assets.transfer_from(
                    &collateral.asset,
                    &loan.escrow(),
                    &pool.admin(),
                    loan.collateral_held,
                )?;
                loan.collateral_held = Decimal::ZERO;
            }
        }

        if !already_defaulted {
            let principal = loan.balance.principal_outstanding;
            pool.record_default(loan_id, principal)?;
            loan.default_now();
            warn!(written_off = %principal, "Loan marked defaulted");
            self.publish_default(&loan);
        }
        Ok(loan.written_off)
    }

    /// Release escrowed collateral of a defaulted loan to `receiver`
    ///
    /// Pool admin only; for loans that defaulted on missed payments before
    /// the admin acted.
    pub fn claim_collateral(
        &self,
        caller: &Account,
        loan_id: LoanId,
        receiver: &Account,
        now: Timestamp,
    ) -> Result<Decimal> {
        self.ctx.services.ensure_not_paused()?;
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        pool.require_admin(caller)?;

        self.settle(&mut loan, &pool, now)?;
        loan.require_state("claim_collateral", &[LoanState::Defaulted])?;
        self.release_collateral(&mut loan, receiver)
    }

    /// Return escrowed collateral to the borrower of a repaid or expired loan
    pub fn reclaim_collateral(&self, caller: &Account, loan_id: LoanId, now: Timestamp) -> Result<Decimal> {
        self.ctx.services.ensure_not_paused()?;
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;
        loan.require_borrower(caller)?;
        Self::require_admitted_borrower(&pool, &loan.borrower)?;

        self.settle(&mut loan, &pool, now)?;
        loan.require_state("reclaim_collateral", &[LoanState::Repaid, LoanState::Expired])?;
        self.release_collateral(&mut loan, caller)
    }

    fn release_collateral(&self, loan: &mut Loan, receiver: &Account) -> Result<Decimal> {
        let amount = loan.collateral_held;
        let collateral = match loan.terms.collateral.clone() {
            Some(collateral) if amount > Decimal::ZERO => collateral,
            _ => return Err(LoanError::InvalidAmount.into()),
        };

        self.ctx
            .assets
            .transfer_from(&collateral.asset, &loan.escrow(), receiver, amount)?;
        loan.collateral_held = Decimal::ZERO;

        info!(loan_id = %loan.id, receiver = %receiver.short(), amount = %amount, "Collateral released");
        Ok(amount)
    }

    /// Materialise time-driven transitions, returning the resulting state
    pub fn refresh(&self, loan_id: LoanId, now: Timestamp) -> Result<LoanState> {
        self.ctx.services.ensure_not_paused()?;
        let handle = self.handle(&loan_id)?;
        let mut loan = handle.lock();
        let pool = self.pools.pool(&loan.pool_id)?;

        self.settle(&mut loan, &pool, now)?;
        Ok(loan.state)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Snapshot of a loan as last materialised
    pub fn loan(&self, loan_id: &LoanId) -> Result<Loan> {
        Ok(self.handle(loan_id)?.lock().clone())
    }

    /// Snapshot of a loan as it stands at `now`
    fn projected(&self, loan_id: &LoanId, now: Timestamp) -> Result<Loan> {
        let mut loan = self.loan(loan_id)?;
        loan.refresh(now, &self.ctx.config);
        Ok(loan)
    }

    pub fn effective_state(&self, loan_id: &LoanId, now: Timestamp) -> Result<LoanState> {
        let loan = self.loan(loan_id)?;
        Ok(effective_state(&loan, now, &self.ctx.config))
    }

    /// Amount that would fully repay the loan at `now`
    pub fn payoff_amount(&self, loan_id: &LoanId, now: Timestamp) -> Result<Decimal> {
        Ok(self.projected(loan_id, now)?.payoff_amount())
    }

    pub fn next_payment_due(&self, loan_id: &LoanId, now: Timestamp) -> Result<Option<PaymentDue>> {
        Ok(self.projected(loan_id, now)?.next_payment_due())
    }

    /// Every loan, ordered by id
    pub fn loans(&self) -> Vec<Loan> {
        let mut loans: Vec<_> = self
            .loans
            .iter()
            .map(|entry| entry.value().lock().clone())
            .collect();
        loans.sort_by_key(|loan| loan.id);
        loans
    }

    pub fn loans_for_pool(&self, pool_id: &PoolId) -> Vec<Loan> {
        self.loans()
            .into_iter()
            .filter(|loan| loan.pool_id == *pool_id)
            .collect()
    }

    pub fn loan_count(&self) -> usize {
        self.loans.len()
    }
}
