//! Loan state
//!
//! A [`Loan`] is plain data plus the transitions that need no collaborators.
//! Asset movement, pool accounting and notifications live in
//! [`crate::LoanFactory`].

use crate::schedule::{LoanBalance, PaymentDue, PaymentSchedule};
use crate::terms::LoanTerms;
use perimeter_common::error::LoanError;
use perimeter_common::{Account, AssetId, LoanId, PoolId, ProtocolConfig, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Loan lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanState {
    Requested,
    Collateralized,
    Active,
    Repaid,
    Defaulted,
    Expired,
    Canceled,
}

impl LoanState {
    pub fn label(&self) -> &'static str {
        match self {
            LoanState::Requested => "Requested",
            LoanState::Collateralized => "Collateralized",
            LoanState::Active => "Active",
            LoanState::Repaid => "Repaid",
            LoanState::Defaulted => "Defaulted",
            LoanState::Expired => "Expired",
            LoanState::Canceled => "Canceled",
        }
    }

    /// Not yet funded, still fundable before drop-dead
    pub fn is_pending(&self) -> bool {
        matches!(self, LoanState::Requested | LoanState::Collateralized)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanState::Repaid | LoanState::Defaulted | LoanState::Expired | LoanState::Canceled
        )
    }
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A loan drawn against one pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub pool_id: PoolId,
    pub borrower: Account,
    pub asset: AssetId,
    pub terms: LoanTerms,
    pub state: LoanState,
    pub created_at: Timestamp,
    pub funded_at: Option<Timestamp>,
    pub schedule: Option<PaymentSchedule>,
    pub balance: LoanBalance,
    /// Principal handed to the borrower: the net amount at funding for a
    /// fixed-term loan, cumulative drawdowns for an open-term one
    pub drawn: Decimal,
    /// Undrawn funds in the funding vault of an open-term loan
    #[serde(default)]
    pub funding_available: Decimal,
    /// Funds returned from the funding vault to the pool
    #[serde(default)]
    pub funds_reclaimed: Decimal,
    #[serde(default)]
    pub callback_at: Option<Timestamp>,
    /// Collateral currently held in escrow
    pub collateral_held: Decimal,
    /// Principal written off at default
    pub written_off: Decimal,
}

impl Loan {
    /// Escrow account holding a loan's collateral
    pub fn escrow_for(id: &LoanId) -> Account {
        Account::derive("loan escrow", id.0.as_bytes())
    }

    pub(crate) fn new(
        id: LoanId,
        pool_id: PoolId,
        borrower: Account,
        asset: AssetId,
        terms: LoanTerms,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            pool_id,
            borrower,
            asset,
            terms,
            state: LoanState::Requested,
            created_at: now,
            funded_at: None,
            schedule: None,
            balance: LoanBalance::default(),
            drawn: Decimal::ZERO,
            funding_available: Decimal::ZERO,
            funds_reclaimed: Decimal::ZERO,
            callback_at: None,
            collateral_held: Decimal::ZERO,
            written_off: Decimal::ZERO,
        }
    }

    /// Account holding an open-term loan's undrawn funds
    pub fn funding_vault_for(id: &LoanId) -> Account {
        Account::derive("loan funding vault", id.0.as_bytes())
    }

    pub fn escrow(&self) -> Account {
        Self::escrow_for(&self.id)
    }

    pub fn funding_vault(&self) -> Account {
        Self::funding_vault_for(&self.id)
    }

    /// Whether the borrower may still draw on an open-term line at `now`
    pub fn is_drawable(&self, now: Timestamp) -> bool {
        self.state == LoanState::Active
            && self.terms.is_open()
            && self.callback_at.is_none()
            && self.schedule.is_some_and(|schedule| now < schedule.maturity)
    }

    pub fn requires_collateral(&self) -> bool {
        self.terms.collateral.is_some()
    }

    pub fn amount_repaid(&self) -> Decimal {
        self.balance.amount_repaid()
    }

    pub fn payoff_amount(&self) -> Decimal {
        match self.state {
            LoanState::Active => self.balance.payoff(),
            _ => Decimal::ZERO,
        }
    }

    pub fn next_payment_due(&self) -> Option<PaymentDue> {
        match (self.state, &self.schedule) {
            (LoanState::Active, Some(schedule)) => self.balance.next_due(schedule),
            _ => None,
        }
    }

    /// Fail with `InvalidState` unless the loan is in one of `allowed`
    pub fn require_state(&self, operation: &str, allowed: &[LoanState]) -> Result<(), LoanError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LoanError::InvalidState {
                operation: operation.to_string(),
                state: self.state.label().to_string(),
            })
        }
    }

    /// Fail with `NotBorrower` unless `caller` is the borrower
    pub fn require_borrower(&self, caller: &Account) -> Result<(), LoanError> {
        if *caller == self.borrower {
            Ok(())
        } else {
            Err(LoanError::NotBorrower { caller: *caller })
        }
    }

    /// Apply time-driven transitions up to `now`
    ///
    /// Returns the new state when one was entered: `Expired` for an unfunded
    /// loan at or past its drop-dead timestamp, `Defaulted` for an active
    /// loan whose consecutive missed periods exceed its threshold, `Repaid`
    /// for an open-term line with nothing owed that can no longer be drawn.
    /// Active loans also accrue interest and late fees for each elapsed due
    /// date.
    pub fn refresh(&mut self, now: Timestamp, config: &ProtocolConfig) -> Option<LoanState> {
        match self.state {
            LoanState::Requested | LoanState::Collateralized if now >= self.terms.drop_dead => {
                self.state = LoanState::Expired;
                Some(LoanState::Expired)
            }
            LoanState::Active => {
                let schedule = self.schedule?;
                let threshold = self.terms.default_threshold(config.max_missed_periods);
                let defaulted =
                    self.balance
                        .advance(&schedule, &self.terms, now, config.days_per_year, threshold);
                if defaulted {
                    self.default_now();
                    Some(LoanState::Defaulted)
                } else if self.close_if_settled(now) {
                    Some(LoanState::Repaid)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Open-term Active → Repaid once nothing is owed and no more can be drawn
    pub(crate) fn close_if_settled(&mut self, now: Timestamp) -> bool {
        if self.state != LoanState::Active
            || !self.terms.is_open()
            || !self.balance.is_repaid()
            || self.is_drawable(now)
        {
            return false;
        }
        self.state = LoanState::Repaid;
        true
    }

    /// Requested/Collateralized → Active with `released` sent out of the pool
    ///
    /// A fixed-term loan's `released` went to the borrower. An open-term
    /// loan's went to its funding vault and nothing is drawn yet.
    pub(crate) fn activate(&mut self, now: Timestamp, released: Decimal, config: &ProtocolConfig) {
        let schedule = PaymentSchedule::new(&self.terms, now);
        if self.terms.is_open() {
            self.balance = LoanBalance::open(now);
            self.funding_available = released;
        } else {
            self.balance = LoanBalance::funded(&schedule, &self.terms, config.days_per_year);
            self.drawn = released;
        }
        self.schedule = Some(schedule);
        self.funded_at = Some(now);
        self.state = LoanState::Active;
    }

    /// Start the callback notice on an active open-term loan
    ///
    /// Returns the end of the notice; calling an already called loan keeps
    /// the original notice.
    pub(crate) fn call_back(&mut self, now: Timestamp) -> Option<Timestamp> {
        let schedule = self.schedule.as_mut()?;
        if let Some(due) = schedule.callback_due {
            return Some(due);
        }
        self.callback_at = Some(now);
        Some(schedule.call_back(now))
    }

    /// Active → Defaulted, returning the principal to write off
    pub(crate) fn default_now(&mut self) -> Decimal {
        self.written_off = self.balance.principal_outstanding;
        self.state = LoanState::Defaulted;
        self.written_off
    }
}

/// State of `loan` at `now`, without mutating it
pub fn effective_state(loan: &Loan, now: Timestamp, config: &ProtocolConfig) -> LoanState {
    let mut projected = loan.clone();
    projected.refresh(now, config);
    projected.state
}
