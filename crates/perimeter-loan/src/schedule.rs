//! Payment schedule and loan balance
//!
//! Interest is simple and accrues per period on the outstanding principal:
//!
//! ```text
//! interest(k) = floor(principal_outstanding × apr_bps × days(k) / (10_000 × days_per_year))
//! ```
//!
//! Period 1 accrues when the loan is funded; period `k + 1` accrues when
//! period `k` falls due. Principal is due at maturity. Each due date that
//! passes with anything still owed counts as a missed period and charges the
//! late fee.
//!
//! Open-term loans accrue continuously on the drawn balance instead:
//!
//! ```text
//! interest(t0, t1) = drawn × apr_bps × (t1 - t0) / (10_000 × days_per_year × 86_400)
//! ```
//!
//! Whole units are credited as they accrue and the fraction carries over, so
//! frequent touches lose nothing to rounding.
//!
//! Interest accrued over a period is billed when the period falls due and
//! must be paid by the next due date. A callback brings the principal due
//! date forward to the first due date on or after the callback notice ends.

use crate::terms::LoanTerms;
use perimeter_common::error::LoanError;
use perimeter_common::{days, Timestamp, BPS_DENOMINATOR, SECONDS_PER_DAY};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Due dates of a funded loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSchedule {
    pub funded_at: Timestamp,
    pub maturity: Timestamp,
    pub periods: u32,
    period_days: u32,
    duration_days: u32,
    /// End of the callback notice, once the loan has been called
    #[serde(default)]
    pub callback_due: Option<Timestamp>,
}

impl PaymentSchedule {
    pub fn new(terms: &LoanTerms, funded_at: Timestamp) -> Self {
        Self {
            funded_at,
            maturity: funded_at + days(terms.duration_days),
            periods: terms.payment_periods(),
            period_days: terms.payment_period_days.max(1),
            duration_days: terms.duration_days,
            callback_due: None,
        }
    }

    /// Start a callback at `now`; notice runs one payment period
    pub fn call_back(&mut self, now: Timestamp) -> Timestamp {
        let due = now + days(self.period_days);
        self.callback_due = Some(due);
        due
    }

    /// Whether outstanding principal counts as owed at due date `k`
    pub fn principal_due(&self, k: u32) -> bool {
        if k == 0 {
            return false;
        }
        k >= self.periods || self.callback_due.is_some_and(|due| self.due_at(k) >= due)
    }

    /// Due date of period `k` (1-based)
    ///
    /// The final period is due at maturity. Past maturity, overdue balances
    /// are reassessed every period length.
    pub fn due_at(&self, k: u32) -> Timestamp {
        if k < self.periods {
            self.funded_at + days(self.period_days) * i64::from(k)
        } else {
            self.maturity + days(self.period_days) * i64::from(k - self.periods)
        }
    }

    /// Length of period `k` in days; the last one may be shorter
    pub fn period_days(&self, k: u32) -> u32 {
        let elapsed = self.period_days.saturating_mul(k.saturating_sub(1));
        self.period_days
            .min(self.duration_days.saturating_sub(elapsed))
    }
}

/// Running balance of a funded loan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoanBalance {
    pub principal_outstanding: Decimal,
    pub interest_owed: Decimal,
    pub late_fees_owed: Decimal,

    /// Last period whose interest has accrued
    pub periods_accrued: u32,
    /// Last due date checked for payment
    pub periods_assessed: u32,
    /// Consecutive due dates that passed with a balance owed
    pub missed_periods: u32,

    pub interest_accrued: Decimal,
    pub late_fees_accrued: Decimal,
    pub interest_paid: Decimal,
    pub late_fees_paid: Decimal,
    pub principal_paid: Decimal,

    /// Open-term interest accrued since the last due date, not yet billed
    #[serde(default)]
    pub interest_unbilled: Decimal,
    /// Open-term accrual watermark
    #[serde(default)]
    pub accrued_through: Timestamp,
    /// Sub-unit interest carried between accruals, scaled by the accrual
    /// denominator
    #[serde(default)]
    pub accrual_remainder: Decimal,
}

/// How a payment divides across the balance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSplit {
    pub late_fees: Decimal,
    pub interest: Decimal,
    pub principal: Decimal,
}

impl PaymentSplit {
    pub fn total(&self) -> Decimal {
        self.late_fees + self.interest + self.principal
    }
}

/// Amounts owed at the next due date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDue {
    pub due_at: Timestamp,
    pub late_fees: Decimal,
    pub interest: Decimal,
    pub principal: Decimal,
}

impl PaymentDue {
    pub fn total(&self) -> Decimal {
        self.late_fees + self.interest + self.principal
    }
}

impl LoanBalance {
    /// Balance of a freshly funded loan, with period 1 accrued
    pub fn funded(schedule: &PaymentSchedule, terms: &LoanTerms, days_per_year: u32) -> Self {
        let mut balance = Self {
            principal_outstanding: terms.principal,
            ..Self::default()
        };
        balance.accrue(schedule, terms, 1, days_per_year);
        balance
    }

    /// Balance of a freshly funded open-term loan; nothing drawn yet
    pub fn open(funded_at: Timestamp) -> Self {
        Self {
            accrued_through: funded_at,
            ..Self::default()
        }
    }

    fn accrue(&mut self, schedule: &PaymentSchedule, terms: &LoanTerms, k: u32, days_per_year: u32) {
        let interest = period_interest(
            self.principal_outstanding,
            terms.apr_bps,
            schedule.period_days(k),
            days_per_year,
        );
        self.interest_owed += interest;
        self.interest_accrued += interest;
        self.periods_accrued = k;
    }

    /// Accrue open-term interest on the drawn balance up to `t`
    fn accrue_to(&mut self, terms: &LoanTerms, t: Timestamp, days_per_year: u32) {
        if t <= self.accrued_through {
            return;
        }
        let numerator = self.principal_outstanding
            * Decimal::from(terms.apr_bps)
            * Decimal::from(t - self.accrued_through)
            + self.accrual_remainder;
        let denominator = accrual_denominator(days_per_year);
        let interest = (numerator / denominator).floor();

        self.accrual_remainder = numerator - interest * denominator;
        self.interest_unbilled += interest;
        self.interest_accrued += interest;
        self.accrued_through = t;
    }

    fn bill(&mut self) {
        self.interest_owed += self.interest_unbilled;
        self.interest_unbilled = Decimal::ZERO;
    }

    fn assess(&mut self, schedule: &PaymentSchedule, terms: &LoanTerms, k: u32) {
        let mut owed = self.interest_owed + self.late_fees_owed;
        if schedule.principal_due(k) {
            owed += self.principal_outstanding;
        }

        if owed > Decimal::ZERO {
            self.missed_periods += 1;
            self.late_fees_owed += terms.late_payment.late_fee;
            self.late_fees_accrued += terms.late_payment.late_fee;
        } else {
            self.missed_periods = 0;
        }
        self.periods_assessed = k;
    }

    /// Process every due date strictly before `now`
    ///
    /// Returns `true` once consecutive missed periods exceed `threshold`;
    /// processing stops at that due date.
    pub fn advance(
        &mut self,
        schedule: &PaymentSchedule,
        terms: &LoanTerms,
        now: Timestamp,
        days_per_year: u32,
        threshold: u32,
    ) -> bool {
        if terms.is_open() {
            return self.advance_open(schedule, terms, now, days_per_year, threshold);
        }
        if self.is_repaid() {
            return false;
        }
        loop {
            let k = self.periods_assessed + 1;
            if schedule.due_at(k) >= now {
                return false;
            }

            self.assess(schedule, terms, k);
            if k < schedule.periods {
                self.accrue(schedule, terms, k + 1, days_per_year);
            }
            if self.missed_periods > threshold {
                return true;
            }
        }
    }

    fn advance_open(
        &mut self,
        schedule: &PaymentSchedule,
        terms: &LoanTerms,
        now: Timestamp,
        days_per_year: u32,
        threshold: u32,
    ) -> bool {
        loop {
            let k = self.periods_assessed + 1;
            let due = schedule.due_at(k);
            if due >= now {
                break;
            }

            self.accrue_to(terms, due, days_per_year);
            self.assess(schedule, terms, k);
            self.bill();
            self.periods_accrued = k;
            if self.missed_periods > threshold {
                return true;
            }
        }
        self.accrue_to(terms, now, days_per_year);
        false
    }

    /// Everything needed to close the loan today
    pub fn payoff(&self) -> Decimal {
        self.late_fees_owed + self.interest_owed + self.interest_unbilled + self.principal_outstanding
    }

    /// Add principal drawn on an open-term loan
    pub fn draw(&mut self, amount: Decimal) {
        self.principal_outstanding += amount;
    }

    /// Return drawn principal on an open-term loan; the caller has bounded
    /// `amount` by the outstanding principal
    pub fn pay_down(&mut self, amount: Decimal, schedule: &PaymentSchedule) {
        self.principal_outstanding -= amount;
        self.principal_paid += amount;
        self.clear_if_current(schedule);
    }

    /// Reset the missed-period count once nothing already due is owed
    fn clear_if_current(&mut self, schedule: &PaymentSchedule) {
        let principal_due = schedule.principal_due(self.periods_assessed);
        if self.late_fees_owed.is_zero()
            && self.interest_owed.is_zero()
            && (!principal_due || self.principal_outstanding.is_zero())
        {
            self.missed_periods = 0;
        }
    }

    pub fn is_repaid(&self) -> bool {
        self.payoff().is_zero()
    }

    pub fn amount_repaid(&self) -> Decimal {
        self.late_fees_paid + self.interest_paid + self.principal_paid
    }

    /// Divide `amount` into late fees, then interest, then principal
    pub fn allocate(&self, amount: Decimal) -> Result<PaymentSplit, LoanError> {
        if amount <= Decimal::ZERO {
            return Err(LoanError::InvalidAmount);
        }
        let payoff = self.payoff();
        if amount > payoff {
            return Err(LoanError::Overpayment { amount, payoff });
        }

        let late_fees = amount.min(self.late_fees_owed);
        let interest = (amount - late_fees).min(self.interest_owed + self.interest_unbilled);
        let principal = amount - late_fees - interest;
        Ok(PaymentSplit {
            late_fees,
            interest,
            principal,
        })
    }

    /// Apply an allocated payment; returns `true` when the loan is repaid
    pub fn apply(&mut self, split: &PaymentSplit, schedule: &PaymentSchedule) -> bool {
        // Billed interest first
        let billed = split.interest.min(self.interest_owed);
        self.late_fees_owed -= split.late_fees;
        self.interest_owed -= billed;
        self.interest_unbilled -= split.interest - billed;
        self.principal_outstanding -= split.principal;

        self.late_fees_paid += split.late_fees;
        self.interest_paid += split.interest;
        self.principal_paid += split.principal;

        self.clear_if_current(schedule);
        self.is_repaid()
    }

    /// Amounts owed at the next due date, or `None` once repaid
    pub fn next_due(&self, schedule: &PaymentSchedule) -> Option<PaymentDue> {
        if self.is_repaid() {
            return None;
        }
        let k = self.periods_assessed + 1;
        let principal = if schedule.principal_due(k) {
            self.principal_outstanding
        } else {
            Decimal::ZERO
        };
        Some(PaymentDue {
            due_at: schedule.due_at(k),
            late_fees: self.late_fees_owed,
            interest: self.interest_owed,
            principal,
        })
    }
}

/// Basis points times seconds per year
fn accrual_denominator(days_per_year: u32) -> Decimal {
    Decimal::from(BPS_DENOMINATOR) * Decimal::from(days_per_year.max(1)) * Decimal::from(SECONDS_PER_DAY)
}

/// Simple interest on `principal` for `period_days`, rounded down
pub fn period_interest(principal: Decimal, apr_bps: u32, period_days: u32, days_per_year: u32) -> Decimal {
    let numerator = principal * Decimal::from(apr_bps) * Decimal::from(period_days);
    let denominator = Decimal::from(BPS_DENOMINATOR) * Decimal::from(days_per_year.max(1));
    (numerator / denominator).floor()
}
