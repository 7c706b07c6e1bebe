//! Loan terms

use perimeter_common::error::LoanError;
use perimeter_common::{AssetId, Timestamp, BPS_DENOMINATOR};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a funded loan hands out and takes back principal
///
/// Both pay interest every period and owe all principal at maturity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    /// The whole principal, less the origination fee, goes to the borrower
    /// at funding; interest accrues per period on the outstanding principal.
    Fixed,
    /// A credit line. Funding parks the principal in the loan's funding
    /// vault; the borrower draws down and pays down against it, and interest
    /// accrues continuously on the drawn balance. The pool admin may reclaim
    /// idle funds and call the loan back.
    Open,
}

/// Penalties for missed payment periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LatePaymentPolicy {
    /// Flat fee charged for each missed period
    #[serde(default)]
    pub late_fee: Decimal,
    /// Consecutive missed periods tolerated before default; the protocol
    /// default applies when unset
    #[serde(default)]
    pub max_missed_periods: Option<u32>,
}

/// Collateral the borrower must post before funding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collateral {
    pub asset: AssetId,
    pub amount: Decimal,
}

/// Negotiated loan terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Amount lent, in base units
    pub principal: Decimal,
    /// Annual interest rate
    pub apr_bps: u32,
    pub duration_days: u32,
    pub payment_period_days: u32,
    /// Funding deadline
    pub drop_dead: Timestamp,
    #[serde(default)]
    pub late_payment: LatePaymentPolicy,
    /// Fee withheld from the drawn amount, in bps of principal
    #[serde(default)]
    pub origination_bps: u32,
    #[serde(default = "default_loan_type")]
    pub loan_type: LoanType,
    #[serde(default)]
    pub collateral: Option<Collateral>,
}

fn default_loan_type() -> LoanType {
    LoanType::Fixed
}

impl LoanTerms {
    pub fn new(
        principal: Decimal,
        apr_bps: u32,
        duration_days: u32,
        payment_period_days: u32,
        drop_dead: Timestamp,
    ) -> Self {
        Self {
            principal,
            apr_bps,
            duration_days,
            payment_period_days,
            drop_dead,
            late_payment: LatePaymentPolicy::default(),
            origination_bps: 0,
            loan_type: LoanType::Fixed,
            collateral: None,
        }
    }

    pub fn with_origination_bps(mut self, bps: u32) -> Self {
        self.origination_bps = bps;
        self
    }

    pub fn with_late_fee(mut self, late_fee: Decimal) -> Self {
        self.late_payment.late_fee = late_fee;
        self
    }

    pub fn with_max_missed_periods(mut self, periods: u32) -> Self {
        self.late_payment.max_missed_periods = Some(periods);
        self
    }

    pub fn with_loan_type(mut self, loan_type: LoanType) -> Self {
        self.loan_type = loan_type;
        self
    }

    pub fn with_collateral(mut self, asset: AssetId, amount: Decimal) -> Self {
        self.collateral = Some(Collateral { asset, amount });
        self
    }

    pub fn is_open(&self) -> bool {
        self.loan_type == LoanType::Open
    }

    /// Number of payment periods; the last one may be shorter
    pub fn payment_periods(&self) -> u32 {
        self.duration_days.div_ceil(self.payment_period_days.max(1))
    }

    /// Fee withheld at funding
    pub fn origination_fee(&self) -> Decimal {
        perimeter_common::bps_of(self.principal, self.origination_bps)
    }

    /// Consecutive missed periods tolerated before default
    pub fn default_threshold(&self, protocol_default: u32) -> u32 {
        self.late_payment
            .max_missed_periods
            .unwrap_or(protocol_default)
    }

    pub fn validate(&self, now: Timestamp) -> Result<(), LoanError> {
        if self.principal <= Decimal::ZERO {
            return Err(LoanError::InvalidTerms("principal must be positive".into()));
        }
        if self.principal.fract() != Decimal::ZERO {
            return Err(LoanError::InvalidTerms(
                "principal must be whole base units".into(),
            ));
        }
        if self.duration_days == 0 {
            return Err(LoanError::InvalidTerms("duration must be positive".into()));
        }
        if self.payment_period_days == 0 {
            return Err(LoanError::InvalidTerms("payment period must be positive".into()));
        }
        if self.payment_period_days > self.duration_days {
            return Err(LoanError::InvalidTerms(
                "payment period exceeds duration".into(),
            ));
        }
        if self.drop_dead <= now {
            return Err(LoanError::InvalidTerms(format!(
                "drop-dead timestamp {} is not in the future",
                self.drop_dead
            )));
        }
        if self.origination_bps > BPS_DENOMINATOR {
            return Err(LoanError::InvalidTerms(
                "origination fee exceeds principal".into(),
            ));
        }
        // The funding vault must hold the full line so reclaims settle it
        if self.is_open() && self.origination_bps > 0 {
            return Err(LoanError::InvalidTerms(
                "open-term loans carry no origination fee".into(),
            ));
        }
        if self.late_payment.late_fee < Decimal::ZERO {
            return Err(LoanError::InvalidTerms("late fee must not be negative".into()));
        }
        if let Some(collateral) = &self.collateral {
            if collateral.amount <= Decimal::ZERO {
                return Err(LoanError::InvalidTerms(
                    "collateral amount must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // 1,000,000 at 5% over 180 days, paid every 30
    fn terms() -> LoanTerms {
        LoanTerms::new(dec!(1000000), 500, 180, 30, 1_000)
    }

    #[test]
    fn test_payment_periods() {
        assert_eq!(terms().payment_periods(), 6);

        let uneven = LoanTerms::new(dec!(100), 500, 100, 30, 1_000);
        assert_eq!(uneven.payment_periods(), 4);
    }

    #[test]
    fn test_validate() {
        assert!(terms().validate(0).is_ok());

        let mut t = terms();
        t.principal = Decimal::ZERO;
        assert!(matches!(t.validate(0), Err(LoanError::InvalidTerms(_))));

        let mut t = terms();
        t.duration_days = 0;
        assert!(t.validate(0).is_err());

        let mut t = terms();
        t.payment_period_days = 0;
        assert!(t.validate(0).is_err());

        // Drop-dead at or before now
        assert!(terms().validate(1_000).is_err());
        assert!(terms().validate(2_000).is_err());

        let t = terms().with_collateral(AssetId::new("WETH").unwrap(), Decimal::ZERO);
        assert!(t.validate(0).is_err());
    }

    #[test]
    fn test_origination_fee() {
        let t = terms().with_origination_bps(100);
        assert_eq!(t.origination_fee(), dec!(10000));
    }

    #[test]
    fn test_open_term_rejects_origination_fee() {
        let open = terms().with_loan_type(LoanType::Open);
        assert!(open.is_open());
        assert!(open.validate(0).is_ok());

        let t = open.with_origination_bps(100);
        assert!(matches!(t.validate(0), Err(LoanError::InvalidTerms(_))));
        assert!(terms().with_origination_bps(100).validate(0).is_ok());
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(terms().default_threshold(2), 2);
        assert_eq!(terms().with_max_missed_periods(0).default_threshold(2), 0);
    }
}
