//! Scenario description
//!
//! A scenario is a single pool, its lenders and borrowers, and a list of
//! steps replayed in order. Amounts are base units; time moves only through
//! `advance_days`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_asset")]
    pub asset: String,
    pub min_first_loss: Decimal,
    pub first_loss: Decimal,
    #[serde(default)]
    pub service_fee_bps: Option<u32>,
    pub lenders: Vec<LenderSpec>,
    pub loans: Vec<LoanSpec>,
    pub steps: Vec<Step>,
}

fn default_asset() -> String {
    "USDC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LenderSpec {
    pub name: String,
    pub deposit: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanSpec {
    pub name: String,
    pub principal: Decimal,
    pub apr_bps: u32,
    pub duration_days: u32,
    pub payment_period_days: u32,
    /// Days from creation until the loan can no longer be funded
    #[serde(default = "default_drop_dead_days")]
    pub drop_dead_days: u32,
    #[serde(default)]
    pub origination_bps: u32,
    #[serde(default)]
    pub late_fee: Decimal,
}

fn default_drop_dead_days() -> u32 {
    7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Move the clock forward and refresh every loan
    AdvanceDays { days: u32 },
    /// Pay whatever is owed at the next due date
    PayDue { loan: String },
    /// Pay a fixed amount
    Pay { loan: String, amount: Decimal },
    /// Repay the loan in full
    Payoff { loan: String },
    /// Pool admin defaults the loan
    Default { loan: String },
}

impl Scenario {
    /// Two lenders, one loan repaid on schedule and one that defaults
    pub fn builtin() -> Self {
        let mut steps = vec![
            Step::AdvanceDays { days: 29 },
            Step::PayDue {
                loan: "acme".into(),
            },
            Step::PayDue {
                loan: "globex".into(),
            },
        ];
        // Acme pays every period; Globex stops paying and defaults
        for _ in 0..5 {
            steps.push(Step::AdvanceDays { days: 30 });
            steps.push(Step::PayDue {
                loan: "acme".into(),
            });
        }

        Self {
            asset: default_asset(),
            min_first_loss: Decimal::from(100_000),
            first_loss: Decimal::from(100_000),
            service_fee_bps: Some(500),
            lenders: vec![
                LenderSpec {
                    name: "alice".into(),
                    deposit: Decimal::from(6_000_000),
                },
                LenderSpec {
                    name: "bob".into(),
                    deposit: Decimal::from(4_000_000),
                },
            ],
            loans: vec![
                LoanSpec {
                    name: "acme".into(),
                    principal: Decimal::from(2_000_000),
                    apr_bps: 1000,
                    duration_days: 180,
                    payment_period_days: 30,
                    drop_dead_days: default_drop_dead_days(),
                    origination_bps: 50,
                    late_fee: Decimal::ZERO,
                },
                LoanSpec {
                    name: "globex".into(),
                    principal: Decimal::from(1_000_000),
                    apr_bps: 1200,
                    duration_days: 90,
                    payment_period_days: 30,
                    drop_dead_days: default_drop_dead_days(),
                    origination_bps: 0,
                    late_fee: Decimal::from(1_000),
                },
            ],
            steps,
        }
    }
}
