//! Perimeter Simulator Binary
//!
//! Replays a lending scenario against an in-memory deployment on a manual
//! clock and prints how the pool's lenders came out.
//!
//! ```text
//! perimeter-sim [scenario.json]
//! ```

mod scenario;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::SigningKey;
use perimeter::common::{days, InMemoryAssetLedger};
use perimeter::{
    Account, AssetId, AttestationSignature, Clock, Deployment, LoanId, LoanState, LoanTerms,
    ManualClock, Pool, PoolRequest, ProtocolConfig, Timestamp, VerificationResult,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scenario::{Scenario, Step};

/// 2024-01-01T00:00:00Z
const SIM_START: Timestamp = 1_704_067_200;

const KYC_SCHEMA: &str = "kyc/v1";
const TERMS_URL: &str = "https://perimeter.example/terms/v1";

#[derive(Debug, Clone, Serialize)]
struct LenderOutcome {
    name: String,
    deposited: Decimal,
    paid_out: Decimal,
}

#[derive(Debug, Clone, Serialize)]
struct Report {
    finished_at: Timestamp,
    pool_state: String,
    share_price: Decimal,
    total_defaults: Decimal,
    first_loss_remaining: Decimal,
    admin_fees: Decimal,
    loans: BTreeMap<String, String>,
    lenders: Vec<LenderOutcome>,
}

fn account(name: &str) -> Account {
    Account::derive("perimeter-sim", name.as_bytes())
}

struct Simulation {
    clock: ManualClock,
    ledger: Arc<InMemoryAssetLedger>,
    deployment: Deployment,
    asset: AssetId,
    operator: Account,
    admin: Account,
    loans: BTreeMap<String, LoanId>,
}

impl Simulation {
    fn new(config: ProtocolConfig, asset: AssetId) -> Result<Self> {
        let ledger = Arc::new(InMemoryAssetLedger::new());
        let operator = account("operator");
        let deployment = Deployment::new(operator, config, ledger.clone())?;

        Ok(Self {
            clock: ManualClock::new(SIM_START),
            ledger,
            deployment,
            asset,
            operator,
            admin: account("pool-admin"),
            loans: BTreeMap::new(),
        })
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn loan_id(&self, name: &str) -> Result<LoanId> {
        self.loans
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("scenario references unknown loan {name}"))
    }

    /// Protocol setup: liquidity asset, terms of service, pool admin
    fn bootstrap(&self) -> Result<()> {
        let now = self.now();
        self.deployment
            .services
            .set_liquidity_asset(&self.operator, self.asset.clone(), true)?;
        self.deployment
            .terms
            .update_terms_of_service(&self.operator, TERMS_URL)?;
        self.deployment
            .terms
            .accept_terms_of_service(&self.admin, now)?;
        self.deployment
            .pool_admins
            .allow_participant(&self.operator, self.admin, now)?;
        Ok(())
    }

    fn open_pool(&self, scenario: &Scenario) -> Result<Arc<Pool>> {
        let now = self.now();
        let mut request =
            PoolRequest::new(self.asset.clone(), scenario.min_first_loss, now + days(30));
        if let Some(bps) = scenario.service_fee_bps {
            request = request.with_service_fee_bps(bps);
        }

        let created = self.deployment.pools.create_pool(&self.admin, request, now)?;
        let pool = self.deployment.pool(&created.pool_id)?;

        if scenario.first_loss > Decimal::ZERO {
            self.ledger.mint(&self.asset, &self.admin, scenario.first_loss);
            pool.deposit_first_loss(&self.admin, scenario.first_loss)?;
        }
        pool.activate(&self.admin, now)?;
        Ok(pool)
    }

    /// Admit a participant through a signed KYC attestation
    fn onboard(&self, pool: &Pool, name: &str, verifier_key: &SigningKey) -> Result<Account> {
        let participant = account(name);
        let now = self.now();
        let participants = pool.participants();

        let result = VerificationResult::new(
            KYC_SCHEMA,
            participant,
            now + days(365),
            format!("kyc-{name}"),
        );
        let signature = AttestationSignature::sign(&result, &participants.scope(), verifier_key);
        participants
            .verify(&result, &signature, now)
            .with_context(|| format!("onboarding {name}"))?;
        Ok(participant)
    }

    fn step(&self, pool: &Pool, step: &Step) -> Result<()> {
        match step {
            Step::AdvanceDays { days: n } => {
                let now = self.clock.advance_days(*n);
                for (name, loan_id) in &self.loans {
                    let state = self.deployment.loans.refresh(*loan_id, now)?;
                    debug!(loan = %name, state = %state, "Refreshed");
                }
            }
            Step::PayDue { loan } => {
                let loan_id = self.loan_id(loan)?;
                let now = self.now();
                if let Some(due) = self.deployment.loans.next_payment_due(&loan_id, now)? {
                    if due.total() > Decimal::ZERO {
                        self.pay(loan, loan_id, due.total())?;
                    }
                }
            }
            Step::Pay { loan, amount } => {
                let loan_id = self.loan_id(loan)?;
                self.pay(loan, loan_id, *amount)?;
            }
            Step::Payoff { loan } => {
                let loan_id = self.loan_id(loan)?;
                let payoff = self.deployment.loans.payoff_amount(&loan_id, self.now())?;
                if payoff > Decimal::ZERO {
                    self.pay(loan, loan_id, payoff)?;
                }
            }
            Step::Default { loan } => {
                let loan_id = self.loan_id(loan)?;
                let written_off = self
                    .deployment
                    .loans
                    .mark_defaulted(&pool.admin(), loan_id, self.now())?;
                info!(loan = %loan, written_off = %written_off, "Loan defaulted by pool admin");
            }
        }
        Ok(())
    }

    fn pay(&self, name: &str, loan_id: LoanId, amount: Decimal) -> Result<()> {
        let borrower = account(name);
        let split = self
            .deployment
            .loans
            .make_payment(&borrower, loan_id, amount, self.now())
            .with_context(|| format!("payment of {amount} on loan {name}"))?;
        info!(
            loan = %name,
            interest = %split.interest,
            principal = %split.principal,
            late_fees = %split.late_fees,
            "Payment made"
        );
        Ok(())
    }

    fn run(mut self, scenario: &Scenario) -> Result<Report> {
        self.bootstrap()?;
        let pool = self.open_pool(scenario)?;

        let (verifier, verifier_key) = Account::generate();
        pool.participants().add_credential_schema(&self.admin, KYC_SCHEMA)?;
        pool.participants().add_trusted_verifier(&self.admin, verifier)?;

        let mut lenders = Vec::new();
        for spec in &scenario.lenders {
            let lender = self.onboard(&pool, &spec.name, &verifier_key)?;
            self.deployment.terms.accept_terms_of_service(&lender, self.now())?;
            self.ledger.mint(&self.asset, &lender, spec.deposit);
            pool.deposit(&lender, spec.deposit)?;
            lenders.push((spec.name.clone(), lender, spec.deposit));
        }

        for spec in &scenario.loans {
            let borrower = self.onboard(&pool, &spec.name, &verifier_key)?;
            self.deployment.terms.accept_terms_of_service(&borrower, self.now())?;
            // Working capital for interest and fees
            self.ledger.mint(&self.asset, &borrower, spec.principal);

            let now = self.now();
            let terms = LoanTerms::new(
                spec.principal,
                spec.apr_bps,
                spec.duration_days,
                spec.payment_period_days,
                now + days(spec.drop_dead_days),
            )
            .with_origination_bps(spec.origination_bps)
            .with_late_fee(spec.late_fee);

            let created = self.deployment.loans.create_loan(
                &borrower,
                pool.id(),
                self.asset.clone(),
                terms,
                now,
            )?;
            let drawn = self.deployment.loans.fund(&self.admin, created.loan_id, now)?;
            info!(loan = %spec.name, drawn = %drawn, "Loan funded");
            self.loans.insert(spec.name.clone(), created.loan_id);
        }

        for step in &scenario.steps {
            self.step(&pool, step)?;
        }

        self.wind_down(&pool, lenders)
    }

    /// Close the pool if every loan has settled and pay everyone out
    fn wind_down(&self, pool: &Pool, lenders: Vec<(String, Account, Decimal)>) -> Result<Report> {
        let now = self.now();
        if pool.outstanding_principal().is_zero() {
            pool.close(&self.admin)?;
        } else {
            warn!(outstanding = %pool.outstanding_principal(), "Loans outstanding; pool left open");
        }

        let share_price = pool.snapshot().share_price;
        let mut outcomes = Vec::new();
        for (name, lender, deposited) in lenders {
            let shares = pool.balance_of(&lender);
            let redeemable = pool.convert_to_assets(shares);
            let paid_out = if shares > Decimal::ZERO && pool.max_withdraw(&lender) >= redeemable {
                pool.withdraw(&lender, shares)?
            } else {
                Decimal::ZERO
            };
            outcomes.push(LenderOutcome {
                name,
                deposited,
                paid_out,
            });
        }

        let snapshot = pool.snapshot();
        if snapshot.admin_fees > Decimal::ZERO {
            pool.withdraw_admin_fees(&self.admin, &self.admin)?;
        }

        let mut loans = BTreeMap::new();
        for (name, loan_id) in &self.loans {
            let state: LoanState = self.deployment.loans.effective_state(loan_id, now)?;
            loans.insert(name.clone(), state.label().to_string());
        }

        Ok(Report {
            finished_at: now,
            pool_state: pool.state().label().to_string(),
            share_price,
            total_defaults: snapshot.total_defaults,
            first_loss_remaining: snapshot.first_loss,
            admin_fees: snapshot.admin_fees,
            loans,
            lenders: outcomes,
        })
    }
}

fn load_scenario() -> Result<Scenario> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading scenario {path}"))?;
            let scenario = serde_json::from_str(&raw)
                .with_context(|| format!("parsing scenario {path}"))?;
            info!(path = %path, "Loaded scenario");
            Ok(scenario)
        }
        None => {
            info!("No scenario given; running the built-in scenario");
            Ok(Scenario::builtin())
        }
    }
}

fn print_report(report: &Report) {
    let finished = chrono::DateTime::from_timestamp(report.finished_at, 0)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| report.finished_at.to_string());

    println!("Pool state        {}", report.pool_state);
    println!("Finished          {}", finished);
    println!("Share price       {}", report.share_price.round_dp(6));
    println!("Total defaults    {}", report.total_defaults);
    println!("First-loss left   {}", report.first_loss_remaining);
    println!("Admin fees        {}", report.admin_fees);
    println!();
    println!("Loans");
    for (name, state) in &report.loans {
        println!("  {:<12} {}", name, state);
    }
    println!();
    println!("Lenders");
    for lender in &report.lenders {
        println!(
            "  {:<12} deposited {:>14}   paid out {:>14}",
            lender.name, lender.deposited, lender.paid_out
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Perimeter simulator v{}", perimeter::common::VERSION);

    let config = ProtocolConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let scenario = load_scenario()?;
    let asset = AssetId::new(scenario.asset.clone())?;
    let simulation = Simulation::new(config, asset)?;

    // Count notifications until the deployment is dropped
    let mut events = simulation.deployment.events().subscribe();
    let listener = tokio::spawn(async move {
        let mut seen = 0usize;
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(event = event.name(), "Event");
                    seen += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event listener lagged");
                    seen += skipped as usize;
                }
                Err(RecvError::Closed) => break,
            }
        }
        seen
    });

    let report = simulation.run(&scenario)?;
    let seen = listener.await?;

    print_report(&report);
    println!();
    println!("Events published  {}", seen);
    Ok(())
}
