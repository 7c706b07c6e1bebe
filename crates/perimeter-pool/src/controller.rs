//! Pool controller
//!
//! Lifecycle transitions, settings, first-loss capital and accrued admin
//! fees. Pure state: authorization, asset movement and notifications are the
//! [`crate::Pool`] handle's job.

use crate::state::{validate_service_fee, PoolSettings, PoolState};
use perimeter_common::error::PoolError;
use perimeter_common::{ProtocolConfig, Timestamp};
use rust_decimal::Decimal;

/// Lifecycle and junior-capital state of one pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolController {
    state: PoolState,
    settings: PoolSettings,
    /// Junior capital held in the vault
    first_loss: Decimal,
    /// First-loss capital consumed by defaults
    first_loss_applied: Decimal,
    /// Service fees owed to the pool admin
    admin_fees: Decimal,
}

impl PoolController {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            state: PoolState::Initialized,
            settings,
            first_loss: Decimal::ZERO,
            first_loss_applied: Decimal::ZERO,
            admin_fees: Decimal::ZERO,
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn first_loss(&self) -> Decimal {
        self.first_loss
    }

    pub fn first_loss_applied(&self) -> Decimal {
        self.first_loss_applied
    }

    pub fn admin_fees(&self) -> Decimal {
        self.admin_fees
    }

    /// Fail with `InvalidState` unless the pool is in one of `allowed`
    pub fn require_state(&self, operation: &str, allowed: &[PoolState]) -> Result<(), PoolError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PoolError::InvalidState {
                operation: operation.to_string(),
                state: self.state.label().to_string(),
            })
        }
    }

    /// Fail with `PoolNotActive` unless the pool is Active
    pub fn require_active(&self) -> Result<(), PoolError> {
        if self.state == PoolState::Active {
            Ok(())
        } else {
            Err(PoolError::PoolNotActive {
                state: self.state.label().to_string(),
            })
        }
    }

    /// Initialized → Active
    pub fn activate(&mut self, now: Timestamp) -> Result<PoolState, PoolError> {
        self.require_state("activate", &[PoolState::Initialized])?;

        if now >= self.settings.activation_deadline {
            return Err(PoolError::ActivationExpired {
                deadline: self.settings.activation_deadline,
            });
        }
        if self.first_loss < self.settings.min_first_loss {
            return Err(PoolError::InsufficientFirstLoss {
                required: self.settings.min_first_loss,
                deposited: self.first_loss,
            });
        }

        Ok(self.transition(PoolState::Active))
    }

    /// Active → Paused
    pub fn pause(&mut self) -> Result<PoolState, PoolError> {
        self.require_state("pause", &[PoolState::Active])?;
        Ok(self.transition(PoolState::Paused))
    }

    /// Paused → Active
    pub fn unpause(&mut self) -> Result<PoolState, PoolError> {
        self.require_state("unpause", &[PoolState::Paused])?;
        Ok(self.transition(PoolState::Active))
    }

    /// Any open state → Closed, once no principal is out on loan
    pub fn close(&mut self, outstanding_principal: Decimal) -> Result<PoolState, PoolError> {
        self.require_state(
            "close",
            &[PoolState::Initialized, PoolState::Active, PoolState::Paused],
        )?;
        if outstanding_principal > Decimal::ZERO {
            return Err(PoolError::LoansOutstanding {
                principal: outstanding_principal,
            });
        }
        Ok(self.transition(PoolState::Closed))
    }

    fn transition(&mut self, to: PoolState) -> PoolState {
        std::mem::replace(&mut self.state, to)
    }

    /// Validate a first-loss top-up
    pub fn check_first_loss_deposit(&self, amount: Decimal) -> Result<(), PoolError> {
        if amount <= Decimal::ZERO {
            return Err(PoolError::InvalidAmount);
        }
        self.require_state(
            "deposit_first_loss",
            &[PoolState::Initialized, PoolState::Active, PoolState::Paused],
        )
    }

    pub(crate) fn add_first_loss(&mut self, amount: Decimal) {
        self.first_loss += amount;
    }

    /// Validate a first-loss withdrawal, returning the amount to release
    pub fn check_first_loss_withdrawal(&self) -> Result<Decimal, PoolError> {
        self.require_state("withdraw_first_loss", &[PoolState::Closed])?;
        if self.first_loss.is_zero() {
            return Err(PoolError::InvalidAmount);
        }
        Ok(self.first_loss)
    }

    pub(crate) fn take_first_loss(&mut self) -> Decimal {
        std::mem::take(&mut self.first_loss)
    }

    /// Cover `loss` from first-loss capital, returning the amount covered
    pub(crate) fn apply_first_loss(&mut self, loss: Decimal) -> Decimal {
        let covered = loss.min(self.first_loss);
        self.first_loss -= covered;
        self.first_loss_applied += covered;
        covered
    }

    pub(crate) fn accrue_admin_fees(&mut self, amount: Decimal) {
        self.admin_fees += amount;
    }

    pub(crate) fn take_admin_fees(&mut self) -> Decimal {
        std::mem::take(&mut self.admin_fees)
    }

    pub fn set_service_fee_bps(&mut self, bps: u32, config: &ProtocolConfig) -> Result<(), PoolError> {
        validate_service_fee(bps, config)?;
        self.settings.service_fee_bps = bps;
        Ok(())
    }

    /// Change the capacity; never below current lender value
    pub fn set_max_capacity(
        &mut self,
        capacity: Option<Decimal>,
        total_assets: Decimal,
    ) -> Result<(), PoolError> {
        if let Some(cap) = capacity {
            if cap < total_assets || cap <= Decimal::ZERO {
                return Err(PoolError::InvalidSettings(format!(
                    "capacity {} is below current lender value {}",
                    cap, total_assets
                )));
            }
        }
        self.settings.max_capacity = capacity;
        Ok(())
    }

    /// Fail with `CapacityExceeded` if a deposit would overflow the pool
    pub fn check_capacity(&self, total_assets: Decimal, deposit: Decimal) -> Result<(), PoolError> {
        if let Some(capacity) = self.settings.max_capacity {
            let resulting = total_assets + deposit;
            if resulting > capacity {
                return Err(PoolError::CapacityExceeded {
                    capacity,
                    resulting,
                });
            }
        }
        Ok(())
    }

    /// Largest deposit the pool can accept right now
    pub fn max_deposit(&self, total_assets: Decimal) -> Decimal {
        if self.state != PoolState::Active {
            return Decimal::ZERO;
        }
        match self.settings.max_capacity {
            Some(capacity) => (capacity - total_assets).max(Decimal::ZERO),
            None => Decimal::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn controller(min_first_loss: Decimal) -> PoolController {
        PoolController::new(PoolSettings {
            min_first_loss,
            activation_deadline: 1_000,
            max_capacity: Some(dec!(10000000)),
            service_fee_bps: 0,
            pool_type: "fixed-term".into(),
        })
    }

    #[test]
    fn test_activation_requires_first_loss() {
        let mut ctrl = controller(dec!(5000000));

        assert_eq!(
            ctrl.activate(10),
            Err(PoolError::InsufficientFirstLoss {
                required: dec!(5000000),
                deposited: dec!(0),
            })
        );
        assert_eq!(ctrl.state(), PoolState::Initialized);

        ctrl.check_first_loss_deposit(dec!(5000000)).unwrap();
        ctrl.add_first_loss(dec!(5000000));
        assert_eq!(ctrl.activate(10), Ok(PoolState::Initialized));
        assert_eq!(ctrl.state(), PoolState::Active);
    }

    #[test]
    fn test_activation_deadline() {
        let mut ctrl = controller(Decimal::ZERO);
        assert_eq!(
            ctrl.activate(1_000),
            Err(PoolError::ActivationExpired { deadline: 1_000 })
        );
        assert!(ctrl.activate(999).is_ok());
    }

    #[test]
    fn test_lifecycle() {
        let mut ctrl = controller(Decimal::ZERO);

        assert!(ctrl.pause().is_err());
        ctrl.activate(0).unwrap();
        ctrl.pause().unwrap();
        assert_eq!(ctrl.state(), PoolState::Paused);
        assert!(ctrl.require_active().is_err());
        ctrl.unpause().unwrap();
        assert!(ctrl.require_active().is_ok());

        assert_eq!(
            ctrl.close(dec!(1)),
            Err(PoolError::LoansOutstanding { principal: dec!(1) })
        );
        ctrl.close(Decimal::ZERO).unwrap();
        assert_eq!(ctrl.state(), PoolState::Closed);

        // Closed is terminal
        assert!(ctrl.close(Decimal::ZERO).is_err());
        assert!(ctrl.unpause().is_err());
        assert!(ctrl.check_first_loss_deposit(dec!(1)).is_err());
    }

    #[test]
    fn test_first_loss_absorbs_defaults() {
        let mut ctrl = controller(Decimal::ZERO);
        ctrl.add_first_loss(dec!(300));

        assert_eq!(ctrl.apply_first_loss(dec!(100)), dec!(100));
        assert_eq!(ctrl.apply_first_loss(dec!(500)), dec!(200));
        assert_eq!(ctrl.first_loss(), Decimal::ZERO);
        assert_eq!(ctrl.first_loss_applied(), dec!(300));
    }

    #[test]
    fn test_first_loss_withdrawal_only_when_closed() {
        let mut ctrl = controller(Decimal::ZERO);
        ctrl.add_first_loss(dec!(50));
        assert!(ctrl.check_first_loss_withdrawal().is_err());

        ctrl.close(Decimal::ZERO).unwrap();
        assert_eq!(ctrl.check_first_loss_withdrawal(), Ok(dec!(50)));
        assert_eq!(ctrl.take_first_loss(), dec!(50));
        assert_eq!(ctrl.check_first_loss_withdrawal(), Err(PoolError::InvalidAmount));
    }

    #[test]
    fn test_capacity() {
        let mut ctrl = controller(Decimal::ZERO);
        assert!(ctrl.check_capacity(dec!(9000000), dec!(1000000)).is_ok());
        assert!(matches!(
            ctrl.check_capacity(dec!(9000000), dec!(1000001)),
            Err(PoolError::CapacityExceeded { .. })
        ));

        assert!(ctrl.set_max_capacity(Some(dec!(100)), dec!(200)).is_err());
        ctrl.set_max_capacity(None, dec!(200)).unwrap();
        assert!(ctrl.check_capacity(dec!(9000000), dec!(1000001)).is_ok());

        assert_eq!(ctrl.max_deposit(Decimal::ZERO), Decimal::ZERO);
        ctrl.activate(0).unwrap();
        assert_eq!(ctrl.max_deposit(Decimal::ZERO), Decimal::MAX);
    }
}
