//! Supply conservation invariant checker.
//!
//! Invariant enforced after every settlement:
//! ```text
//! Σ(available + frozen) == Σ(credits) − Σ(withdrawals)
//! ```
//!
//! Freezes, releases and splits only move funds between pools and
//! accounts, so none of them may change the left-hand side.

use openescrow_types::{EscrowError, Result, checked_add};
use rust_decimal::Decimal;

/// Running totals of funds entering and leaving custody.
#[derive(Debug, Clone, Default)]
pub struct SupplyConservation {
    /// Total credited since genesis.
    credits: Decimal,
    /// Total withdrawn since genesis.
    withdrawals: Decimal,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a credit.
    ///
    /// # Errors
    /// Returns `InvalidAmount` if the running total would overflow.
    pub fn record_credit(&mut self, amount: Decimal) -> Result<()> {
        self.credits = checked_add(self.credits, amount)?;
        Ok(())
    }

    /// Record a withdrawal. Bounded by credits, so it cannot overflow.
    pub fn record_withdrawal(&mut self, amount: Decimal) {
        self.withdrawals += amount;
    }

    /// Expected total supply: credits − withdrawals.
    #[must_use]
    pub fn expected_supply(&self) -> Decimal {
        self.credits - self.withdrawals
    }

    /// Compare the actual supply (sum of all account totals) against the
    /// expected supply.
    ///
    /// # Errors
    /// Returns [`EscrowError::SupplyInvariantViolation`] if actual ≠ expected.
    pub fn verify(&self, actual_supply: Decimal) -> Result<()> {
        let expected = self.expected_supply();
        if actual_supply != expected {
            return Err(EscrowError::SupplyInvariantViolation {
                reason: format!(
                    "actual supply {actual_supply} != expected {expected} \
                     (credits={}, withdrawals={})",
                    self.credits, self.withdrawals,
                ),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn total_credits(&self) -> Decimal {
        self.credits
    }

    #[must_use]
    pub fn total_withdrawals(&self) -> Decimal {
        self.withdrawals
    }
}
