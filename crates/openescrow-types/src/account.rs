//! Account balance types for the OpenEscrow ledger.
//!
//! Every account has an `available` balance (free to withdraw or commit),
//! a `frozen` balance (reserved against open milestones), and an
//! `allowance`: the standing cap the escrow operator may freeze on the
//! account's behalf. The allowance is a separate field, not derived from
//! the balances, so every freeze can be audited against what was approved.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EscrowError, Result};

/// Balance entry for a single account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Free for new commitments or withdrawal.
    pub available: Decimal,
    /// Escrowed against open milestones.
    pub frozen: Decimal,
    /// Remaining amount the operator may still freeze.
    pub allowance: Decimal,
}

impl Account {
    /// Create a zero account.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Decimal::ZERO,
            frozen: Decimal::ZERO,
            allowance: Decimal::ZERO,
        }
    }

    /// Total balance (available + frozen). Allowance is not money.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.frozen
    }

    /// Whether this account holds no funds at all.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.frozen.is_zero()
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that `amount` is a strictly positive whole number of base units.
///
/// # Errors
/// Returns [`EscrowError::InvalidAmount`] otherwise.
pub fn ensure_positive_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(EscrowError::InvalidAmount {
            reason: format!("amount must be positive, got {amount}"),
        });
    }
    ensure_whole(amount)
}

/// Check that `amount` is a non-negative whole number of base units.
///
/// # Errors
/// Returns [`EscrowError::InvalidAmount`] otherwise.
pub fn ensure_non_negative_amount(amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(EscrowError::InvalidAmount {
            reason: format!("amount must not be negative, got {amount}"),
        });
    }
    ensure_whole(amount)
}

fn ensure_whole(amount: Decimal) -> Result<()> {
    if !amount.fract().is_zero() {
        return Err(EscrowError::InvalidAmount {
            reason: format!("amount must be a whole number of base units, got {amount}"),
        });
    }
    Ok(())
}

/// Checked addition that reports overflow as [`EscrowError::InvalidAmount`].
///
/// # Errors
/// Returns [`EscrowError::InvalidAmount`] on overflow.
pub fn checked_add(lhs: Decimal, rhs: Decimal) -> Result<Decimal> {
    lhs.checked_add(rhs).ok_or_else(|| EscrowError::InvalidAmount {
        reason: format!("{lhs} + {rhs} overflows"),
    })
}
