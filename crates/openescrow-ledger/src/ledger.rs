//! Escrow ledger.
//!
//! Tracks per-account balances with available/frozen accounting plus a
//! standing allowance. Every mutation validates first and then applies,
//! so either the full operation succeeds or nothing changes.

use std::collections::HashMap;

use openescrow_types::{
    Account, AccountId, EscrowError, Result, checked_add, ensure_non_negative_amount,
    ensure_positive_amount,
};
use rust_decimal::Decimal;

use crate::SupplyConservation;

/// Source of truth for all balance state.
///
/// The escrow controller calls `freeze` when a milestone is created and
/// `release` / `split` when it settles. Funds only enter through `credit`
/// and only leave through `withdraw`.
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: HashMap<AccountId, Account>,
    supply: SupplyConservation,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit funds (increases available). Creates the account on first use.
    ///
    /// # Errors
    /// `InvalidAmount` if `amount` is not a positive whole number or the
    /// balance would overflow.
    pub fn credit(&mut self, account: AccountId, amount: Decimal) -> Result<()> {
        ensure_positive_amount(amount)?;
        let current = self.account(account).available;
        let next = checked_add(current, amount)?;
        self.supply.record_credit(amount)?;
        self.accounts.entry(account).or_default().available = next;
        Ok(())
    }

    /// Set the standing allowance (replaces, does not add). Zero revokes.
    ///
    /// # Errors
    /// `InvalidAmount` for negative or fractional amounts;
    /// `InsufficientFunds` if `amount` exceeds the available balance.
    pub fn approve(&mut self, account: AccountId, amount: Decimal) -> Result<()> {
        ensure_non_negative_amount(amount)?;
        let available = self.account(account).available;
        if amount > available {
            return Err(EscrowError::InsufficientFunds {
                needed: amount,
                available,
            });
        }
        if let Some(entry) = self.accounts.get_mut(&account) {
            entry.allowance = amount;
        }
        Ok(())
    }

    /// Drop the allowance to zero.
    pub fn revoke(&mut self, account: AccountId) {
        if let Some(entry) = self.accounts.get_mut(&account) {
            entry.allowance = Decimal::ZERO;
        }
    }

    /// Freeze funds (available → frozen), consuming allowance.
    ///
    /// # Errors
    /// `InvalidAmount`, `InsufficientFunds` if available < amount, then
    /// `InsufficientAllowance` if allowance < amount.
    pub fn freeze(&mut self, account: AccountId, amount: Decimal) -> Result<()> {
        ensure_positive_amount(amount)?;
        let entry = self
            .accounts
            .get_mut(&account)
            .ok_or(EscrowError::InsufficientFunds {
                needed: amount,
                available: Decimal::ZERO,
            })?;

        if entry.available < amount {
            return Err(EscrowError::InsufficientFunds {
                needed: amount,
                available: entry.available,
            });
        }
        if entry.allowance < amount {
            return Err(EscrowError::InsufficientAllowance {
                needed: amount,
                allowance: entry.allowance,
            });
        }

        entry.available -= amount;
        entry.frozen += amount;
        entry.allowance -= amount;
        Ok(())
    }

    /// Release frozen funds of `from` to the available balance of `to`.
    /// `from == to` returns the funds to their owner. Allowance is untouched.
    ///
    /// # Errors
    /// `InvalidAmount`, or `InsufficientFrozenFunds` if frozen < amount.
    pub fn release(&mut self, from: AccountId, to: AccountId, amount: Decimal) -> Result<()> {
        ensure_positive_amount(amount)?;
        self.take_frozen(from, amount)?;
        self.deposit_released(to, amount);
        Ok(())
    }

    /// Release `amount_a` to `a` and `amount_b` to `b` from the same frozen
    /// pool, atomically. One leg may be zero; the sum must be positive.
    ///
    /// # Errors
    /// `InvalidAmount` for a negative or fractional leg or a zero sum;
    /// `InsufficientFrozenFunds` if frozen < sum.
    pub fn split(
        &mut self,
        from: AccountId,
        a: AccountId,
        b: AccountId,
        amount_a: Decimal,
        amount_b: Decimal,
    ) -> Result<()> {
        ensure_non_negative_amount(amount_a)?;
        ensure_non_negative_amount(amount_b)?;
        let total = checked_add(amount_a, amount_b)?;
        ensure_positive_amount(total)?;

        self.take_frozen(from, total)?;
        self.deposit_released(a, amount_a);
        self.deposit_released(b, amount_b);
        Ok(())
    }

    /// Withdraw funds out of custody. The allowance is clamped to the new
    /// available balance.
    ///
    /// # Errors
    /// `InvalidAmount`, or `InsufficientFunds` if available < amount.
    pub fn withdraw(&mut self, account: AccountId, amount: Decimal) -> Result<()> {
        ensure_positive_amount(amount)?;
        let entry = self
            .accounts
            .get_mut(&account)
            .ok_or(EscrowError::InsufficientFunds {
                needed: amount,
                available: Decimal::ZERO,
            })?;

        if entry.available < amount {
            return Err(EscrowError::InsufficientFunds {
                needed: amount,
                available: entry.available,
            });
        }

        entry.available -= amount;
        entry.allowance = entry.allowance.min(entry.available);
        self.supply.record_withdrawal(amount);
        Ok(())
    }

    /// Snapshot of an account. Unknown accounts read as zero.
    #[must_use]
    pub fn account(&self, account: AccountId) -> Account {
        self.accounts.get(&account).cloned().unwrap_or_default()
    }

    /// Sum of `available + frozen` over every account.
    #[must_use]
    pub fn total_supply(&self) -> Decimal {
        self.accounts.values().map(Account::total).sum()
    }

    /// Sum of frozen balances over every account.
    #[must_use]
    pub fn total_frozen(&self) -> Decimal {
        self.accounts.values().map(|a| a.frozen).sum()
    }

    /// Number of accounts that have ever been credited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Credit/withdrawal totals.
    #[must_use]
    pub fn supply(&self) -> &SupplyConservation {
        &self.supply
    }

    /// Check `Σ(available + frozen) == credits − withdrawals`.
    ///
    /// # Errors
    /// Returns `SupplyInvariantViolation` on mismatch.
    pub fn verify_conservation(&self) -> Result<()> {
        let result = self.supply.verify(self.total_supply());
        if let Err(ref err) = result {
            tracing::warn!(error = %err, "Supply conservation check failed");
        }
        result
    }

    fn take_frozen(&mut self, from: AccountId, amount: Decimal) -> Result<()> {
        let entry = self
            .accounts
            .get_mut(&from)
            .ok_or(EscrowError::InsufficientFrozenFunds {
                needed: amount,
                frozen: Decimal::ZERO,
            })?;

        if entry.frozen < amount {
            return Err(EscrowError::InsufficientFrozenFunds {
                needed: amount,
                frozen: entry.frozen,
            });
        }

        entry.frozen -= amount;
        Ok(())
    }

    /// Infallible: the receiving balance is bounded by total credited supply,
    /// which `record_credit` keeps within range.
    fn deposit_released(&mut self, to: AccountId, amount: Decimal) {
        if amount.is_zero() {
            return;
        }
        self.accounts.entry(to).or_default().available += amount;
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn funded(amount: i64, allowance: i64) -> (Ledger, AccountId) {
        let mut ledger = Ledger::new();
        let owner = AccountId::new();
        ledger.credit(owner, dec(amount)).unwrap();
        ledger.approve(owner, dec(allowance)).unwrap();
        (ledger, owner)
    }

    #[test]
    fn credit_increases_available() {
        let mut ledger = Ledger::new();
        let user = AccountId::new();
        ledger.credit(user, dec(200)).unwrap();
        let acct = ledger.account(user);
        assert_eq!(acct.available, dec(200));
        assert_eq!(acct.frozen, Decimal::ZERO);
        assert_eq!(acct.allowance, Decimal::ZERO);
    }

    #[test]
    fn credit_rejects_non_positive_and_fractional() {
        let mut ledger = Ledger::new();
        let user = AccountId::new();
        for bad in [Decimal::ZERO, dec(-5), Decimal::new(15, 1)] {
            let err = ledger.credit(user, bad).unwrap_err();
            assert!(matches!(err, EscrowError::InvalidAmount { .. }));
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn credit_overflow_leaves_balance_unchanged() {
        let mut ledger = Ledger::new();
        let user = AccountId::new();
        ledger.credit(user, Decimal::MAX.trunc()).unwrap();
        let err = ledger.credit(user, dec(1)).unwrap_err();
        assert!(matches!(err, EscrowError::InvalidAmount { .. }));
        assert_eq!(ledger.account(user).available, Decimal::MAX.trunc());
        assert!(ledger.verify_conservation().is_ok());
    }

    #[test]
    fn approve_replaces_and_zero_revokes() {
        let (mut ledger, owner) = funded(200, 100);
        assert_eq!(ledger.account(owner).allowance, dec(100));
        ledger.approve(owner, dec(40)).unwrap();
        assert_eq!(ledger.account(owner).allowance, dec(40));
        ledger.approve(owner, Decimal::ZERO).unwrap();
        assert_eq!(ledger.account(owner).allowance, Decimal::ZERO);
    }

    #[test]
    fn approve_above_available_fails() {
        let (mut ledger, owner) = funded(100, 50);
        let err = ledger.approve(owner, dec(101)).unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds { .. }));
        assert_eq!(ledger.account(owner).allowance, dec(50));
    }

    #[test]
    fn revoke_clears_allowance() {
        let (mut ledger, owner) = funded(100, 50);
        ledger.revoke(owner);
        let err = ledger.freeze(owner, dec(10)).unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientAllowance { .. }));
    }

    #[test]
    fn freeze_moves_to_frozen_and_consumes_allowance() {
        let (mut ledger, owner) = funded(200, 100);
        ledger.freeze(owner, dec(25)).unwrap();
        ledger.freeze(owner, dec(25)).unwrap();
        let acct = ledger.account(owner);
        assert_eq!(acct.available, dec(150));
        assert_eq!(acct.frozen, dec(50));
        assert_eq!(acct.allowance, dec(50));
    }

    #[test]
    fn freeze_insufficient_funds_fails() {
        let (mut ledger, owner) = funded(100, 100);
        let err = ledger.freeze(owner, dec(200)).unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds { .. }));
        assert_eq!(ledger.account(owner).available, dec(100));
    }

    #[test]
    fn freeze_unknown_account_fails() {
        let mut ledger = Ledger::new();
        let err = ledger.freeze(AccountId::new(), dec(1)).unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds { .. }));
    }

    #[test]
    fn freeze_beyond_allowance_fails() {
        let (mut ledger, owner) = funded(200, 30);
        let err = ledger.freeze(owner, dec(31)).unwrap_err();
        assert!(matches!(
            err,
            EscrowError::InsufficientAllowance { allowance, .. } if allowance == dec(30)
        ));
        let acct = ledger.account(owner);
        assert_eq!(acct.frozen, Decimal::ZERO);
        assert_eq!(acct.available, dec(200));
    }

    #[test]
    fn release_pays_counterparty_without_restoring_allowance() {
        let (mut ledger, owner) = funded(200, 100);
        let provider = AccountId::new();
        ledger.freeze(owner, dec(25)).unwrap();
        ledger.release(owner, provider, dec(25)).unwrap();

        let o = ledger.account(owner);
        assert_eq!(o.available, dec(175));
        assert_eq!(o.frozen, Decimal::ZERO);
        assert_eq!(o.allowance, dec(75));
        assert_eq!(ledger.account(provider).available, dec(25));
        assert!(ledger.verify_conservation().is_ok());
    }

    #[test]
    fn release_to_self_refunds() {
        let (mut ledger, owner) = funded(100, 100);
        ledger.freeze(owner, dec(40)).unwrap();
        ledger.release(owner, owner, dec(40)).unwrap();
        let acct = ledger.account(owner);
        assert_eq!(acct.available, dec(100));
        assert_eq!(acct.frozen, Decimal::ZERO);
        assert_eq!(acct.allowance, dec(60));
    }

    #[test]
    fn release_more_than_frozen_fails() {
        let (mut ledger, owner) = funded(100, 100);
        ledger.freeze(owner, dec(10)).unwrap();
        let err = ledger.release(owner, AccountId::new(), dec(11)).unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFrozenFunds { .. }));
        assert_eq!(ledger.account(owner).frozen, dec(10));
    }

    #[test]
    fn split_pays_both_legs_from_one_pool() {
        let (mut ledger, owner) = funded(100, 100);
        let provider = AccountId::new();
        ledger.freeze(owner, dec(25)).unwrap();
        ledger
            .split(owner, provider, owner, dec(13), dec(12))
            .unwrap();
        assert_eq!(ledger.account(provider).available, dec(13));
        let o = ledger.account(owner);
        assert_eq!(o.available, dec(87));
        assert_eq!(o.frozen, Decimal::ZERO);
        assert!(ledger.verify_conservation().is_ok());
    }

    #[test]
    fn split_allows_one_zero_leg() {
        let (mut ledger, owner) = funded(10, 10);
        let provider = AccountId::new();
        ledger.freeze(owner, dec(1)).unwrap();
        ledger
            .split(owner, provider, owner, dec(1), Decimal::ZERO)
            .unwrap();
        assert_eq!(ledger.account(provider).available, dec(1));
        assert_eq!(ledger.account(owner).frozen, Decimal::ZERO);
    }

    #[test]
    fn split_is_all_or_nothing() {
        let (mut ledger, owner) = funded(100, 100);
        let provider = AccountId::new();
        ledger.freeze(owner, dec(20)).unwrap();

        let err = ledger
            .split(owner, provider, owner, dec(15), dec(10))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFrozenFunds { .. }));
        assert_eq!(ledger.account(owner).frozen, dec(20));
        assert!(ledger.account(provider).is_zero());

        let err = ledger
            .split(owner, provider, owner, Decimal::ZERO, Decimal::ZERO)
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidAmount { .. }));

        let err = ledger
            .split(owner, provider, owner, dec(-1), dec(5))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidAmount { .. }));
        assert_eq!(ledger.account(owner).frozen, dec(20));
    }

    #[test]
    fn withdraw_clamps_allowance() {
        let (mut ledger, owner) = funded(100, 80);
        ledger.withdraw(owner, dec(50)).unwrap();
        let acct = ledger.account(owner);
        assert_eq!(acct.available, dec(50));
        assert_eq!(acct.allowance, dec(50));
        assert_eq!(ledger.total_supply(), dec(50));
        assert!(ledger.verify_conservation().is_ok());
    }

    #[test]
    fn withdraw_cannot_touch_frozen() {
        let (mut ledger, owner) = funded(100, 100);
        ledger.freeze(owner, dec(60)).unwrap();
        let err = ledger.withdraw(owner, dec(41)).unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds { .. }));
    }

    #[test]
    fn total_supply_and_frozen_sum_all_accounts() {
        let mut ledger = Ledger::new();
        let u1 = AccountId::new();
        let u2 = AccountId::new();
        ledger.credit(u1, dec(1000)).unwrap();
        ledger.credit(u2, dec(500)).unwrap();
        ledger.approve(u1, dec(300)).unwrap();
        ledger.freeze(u1, dec(300)).unwrap();
        assert_eq!(ledger.total_supply(), dec(1500));
        assert_eq!(ledger.total_frozen(), dec(300));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn nonexistent_account_is_zero() {
        let ledger = Ledger::new();
        assert!(ledger.account(AccountId::new()).is_zero());
    }

    /// Random operation sequences never break conservation or let the
    /// allowance exceed the available balance.
    #[test]
    fn randomized_operations_conserve_supply() {
        let mut rng = StdRng::seed_from_u64(0x00e5_c0de);
        let users: Vec<AccountId> = (0..5).map(|_| AccountId::new()).collect();
        let mut ledger = Ledger::new();

        for _ in 0..2_000 {
            let a = users[rng.gen_range(0..users.len())];
            let b = users[rng.gen_range(0..users.len())];
            let amount = dec(rng.gen_range(0..60));
            let before = ledger.total_supply();

            let result = match rng.gen_range(0..7) {
                0 => ledger.credit(a, amount),
                1 => ledger.approve(a, amount),
                2 => ledger.freeze(a, amount),
                3 => ledger.release(a, b, amount),
                4 => {
                    let half = (amount / Decimal::TWO).floor();
                    ledger.split(a, a, b, half, amount - half)
                }
                5 => ledger.withdraw(a, amount),
                _ => {
                    ledger.revoke(a);
                    Ok(())
                }
            };

            if result.is_err() {
                assert_eq!(ledger.total_supply(), before, "failed op changed supply");
            }
            ledger.verify_conservation().unwrap();
            for u in &users {
                let acct = ledger.account(*u);
                assert!(acct.allowance <= acct.available);
                assert!(acct.frozen >= Decimal::ZERO);
            }
        }
    }
}
