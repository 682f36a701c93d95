//! Settlement guard: prevents double-settlement of a milestone.
//!
//! Each milestone's frozen price may leave escrow exactly once, whether by
//! verification, conflict resolution, or a delete refund. A second attempt
//! on the same [`MilestoneKey`] returns [`EscrowError::AlreadySettled`].
//!
//! Unlike a trade cache the set is unbounded: milestones are few and are
//! retained for audit anyway.

use std::collections::BTreeSet;

use openescrow_types::{EscrowError, MilestoneKey, Result};

#[derive(Debug, Default)]
pub struct SettlementGuard {
    settled: BTreeSet<MilestoneKey>,
}

impl SettlementGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if `key` was already settled, without recording anything.
    ///
    /// # Errors
    /// Returns [`EscrowError::AlreadySettled`].
    pub fn check(&self, key: MilestoneKey) -> Result<()> {
        if self.settled.contains(&key) {
            return Err(EscrowError::AlreadySettled(key));
        }
        Ok(())
    }

    /// Mark a milestone as settled.
    ///
    /// # Errors
    /// Returns [`EscrowError::AlreadySettled`] if `key` is already marked.
    pub fn mark_settled(&mut self, key: MilestoneKey) -> Result<()> {
        if !self.settled.insert(key) {
            return Err(EscrowError::AlreadySettled(key));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_settled(&self, key: &MilestoneKey) -> bool {
        self.settled.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.settled.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_settle_ok() {
        let mut guard = SettlementGuard::new();
        let key = MilestoneKey::new(0, 0, 0);
        assert!(guard.check(key).is_ok());
        guard.mark_settled(key).unwrap();
        assert!(guard.is_settled(&key));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn double_settle_blocked() {
        let mut guard = SettlementGuard::new();
        let key = MilestoneKey::new(1, 2, 3);
        guard.mark_settled(key).unwrap();

        let err = guard.mark_settled(key).unwrap_err();
        assert!(
            matches!(err, EscrowError::AlreadySettled(k) if k == key),
            "Expected AlreadySettled, got: {err:?}"
        );
        assert!(matches!(guard.check(key), Err(EscrowError::AlreadySettled(_))));
    }

    #[test]
    fn sibling_milestones_independent() {
        let mut guard = SettlementGuard::new();
        guard.mark_settled(MilestoneKey::new(0, 0, 0)).unwrap();
        guard.mark_settled(MilestoneKey::new(0, 0, 1)).unwrap();
        guard.mark_settled(MilestoneKey::new(0, 1, 0)).unwrap();
        assert_eq!(guard.len(), 3);
        assert!(!guard.is_settled(&MilestoneKey::new(1, 0, 0)));
    }

    #[test]
    fn empty_guard() {
        let guard = SettlementGuard::new();
        assert!(guard.is_empty());
        assert_eq!(guard.len(), 0);
    }
}
