//! # Milestone: the priced unit of escrowed work
//!
//! A milestone is created by the project owner with a fixed price. The price
//! is frozen on the owner's account at creation and stays frozen until the
//! milestone settles.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐ take  ┌─────────┐ accept ┌──────────┐ complete ┌───────────┐ verify ┌──────────┐
//!   │ CREATED ├──────▶│ PENDING ├───────▶│ ACCEPTED ├─────────▶│ COMPLETED ├───────▶│ VERIFIED │
//!   └──┬──────┘◀──────┴──┬──────┘ reject └──────────┘          └─────┬─────┘        └──────────┘
//!      │ delete          │ delete                                    │ dispute            ▲
//!      ▼                 ▼                                           ▼                    │
//!   ┌─────────┐                                              ┌──────────┐ settle ┌──────┴───┐
//!   │ DELETED │                                              │ CONFLICT ├───────▶│ RESOLVED │
//!   └─────────┘                                              └──────────┘        └──────┬───┘
//!                                                                                       ▼
//!                                                                                ┌────────────┐
//!                                                                                │ TERMINATED │
//!                                                                                └────────────┘
//! ```
//!
//! `VERIFIED`, `TERMINATED` and `DELETED` are terminal. Settled milestones
//! are never removed; reviews reference them.
//!
//! A milestone in `CONFLICT` has exactly one conflict record, stored by the
//! conflict resolver under the same [`MilestoneKey`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, EscrowError, MilestoneKey, Result};

/// The lifecycle state of a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MilestoneState {
    /// Price frozen; no provider has claimed the service yet.
    Created,
    /// A provider has requested the parent service.
    Pending,
    /// The owner accepted the request; provider is bound.
    Accepted,
    /// The provider reports the work done; awaiting owner verification.
    Completed,
    /// Owner verified; price released to the provider. Terminal.
    Verified,
    /// The owner disputed the completion; a conflict vote is open.
    Conflict,
    /// Conflict tally settled; transient step before the terminal state.
    Resolved,
    /// Settled through a split or requester refund. Terminal.
    Terminated,
    /// Cancelled by the owner before acceptance; price refunded. Terminal.
    Deleted,
}

impl MilestoneState {
    /// Can a milestone move from `self` to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Pending | Self::Deleted)
                | (Self::Pending, Self::Accepted | Self::Created | Self::Deleted)
                | (Self::Accepted, Self::Completed)
                | (Self::Completed, Self::Verified | Self::Conflict)
                | (Self::Conflict, Self::Resolved)
                | (Self::Resolved, Self::Verified | Self::Terminated)
        )
    }

    /// Funds have reached their final resting balance.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Verified | Self::Terminated)
    }

    /// No further transitions are possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Terminated | Self::Deleted)
    }

    /// The price is still frozen on the owner's account.
    #[must_use]
    pub fn holds_funds(&self) -> bool {
        !self.is_terminal()
    }

    /// Title and description may still be edited.
    #[must_use]
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Created | Self::Pending)
    }
}

impl std::fmt::Display for MilestoneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Pending => write!(f, "PENDING"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Verified => write!(f, "VERIFIED"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Terminated => write!(f, "TERMINATED"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A priced milestone under a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    /// `(project, service, index)` address.
    pub key: MilestoneKey,
    /// The project owner whose funds are frozen.
    pub owner: AccountId,
    pub title: String,
    pub description: String,
    /// Fixed at creation, never edited.
    pub price: Decimal,
    /// Bound when the owner accepts the service request.
    pub provider: Option<AccountId>,
    /// Current lifecycle state.
    pub state: MilestoneState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Milestone {
    /// Check that moving to `target` is allowed, without mutating.
    ///
    /// # Errors
    /// - `AlreadyVerified` if the milestone is verified and `target` is `Verified`
    /// - `InvalidTransition` for any other disallowed move
    pub fn check_transition(&self, target: MilestoneState) -> Result<()> {
        if self.state == MilestoneState::Verified && target == MilestoneState::Verified {
            return Err(EscrowError::AlreadyVerified(self.key));
        }
        if !self.state.can_transition_to(target) {
            return Err(EscrowError::invalid_transition(
                format!("milestone {}", self.key),
                self.state,
                target,
            ));
        }
        Ok(())
    }

    /// Move to `target` if allowed.
    ///
    /// # Errors
    /// Same as [`Milestone::check_transition`].
    pub fn advance(&mut self, target: MilestoneState) -> Result<()> {
        self.check_transition(target)?;
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The bound provider, or `NotFound` when the service was never accepted.
    ///
    /// # Errors
    /// Returns `NotFound` if no provider is bound.
    pub fn bound_provider(&self) -> Result<AccountId> {
        self.provider
            .ok_or_else(|| EscrowError::not_found(format!("provider for milestone {}", self.key)))
    }
}

/// Dummy milestone for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Milestone {
    /// Create a milestone in `Created` state with the given price.
    pub fn dummy(key: MilestoneKey, owner: AccountId, price: Decimal) -> Self {
        Self {
            key,
            owner,
            title: format!("milestone {key}"),
            description: String::new(),
            price,
            provider: None,
            state: MilestoneState::Created,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_milestone() -> Milestone {
        Milestone::dummy(MilestoneKey::new(0, 0, 0), AccountId::new(), Decimal::new(25, 0))
    }

    #[test]
    fn happy_path_transitions_valid() {
        use MilestoneState::*;
        assert!(Created.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Verified));
    }

    #[test]
    fn conflict_branch_transitions_valid() {
        use MilestoneState::*;
        assert!(Completed.can_transition_to(Conflict));
        assert!(Conflict.can_transition_to(Resolved));
        assert!(Resolved.can_transition_to(Terminated));
        assert!(Resolved.can_transition_to(Verified));
    }

    #[test]
    fn skipping_states_is_invalid() {
        use MilestoneState::*;
        assert!(!Created.can_transition_to(Accepted));
        assert!(!Created.can_transition_to(Completed));
        assert!(!Accepted.can_transition_to(Verified));
        assert!(!Conflict.can_transition_to(Verified));
        assert!(!Conflict.can_transition_to(Terminated));
        assert!(!Accepted.can_transition_to(Deleted));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        use MilestoneState::*;
        let all = [
            Created, Pending, Accepted, Completed, Verified, Conflict, Resolved, Terminated,
            Deleted,
        ];
        for terminal in [Verified, Terminated, Deleted] {
            assert!(terminal.is_terminal());
            for target in all {
                assert!(
                    !terminal.can_transition_to(target),
                    "{terminal} -> {target} must be rejected"
                );
            }
        }
    }

    #[test]
    fn settled_means_verified_or_terminated() {
        assert!(MilestoneState::Verified.is_settled());
        assert!(MilestoneState::Terminated.is_settled());
        assert!(!MilestoneState::Deleted.is_settled());
        assert!(!MilestoneState::Conflict.is_settled());
    }

    #[test]
    fn advance_updates_state() {
        let mut m = make_milestone();
        m.advance(MilestoneState::Pending).unwrap();
        assert_eq!(m.state, MilestoneState::Pending);
    }

    #[test]
    fn complete_from_created_is_invalid_transition() {
        let mut m = make_milestone();
        let err = m.advance(MilestoneState::Completed).unwrap_err();
        assert!(matches!(err, EscrowError::InvalidTransition { .. }));
        assert_eq!(m.state, MilestoneState::Created, "state must be unchanged");
    }

    #[test]
    fn verify_twice_is_already_verified() {
        let mut m = make_milestone();
        m.state = MilestoneState::Completed;
        m.advance(MilestoneState::Verified).unwrap();
        let err = m.advance(MilestoneState::Verified).unwrap_err();
        assert_eq!(err, EscrowError::AlreadyVerified(m.key));
    }

    #[test]
    fn bound_provider_missing_is_not_found() {
        let m = make_milestone();
        assert!(matches!(
            m.bound_provider().unwrap_err(),
            EscrowError::NotFound { .. }
        ));
    }

    #[test]
    fn state_display() {
        assert_eq!(MilestoneState::Terminated.to_string(), "TERMINATED");
        assert_eq!(MilestoneState::Accepted.to_string(), "ACCEPTED");
    }

    #[test]
    fn serde_roundtrip() {
        let m = make_milestone();
        let json = serde_json::to_string(&m).unwrap();
        let back: Milestone = serde_json::from_str(&json).unwrap();
        assert_eq!(m.key, back.key);
        assert_eq!(m.price, back.price);
        assert_eq!(m.state, back.state);
    }
}
