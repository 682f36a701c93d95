//! Service escrow aggregate.
//!
//! A service groups the ordered milestones of one `(project, service)` pair
//! and carries the provider assignment. Its state is derived from, but not
//! identical to, its milestones' states:
//!
//! ```text
//! CREATED ──take──▶ PENDING ──accept──▶ ACCEPTED ──complete──▶ COMPLETED
//!    ▲                 │
//!    └─────reject──────┘
//! ```
//!
//! A service can only be completed once every live milestone is settled.

use serde::{Deserialize, Serialize};

use crate::{AccountId, EscrowError, Milestone, MilestoneState, Result, ServiceKey};

/// Aggregate state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    /// Open for a provider to take.
    Created,
    /// A provider requested it; awaiting the owner.
    Pending,
    /// The owner accepted; provider bound to every milestone.
    Accepted,
    /// All milestones settled and the provider closed the service. Terminal.
    Completed,
}

impl ServiceState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Pending)
                | (Self::Pending, Self::Accepted | Self::Created)
                | (Self::Accepted, Self::Completed)
        )
    }

    /// The milestone state a milestone created under this service starts in.
    #[must_use]
    pub fn initial_milestone_state(&self) -> Option<MilestoneState> {
        match self {
            Self::Created => Some(MilestoneState::Created),
            Self::Pending => Some(MilestoneState::Pending),
            Self::Accepted => Some(MilestoneState::Accepted),
            Self::Completed => None,
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Pending => write!(f, "PENDING"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Escrow-side view of a service: provider assignment plus its milestones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEscrow {
    pub key: ServiceKey,
    /// Project owner; the account whose funds back every milestone.
    pub owner: AccountId,
    /// The provider that took the request (candidate until accepted).
    pub provider: Option<AccountId>,
    pub state: ServiceState,
    /// Milestones in creation order; a milestone's index is its position.
    pub milestones: Vec<Milestone>,
}

impl ServiceEscrow {
    #[must_use]
    pub fn new(key: ServiceKey, owner: AccountId) -> Self {
        Self {
            key,
            owner,
            provider: None,
            state: ServiceState::Created,
            milestones: Vec::new(),
        }
    }

    /// Check that moving the service to `target` is allowed.
    ///
    /// # Errors
    /// Returns `InvalidTransition` otherwise.
    pub fn check_transition(&self, target: ServiceState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(EscrowError::invalid_transition(
                format!("service {}", self.key),
                self.state,
                target,
            ));
        }
        Ok(())
    }

    /// Index the next milestone will receive.
    #[must_use]
    pub fn next_index(&self) -> u32 {
        u32::try_from(self.milestones.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn milestone(&self, index: u32) -> Option<&Milestone> {
        self.milestones.get(index as usize)
    }

    pub fn milestone_mut(&mut self, index: u32) -> Option<&mut Milestone> {
        self.milestones.get_mut(index as usize)
    }

    /// Milestones that were not soft-deleted.
    pub fn live_milestones(&self) -> impl Iterator<Item = &Milestone> {
        self.milestones
            .iter()
            .filter(|m| m.state != MilestoneState::Deleted)
    }

    /// Number of milestones counted against the per-service cap.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live_milestones().count()
    }

    /// Every live milestone is Verified or Terminated.
    #[must_use]
    pub fn all_settled(&self) -> bool {
        self.live_milestones().all(|m| m.state.is_settled())
    }

    /// First live milestone that is not yet settled, if any.
    #[must_use]
    pub fn first_unsettled(&self) -> Option<&Milestone> {
        self.live_milestones().find(|m| !m.state.is_settled())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn make_service(prices: &[i64]) -> ServiceEscrow {
        let key = ServiceKey::new(0, 0);
        let owner = AccountId::new();
        let mut svc = ServiceEscrow::new(key, owner);
        for &p in prices {
            let idx = svc.next_index();
            svc.milestones
                .push(Milestone::dummy(key.milestone(idx), owner, Decimal::new(p, 0)));
        }
        svc
    }

    #[test]
    fn service_transitions() {
        assert!(ServiceState::Created.can_transition_to(ServiceState::Pending));
        assert!(ServiceState::Pending.can_transition_to(ServiceState::Accepted));
        assert!(ServiceState::Pending.can_transition_to(ServiceState::Created));
        assert!(ServiceState::Accepted.can_transition_to(ServiceState::Completed));
        assert!(!ServiceState::Created.can_transition_to(ServiceState::Accepted));
        assert!(!ServiceState::Completed.can_transition_to(ServiceState::Created));
    }

    #[test]
    fn initial_milestone_state_follows_service() {
        assert_eq!(
            ServiceState::Accepted.initial_milestone_state(),
            Some(MilestoneState::Accepted)
        );
        assert_eq!(ServiceState::Completed.initial_milestone_state(), None);
    }

    #[test]
    fn indices_follow_insertion_order() {
        let svc = make_service(&[25, 25, 10]);
        assert_eq!(svc.next_index(), 3);
        assert_eq!(svc.milestone(2).unwrap().price, Decimal::new(10, 0));
        assert!(svc.milestone(3).is_none());
    }

    #[test]
    fn all_settled_ignores_deleted() {
        let mut svc = make_service(&[25, 25]);
        assert!(!svc.all_settled());
        svc.milestones[0].state = MilestoneState::Verified;
        svc.milestones[1].state = MilestoneState::Deleted;
        assert!(svc.all_settled());
        assert_eq!(svc.live_count(), 1);
    }

    #[test]
    fn first_unsettled_reports_blocker() {
        let mut svc = make_service(&[25, 25]);
        svc.milestones[0].state = MilestoneState::Terminated;
        let blocker = svc.first_unsettled().unwrap();
        assert_eq!(blocker.key.index, 1);
    }

    #[test]
    fn check_transition_error() {
        let svc = make_service(&[]);
        let err = svc.check_transition(ServiceState::Completed).unwrap_err();
        assert!(matches!(err, EscrowError::InvalidTransition { .. }));
    }
}
