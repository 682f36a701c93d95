//! Domain events emitted by the escrow controller.
//!
//! Every event carries the full `(project, service, milestone)` addressing
//! tuple (or the service key for service-level events). Events are emitted
//! only after the operation has fully committed; a rejected call emits
//! nothing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    AccountId, ConflictOutcome, MilestoneKey, ReviewDirection, ServiceKey, VoteChoice,
};

/// Observable domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EscrowEvent {
    MilestoneCreated {
        key: MilestoneKey,
        title: String,
        price: Decimal,
    },
    MilestoneUpdated {
        key: MilestoneKey,
        title: String,
    },
    MilestoneDeleted {
        key: MilestoneKey,
        refunded: Decimal,
    },
    MilestoneCompleted {
        key: MilestoneKey,
        provider: AccountId,
    },
    MilestoneVerified {
        key: MilestoneKey,
        provider: AccountId,
        amount: Decimal,
    },
    ServiceTaken {
        key: ServiceKey,
        provider: AccountId,
    },
    ServiceAccepted {
        key: ServiceKey,
        provider: AccountId,
    },
    ServiceRejected {
        key: ServiceKey,
        provider: AccountId,
    },
    ServiceCompleted {
        key: ServiceKey,
        provider: AccountId,
    },
    ConflictCreated {
        key: MilestoneKey,
        raiser: AccountId,
        respondent: AccountId,
        total_voters: u32,
    },
    VotingStarted {
        key: MilestoneKey,
    },
    ConflictVoted {
        key: MilestoneKey,
        voter: AccountId,
        choice: VoteChoice,
    },
    ConflictResult {
        key: MilestoneKey,
        outcome: ConflictOutcome,
    },
    ReviewRecorded {
        key: MilestoneKey,
        reviewer: AccountId,
        reviewee: AccountId,
        direction: ReviewDirection,
        rating: u8,
    },
}

impl EscrowEvent {
    /// The service this event concerns.
    #[must_use]
    pub fn service_key(&self) -> ServiceKey {
        match self {
            Self::ServiceTaken { key, .. }
            | Self::ServiceAccepted { key, .. }
            | Self::ServiceRejected { key, .. }
            | Self::ServiceCompleted { key, .. } => *key,
            Self::MilestoneCreated { key, .. }
            | Self::MilestoneUpdated { key, .. }
            | Self::MilestoneDeleted { key, .. }
            | Self::MilestoneCompleted { key, .. }
            | Self::MilestoneVerified { key, .. }
            | Self::ConflictCreated { key, .. }
            | Self::VotingStarted { key }
            | Self::ConflictVoted { key, .. }
            | Self::ConflictResult { key, .. }
            | Self::ReviewRecorded { key, .. } => key.service_key(),
        }
    }

    /// The milestone this event concerns, if it is milestone-level.
    #[must_use]
    pub fn milestone_key(&self) -> Option<MilestoneKey> {
        match self {
            Self::ServiceTaken { .. }
            | Self::ServiceAccepted { .. }
            | Self::ServiceRejected { .. }
            | Self::ServiceCompleted { .. } => None,
            Self::MilestoneCreated { key, .. }
            | Self::MilestoneUpdated { key, .. }
            | Self::MilestoneDeleted { key, .. }
            | Self::MilestoneCompleted { key, .. }
            | Self::MilestoneVerified { key, .. }
            | Self::ConflictCreated { key, .. }
            | Self::VotingStarted { key }
            | Self::ConflictVoted { key, .. }
            | Self::ConflictResult { key, .. }
            | Self::ReviewRecorded { key, .. } => Some(*key),
        }
    }

    /// Stable snake_case name, matching the serialized `event` tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::MilestoneCreated { .. } => "milestone_created",
            Self::MilestoneUpdated { .. } => "milestone_updated",
            Self::MilestoneDeleted { .. } => "milestone_deleted",
            Self::MilestoneCompleted { .. } => "milestone_completed",
            Self::MilestoneVerified { .. } => "milestone_verified",
            Self::ServiceTaken { .. } => "service_taken",
            Self::ServiceAccepted { .. } => "service_accepted",
            Self::ServiceRejected { .. } => "service_rejected",
            Self::ServiceCompleted { .. } => "service_completed",
            Self::ConflictCreated { .. } => "conflict_created",
            Self::VotingStarted { .. } => "voting_started",
            Self::ConflictVoted { .. } => "conflict_voted",
            Self::ConflictResult { .. } => "conflict_result",
            Self::ReviewRecorded { .. } => "review_recorded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConflictVerdict, RemainderRecipient, RequesterAward};

    #[test]
    fn milestone_event_addresses() {
        let key = MilestoneKey::new(0, 1, 2);
        let ev = EscrowEvent::ConflictVoted {
            key,
            voter: AccountId::new(),
            choice: VoteChoice::ForProvider,
        };
        assert_eq!(ev.milestone_key(), Some(key));
        assert_eq!(ev.service_key(), ServiceKey::new(0, 1));
    }

    #[test]
    fn service_event_has_no_milestone() {
        let ev = EscrowEvent::ServiceAccepted {
            key: ServiceKey::new(4, 2),
            provider: AccountId::new(),
        };
        assert_eq!(ev.milestone_key(), None);
        assert_eq!(ev.service_key(), ServiceKey::new(4, 2));
    }

    #[test]
    fn name_matches_serde_tag() {
        let ev = EscrowEvent::ConflictResult {
            key: MilestoneKey::new(0, 1, 0),
            outcome: ConflictOutcome::tally(
                1,
                0,
                Decimal::new(20, 0),
                RemainderRecipient::Provider,
                RequesterAward::Refund,
            ),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], ev.name());
        let back: EscrowEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
        match back {
            EscrowEvent::ConflictResult { outcome, .. } => {
                assert_eq!(outcome.verdict, ConflictVerdict::ProviderAwarded);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
