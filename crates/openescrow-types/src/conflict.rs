//! # Conflict: vote-settled milestone disputes
//!
//! When the owner disputes a completed milestone, a [`Conflict`] is opened
//! under the milestone's key. The raiser declares the voter count up front;
//! the tally is a pure function of the votes cast and that count, so there
//! is no clock and no separate "close voting" step.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐ start_vote ┌────────┐ final vote + settlement ┌──────────┐
//!   │ CREATED ├───────────▶│ VOTING ├────────────────────────▶│ RESOLVED │
//!   └─────────┘            └────────┘                         └──────────┘
//! ```
//!
//! ## Tally rule
//!
//! | Votes                      | Payout                                     |
//! |----------------------------|--------------------------------------------|
//! | all `ForProvider`          | full price to provider                     |
//! | all `ForRequester`         | full price back to requester (or 50/50)    |
//! | mixed                      | 50/50, odd remainder per config            |

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, EscrowError, MilestoneKey, RemainderRecipient, RequesterAward, Result};

/// Lifecycle state of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictState {
    /// Opened by the raiser; votes not accepted yet.
    Created,
    /// Accepting votes until `total_voters` have voted.
    Voting,
    /// Tally finalized and payment settled. Terminal.
    Resolved,
}

impl ConflictState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Voting) | (Self::Voting, Self::Resolved)
        )
    }
}

impl std::fmt::Display for ConflictState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Voting => write!(f, "VOTING"),
            Self::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// A single voter's choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteChoice {
    /// The requester (project owner) is right; work not acceptable.
    ForRequester,
    /// The provider delivered; release the funds.
    ForProvider,
}

impl std::fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForRequester => write!(f, "FOR_REQUESTER"),
            Self::ForProvider => write!(f, "FOR_PROVIDER"),
        }
    }
}

/// Which side the tally favoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictVerdict {
    /// Unanimous for the provider.
    ProviderAwarded,
    /// Unanimous for the requester.
    RequesterAwarded,
    /// Mixed votes.
    Split,
}

impl std::fmt::Display for ConflictVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProviderAwarded => write!(f, "PROVIDER_AWARDED"),
            Self::RequesterAwarded => write!(f, "REQUESTER_AWARDED"),
            Self::Split => write!(f, "SPLIT"),
        }
    }
}

/// Result of a finished tally: verdict plus the exact payout legs.
///
/// `to_provider + to_requester` always equals the disputed price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictOutcome {
    pub verdict: ConflictVerdict,
    pub to_provider: Decimal,
    pub to_requester: Decimal,
    pub votes_for_provider: u32,
    pub votes_for_requester: u32,
}

impl ConflictOutcome {
    /// Compute the payout for a finished tally.
    #[must_use]
    pub fn tally(
        votes_for_provider: u32,
        votes_for_requester: u32,
        price: Decimal,
        remainder: RemainderRecipient,
        requester_award: RequesterAward,
    ) -> Self {
        let (verdict, to_provider, to_requester) = match (votes_for_provider, votes_for_requester) {
            (_, 0) => (ConflictVerdict::ProviderAwarded, price, Decimal::ZERO),
            (0, _) => match requester_award {
                RequesterAward::Refund => {
                    (ConflictVerdict::RequesterAwarded, Decimal::ZERO, price)
                }
                // The winning side keeps the odd unit, whatever `remainder` says.
                RequesterAward::SplitEvenly => {
                    let (p, r) = split_even(price, RemainderRecipient::Requester);
                    (ConflictVerdict::RequesterAwarded, p, r)
                }
            },
            _ => {
                let (p, r) = split_even(price, remainder);
                (ConflictVerdict::Split, p, r)
            }
        };
        Self {
            verdict,
            to_provider,
            to_requester,
            votes_for_provider,
            votes_for_requester,
        }
    }

    /// The provider receives the whole price.
    #[must_use]
    pub fn provider_takes_all(&self) -> bool {
        self.to_requester.is_zero()
    }

    /// The requester receives the whole price.
    #[must_use]
    pub fn requester_takes_all(&self) -> bool {
        self.to_provider.is_zero()
    }
}

/// Split `price` as close to 50/50 as integer division allows.
/// Returns `(to_provider, to_requester)`.
#[must_use]
pub fn split_even(price: Decimal, remainder: RemainderRecipient) -> (Decimal, Decimal) {
    let half = (price / Decimal::TWO).floor();
    let odd = price - half - half;
    match remainder {
        RemainderRecipient::Provider => (half + odd, half),
        RemainderRecipient::Requester => (half, half + odd),
    }
}

/// A dispute over a completed milestone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Same key as the disputed milestone.
    pub key: MilestoneKey,
    pub title: String,
    pub description: String,
    /// The project owner who disputed the completion.
    pub raiser: AccountId,
    /// The milestone's bound provider.
    pub respondent: AccountId,
    /// Declared at creation; the tally finishes when this many have voted.
    pub total_voters: u32,
    /// Disputed amount (the milestone price).
    pub amount: Decimal,
    /// One entry per voter; prevents double voting.
    pub votes: BTreeMap<AccountId, VoteChoice>,
    pub state: ConflictState,
    /// Set once resolved.
    pub outcome: Option<ConflictOutcome>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    #[must_use]
    pub fn new(
        key: MilestoneKey,
        title: String,
        description: String,
        raiser: AccountId,
        respondent: AccountId,
        total_voters: u32,
        amount: Decimal,
    ) -> Self {
        Self {
            key,
            title,
            description,
            raiser,
            respondent,
            total_voters,
            amount,
            votes: BTreeMap::new(),
            state: ConflictState::Created,
            outcome: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    fn check_transition(&self, target: ConflictState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(EscrowError::invalid_transition(
                format!("conflict {}", self.key),
                self.state,
                target,
            ));
        }
        Ok(())
    }

    /// Open the voting round. Raiser only.
    ///
    /// # Errors
    /// - `Unauthorized` if `actor` is not the raiser
    /// - `InvalidTransition` if voting already started or the conflict is resolved
    pub fn start_vote(&mut self, actor: AccountId) -> Result<()> {
        if actor != self.raiser {
            return Err(EscrowError::unauthorized(actor, format!("start vote on {}", self.key)));
        }
        self.check_transition(ConflictState::Voting)?;
        self.state = ConflictState::Voting;
        Ok(())
    }

    /// Whether every declared voter has voted.
    #[must_use]
    pub fn is_tally_complete(&self) -> bool {
        self.votes.len() >= self.total_voters as usize
    }

    /// Check that `voter` may vote now, without mutating.
    ///
    /// # Errors
    /// - `InvalidTransition` if voting has not started
    /// - `VotingClosed` if the tally is complete or the conflict is resolved
    /// - `AlreadyVoted` if `voter` already has a recorded vote
    pub fn check_vote(&self, voter: AccountId) -> Result<()> {
        match self.state {
            ConflictState::Created => {
                return Err(EscrowError::invalid_transition(
                    format!("conflict {}", self.key),
                    self.state,
                    "VOTE",
                ));
            }
            ConflictState::Resolved => return Err(EscrowError::VotingClosed(self.key)),
            ConflictState::Voting => {}
        }
        if self.is_tally_complete() {
            return Err(EscrowError::VotingClosed(self.key));
        }
        if self.votes.contains_key(&voter) {
            return Err(EscrowError::AlreadyVoted {
                key: self.key,
                voter,
            });
        }
        Ok(())
    }

    /// Record a vote. Returns `true` if this vote completed the tally.
    ///
    /// # Errors
    /// Same as [`Conflict::check_vote`].
    pub fn record_vote(&mut self, voter: AccountId, choice: VoteChoice) -> Result<bool> {
        self.check_vote(voter)?;
        self.votes.insert(voter, choice);
        Ok(self.is_tally_complete())
    }

    /// `(for_provider, for_requester)` counts.
    #[must_use]
    pub fn counts(&self) -> (u32, u32) {
        let for_provider = self
            .votes
            .values()
            .filter(|c| **c == VoteChoice::ForProvider)
            .count();
        let for_requester = self.votes.len() - for_provider;
        (
            u32::try_from(for_provider).unwrap_or(u32::MAX),
            u32::try_from(for_requester).unwrap_or(u32::MAX),
        )
    }

    /// Compute the outcome of a complete tally.
    ///
    /// # Errors
    /// - `VotingClosed` if already resolved
    /// - `InvalidTransition` if the tally is not complete yet
    pub fn compute_outcome(
        &self,
        remainder: RemainderRecipient,
        requester_award: RequesterAward,
    ) -> Result<ConflictOutcome> {
        self.check_transition(ConflictState::Resolved)?;
        if !self.is_tally_complete() {
            return Err(EscrowError::invalid_transition(
                format!(
                    "conflict {} ({}/{} votes)",
                    self.key,
                    self.votes.len(),
                    self.total_voters
                ),
                self.state,
                ConflictState::Resolved,
            ));
        }
        let (for_provider, for_requester) = self.counts();
        Ok(ConflictOutcome::tally(
            for_provider,
            for_requester,
            self.amount,
            remainder,
            requester_award,
        ))
    }

    /// Close the conflict with its settled outcome.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the conflict is `Voting`.
    pub fn mark_resolved(&mut self, outcome: ConflictOutcome) -> Result<()> {
        self.check_transition(ConflictState::Resolved)?;
        self.state = ConflictState::Resolved;
        self.outcome = Some(outcome);
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

/// Dummy conflict for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Conflict {
    /// A conflict already in `Voting` with the given voter count and amount.
    pub fn dummy_voting(key: MilestoneKey, total_voters: u32, amount: Decimal) -> Self {
        let mut c = Self::new(
            key,
            "dispute".to_string(),
            String::new(),
            AccountId::new(),
            AccountId::new(),
            total_voters,
            amount,
        );
        c.state = ConflictState::Voting;
        c
    }
}
