//! Conflict resolver: per-milestone disputes, voting, and vote-weighted
//! settlement.
//!
//! Settlement steps, all checked before the first write:
//! 1. Settlement guard (no second payout for the same milestone)
//! 2. Tally → [`ConflictOutcome`] (provider / requester / split legs)
//! 3. Milestone may enter `Resolved`
//! 4. One ledger call: `release` for a single recipient, `split` for two
//! 5. Guard, milestone (`Resolved` → `Verified`/`Terminated`), conflict
//!    (`Resolved`) are updated

use std::collections::BTreeMap;

use openescrow_ledger::Ledger;
use openescrow_types::{
    Conflict, ConflictOutcome, ConflictState, ConflictVerdict, EngineConfig, EscrowError,
    Milestone, MilestoneKey, MilestoneState, RemainderRecipient, RequesterAward, Result, Transfer,
};

use crate::settlement_guard::SettlementGuard;

/// What a conflict settlement did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub outcome: ConflictOutcome,
    pub transfers: Vec<Transfer>,
    /// `Verified` when the provider took everything, else `Terminated`.
    pub milestone_state: MilestoneState,
}

/// Owns every conflict, keyed by the disputed milestone.
#[derive(Debug)]
pub struct ConflictResolver {
    conflicts: BTreeMap<MilestoneKey, Conflict>,
    remainder: RemainderRecipient,
    requester_award: RequesterAward,
}

impl ConflictResolver {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            conflicts: BTreeMap::new(),
            remainder: config.split_remainder,
            requester_award: config.requester_award,
        }
    }

    /// Store a freshly created conflict.
    ///
    /// # Errors
    /// `InvalidTransition` if the milestone already has a conflict.
    pub fn open(&mut self, conflict: Conflict) -> Result<()> {
        if let Some(existing) = self.conflicts.get(&conflict.key) {
            return Err(EscrowError::invalid_transition(
                format!("conflict {}", conflict.key),
                existing.state,
                ConflictState::Created,
            ));
        }
        self.conflicts.insert(conflict.key, conflict);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: MilestoneKey) -> Option<&Conflict> {
        self.conflicts.get(&key)
    }

    /// # Errors
    /// `NotFound` if the milestone has no conflict.
    pub fn conflict(&self, key: MilestoneKey) -> Result<&Conflict> {
        self.conflicts
            .get(&key)
            .ok_or_else(|| EscrowError::not_found(format!("conflict {key}")))
    }

    /// # Errors
    /// `NotFound` if the milestone has no conflict.
    pub fn conflict_mut(&mut self, key: MilestoneKey) -> Result<&mut Conflict> {
        self.conflicts
            .get_mut(&key)
            .ok_or_else(|| EscrowError::not_found(format!("conflict {key}")))
    }

    /// Replace a conflict with an updated copy (clone-and-commit).
    pub fn commit(&mut self, conflict: Conflict) {
        self.conflicts.insert(conflict.key, conflict);
    }

    /// Conflicts still waiting for votes or payment.
    pub fn open_conflicts(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts
            .values()
            .filter(|c| c.state != ConflictState::Resolved)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Settle a fully voted conflict through the ledger.
    ///
    /// # Errors
    /// - `AlreadySettled` if the milestone already paid out
    /// - `InvalidTransition` / `VotingClosed` if the tally is incomplete or
    ///   the conflict is already resolved
    /// - ledger errors if the frozen pool does not cover the price
    ///
    /// On error nothing is modified.
    pub fn settle(
        &self,
        conflict: &mut Conflict,
        milestone: &mut Milestone,
        ledger: &mut Ledger,
        guard: &mut SettlementGuard,
    ) -> Result<Settlement> {
        guard.check(conflict.key)?;
        let outcome = conflict.compute_outcome(self.remainder, self.requester_award)?;
        milestone.check_transition(MilestoneState::Resolved)?;

        let milestone_state = match outcome.verdict {
            ConflictVerdict::ProviderAwarded => MilestoneState::Verified,
            ConflictVerdict::RequesterAwarded | ConflictVerdict::Split => {
                MilestoneState::Terminated
            }
        };

        let owner = milestone.owner;
        let provider = conflict.respondent;
        let transfers = if outcome.provider_takes_all() {
            ledger.release(owner, provider, outcome.to_provider)?;
            vec![Transfer::release(owner, provider, outcome.to_provider)]
        } else if outcome.requester_takes_all() {
            ledger.release(owner, owner, outcome.to_requester)?;
            vec![Transfer::release(owner, owner, outcome.to_requester)]
        } else {
            ledger.split(
                owner,
                provider,
                owner,
                outcome.to_provider,
                outcome.to_requester,
            )?;
            vec![
                Transfer::release(owner, provider, outcome.to_provider),
                Transfer::release(owner, owner, outcome.to_requester),
            ]
        };

        guard.mark_settled(conflict.key)?;
        milestone.advance(MilestoneState::Resolved)?;
        milestone.advance(milestone_state)?;
        conflict.mark_resolved(outcome.clone())?;

        tracing::info!(
            key = %conflict.key,
            verdict = %outcome.verdict,
            to_provider = %outcome.to_provider,
            to_requester = %outcome.to_requester,
            "Conflict settled"
        );

        Ok(Settlement {
            outcome,
            transfers,
            milestone_state,
        })
    }
}
