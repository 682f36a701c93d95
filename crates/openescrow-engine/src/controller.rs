//! Escrow controller: one operation per lifecycle action.
//!
//! Each operation authorizes the actor (new work through the [`Registry`],
//! settlement of existing milestones against the recorded owner and
//! provider), checks every state guard, performs at most one ledger
//! movement, then advances state and records events. A rejected call
//! returns before the first write, so ledger, milestone and conflict state
//! stay untouched.

use std::collections::BTreeSet;

use chrono::Utc;
use openescrow_ledger::Ledger;
use openescrow_types::{
    Account, AccountId, Conflict, ConflictState, EngineConfig, EscrowError, EscrowEvent,
    Milestone, MilestoneKey, MilestoneState, ReceiptType, Result, ReviewDirection, ReviewRecord,
    ServiceEscrow, ServiceKey, ServiceState, SettlementReceipt, Transfer, VoteChoice, constants,
    ensure_positive_amount, verify_chain,
};
use rust_decimal::Decimal;

use crate::conflict_resolver::ConflictResolver;
use crate::milestone_store::MilestoneStore;
use crate::registry::{InMemoryRegistry, Registry};
use crate::review_sink::{ReviewLog, ReviewSink};
use crate::settlement_guard::SettlementGuard;

/// Result of a successful controller operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReceipt {
    pub service: ServiceKey,
    /// Set for milestone-level operations.
    pub milestone: Option<MilestoneKey>,
    pub milestone_state: Option<MilestoneState>,
    pub service_state: Option<ServiceState>,
    pub conflict_state: Option<ConflictState>,
    /// Funds moved by this operation, in order.
    pub transfers: Vec<Transfer>,
    /// Events emitted by this operation, in order.
    pub events: Vec<EscrowEvent>,
}

impl ActionReceipt {
    /// Total released (freezes excluded).
    #[must_use]
    pub fn released(&self) -> Decimal {
        self.transfers
            .iter()
            .filter(|t| t.kind == openescrow_types::TransferKind::Release)
            .map(|t| t.amount)
            .sum()
    }
}

/// Orchestrates ledger, milestone store and conflict resolver.
pub struct EscrowController<R: Registry = InMemoryRegistry, S: ReviewSink = ReviewLog> {
    config: EngineConfig,
    ledger: Ledger,
    store: MilestoneStore,
    resolver: ConflictResolver,
    guard: SettlementGuard,
    registry: R,
    reviews: S,
    reviewed: BTreeSet<(MilestoneKey, ReviewDirection)>,
    events: Vec<EscrowEvent>,
    receipts: Vec<SettlementReceipt>,
}

impl<R: Registry, S: ReviewSink> EscrowController<R, S> {
    /// Build a controller over an existing ledger. The conflict resolver is
    /// created here from `config`.
    ///
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn new(config: EngineConfig, ledger: Ledger, registry: R, reviews: S) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            max_voters = config.max_voters,
            settle_on_final_vote = config.settle_on_final_vote,
            "Escrow controller started"
        );
        Ok(Self {
            resolver: ConflictResolver::new(&config),
            config,
            ledger,
            store: MilestoneStore::new(),
            guard: SettlementGuard::new(),
            registry,
            reviews,
            reviewed: BTreeSet::new(),
            events: Vec::new(),
            receipts: Vec::new(),
        })
    }

    // =================================================================
    // Ledger forwarding
    // =================================================================

    /// Credit funds to an account.
    ///
    /// # Errors
    /// `InvalidAmount`.
    pub fn deposit(&mut self, account: AccountId, amount: Decimal) -> Result<Account> {
        self.ledger.credit(account, amount)?;
        tracing::debug!(account = %account, %amount, "Deposit");
        Ok(self.ledger.account(account))
    }

    /// Set the standing allowance the engine may freeze.
    ///
    /// # Errors
    /// `InvalidAmount`, `InsufficientFunds`.
    pub fn approve(&mut self, account: AccountId, amount: Decimal) -> Result<Account> {
        self.ledger.approve(account, amount)?;
        tracing::debug!(account = %account, %amount, "Allowance set");
        Ok(self.ledger.account(account))
    }

    /// Drop the standing allowance to zero. Already frozen funds stay frozen.
    pub fn revoke(&mut self, account: AccountId) -> Account {
        self.ledger.revoke(account);
        tracing::debug!(account = %account, "Allowance revoked");
        self.ledger.account(account)
    }

    /// Move funds out of custody.
    ///
    /// # Errors
    /// `InvalidAmount`, `InsufficientFunds`.
    pub fn withdraw(&mut self, account: AccountId, amount: Decimal) -> Result<Account> {
        self.ledger.withdraw(account, amount)?;
        tracing::debug!(account = %account, %amount, "Withdrawal");
        Ok(self.ledger.account(account))
    }

    // =================================================================
    // Milestones
    // =================================================================

    /// Create a milestone and freeze its price from the owner's balance.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `InvalidAmount`, `InvalidTransition`
    /// (completed service or cap reached), `InsufficientFunds`,
    /// `InsufficientAllowance`.
    pub fn create_milestone(
        &mut self,
        service: ServiceKey,
        owner: AccountId,
        title: impl Into<String>,
        description: impl Into<String>,
        price: Decimal,
    ) -> Result<ActionReceipt> {
        if !self.registry.service_exists(service) {
            return Err(EscrowError::not_found(format!("service {service}")));
        }
        if !self.registry.is_project_owner(service.project, owner) {
            return Err(deny(owner, format!("create milestone under {service}")));
        }
        ensure_positive_amount(price)?;
        let plan = self
            .store
            .plan_milestone(service, self.config.max_milestones_per_service)?;

        self.ledger.freeze(owner, price)?;
        let milestone =
            self.store
                .insert_milestone(plan, owner, title.into(), description.into(), price);
        let key = milestone.key;
        let title = milestone.title.clone();

        tracing::debug!(key = %key, owner = %owner, %price, state = %plan.state, "Milestone created");
        Ok(self.action(
            service,
            Some(key),
            vec![Transfer::freeze(owner, price)],
            vec![EscrowEvent::MilestoneCreated { key, title, price }],
        ))
    }

    /// Edit title and description while the milestone is `Created` or
    /// `Pending`. The price never changes.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `InvalidTransition`.
    pub fn update_milestone(
        &mut self,
        key: MilestoneKey,
        owner: AccountId,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<ActionReceipt> {
        let m = self.store.milestone(key)?;
        self.require_owner(m, owner, "update milestone")?;
        if !self.registry.service_exists(key.service_key()) {
            return Err(EscrowError::not_found(format!("service {}", key.service_key())));
        }
        if !m.state.is_editable() {
            return Err(EscrowError::invalid_transition(
                format!("milestone {key}"),
                m.state,
                "UPDATE",
            ));
        }

        let m = self.store.milestone_mut(key)?;
        m.title = title.into();
        m.description = description.into();
        m.updated_at = Utc::now();
        let title = m.title.clone();

        tracing::debug!(key = %key, "Milestone updated");
        Ok(self.action(
            key.service_key(),
            Some(key),
            Vec::new(),
            vec![EscrowEvent::MilestoneUpdated { key, title }],
        ))
    }

    /// Soft-delete a `Created` or `Pending` milestone and refund its price
    /// to the owner's available balance. The allowance is not restored.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `InvalidTransition`, `AlreadySettled`.
    pub fn delete_milestone(&mut self, key: MilestoneKey, owner: AccountId) -> Result<ActionReceipt> {
        let m = self.store.milestone(key)?;
        self.require_owner(m, owner, "delete milestone")?;
        m.check_transition(MilestoneState::Deleted)?;
        self.guard.check(key)?;
        let price = m.price;

        self.ledger.release(owner, owner, price)?;
        self.guard.mark_settled(key)?;
        self.store.milestone_mut(key)?.advance(MilestoneState::Deleted)?;

        let transfers = vec![Transfer::release(owner, owner, price)];
        self.issue_receipt(ReceiptType::MilestoneRefunded, key, transfers.clone());
        self.check_conservation()?;

        tracing::info!(key = %key, refunded = %price, "Milestone deleted");
        Ok(self.action(
            key.service_key(),
            Some(key),
            transfers,
            vec![EscrowEvent::MilestoneDeleted {
                key,
                refunded: price,
            }],
        ))
    }

    /// The bound provider marks an `Accepted` milestone as done.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `InvalidTransition`.
    pub fn complete_milestone(
        &mut self,
        key: MilestoneKey,
        provider: AccountId,
    ) -> Result<ActionReceipt> {
        let m = self.store.milestone(key)?;
        if m.provider != Some(provider) {
            return Err(deny(provider, format!("complete milestone {key}")));
        }
        m.check_transition(MilestoneState::Completed)?;

        self.store
            .milestone_mut(key)?
            .advance(MilestoneState::Completed)?;

        tracing::debug!(key = %key, provider = %provider, "Milestone completed");
        Ok(self.action(
            key.service_key(),
            Some(key),
            Vec::new(),
            vec![EscrowEvent::MilestoneCompleted { key, provider }],
        ))
    }

    /// The owner accepts a completed milestone; its price is released to
    /// the provider.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `AlreadyVerified`, `InvalidTransition`,
    /// `AlreadySettled`, `InsufficientFrozenFunds`.
    pub fn verify_milestone(&mut self, key: MilestoneKey, owner: AccountId) -> Result<ActionReceipt> {
        let m = self.store.milestone(key)?;
        self.require_owner(m, owner, "verify milestone")?;
        m.check_transition(MilestoneState::Verified)?;
        self.guard.check(key)?;
        let provider = m.bound_provider()?;
        let price = m.price;

        self.ledger.release(owner, provider, price)?;
        self.guard.mark_settled(key)?;
        self.store
            .milestone_mut(key)?
            .advance(MilestoneState::Verified)?;

        let transfers = vec![Transfer::release(owner, provider, price)];
        self.issue_receipt(ReceiptType::MilestoneVerified, key, transfers.clone());
        self.check_conservation()?;

        tracing::info!(key = %key, provider = %provider, amount = %price, "Milestone verified");
        Ok(self.action(
            key.service_key(),
            Some(key),
            transfers,
            vec![EscrowEvent::MilestoneVerified {
                key,
                provider,
                amount: price,
            }],
        ))
    }

    // =================================================================
    // Service requests
    // =================================================================

    /// A provider takes the service request: `Created → Pending`.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `InvalidTransition`.
    pub fn take_service(&mut self, service: ServiceKey, provider: AccountId) -> Result<ActionReceipt> {
        if !self.registry.service_exists(service) {
            return Err(EscrowError::not_found(format!("service {service}")));
        }
        let owner = self
            .registry
            .project_owner(service.project)
            .ok_or_else(|| EscrowError::not_found(format!("project {}", service.project)))?;
        if provider == owner || !self.registry.is_service_provider(service, provider) {
            return Err(deny(provider, format!("take service {service}")));
        }

        self.store.take(service, owner, provider)?;

        tracing::info!(service = %service, provider = %provider, "Service taken");
        Ok(self.action(
            service,
            None,
            Vec::new(),
            vec![EscrowEvent::ServiceTaken {
                key: service,
                provider,
            }],
        ))
    }

    /// The owner accepts the pending provider: `Pending → Accepted`, and the
    /// provider is bound on every milestone.
    ///
    /// # Errors
    /// `Unauthorized`, `NotFound`, `InvalidTransition`.
    pub fn accept_service(&mut self, service: ServiceKey, owner: AccountId) -> Result<ActionReceipt> {
        self.require_project_owner(service, owner, "accept service")?;
        if !self.registry.service_exists(service) {
            return Err(EscrowError::not_found(format!("service {service}")));
        }
        let provider = self.store.accept(service)?;

        tracing::info!(service = %service, provider = %provider, "Service accepted");
        Ok(self.action(
            service,
            None,
            Vec::new(),
            vec![EscrowEvent::ServiceAccepted {
                key: service,
                provider,
            }],
        ))
    }

    /// The owner turns the pending provider down: `Pending → Created`.
    ///
    /// # Errors
    /// `Unauthorized`, `NotFound`, `InvalidTransition`.
    pub fn reject_service(&mut self, service: ServiceKey, owner: AccountId) -> Result<ActionReceipt> {
        self.require_project_owner(service, owner, "reject service")?;
        let provider = self.store.reject(service)?;

        tracing::info!(service = %service, provider = %provider, "Service rejected");
        Ok(self.action(
            service,
            None,
            Vec::new(),
            vec![EscrowEvent::ServiceRejected {
                key: service,
                provider,
            }],
        ))
    }

    /// The provider closes the service once every live milestone settled.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `InvalidTransition`.
    pub fn complete_service(
        &mut self,
        service: ServiceKey,
        provider: AccountId,
    ) -> Result<ActionReceipt> {
        let svc = self
            .store
            .service(service)
            .ok_or_else(|| EscrowError::not_found(format!("service {service}")))?;
        if svc.provider != Some(provider) {
            return Err(deny(provider, format!("complete service {service}")));
        }

        self.store.complete(service)?;

        tracing::info!(service = %service, provider = %provider, "Service completed");
        Ok(self.action(
            service,
            None,
            Vec::new(),
            vec![EscrowEvent::ServiceCompleted {
                key: service,
                provider,
            }],
        ))
    }

    // =================================================================
    // Conflicts
    // =================================================================

    /// The owner disputes a completed milestone. `total_voters` fixes how
    /// many votes finish the tally.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `InvalidVoterCount`, `InvalidTransition`.
    pub fn raise_conflict(
        &mut self,
        key: MilestoneKey,
        raiser: AccountId,
        title: impl Into<String>,
        description: impl Into<String>,
        total_voters: u32,
    ) -> Result<ActionReceipt> {
        let m = self.store.milestone(key)?;
        self.require_owner(m, raiser, "raise conflict")?;
        if total_voters == 0 || total_voters > self.config.max_voters {
            return Err(EscrowError::InvalidVoterCount {
                requested: total_voters,
                max: self.config.max_voters,
            });
        }
        m.check_transition(MilestoneState::Conflict)?;
        let respondent = m.bound_provider()?;
        let conflict = Conflict::new(
            key,
            title.into(),
            description.into(),
            raiser,
            respondent,
            total_voters,
            m.price,
        );

        self.resolver.open(conflict)?;
        self.store
            .milestone_mut(key)?
            .advance(MilestoneState::Conflict)?;

        tracing::info!(key = %key, raiser = %raiser, respondent = %respondent, total_voters, "Conflict raised");
        Ok(self.action(
            key.service_key(),
            Some(key),
            Vec::new(),
            vec![EscrowEvent::ConflictCreated {
                key,
                raiser,
                respondent,
                total_voters,
            }],
        ))
    }

    /// The raiser opens voting.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `InvalidTransition`.
    pub fn start_vote(&mut self, key: MilestoneKey, actor: AccountId) -> Result<ActionReceipt> {
        self.resolver
            .conflict_mut(key)?
            .start_vote(actor)
            .inspect_err(|e| tracing::warn!(key = %key, actor = %actor, error = %e, "Start vote rejected"))?;

        tracing::debug!(key = %key, "Voting started");
        Ok(self.action(
            key.service_key(),
            Some(key),
            Vec::new(),
            vec![EscrowEvent::VotingStarted { key }],
        ))
    }

    /// Cast one vote. With `settle_on_final_vote`, the vote that completes
    /// the tally also settles the payment.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `InvalidTransition` (voting not started),
    /// `VotingClosed`, `AlreadyVoted`, and settlement errors.
    pub fn cast_vote(
        &mut self,
        key: MilestoneKey,
        voter: AccountId,
        choice: VoteChoice,
    ) -> Result<ActionReceipt> {
        let conflict = self.resolver.conflict(key)?;
        if !self.registry.is_registered(voter) {
            return Err(deny(voter, format!("vote on {key} without profile")));
        }
        if voter == conflict.raiser || voter == conflict.respondent {
            return Err(deny(voter, format!("vote on own conflict {key}")));
        }

        let mut candidate = conflict.clone();
        let tally_complete = candidate.record_vote(voter, choice)?;
        let mut events = vec![EscrowEvent::ConflictVoted { key, voter, choice }];
        tracing::debug!(
            key = %key,
            voter = %voter,
            %choice,
            votes = candidate.votes.len(),
            total_voters = candidate.total_voters,
            "Vote recorded"
        );

        if !(tally_complete && self.config.settle_on_final_vote) {
            self.resolver.commit(candidate);
            return Ok(self.action(key.service_key(), Some(key), Vec::new(), events));
        }

        let milestone = self.store.milestone_mut(key)?;
        let settlement =
            self.resolver
                .settle(&mut candidate, milestone, &mut self.ledger, &mut self.guard)?;
        self.resolver.commit(candidate);

        self.issue_receipt(ReceiptType::ConflictSettled, key, settlement.transfers.clone());
        self.check_conservation()?;
        events.push(EscrowEvent::ConflictResult {
            key,
            outcome: settlement.outcome,
        });
        Ok(self.action(key.service_key(), Some(key), settlement.transfers, events))
    }

    /// Settle a fully voted conflict. Needed when `settle_on_final_vote` is
    /// off; otherwise the final vote already settled and this fails with
    /// `AlreadySettled`.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `AlreadySettled`, `InvalidTransition`
    /// (tally incomplete), and ledger errors.
    pub fn resolve_payment(&mut self, key: MilestoneKey, actor: AccountId) -> Result<ActionReceipt> {
        let conflict = self.resolver.conflict(key)?;
        if actor != conflict.raiser
            && actor != conflict.respondent
            && !self.registry.is_registered(actor)
        {
            return Err(deny(actor, format!("resolve payment of {key}")));
        }

        let mut candidate = conflict.clone();
        let milestone = self.store.milestone_mut(key)?;
        let settlement =
            self.resolver
                .settle(&mut candidate, milestone, &mut self.ledger, &mut self.guard)?;
        self.resolver.commit(candidate);

        self.issue_receipt(ReceiptType::ConflictSettled, key, settlement.transfers.clone());
        self.check_conservation()?;
        Ok(self.action(
            key.service_key(),
            Some(key),
            settlement.transfers,
            vec![EscrowEvent::ConflictResult {
                key,
                outcome: settlement.outcome,
            }],
        ))
    }

    // =================================================================
    // Reviews
    // =================================================================

    /// Review a settled milestone, once per direction. The owner reviews
    /// the provider and vice versa.
    ///
    /// # Errors
    /// `NotFound`, `InvalidTransition` (not settled), `Unauthorized`,
    /// `InvalidReview`, `DuplicateReview`, and sink errors.
    pub fn review_milestone(
        &mut self,
        key: MilestoneKey,
        reviewer: AccountId,
        text: impl Into<String>,
        rating: u8,
    ) -> Result<ActionReceipt> {
        let m = self.store.milestone(key)?;
        if !m.state.is_settled() {
            return Err(EscrowError::invalid_transition(
                format!("milestone {key}"),
                m.state,
                "REVIEW",
            ));
        }
        let provider = m.bound_provider()?;
        let (direction, reviewee) = if reviewer == m.owner {
            (ReviewDirection::OwnerToProvider, provider)
        } else if reviewer == provider {
            (ReviewDirection::ProviderToOwner, m.owner)
        } else {
            return Err(deny(reviewer, format!("review milestone {key}")));
        };

        if !(self.config.min_rating..=self.config.max_rating).contains(&rating) {
            return Err(EscrowError::InvalidReview {
                reason: format!(
                    "rating {rating} outside {}..={}",
                    self.config.min_rating, self.config.max_rating
                ),
            });
        }
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EscrowError::InvalidReview {
                reason: "review text is empty".to_string(),
            });
        }
        if text.len() > constants::MAX_REVIEW_TEXT_LEN {
            return Err(EscrowError::InvalidReview {
                reason: format!(
                    "review text is {} bytes, limit {}",
                    text.len(),
                    constants::MAX_REVIEW_TEXT_LEN
                ),
            });
        }
        if self.reviewed.contains(&(key, direction)) {
            return Err(EscrowError::DuplicateReview {
                key,
                direction: direction.to_string(),
            });
        }

        self.reviews.record(ReviewRecord {
            key,
            reviewer,
            reviewee,
            direction,
            text,
            rating,
            created_at: Utc::now(),
        })?;
        self.reviewed.insert((key, direction));

        tracing::debug!(key = %key, %direction, rating, "Review recorded");
        Ok(self.action(
            key.service_key(),
            Some(key),
            Vec::new(),
            vec![EscrowEvent::ReviewRecorded {
                key,
                reviewer,
                reviewee,
                direction,
                rating,
            }],
        ))
    }

    // =================================================================
    // Queries
    // =================================================================

    /// # Errors
    /// `NotFound`.
    pub fn milestone(&self, key: MilestoneKey) -> Result<&Milestone> {
        self.store.milestone(key)
    }

    #[must_use]
    pub fn service(&self, key: ServiceKey) -> Option<&ServiceEscrow> {
        self.store.service(key)
    }

    #[must_use]
    pub fn conflict(&self, key: MilestoneKey) -> Option<&Conflict> {
        self.resolver.get(key)
    }

    #[must_use]
    pub fn account(&self, account: AccountId) -> Account {
        self.ledger.account(account)
    }

    /// Sum of prices still held in escrow for `owner`. Matches the owner's
    /// frozen balance while the ledger is only driven by this controller.
    #[must_use]
    pub fn escrowed_for(&self, owner: AccountId) -> Decimal {
        self.store.open_value(owner)
    }

    /// Every event emitted so far, in commit order.
    #[must_use]
    pub fn events(&self) -> &[EscrowEvent] {
        &self.events
    }

    /// The settlement audit trail.
    #[must_use]
    pub fn receipts(&self) -> &[SettlementReceipt] {
        &self.receipts
    }

    /// Check the receipt hash chain end to end.
    #[must_use]
    pub fn verify_receipts(&self) -> bool {
        verify_chain(&self.receipts)
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Registry access for embedders that own profile and project data.
    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    #[must_use]
    pub fn reviews(&self) -> &S {
        &self.reviews
    }

    // =================================================================
    // Internals
    // =================================================================

    /// Authorizes against the owner recorded on the milestone, so escrowed
    /// funds stay reachable after the project is deleted in the registry.
    fn require_owner(&self, m: &Milestone, actor: AccountId, action: &str) -> Result<()> {
        if m.owner != actor {
            return Err(deny(actor, format!("{action} {}", m.key)));
        }
        Ok(())
    }

    fn require_project_owner(&self, service: ServiceKey, actor: AccountId, action: &str) -> Result<()> {
        if !self.registry.is_project_owner(service.project, actor) {
            return Err(deny(actor, format!("{action} {service}")));
        }
        Ok(())
    }

    fn issue_receipt(&mut self, receipt_type: ReceiptType, key: MilestoneKey, transfers: Vec<Transfer>) {
        let prev_hash = self.receipts.last().map_or([0u8; 32], |r| r.payload_hash);
        let receipt = SettlementReceipt::new(
            self.receipts.len() as u64,
            receipt_type,
            key,
            transfers,
            prev_hash,
        );
        tracing::debug!(
            key = %key,
            receipt_type = %receipt_type,
            sequence = receipt.sequence,
            hash = %receipt.hash_hex(),
            "Settlement receipt issued"
        );
        self.receipts.push(receipt);
    }

    fn check_conservation(&self) -> Result<()> {
        if !self.config.verify_conservation {
            return Ok(());
        }
        self.ledger.verify_conservation().inspect_err(|e| {
            tracing::error!(error = %e, "Supply conservation violated after settlement");
        })
    }

    fn action(
        &mut self,
        service: ServiceKey,
        milestone: Option<MilestoneKey>,
        transfers: Vec<Transfer>,
        events: Vec<EscrowEvent>,
    ) -> ActionReceipt {
        self.events.extend(events.iter().cloned());
        ActionReceipt {
            service,
            milestone,
            milestone_state: milestone
                .and_then(|k| self.store.milestone(k).ok())
                .map(|m| m.state),
            service_state: self.store.service(service).map(|s| s.state),
            conflict_state: milestone
                .and_then(|k| self.resolver.get(k))
                .map(|c| c.state),
            transfers,
            events,
        }
    }
}

fn deny(actor: AccountId, action: String) -> EscrowError {
    tracing::warn!(actor = %actor, action = %action, "Unauthorized");
    EscrowError::unauthorized(actor, action)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    struct Fixture {
        ctl: EscrowController,
        owner: AccountId,
        provider: AccountId,
        service: ServiceKey,
    }

    fn fixture() -> Fixture {
        let owner = AccountId::new();
        let provider = AccountId::new();
        let mut registry = InMemoryRegistry::new();
        registry.register_profile(owner);
        registry.register_profile(provider);
        let project = registry.create_project(owner, "NFT").unwrap();
        let service = registry.create_service(project, owner, "Artwork").unwrap();

        let mut ctl = EscrowController::new(
            EngineConfig::default(),
            Ledger::new(),
            registry,
            ReviewLog::new(),
        )
        .unwrap();
        ctl.deposit(owner, dec(200)).unwrap();
        ctl.approve(owner, dec(100)).unwrap();
        Fixture {
            ctl,
            owner,
            provider,
            service,
        }
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = EngineConfig {
            max_voters: 0,
            ..EngineConfig::default()
        };
        let res = EscrowController::new(cfg, Ledger::new(), InMemoryRegistry::new(), ReviewLog::new());
        assert!(matches!(res, Err(EscrowError::Configuration(_))));
    }

    #[test]
    fn create_reports_freeze_and_event() {
        let mut f = fixture();
        let r = f
            .ctl
            .create_milestone(f.service, f.owner, "Design", "", dec(25))
            .unwrap();
        assert_eq!(r.milestone, Some(MilestoneKey::new(0, 0, 0)));
        assert_eq!(r.milestone_state, Some(MilestoneState::Created));
        assert_eq!(r.service_state, Some(ServiceState::Created));
        assert_eq!(r.conflict_state, None);
        assert_eq!(r.transfers, vec![Transfer::freeze(f.owner, dec(25))]);
        assert_eq!(r.released(), Decimal::ZERO);
        assert_eq!(r.events.len(), 1);
        assert_eq!(f.ctl.events(), r.events.as_slice());
    }

    #[test]
    fn non_owner_cannot_create() {
        let mut f = fixture();
        let err = f
            .ctl
            .create_milestone(f.service, f.provider, "x", "", dec(5))
            .unwrap_err();
        assert!(matches!(err, EscrowError::Unauthorized { .. }));
        assert!(f.ctl.events().is_empty());
    }

    #[test]
    fn unknown_service_not_found() {
        let mut f = fixture();
        let err = f
            .ctl
            .create_milestone(ServiceKey::new(0, 7), f.owner, "x", "", dec(5))
            .unwrap_err();
        assert!(matches!(err, EscrowError::NotFound { .. }));
    }

    #[test]
    fn failed_freeze_creates_nothing() {
        let mut f = fixture();
        let err = f
            .ctl
            .create_milestone(f.service, f.owner, "big", "", dec(101))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientAllowance { .. }));
        assert!(f.ctl.service(f.service).is_none());
        assert_eq!(f.ctl.account(f.owner).frozen, Decimal::ZERO);
    }

    #[test]
    fn fractional_price_rejected() {
        let mut f = fixture();
        let err = f
            .ctl
            .create_milestone(f.service, f.owner, "x", "", Decimal::new(255, 1))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidAmount { .. }));
    }

    #[test]
    fn milestone_cap_enforced() {
        let owner = AccountId::new();
        let mut registry = InMemoryRegistry::new();
        registry.register_profile(owner);
        let project = registry.create_project(owner, "p").unwrap();
        let service = registry.create_service(project, owner, "s").unwrap();
        let cfg = EngineConfig {
            max_milestones_per_service: 2,
            ..EngineConfig::default()
        };
        let mut ctl = EscrowController::new(cfg, Ledger::new(), registry, ReviewLog::new()).unwrap();
        ctl.deposit(owner, dec(10)).unwrap();
        ctl.approve(owner, dec(10)).unwrap();

        ctl.create_milestone(service, owner, "a", "", dec(1)).unwrap();
        ctl.create_milestone(service, owner, "b", "", dec(1)).unwrap();
        let err = ctl
            .create_milestone(service, owner, "c", "", dec(1))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidTransition { .. }));
        assert_eq!(ctl.account(owner).frozen, dec(2));
    }

    #[test]
    fn update_only_while_editable() {
        let mut f = fixture();
        let key = f
            .ctl
            .create_milestone(f.service, f.owner, "Draft", "", dec(10))
            .unwrap()
            .milestone
            .unwrap();
        f.ctl
            .update_milestone(key, f.owner, "Final", "with details")
            .unwrap();
        let m = f.ctl.milestone(key).unwrap();
        assert_eq!(m.title, "Final");
        assert_eq!(m.description, "with details");
        assert_eq!(m.price, dec(10));

        f.ctl.take_service(f.service, f.provider).unwrap();
        f.ctl.accept_service(f.service, f.owner).unwrap();
        let err = f
            .ctl
            .update_milestone(key, f.owner, "Late", "")
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidTransition { .. }));
    }

    #[test]
    fn revoke_blocks_new_milestones_but_keeps_escrow() {
        let mut f = fixture();
        f.ctl
            .create_milestone(f.service, f.owner, "a", "", dec(30))
            .unwrap();
        let acct = f.ctl.revoke(f.owner);
        assert_eq!(acct.allowance, Decimal::ZERO);
        assert_eq!(acct.frozen, dec(30));
        assert_eq!(f.ctl.escrowed_for(f.owner), dec(30));

        let err = f
            .ctl
            .create_milestone(f.service, f.owner, "b", "", dec(1))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientAllowance { .. }));
        assert_eq!(f.ctl.escrowed_for(f.owner), dec(30));
    }

    #[test]
    fn owner_cannot_take_own_service() {
        let mut f = fixture();
        let err = f.ctl.take_service(f.service, f.owner).unwrap_err();
        assert!(matches!(err, EscrowError::Unauthorized { .. }));
    }

    #[test]
    fn only_owner_accepts_or_rejects() {
        let mut f = fixture();
        f.ctl.take_service(f.service, f.provider).unwrap();
        let err = f.ctl.accept_service(f.service, f.provider).unwrap_err();
        assert!(matches!(err, EscrowError::Unauthorized { .. }));
        let err = f.ctl.reject_service(f.service, f.provider).unwrap_err();
        assert!(matches!(err, EscrowError::Unauthorized { .. }));

        let r = f.ctl.reject_service(f.service, f.owner).unwrap();
        assert_eq!(r.service_state, Some(ServiceState::Created));
        assert!(matches!(
            r.events.as_slice(),
            [EscrowEvent::ServiceRejected { provider, .. }] if *provider == f.provider
        ));
    }

    #[test]
    fn receipt_chain_covers_every_settlement() {
        let mut f = fixture();
        let a = f
            .ctl
            .create_milestone(f.service, f.owner, "a", "", dec(10))
            .unwrap()
            .milestone
            .unwrap();
        let b = f
            .ctl
            .create_milestone(f.service, f.owner, "b", "", dec(15))
            .unwrap()
            .milestone
            .unwrap();
        f.ctl.delete_milestone(a, f.owner).unwrap();
        f.ctl.take_service(f.service, f.provider).unwrap();
        f.ctl.accept_service(f.service, f.owner).unwrap();
        f.ctl.complete_milestone(b, f.provider).unwrap();
        f.ctl.verify_milestone(b, f.owner).unwrap();

        let receipts = f.ctl.receipts();
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].receipt_type, ReceiptType::MilestoneRefunded);
        assert_eq!(receipts[1].receipt_type, ReceiptType::MilestoneVerified);
        assert_eq!(receipts[1].prev_hash, receipts[0].payload_hash);
        assert_eq!(receipts[1].released_total(), dec(15));
        assert!(f.ctl.verify_receipts());
    }
}
