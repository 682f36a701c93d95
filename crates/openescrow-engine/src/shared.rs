//! Thread-safe handle to an [`EscrowController`].
//!
//! All mutating calls take the write lock for their whole duration, so
//! concurrent submissions apply in one total order and never interleave.
//! Queries take the read lock and return owned snapshots. The lock is
//! `parking_lot`: no poisoning, and it is never held across an `.await`.

use std::sync::Arc;

use openescrow_types::{
    Account, AccountId, Conflict, EscrowEvent, Milestone, MilestoneKey, Result, ServiceEscrow,
    ServiceKey, VoteChoice,
};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::controller::{ActionReceipt, EscrowController};
use crate::registry::{InMemoryRegistry, Registry};
use crate::review_sink::{ReviewLog, ReviewSink};

pub struct SharedEscrow<R: Registry = InMemoryRegistry, S: ReviewSink = ReviewLog> {
    inner: Arc<RwLock<EscrowController<R, S>>>,
}

impl<R: Registry, S: ReviewSink> Clone for SharedEscrow<R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Registry, S: ReviewSink> SharedEscrow<R, S> {
    #[must_use]
    pub fn new(controller: EscrowController<R, S>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(controller)),
        }
    }

    /// Run `f` under the write lock. Use for any operation not wrapped
    /// below, or to apply several operations as one atomic unit.
    pub fn write<T>(&self, f: impl FnOnce(&mut EscrowController<R, S>) -> T) -> T {
        f(&mut self.inner.write())
    }

    /// Run `f` under the read lock.
    pub fn read<T>(&self, f: impl FnOnce(&EscrowController<R, S>) -> T) -> T {
        f(&self.inner.read())
    }

    // =================================================================
    // Ledger
    // =================================================================

    /// # Errors
    /// See [`EscrowController::deposit`].
    pub fn deposit(&self, account: AccountId, amount: Decimal) -> Result<Account> {
        self.inner.write().deposit(account, amount)
    }

    /// # Errors
    /// See [`EscrowController::approve`].
    pub fn approve(&self, account: AccountId, amount: Decimal) -> Result<Account> {
        self.inner.write().approve(account, amount)
    }

    pub fn revoke(&self, account: AccountId) -> Account {
        self.inner.write().revoke(account)
    }

    /// # Errors
    /// See [`EscrowController::withdraw`].
    pub fn withdraw(&self, account: AccountId, amount: Decimal) -> Result<Account> {
        self.inner.write().withdraw(account, amount)
    }

    // =================================================================
    // Milestones
    // =================================================================

    /// # Errors
    /// See [`EscrowController::create_milestone`].
    pub fn create_milestone(
        &self,
        service: ServiceKey,
        owner: AccountId,
        title: impl Into<String>,
        description: impl Into<String>,
        price: Decimal,
    ) -> Result<ActionReceipt> {
        self.inner
            .write()
            .create_milestone(service, owner, title, description, price)
    }

    /// # Errors
    /// See [`EscrowController::update_milestone`].
    pub fn update_milestone(
        &self,
        key: MilestoneKey,
        owner: AccountId,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<ActionReceipt> {
        self.inner
            .write()
            .update_milestone(key, owner, title, description)
    }

    /// # Errors
    /// See [`EscrowController::delete_milestone`].
    pub fn delete_milestone(&self, key: MilestoneKey, owner: AccountId) -> Result<ActionReceipt> {
        self.inner.write().delete_milestone(key, owner)
    }

    /// # Errors
    /// See [`EscrowController::complete_milestone`].
    pub fn complete_milestone(&self, key: MilestoneKey, provider: AccountId) -> Result<ActionReceipt> {
        self.inner.write().complete_milestone(key, provider)
    }

    /// # Errors
    /// See [`EscrowController::verify_milestone`].
    pub fn verify_milestone(&self, key: MilestoneKey, owner: AccountId) -> Result<ActionReceipt> {
        self.inner.write().verify_milestone(key, owner)
    }

    // =================================================================
    // Services
    // =================================================================

    /// # Errors
    /// See [`EscrowController::take_service`].
    pub fn take_service(&self, service: ServiceKey, provider: AccountId) -> Result<ActionReceipt> {
        self.inner.write().take_service(service, provider)
    }

    /// # Errors
    /// See [`EscrowController::accept_service`].
    pub fn accept_service(&self, service: ServiceKey, owner: AccountId) -> Result<ActionReceipt> {
        self.inner.write().accept_service(service, owner)
    }

    /// # Errors
    /// See [`EscrowController::reject_service`].
    pub fn reject_service(&self, service: ServiceKey, owner: AccountId) -> Result<ActionReceipt> {
        self.inner.write().reject_service(service, owner)
    }

    /// # Errors
    /// See [`EscrowController::complete_service`].
    pub fn complete_service(&self, service: ServiceKey, provider: AccountId) -> Result<ActionReceipt> {
        self.inner.write().complete_service(service, provider)
    }

    // =================================================================
    // Conflicts and reviews
    // =================================================================

    /// # Errors
    /// See [`EscrowController::raise_conflict`].
    pub fn raise_conflict(
        &self,
        key: MilestoneKey,
        raiser: AccountId,
        title: impl Into<String>,
        description: impl Into<String>,
        total_voters: u32,
    ) -> Result<ActionReceipt> {
        self.inner
            .write()
            .raise_conflict(key, raiser, title, description, total_voters)
    }

    /// # Errors
    /// See [`EscrowController::start_vote`].
    pub fn start_vote(&self, key: MilestoneKey, actor: AccountId) -> Result<ActionReceipt> {
        self.inner.write().start_vote(key, actor)
    }

    /// # Errors
    /// See [`EscrowController::cast_vote`].
    pub fn cast_vote(
        &self,
        key: MilestoneKey,
        voter: AccountId,
        choice: VoteChoice,
    ) -> Result<ActionReceipt> {
        self.inner.write().cast_vote(key, voter, choice)
    }

    /// # Errors
    /// See [`EscrowController::resolve_payment`].
    pub fn resolve_payment(&self, key: MilestoneKey, actor: AccountId) -> Result<ActionReceipt> {
        self.inner.write().resolve_payment(key, actor)
    }

    /// # Errors
    /// See [`EscrowController::review_milestone`].
    pub fn review_milestone(
        &self,
        key: MilestoneKey,
        reviewer: AccountId,
        text: impl Into<String>,
        rating: u8,
    ) -> Result<ActionReceipt> {
        self.inner
            .write()
            .review_milestone(key, reviewer, text, rating)
    }

    // =================================================================
    // Snapshots
    // =================================================================

    #[must_use]
    pub fn account(&self, account: AccountId) -> Account {
        self.inner.read().account(account)
    }

    #[must_use]
    pub fn milestone(&self, key: MilestoneKey) -> Option<Milestone> {
        self.inner.read().milestone(key).ok().cloned()
    }

    #[must_use]
    pub fn service(&self, key: ServiceKey) -> Option<ServiceEscrow> {
        self.inner.read().service(key).cloned()
    }

    #[must_use]
    pub fn conflict(&self, key: MilestoneKey) -> Option<Conflict> {
        self.inner.read().conflict(key).cloned()
    }

    #[must_use]
    pub fn events(&self) -> Vec<EscrowEvent> {
        self.inner.read().events().to_vec()
    }

    /// # Errors
    /// `SupplyInvariantViolation` on mismatch.
    pub fn verify_conservation(&self) -> Result<()> {
        self.inner.read().ledger().verify_conservation()
    }
}
