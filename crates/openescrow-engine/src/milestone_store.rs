//! Milestone store: ordered milestones per service plus the service
//! aggregate state.
//!
//! The store only knows state machines. It never touches balances; the
//! controller pairs every fund-moving transition with a ledger call.
//! Methods that can fail validate before the first write.

use std::collections::BTreeMap;

use chrono::Utc;
use openescrow_types::{
    AccountId, EscrowError, Milestone, MilestoneKey, MilestoneState, Result, ServiceEscrow,
    ServiceKey, ServiceState,
};
use rust_decimal::Decimal;

/// Where and how the next milestone of a service will be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestonePlan {
    pub key: MilestoneKey,
    pub state: MilestoneState,
    pub provider: Option<AccountId>,
}

#[derive(Debug, Default)]
pub struct MilestoneStore {
    services: BTreeMap<ServiceKey, ServiceEscrow>,
}

impl MilestoneStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn service(&self, key: ServiceKey) -> Option<&ServiceEscrow> {
        self.services.get(&key)
    }

    /// Service record, created in `Created` state on first touch.
    pub fn service_or_insert(&mut self, key: ServiceKey, owner: AccountId) -> &mut ServiceEscrow {
        self.services
            .entry(key)
            .or_insert_with(|| ServiceEscrow::new(key, owner))
    }

    /// # Errors
    /// `NotFound` if the service or milestone does not exist.
    pub fn milestone(&self, key: MilestoneKey) -> Result<&Milestone> {
        self.services
            .get(&key.service_key())
            .and_then(|s| s.milestone(key.index))
            .ok_or_else(|| EscrowError::not_found(format!("milestone {key}")))
    }

    /// # Errors
    /// `NotFound` if the service or milestone does not exist.
    pub fn milestone_mut(&mut self, key: MilestoneKey) -> Result<&mut Milestone> {
        self.services
            .get_mut(&key.service_key())
            .and_then(|s| s.milestone_mut(key.index))
            .ok_or_else(|| EscrowError::not_found(format!("milestone {key}")))
    }

    /// Decide the key and initial state of a new milestone without
    /// creating it. The initial state follows the service: a service that
    /// is already taken or accepted gets milestones in the same stage.
    ///
    /// # Errors
    /// `InvalidTransition` if the service is completed or the live
    /// milestone cap is reached.
    pub fn plan_milestone(&self, key: ServiceKey, max_live: usize) -> Result<MilestonePlan> {
        let Some(svc) = self.services.get(&key) else {
            return Ok(MilestonePlan {
                key: key.milestone(0),
                state: MilestoneState::Created,
                provider: None,
            });
        };

        let state = svc.state.initial_milestone_state().ok_or_else(|| {
            EscrowError::invalid_transition(format!("service {key}"), svc.state, "CREATE_MILESTONE")
        })?;
        if svc.live_count() >= max_live {
            return Err(EscrowError::invalid_transition(
                format!("service {key} ({max_live} live milestones)"),
                svc.state,
                "CREATE_MILESTONE",
            ));
        }
        let provider = match state {
            MilestoneState::Accepted => svc.provider,
            _ => None,
        };
        Ok(MilestonePlan {
            key: key.milestone(svc.next_index()),
            state,
            provider,
        })
    }

    /// Append a milestone according to `plan`. The caller has already
    /// frozen the price.
    pub fn insert_milestone(
        &mut self,
        plan: MilestonePlan,
        owner: AccountId,
        title: String,
        description: String,
        price: Decimal,
    ) -> &Milestone {
        let now = Utc::now();
        let svc = self.service_or_insert(plan.key.service_key(), owner);
        svc.milestones.push(Milestone {
            key: plan.key,
            owner,
            title,
            description,
            price,
            provider: plan.provider,
            state: plan.state,
            created_at: now,
            updated_at: now,
        });
        &svc.milestones[svc.milestones.len() - 1]
    }

    /// `Created → Pending`: record the candidate provider and move every
    /// `Created` milestone to `Pending`.
    ///
    /// # Errors
    /// `InvalidTransition` unless the service is `Created`.
    pub fn take(&mut self, key: ServiceKey, owner: AccountId, provider: AccountId) -> Result<()> {
        let svc = self.service_or_insert(key, owner);
        svc.check_transition(ServiceState::Pending)?;
        svc.state = ServiceState::Pending;
        svc.provider = Some(provider);
        move_milestones(svc, MilestoneState::Created, MilestoneState::Pending, None)
    }

    /// `Pending → Accepted`: bind the provider on every `Pending` milestone
    /// and move it to `Accepted`. Returns the bound provider.
    ///
    /// # Errors
    /// `NotFound` for an unknown service; `InvalidTransition` unless `Pending`.
    pub fn accept(&mut self, key: ServiceKey) -> Result<AccountId> {
        let svc = self.service_mut(key)?;
        svc.check_transition(ServiceState::Accepted)?;
        let provider = svc.provider.ok_or_else(|| {
            EscrowError::Internal(format!("pending service {key} has no provider"))
        })?;
        svc.state = ServiceState::Accepted;
        move_milestones(
            svc,
            MilestoneState::Pending,
            MilestoneState::Accepted,
            Some(provider),
        )?;
        Ok(provider)
    }

    /// `Pending → Created`: drop the candidate provider and move `Pending`
    /// milestones back. Returns the rejected provider.
    ///
    /// # Errors
    /// `NotFound` for an unknown service; `InvalidTransition` unless `Pending`.
    pub fn reject(&mut self, key: ServiceKey) -> Result<AccountId> {
        let svc = self.service_mut(key)?;
        svc.check_transition(ServiceState::Created)?;
        let provider = svc.provider.take().ok_or_else(|| {
            EscrowError::Internal(format!("pending service {key} has no provider"))
        })?;
        svc.state = ServiceState::Created;
        move_milestones(svc, MilestoneState::Pending, MilestoneState::Created, None)?;
        Ok(provider)
    }

    /// `Accepted → Completed` once every live milestone is settled.
    ///
    /// # Errors
    /// `NotFound` for an unknown service; `InvalidTransition` if not
    /// `Accepted` or a live milestone is still open.
    pub fn complete(&mut self, key: ServiceKey) -> Result<()> {
        let svc = self.service_mut(key)?;
        svc.check_transition(ServiceState::Completed)?;
        if let Some(open) = svc.first_unsettled() {
            return Err(EscrowError::invalid_transition(
                format!("service {key} (milestone {} is {})", open.key, open.state),
                svc.state,
                ServiceState::Completed,
            ));
        }
        svc.state = ServiceState::Completed;
        Ok(())
    }

    /// Every milestone across all services.
    pub fn milestones(&self) -> impl Iterator<Item = &Milestone> {
        self.services.values().flat_map(|s| s.milestones.iter())
    }

    /// Sum of prices still held in escrow for `owner`.
    #[must_use]
    pub fn open_value(&self, owner: AccountId) -> Decimal {
        self.milestones()
            .filter(|m| m.owner == owner && m.state.holds_funds())
            .map(|m| m.price)
            .sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn service_mut(&mut self, key: ServiceKey) -> Result<&mut ServiceEscrow> {
        self.services
            .get_mut(&key)
            .ok_or_else(|| EscrowError::not_found(format!("service {key}")))
    }
}

/// Move every live milestone in `from` to `to`, optionally binding a
/// provider. Only called for transitions the milestone FSM allows.
fn move_milestones(
    svc: &mut ServiceEscrow,
    from: MilestoneState,
    to: MilestoneState,
    provider: Option<AccountId>,
) -> Result<()> {
    for m in svc.milestones.iter_mut().filter(|m| m.state == from) {
        m.advance(to)?;
        match to {
            MilestoneState::Created => m.provider = None,
            _ if provider.is_some() => m.provider = provider,
            _ => {}
        }
    }
    Ok(())
}
