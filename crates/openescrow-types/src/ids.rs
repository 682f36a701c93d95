//! Identifiers used throughout OpenEscrow.
//!
//! Accounts use UUIDv7 for time-ordered sorting. Projects and services are
//! numbered sequentially by the registry, and milestones are addressed by
//! their position under a service, so every milestone has a composite key
//! `(project, service, index)`. Conflicts reuse the milestone key.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Identity key of a ledger account (project owner, provider, or voter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ProjectId / ServiceId
// ---------------------------------------------------------------------------

/// Sequential project number assigned by the registry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct ProjectId(pub u64);

impl ProjectId {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Sequential service number, unique within its project.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct ServiceId(pub u64);

impl ServiceId {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ServiceKey
// ---------------------------------------------------------------------------

/// Composite key of a service: `(project, service)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ServiceKey {
    pub project: ProjectId,
    pub service: ServiceId,
}

impl ServiceKey {
    #[must_use]
    pub fn new(project: u64, service: u64) -> Self {
        Self {
            project: ProjectId(project),
            service: ServiceId(service),
        }
    }

    /// Key of the milestone at `index` under this service.
    #[must_use]
    pub fn milestone(self, index: u32) -> MilestoneKey {
        MilestoneKey {
            project: self.project,
            service: self.service,
            index,
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.service)
    }
}

// ---------------------------------------------------------------------------
// MilestoneKey
// ---------------------------------------------------------------------------

/// Full addressing tuple of a milestone: `(project, service, index)`.
///
/// Conflicts are 1:1 with milestones and are stored under the same key,
/// so there is no separate conflict identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MilestoneKey {
    pub project: ProjectId,
    pub service: ServiceId,
    pub index: u32,
}

impl MilestoneKey {
    #[must_use]
    pub fn new(project: u64, service: u64, index: u32) -> Self {
        Self {
            project: ProjectId(project),
            service: ServiceId(service),
            index,
        }
    }

    /// The parent service of this milestone.
    #[must_use]
    pub fn service_key(&self) -> ServiceKey {
        ServiceKey {
            project: self.project,
            service: self.service,
        }
    }
}

impl fmt::Display for MilestoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/m{}", self.project, self.service, self.index)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
