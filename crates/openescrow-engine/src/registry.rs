//! Identity and project/service facts.
//!
//! Profiles, projects and services live outside the escrow core. The
//! controller only asks the narrow questions in [`Registry`].
//! [`InMemoryRegistry`] answers them for embedding and tests.

use std::collections::{BTreeMap, HashSet};

use openescrow_types::{AccountId, EscrowError, ProjectId, Result, ServiceKey};

/// Authorization and existence lookups consumed by the controller.
pub trait Registry: Send + Sync {
    /// The service exists and was not deleted.
    fn service_exists(&self, key: ServiceKey) -> bool;

    /// Owner of a live project.
    fn project_owner(&self, project: ProjectId) -> Option<AccountId>;

    fn is_project_owner(&self, project: ProjectId, actor: AccountId) -> bool {
        self.project_owner(project) == Some(actor)
    }

    /// `actor` may work on the service as its provider.
    fn is_service_provider(&self, key: ServiceKey, actor: AccountId) -> bool;

    /// `actor` has a profile.
    fn is_registered(&self, actor: AccountId) -> bool;
}

#[derive(Debug, Clone)]
struct ProjectRecord {
    owner: AccountId,
    title: String,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct ServiceRecord {
    title: String,
    deleted: bool,
}

/// Registry backed by in-process maps. Deletes are soft.
///
/// Project numbers are global; service numbers restart at zero in every
/// project.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    profiles: HashSet<AccountId>,
    projects: BTreeMap<ProjectId, ProjectRecord>,
    services: BTreeMap<ServiceKey, ServiceRecord>,
    next_project: ProjectId,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile. Returns `false` if it already existed.
    pub fn register_profile(&mut self, account: AccountId) -> bool {
        self.profiles.insert(account)
    }

    /// Create a project owned by `owner`.
    ///
    /// # Errors
    /// `Unauthorized` if `owner` has no profile.
    pub fn create_project(&mut self, owner: AccountId, title: &str) -> Result<ProjectId> {
        if !self.profiles.contains(&owner) {
            return Err(EscrowError::unauthorized(owner, "create project without profile"));
        }
        let id = self.next_project;
        self.next_project = id.next();
        self.projects.insert(
            id,
            ProjectRecord {
                owner,
                title: title.to_string(),
                deleted: false,
            },
        );
        Ok(id)
    }

    /// Create a service under a live project. Owner only.
    ///
    /// # Errors
    /// `NotFound` for an unknown or deleted project; `Unauthorized` if
    /// `owner` does not own it.
    pub fn create_service(
        &mut self,
        project: ProjectId,
        owner: AccountId,
        title: &str,
    ) -> Result<ServiceKey> {
        self.check_project_owner(project, owner)?;
        let service = self
            .services
            .keys()
            .filter(|k| k.project == project)
            .map(|k| k.service.next())
            .max()
            .unwrap_or_default();
        let key = ServiceKey { project, service };
        self.services.insert(
            key,
            ServiceRecord {
                title: title.to_string(),
                deleted: false,
            },
        );
        Ok(key)
    }

    /// Soft-delete a project and every service under it.
    ///
    /// # Errors
    /// Same as [`InMemoryRegistry::create_service`].
    pub fn delete_project(&mut self, project: ProjectId, owner: AccountId) -> Result<()> {
        self.check_project_owner(project, owner)?;
        if let Some(record) = self.projects.get_mut(&project) {
            record.deleted = true;
        }
        for (_, svc) in self.services.iter_mut().filter(|(k, _)| k.project == project) {
            svc.deleted = true;
        }
        Ok(())
    }

    /// Soft-delete one service.
    ///
    /// # Errors
    /// `NotFound` for an unknown service; `Unauthorized` for a non-owner.
    pub fn delete_service(&mut self, key: ServiceKey, owner: AccountId) -> Result<()> {
        self.check_project_owner(key.project, owner)?;
        let svc = self
            .services
            .get_mut(&key)
            .filter(|s| !s.deleted)
            .ok_or_else(|| EscrowError::not_found(format!("service {key}")))?;
        svc.deleted = true;
        Ok(())
    }

    #[must_use]
    pub fn project_title(&self, project: ProjectId) -> Option<&str> {
        self.projects.get(&project).map(|p| p.title.as_str())
    }

    #[must_use]
    pub fn service_title(&self, key: ServiceKey) -> Option<&str> {
        self.services.get(&key).map(|s| s.title.as_str())
    }

    fn check_project_owner(&self, project: ProjectId, actor: AccountId) -> Result<()> {
        let record = self
            .projects
            .get(&project)
            .filter(|p| !p.deleted)
            .ok_or_else(|| EscrowError::not_found(format!("project {project}")))?;
        if record.owner != actor {
            return Err(EscrowError::unauthorized(actor, format!("manage project {project}")));
        }
        Ok(())
    }
}

impl Registry for InMemoryRegistry {
    fn service_exists(&self, key: ServiceKey) -> bool {
        self.services.get(&key).is_some_and(|s| !s.deleted)
    }

    fn project_owner(&self, project: ProjectId) -> Option<AccountId> {
        self.projects
            .get(&project)
            .filter(|p| !p.deleted)
            .map(|p| p.owner)
    }

    /// Any registered profile other than the project owner.
    fn is_service_provider(&self, key: ServiceKey, actor: AccountId) -> bool {
        self.is_registered(actor)
            && self.service_exists(key)
            && self.project_owner(key.project) != Some(actor)
    }

    fn is_registered(&self, actor: AccountId) -> bool {
        self.profiles.contains(&actor)
    }
}
