//! # gantry-token-auth-memory
//!
//! In-memory storage backend for `gantry-token-auth`.
//!
//! Implements [`MembershipStore`] over plain in-process state. Intended for
//! tests and development; production deployments implement the storage
//! traits over the host application's database.
//!
//! Transactions take the store-wide lock for their whole lifetime, so
//! logins serialize. Rollback restores a snapshot taken at `begin`, which
//! gives the same no-partial-state guarantee a database transaction does.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use gantry_token_auth::store::{
    IdentityLink, LocalUser, Membership, MembershipStore, Role, StorageError, StoreTx,
};

#[derive(Debug, Clone, Default)]
struct State {
    users: Vec<LocalUser>,
    links: Vec<IdentityLink>,
    projects: HashSet<i64>,
    roles: Vec<Role>,
    memberships: Vec<Membership>,
}

/// In-memory [`MembershipStore`] implementation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a host-owned project. The plugin never creates projects, so
    /// tests register them up front.
    pub async fn add_project(&self, project_id: i64) {
        self.state.lock().await.projects.insert(project_id);
    }

    /// Returns the number of stored users.
    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    /// Returns the number of stored identity links.
    pub async fn link_count(&self) -> usize {
        self.state.lock().await.links.len()
    }

    /// Returns the number of stored memberships.
    pub async fn membership_count(&self) -> usize {
        self.state.lock().await.memberships.len()
    }

    /// Returns the number of stored roles.
    pub async fn role_count(&self) -> usize {
        self.state.lock().await.roles.len()
    }

    /// Looks up a membership outside any transaction.
    pub async fn membership(&self, user_id: Uuid, project_id: i64) -> Option<Membership> {
        self.state
            .lock()
            .await
            .memberships
            .iter()
            .find(|m| m.user_id == user_id && m.project_id == project_id)
            .cloned()
    }

    /// Looks up a role by id outside any transaction.
    pub async fn role(&self, role_id: Uuid) -> Option<Role> {
        self.state
            .lock()
            .await
            .roles
            .iter()
            .find(|r| r.id == role_id)
            .cloned()
    }

    /// Inserts a user directly, bypassing transaction bookkeeping. Test
    /// setup helper for pre-existing local accounts.
    pub async fn seed_user(&self, user: LocalUser) {
        self.state.lock().await.users.push(user);
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StorageError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard.clone();
        tracing::trace!(
            users = snapshot.users.len(),
            memberships = snapshot.memberships.len(),
            "Opened in-memory transaction"
        );
        Ok(Box::new(MemoryTx { guard, snapshot }))
    }
}

/// One open transaction: exclusive access to the state plus a snapshot for
/// rollback.
struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    snapshot: State,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_user_by_link(
        &mut self,
        provider_key: &str,
        external_id: &str,
    ) -> Result<Option<LocalUser>, StorageError> {
        let user = self
            .guard
            .links
            .iter()
            .find(|l| l.matches(provider_key, external_id))
            .and_then(|l| self.guard.users.iter().find(|u| u.id == l.user_id))
            .cloned();
        Ok(user)
    }

    async fn find_user_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<LocalUser>, StorageError> {
        Ok(self
            .guard
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn username_taken(&mut self, username: &str) -> Result<bool, StorageError> {
        Ok(self.guard.users.iter().any(|u| u.username == username))
    }

    async fn create_user(&mut self, user: &LocalUser) -> Result<(), StorageError> {
        if self.guard.users.iter().any(|u| u.username == user.username) {
            return Err(StorageError::conflict(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        if self.guard.users.iter().any(|u| u.email == user.email) {
            return Err(StorageError::conflict(format!(
                "email '{}' already exists",
                user.email
            )));
        }
        self.guard.users.push(user.clone());
        Ok(())
    }

    async fn create_link(&mut self, link: &IdentityLink) -> Result<(), StorageError> {
        if self
            .guard
            .links
            .iter()
            .any(|l| l.matches(&link.provider_key, &link.external_id))
        {
            return Err(StorageError::conflict(format!(
                "identity link ({}, {}) already exists",
                link.provider_key, link.external_id
            )));
        }
        self.guard.links.push(link.clone());
        Ok(())
    }

    async fn project_exists(&mut self, project_id: i64) -> Result<bool, StorageError> {
        Ok(self.guard.projects.contains(&project_id))
    }

    async fn get_or_create_role(
        &mut self,
        project_id: i64,
        name: &str,
    ) -> Result<Role, StorageError> {
        if let Some(role) = self
            .guard
            .roles
            .iter()
            .find(|r| r.project_id == project_id && r.name == name)
        {
            return Ok(role.clone());
        }

        let role = Role::new(project_id, name);
        self.guard.roles.push(role.clone());
        Ok(role)
    }

    async fn find_membership(
        &mut self,
        user_id: Uuid,
        project_id: i64,
    ) -> Result<Option<Membership>, StorageError> {
        Ok(self
            .guard
            .memberships
            .iter()
            .find(|m| m.user_id == user_id && m.project_id == project_id)
            .cloned())
    }

    async fn create_membership(&mut self, membership: &Membership) -> Result<(), StorageError> {
        if self
            .guard
            .memberships
            .iter()
            .any(|m| m.user_id == membership.user_id && m.project_id == membership.project_id)
        {
            return Err(StorageError::conflict(format!(
                "membership ({}, {}) already exists",
                membership.user_id, membership.project_id
            )));
        }
        self.guard.memberships.push(membership.clone());
        Ok(())
    }

    async fn grant_admin(&mut self, user_id: Uuid, project_id: i64) -> Result<(), StorageError> {
        let membership = self
            .guard
            .memberships
            .iter_mut()
            .find(|m| m.user_id == user_id && m.project_id == project_id)
            .ok_or_else(|| {
                StorageError::not_found(format!("membership ({user_id}, {project_id})"))
            })?;
        membership.is_admin = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        // Writes went to the live state; releasing the lock publishes them.
        drop(self.guard);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        *self.guard = self.snapshot;
        Ok(())
    }
}
