//! Storage records and traits.
//!
//! Defines the local records the plugin reads and writes (users, identity
//! links, roles, memberships) and the storage interface backends implement.
//! The host application owns the actual schema; backends live in sibling
//! crates (e.g. `gantry-token-auth-memory`).
//!
//! One [`StoreTx`] is one atomic unit of work per login: nothing a
//! transaction writes is observable until `commit`, and any error aborts
//! the whole login with no partial state persisted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An insert violated a uniqueness constraint.
    ///
    /// Callers treat this as "someone else already created it" and retry
    /// once as a lookup.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The backend failed (connection loss, I/O error, ...).
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A local user account in the host application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalUser {
    /// Unique identifier.
    pub id: Uuid,

    /// Unique username, slugified from the external username.
    pub username: String,

    /// Unique email address.
    pub email: String,

    /// Display name.
    pub full_name: String,

    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl LocalUser {
    /// Creates a new user record with a fresh id.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            full_name: full_name.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// The durable mapping binding one external identity to one local user.
///
/// Unique on `(provider_key, external_id)`. Created exactly once at first
/// successful login for that external identity and never reassigned: the
/// linked user is authoritative for all future logins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityLink {
    /// The linked local user.
    pub user_id: Uuid,

    /// The identity-link key, constant per deployment.
    pub provider_key: String,

    /// The provider-issued stable identifier.
    pub external_id: String,

    /// When this link was created.
    #[serde(with = "time::serde::rfc3339")]
    pub linked_at: OffsetDateTime,
}

impl IdentityLink {
    /// Creates a new link record.
    #[must_use]
    pub fn new(
        user_id: Uuid,
        provider_key: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            provider_key: provider_key.into(),
            external_id: external_id.into(),
            linked_at: OffsetDateTime::now_utc(),
        }
    }

    /// Checks if this link matches the given provider key and external id.
    #[must_use]
    pub fn matches(&self, provider_key: &str, external_id: &str) -> bool {
        self.provider_key == provider_key && self.external_id == external_id
    }
}

/// A role within one project. Unique on `(project_id, name)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    /// Unique identifier.
    pub id: Uuid,

    /// The project this role belongs to.
    pub project_id: i64,

    /// Role name (e.g. "member", "viewer").
    pub name: String,
}

impl Role {
    /// Creates a new role record with a fresh id.
    #[must_use]
    pub fn new(project_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: name.into(),
        }
    }
}

/// A user's membership in one project. Unique on `(user_id, project_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    /// The member.
    pub user_id: Uuid,

    /// The project.
    pub project_id: i64,

    /// The member's role in this project.
    pub role_id: Uuid,

    /// Whether the member administers this project. Only ever set, never
    /// cleared by this plugin.
    pub is_admin: bool,
}

impl Membership {
    /// Creates a new membership record.
    #[must_use]
    pub fn new(user_id: Uuid, project_id: i64, role_id: Uuid) -> Self {
        Self {
            user_id,
            project_id,
            role_id,
            is_admin: false,
        }
    }

    /// Marks the membership as project admin.
    #[must_use]
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

/// Storage entry point. Hands out one transaction per login.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Begins a new atomic unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StorageError>;
}

/// One atomic login transaction.
///
/// Writes are invisible outside the transaction until [`commit`]
/// (StoreTx::commit); dropping or rolling back discards them. Insert
/// operations report uniqueness violations as [`StorageError::Conflict`]
/// so a concurrent login for the same identity can be resolved by
/// retrying the lookup once.
#[async_trait]
pub trait StoreTx: Send {
    /// Finds the user bound to an identity link, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_user_by_link(
        &mut self,
        provider_key: &str,
        external_id: &str,
    ) -> Result<Option<LocalUser>, StorageError>;

    /// Finds a user by email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_user_by_email(&mut self, email: &str)
        -> Result<Option<LocalUser>, StorageError>;

    /// Returns `true` if a user with this username already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn username_taken(&mut self, username: &str) -> Result<bool, StorageError>;

    /// Creates a new user.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the username or email is
    /// already taken.
    async fn create_user(&mut self, user: &LocalUser) -> Result<(), StorageError>;

    /// Creates a new identity link.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if a link for the same
    /// `(provider_key, external_id)` already exists.
    async fn create_link(&mut self, link: &IdentityLink) -> Result<(), StorageError>;

    /// Returns `true` if the project exists. Projects are host-owned; the
    /// plugin never creates them.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn project_exists(&mut self, project_id: i64) -> Result<bool, StorageError>;

    /// Gets the role for `(project_id, name)`, creating it lazily.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_or_create_role(
        &mut self,
        project_id: i64,
        name: &str,
    ) -> Result<Role, StorageError>;

    /// Finds a user's membership in a project, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_membership(
        &mut self,
        user_id: Uuid,
        project_id: i64,
    ) -> Result<Option<Membership>, StorageError>;

    /// Creates a new membership.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the user already has a
    /// membership in the project.
    async fn create_membership(&mut self, membership: &Membership) -> Result<(), StorageError>;

    /// Sets `is_admin = true` on the user's membership in the project.
    /// Monotonic: implementations never clear the flag.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the membership does not exist.
    async fn grant_admin(&mut self, user_id: Uuid, project_id: i64) -> Result<(), StorageError>;

    /// Commits the transaction, making its writes visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to commit.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Rolls the transaction back, discarding its writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to roll back.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_helpers() {
        let err = StorageError::conflict("username taken");
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "Conflict: username taken");

        let err = StorageError::not_found("no such membership");
        assert!(err.is_not_found());

        let err = StorageError::backend("connection reset");
        assert!(!err.is_conflict());
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_local_user_new() {
        let user = LocalUser::new("jdoe", "jdoe@example.com", "Jane Doe");
        assert_eq!(user.username, "jdoe");
        assert_eq!(user.email, "jdoe@example.com");
        assert_eq!(user.full_name, "Jane Doe");
    }

    #[test]
    fn test_identity_link_matches() {
        let user_id = Uuid::new_v4();
        let link = IdentityLink::new(user_id, "access_token_auth", "guid-123");

        assert!(link.matches("access_token_auth", "guid-123"));
        assert!(!link.matches("access_token_auth", "other"));
        assert!(!link.matches("saml", "guid-123"));
    }

    #[test]
    fn test_membership_builder() {
        let user_id = Uuid::new_v4();
        let role_id = Uuid::new_v4();

        let membership = Membership::new(user_id, 42, role_id);
        assert!(!membership.is_admin);

        let membership = membership.with_admin(true);
        assert!(membership.is_admin);
        assert_eq!(membership.project_id, 42);
    }

    #[test]
    fn test_link_serialization() {
        let link = IdentityLink::new(Uuid::new_v4(), "access_token_auth", "guid-123");
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["provider_key"], "access_token_auth");
        assert_eq!(json["external_id"], "guid-123");

        let back: IdentityLink = serde_json::from_value(json).unwrap();
        assert_eq!(back, link);
    }
}
