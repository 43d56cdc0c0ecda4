//! Membership Resolver.
//!
//! Takes a resolved [`ExternalIdentity`] and makes the local user, identity
//! link, role, and membership state match what the group-claim policy
//! computed, exactly once per login, inside one atomic transaction, so a
//! half-provisioned login is never observable.
//!
//! Lookup/create sequence (first match wins, no fallthrough once matched):
//!
//! 1. **Identity link**: `(provider_key, external_id)` already bound, the
//!    linked user is authoritative.
//! 2. **Email**: a local user with the same email exists, bind the
//!    external identity to it. Email equality is a deliberate trust
//!    decision (treated as proof of same-person identity).
//! 3. **Create**: provision a new user with a slugified,
//!    collision-adjusted username, link it, and signal registration.
//!
//! Uniqueness conflicts from concurrent logins for the same identity are
//! resolved by retrying the lookup once: the constraint violation means
//! someone else already created the row.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::groups::{MembershipTarget, resolve_groups};
use crate::identity::ExternalIdentity;
use crate::slug;
use crate::store::{IdentityLink, LocalUser, Membership, MembershipStore, StoreTx};

/// Host-side registration hooks.
///
/// Invoked after the provisioning transaction commits, for newly created
/// users only. The host wires its welcome email and registration event in
/// here; failures are logged and never fail the login.
#[async_trait]
pub trait RegistrationNotifier: Send + Sync {
    /// Called once per newly registered user.
    ///
    /// # Errors
    ///
    /// Returns an error if the host-side hook fails; the error is logged
    /// by the resolver and otherwise ignored.
    async fn user_registered(&self, user: &LocalUser) -> Result<(), String>;
}

/// A notifier that does nothing. The default when the host wires no hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl RegistrationNotifier for NoopNotifier {
    async fn user_registered(&self, _user: &LocalUser) -> Result<(), String> {
        Ok(())
    }
}

/// The action the resolver took for a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionAction {
    /// The identity link already existed; the linked user is authoritative.
    ExistingLink,

    /// A user with the same email existed; a link was created to it.
    LinkedByEmail,

    /// A new user was created and linked.
    Registered,
}

impl ProvisionAction {
    /// Returns `true` if a new user was created.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered)
    }

    /// Returns `true` if an existing user was newly linked by email.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::LinkedByEmail)
    }
}

impl std::fmt::Display for ProvisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExistingLink => write!(f, "existing_link"),
            Self::LinkedByEmail => write!(f, "linked_by_email"),
            Self::Registered => write!(f, "registered"),
        }
    }
}

/// Result of provisioning one login.
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    /// The authoritative local user for this login.
    pub user: LocalUser,

    /// What the resolver did with the user record.
    pub action: ProvisionAction,

    /// The membership targeted by group resolution, in its post-login
    /// state. `None` when the login carried no matching group and no
    /// default project is configured.
    pub membership: Option<Membership>,
}

/// Resolves external identities into local membership state.
pub struct MembershipResolver {
    config: Arc<AuthConfig>,
    store: Arc<dyn MembershipStore>,
    notifier: Arc<dyn RegistrationNotifier>,
}

impl MembershipResolver {
    /// Creates a resolver with no registration hooks.
    #[must_use]
    pub fn new(config: Arc<AuthConfig>, store: Arc<dyn MembershipStore>) -> Self {
        Self::with_notifier(config, store, Arc::new(NoopNotifier))
    }

    /// Creates a resolver with host registration hooks.
    #[must_use]
    pub fn with_notifier(
        config: Arc<AuthConfig>,
        store: Arc<dyn MembershipStore>,
        notifier: Arc<dyn RegistrationNotifier>,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
        }
    }

    /// Provisions the local user/link/role/membership state for one login.
    ///
    /// Runs inside one storage transaction: any error rolls the whole login
    /// back and no partial state persists. Registration hooks fire only
    /// after a successful commit.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AccessDenied`] under filtering mode with no matching
    ///   group (no mutation is performed)
    /// - [`AuthError::UnknownProject`] when a resolved project id does not
    ///   exist in storage
    /// - [`AuthError::Storage`] when the backend fails
    pub async fn ensure_membership(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<ProvisionOutcome, AuthError> {
        // Deny-before-begin: a filtered login must not open a write
        // transaction at all.
        let resolution = resolve_groups(&self.config, &identity.groups)?;

        let mut tx = self.store.begin().await.map_err(AuthError::from)?;

        let result = self
            .apply(tx.as_mut(), identity, &resolution.target, &resolution.admin_projects)
            .await;

        match result {
            Ok(outcome) => {
                tx.commit().await.map_err(AuthError::from)?;

                if outcome.action.is_registered() {
                    tracing::info!(
                        user_id = %outcome.user.id,
                        username = %outcome.user.username,
                        "Registered new user from external identity"
                    );
                    if let Err(e) = self.notifier.user_registered(&outcome.user).await {
                        tracing::warn!("Registration notifier failed: {}", e);
                    }
                }

                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Transaction rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Applies the full provisioning sequence inside an open transaction.
    async fn apply(
        &self,
        tx: &mut dyn StoreTx,
        identity: &ExternalIdentity,
        target: &Option<MembershipTarget>,
        admin_projects: &[i64],
    ) -> Result<ProvisionOutcome, AuthError> {
        let (user, action) = self.lookup_or_create_user(tx, identity).await?;

        if let Some(target) = target {
            self.ensure_target_membership(tx, user.id, target).await?;
        }

        for &project_id in admin_projects {
            self.ensure_admin(tx, user.id, project_id).await?;
        }

        let membership = match target {
            Some(target) => tx.find_membership(user.id, target.project_id).await?,
            None => None,
        };

        Ok(ProvisionOutcome {
            user,
            action,
            membership,
        })
    }

    /// Runs the link -> email -> create lookup sequence.
    async fn lookup_or_create_user(
        &self,
        tx: &mut dyn StoreTx,
        identity: &ExternalIdentity,
    ) -> Result<(LocalUser, ProvisionAction), AuthError> {
        let provider_key = &self.config.provider_key;

        if let Some(user) = tx
            .find_user_by_link(provider_key, &identity.external_id)
            .await?
        {
            return Ok((user, ProvisionAction::ExistingLink));
        }

        if let Some(user) = tx.find_user_by_email(&identity.email).await? {
            self.link_user(tx, user.id, identity).await?;
            tracing::debug!(
                user_id = %user.id,
                "Bound external identity to existing user by email"
            );
            return Ok((user, ProvisionAction::LinkedByEmail));
        }

        let username = self.unique_username(tx, &identity.username).await?;
        let user = LocalUser::new(username, &identity.email, &identity.full_name);

        match tx.create_user(&user).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                // A concurrent login created the user first; retry the
                // lookups once.
                if let Some(user) = tx
                    .find_user_by_link(provider_key, &identity.external_id)
                    .await?
                {
                    return Ok((user, ProvisionAction::ExistingLink));
                }
                if let Some(user) = tx.find_user_by_email(&identity.email).await? {
                    self.link_user(tx, user.id, identity).await?;
                    return Ok((user, ProvisionAction::LinkedByEmail));
                }
                return Err(AuthError::from(e));
            }
            Err(e) => return Err(AuthError::from(e)),
        }

        self.link_user(tx, user.id, identity).await?;

        Ok((user, ProvisionAction::Registered))
    }

    /// Creates the identity link, tolerating a concurrent creation.
    async fn link_user(
        &self,
        tx: &mut dyn StoreTx,
        user_id: Uuid,
        identity: &ExternalIdentity,
    ) -> Result<(), AuthError> {
        let link = IdentityLink::new(user_id, &self.config.provider_key, &identity.external_id);

        match tx.create_link(&link).await {
            Ok(()) => Ok(()),
            // Someone else linked this external identity first. The link is
            // write-once, so the existing one stands.
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(AuthError::from(e)),
        }
    }

    /// Finds the first free slug candidate for a username.
    async fn unique_username(
        &self,
        tx: &mut dyn StoreTx,
        username: &str,
    ) -> Result<String, AuthError> {
        let base = slug::slugify(username);

        for n in 0u32.. {
            let candidate = slug::candidate(&base, n);
            if !tx.username_taken(&candidate).await? {
                return Ok(candidate);
            }
        }

        unreachable!("slug candidate space is unbounded")
    }

    /// Upserts the membership for the resolved `(role, project)` target.
    ///
    /// Existing memberships keep their role: a changed group claim on a
    /// repeat login never downgrades a previously assigned role.
    async fn ensure_target_membership(
        &self,
        tx: &mut dyn StoreTx,
        user_id: Uuid,
        target: &MembershipTarget,
    ) -> Result<(), AuthError> {
        if !tx.project_exists(target.project_id).await? {
            return Err(AuthError::UnknownProject {
                project: target.project_id.to_string(),
            });
        }

        if tx.find_membership(user_id, target.project_id).await?.is_some() {
            return Ok(());
        }

        let role = tx
            .get_or_create_role(target.project_id, &target.role_name)
            .await?;
        let membership = Membership::new(user_id, target.project_id, role.id);

        match tx.create_membership(&membership).await {
            Ok(()) => {
                tracing::debug!(
                    user_id = %user_id,
                    project_id = target.project_id,
                    role = %target.role_name,
                    "Created membership"
                );
                Ok(())
            }
            // A concurrent login created it first; its role stands.
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(AuthError::from(e)),
        }
    }

    /// Grants `is_admin` on a project membership, creating the membership
    /// with the default role when absent. Elevation is monotonic.
    async fn ensure_admin(
        &self,
        tx: &mut dyn StoreTx,
        user_id: Uuid,
        project_id: i64,
    ) -> Result<(), AuthError> {
        if !tx.project_exists(project_id).await? {
            return Err(AuthError::UnknownProject {
                project: project_id.to_string(),
            });
        }

        if tx.find_membership(user_id, project_id).await?.is_none() {
            let role = tx
                .get_or_create_role(project_id, &self.config.default_role)
                .await?;
            let membership = Membership::new(user_id, project_id, role.id);

            if let Err(e) = tx.create_membership(&membership).await {
                if !e.is_conflict() {
                    return Err(AuthError::from(e));
                }
            }
        }

        tx.grant_admin(user_id, project_id).await?;
        tracing::debug!(
            user_id = %user_id,
            project_id = project_id,
            "Granted project admin from admin group claim"
        );

        Ok(())
    }
}
