//! Authentication entry point.
//!
//! [`AccessTokenAuthService`] is what the host application invokes per
//! login request. It composes the Identity Resolver (external I/O) and the
//! Membership Resolver (transactional local state) linearly and converts
//! every failure into one structured [`AuthFailure`] at the boundary. The
//! host owns sessions and response serialization.

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::connector::IdentityResolver;
use crate::error::{AuthError, AuthFailure};
use crate::provisioning::{
    MembershipResolver, ProvisionAction, RegistrationNotifier,
};
use crate::store::{LocalUser, Membership, MembershipStore};

/// An inbound login request from the host.
///
/// Carries either a bearer access token or an authorization-code-flow
/// callback (`code` plus the reconstructed `redirect_uri`).
#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    /// Bearer access token submitted directly.
    pub access_token: Option<String>,

    /// Authorization code from a callback redirect.
    pub code: Option<String>,

    /// The redirect URI the code was issued for.
    pub redirect_uri: Option<String>,
}

impl LoginRequest {
    /// Builds a bearer-token login request.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Self::default()
        }
    }

    /// Builds an authorization-code login request.
    #[must_use]
    pub fn authorization_code(
        code: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            code: Some(code.into()),
            redirect_uri: Some(redirect_uri.into()),
            ..Self::default()
        }
    }
}

/// A successful login, handed back to the host's session layer.
#[derive(Debug, Clone)]
pub struct LoginResponse {
    /// The authenticated local user.
    pub user: LocalUser,

    /// What provisioning did with the user record.
    pub action: ProvisionAction,

    /// The membership targeted by this login, if any.
    pub membership: Option<Membership>,
}

/// The plugin's authentication service.
pub struct AccessTokenAuthService {
    identity: IdentityResolver,
    membership: MembershipResolver,
}

impl AccessTokenAuthService {
    /// Creates the service with no registration hooks.
    #[must_use]
    pub fn new(config: Arc<AuthConfig>, store: Arc<dyn MembershipStore>) -> Self {
        Self {
            identity: IdentityResolver::new(Arc::clone(&config)),
            membership: MembershipResolver::new(config, store),
        }
    }

    /// Creates the service with host registration hooks.
    #[must_use]
    pub fn with_notifier(
        config: Arc<AuthConfig>,
        store: Arc<dyn MembershipStore>,
        notifier: Arc<dyn RegistrationNotifier>,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(Arc::clone(&config)),
            membership: MembershipResolver::with_notifier(config, store, notifier),
        }
    }

    /// Authenticates one login request.
    ///
    /// Resolves the external identity, provisions local state, and returns
    /// the authenticated user. Never retries; any failure aborts the whole
    /// login with no partial state persisted.
    ///
    /// # Errors
    ///
    /// Every failure, whether provider, policy, or storage, is reported as
    /// one [`AuthFailure`] with a machine-readable reason code.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, AuthFailure> {
        match self.try_login(request).await {
            Ok(response) => {
                tracing::info!(
                    user_id = %response.user.id,
                    action = %response.action,
                    "Authenticated user via access token plugin"
                );
                Ok(response)
            }
            Err(err) => {
                tracing::warn!(reason = err.reason(), "Authentication failed: {}", err);
                Err(AuthFailure::from(err))
            }
        }
    }

    async fn try_login(&self, request: &LoginRequest) -> Result<LoginResponse, AuthError> {
        let identity = match (&request.access_token, &request.code) {
            (Some(token), _) if !token.is_empty() => self.identity.resolve(token).await?,
            (_, Some(code)) if !code.is_empty() => {
                let redirect_uri = request
                    .redirect_uri
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| AuthError::missing_parameter("redirect_uri"))?;
                self.identity.resolve_code(code, redirect_uri).await?
            }
            _ => return Err(AuthError::missing_parameter("access_token")),
        };

        let outcome = self.membership.ensure_membership(&identity).await?;

        Ok(LoginResponse {
            user: outcome.user,
            action: outcome.action,
            membership: outcome.membership,
        })
    }
}
