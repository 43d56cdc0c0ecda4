//! Authentication error types.
//!
//! This module defines the error taxonomy for the token authentication
//! plugin and the structured failure signal handed back to the host
//! application at the login boundary.

use serde::Serialize;

use crate::discovery::DiscoveryError;
use crate::store::StorageError;

/// Errors that can occur during token authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Talking to the identity provider failed: transport error, non-success
    /// HTTP status, or a malformed (non-JSON) response body.
    #[error("Identity provider error: {detail}")]
    IdentityProvider {
        /// Description of the failure.
        detail: String,
    },

    /// A required claim field is missing from the userinfo response.
    #[error("Missing required claim field '{field}' in userinfo response")]
    IncompleteIdentity {
        /// The name of the missing claim field.
        field: String,
    },

    /// OIDC discovery failed (authorization-code flow only).
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Exchanging the authorization code for tokens failed.
    #[error("Token exchange failed: {detail}")]
    TokenExchange {
        /// Description of the failure.
        detail: String,
    },

    /// No group claim matched an authorized project while group filtering
    /// is enabled.
    #[error("Access denied: {detail}")]
    AccessDenied {
        /// Description of why access was denied.
        detail: String,
    },

    /// A group claim resolved to a project that does not exist.
    #[error("Unknown project: {project}")]
    UnknownProject {
        /// The project identifier that could not be found.
        project: String,
    },

    /// The login request lacked a required parameter.
    #[error("Missing required parameter: {name}")]
    MissingParameter {
        /// The name of the missing parameter.
        name: String,
    },

    /// A storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// An unclassified internal failure.
    #[error("Internal error: {detail}")]
    Internal {
        /// Description of the failure.
        detail: String,
    },
}

impl AuthError {
    /// Creates an `IdentityProvider` error.
    #[must_use]
    pub fn identity_provider(detail: impl Into<String>) -> Self {
        Self::IdentityProvider {
            detail: detail.into(),
        }
    }

    /// Creates an `IncompleteIdentity` error naming the missing claim.
    #[must_use]
    pub fn incomplete_identity(field: impl Into<String>) -> Self {
        Self::IncompleteIdentity {
            field: field.into(),
        }
    }

    /// Creates a `TokenExchange` error.
    #[must_use]
    pub fn token_exchange(detail: impl Into<String>) -> Self {
        Self::TokenExchange {
            detail: detail.into(),
        }
    }

    /// Creates an `AccessDenied` error.
    #[must_use]
    pub fn access_denied(detail: impl Into<String>) -> Self {
        Self::AccessDenied {
            detail: detail.into(),
        }
    }

    /// Creates a `MissingParameter` error.
    #[must_use]
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Returns the stable machine-readable reason code for this error.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::IdentityProvider { .. } => "identity_provider_error",
            Self::IncompleteIdentity { .. } => "incomplete_identity",
            Self::Discovery(_) => "discovery_error",
            Self::TokenExchange { .. } => "token_exchange_error",
            Self::AccessDenied { .. } => "access_denied",
            Self::UnknownProject { .. } => "unknown_project",
            Self::MissingParameter { .. } => "missing_parameter",
            Self::Storage(_) | Self::Internal { .. } => "unexpected_error",
        }
    }

    /// Returns `true` if this error originated at the identity provider.
    #[must_use]
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            Self::IdentityProvider { .. } | Self::Discovery(_) | Self::TokenExchange { .. }
        )
    }

    /// Returns `true` if this error denied the login on policy grounds.
    #[must_use]
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

/// Structured "authentication failed" signal surfaced to the host.
///
/// Every [`AuthError`] collapses to one of these at the login boundary:
/// a machine-readable reason code plus human-readable detail. The host
/// serializes it into its own error response format.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthFailure {
    /// Stable snake_case reason code (e.g. `"access_denied"`).
    pub reason: &'static str,

    /// Human-readable description of the failure.
    pub detail: String,
}

impl From<AuthError> for AuthFailure {
    fn from(err: AuthError) -> Self {
        Self {
            reason: err.reason(),
            detail: err.to_string(),
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}

impl std::error::Error for AuthFailure {}
