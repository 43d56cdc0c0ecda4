//! # gantry-token-auth
//!
//! Access-token authentication plugin for the Gantry project tracker.
//!
//! Authenticates users against an external OIDC identity provider using
//! bearer access tokens (or a full authorization-code exchange), then
//! provisions or updates local user, identity-link, role, and membership
//! records from the provider's group claims. A glue layer: it translates
//! one external identity assertion into local authorization state,
//! exactly one local user and one role-in-one-project per login.
//!
//! ## Modules
//!
//! - [`config`] - Immutable deployment configuration (env-sourced)
//! - [`connector`] - Identity Resolver: userinfo, discovery, code exchange
//! - [`identity`] - The resolved external identity contract
//! - [`groups`] - Group-claim to role/project resolution policy
//! - [`provisioning`] - Membership Resolver: idempotent user/link/membership upsert
//! - [`store`] - Storage records and backend traits
//! - [`service`] - The login entry point invoked by the host
//! - [`error`] - Error taxonomy and the structured failure signal
//!
//! ## Flow
//!
//! Inbound request → Identity Resolver (external I/O) → Membership
//! Resolver (one atomic transaction) → local user handed back to the
//! host's session layer. Fails closed everywhere: no partial identity, no
//! partial local state, no automatic retries.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gantry_token_auth::{AccessTokenAuthService, AuthConfig, LoginRequest};
//! use gantry_token_auth_memory::MemoryStore;
//!
//! let config = Arc::new(AuthConfig::from_env()?);
//! let store = Arc::new(MemoryStore::new());
//! let service = AccessTokenAuthService::new(config, store);
//!
//! let response = service.login(&LoginRequest::bearer(token)).await?;
//! println!("authenticated {}", response.user.username);
//! ```

pub mod config;
pub mod connector;
pub mod discovery;
pub mod error;
pub mod groups;
pub mod identity;
pub mod oidc;
pub mod provisioning;
pub mod service;
pub mod slug;
pub mod store;

pub use config::{AuthConfig, ClaimMapping, ConfigError};
pub use connector::IdentityResolver;
pub use discovery::{DiscoveryError, OidcDiscoveryClient};
pub use error::{AuthError, AuthFailure};
pub use groups::{GroupResolution, MembershipTarget, resolve_groups};
pub use identity::ExternalIdentity;
pub use provisioning::{
    MembershipResolver, NoopNotifier, ProvisionAction, ProvisionOutcome, RegistrationNotifier,
};
pub use service::{AccessTokenAuthService, LoginRequest, LoginResponse};
pub use store::{
    IdentityLink, LocalUser, Membership, MembershipStore, Role, StorageError, StoreTx,
};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
