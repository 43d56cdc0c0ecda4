//! OpenID Connect wire types.
//!
//! Data structures exchanged with the identity provider: the discovery
//! document from `.well-known/openid-configuration` (trimmed to the fields
//! this plugin consumes), the token endpoint response, and the standard
//! OAuth error body.

use serde::{Deserialize, Serialize};

/// OpenID Connect Discovery Document.
///
/// Provider metadata returned from the `.well-known/openid-configuration`
/// endpoint. Only the fields the plugin uses are modeled; unknown fields
/// are ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcDiscoveryDocument {
    /// URL that the provider asserts as its Issuer Identifier. Must match
    /// the configured issuer exactly.
    pub issuer: String,

    /// URL of the provider's Authorization Endpoint.
    pub authorization_endpoint: String,

    /// URL of the provider's Token Endpoint.
    pub token_endpoint: String,

    /// URL of the provider's UserInfo Endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// URL of the provider's JSON Web Key Set document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// OAuth 2.0 scope values the provider supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Claim names the provider may be able to supply values for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims_supported: Option<Vec<String>>,
}

/// OAuth token response from the identity provider.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The access token presented to the userinfo endpoint.
    pub access_token: String,

    /// The token type (usually "Bearer").
    #[serde(default)]
    pub token_type: Option<String>,

    /// Token expiration in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Optional refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Optional ID token (JWT). The plugin does not validate it; the
    /// userinfo endpoint is the source of truth for claims.
    #[serde(default)]
    pub id_token: Option<String>,

    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth error response from the identity provider.
#[derive(Debug, Deserialize)]
pub struct OAuthErrorResponse {
    /// The OAuth error code (e.g. `invalid_grant`).
    pub error: String,

    /// Optional human-readable description.
    #[serde(default)]
    pub error_description: Option<String>,
}
