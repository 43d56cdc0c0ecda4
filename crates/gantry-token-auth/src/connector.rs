//! Identity Resolver.
//!
//! Turns a bearer access token (or an authorization code) into a verified
//! [`ExternalIdentity`] by calling the identity provider. Fails closed: any
//! transport error, non-success status, or malformed body aborts the login
//! and no partial identity is ever returned. There is no caching and no
//! retry; every login is a fresh round trip.

use std::sync::Arc;

use url::Url;

use crate::config::AuthConfig;
use crate::discovery::OidcDiscoveryClient;
use crate::error::AuthError;
use crate::identity::ExternalIdentity;
use crate::oidc::{OAuthErrorResponse, TokenResponse};

/// Resolves bearer tokens and authorization codes into external identities.
pub struct IdentityResolver {
    config: Arc<AuthConfig>,
    http_client: reqwest::Client,
    discovery: OidcDiscoveryClient,
}

impl IdentityResolver {
    /// Creates a new resolver over the deployment configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(config: Arc<AuthConfig>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        let discovery = OidcDiscoveryClient::new(config.request_timeout, config.allow_http);

        Self {
            config,
            http_client,
            discovery,
        }
    }

    /// Resolves a bearer access token into an [`ExternalIdentity`].
    ///
    /// Calls the configured userinfo endpoint with the token as a bearer
    /// credential and maps the claims payload through the deployment's
    /// claim field mapping.
    ///
    /// # Errors
    ///
    /// - [`AuthError::IdentityProvider`] on transport failure, non-success
    ///   status, or a non-JSON body
    /// - [`AuthError::IncompleteIdentity`] when a required claim is absent
    pub async fn resolve(&self, bearer_token: &str) -> Result<ExternalIdentity, AuthError> {
        let endpoint = self.config.userinfo_endpoint.clone().ok_or_else(|| {
            AuthError::Internal {
                detail: "userinfo endpoint is not configured".to_string(),
            }
        })?;

        let claims = self.fetch_userinfo(&endpoint, bearer_token).await?;
        let identity = ExternalIdentity::from_claims(&self.config.claims, &claims)?;

        tracing::debug!(
            external_id = %identity.external_id,
            groups = identity.groups.len(),
            "Resolved identity from userinfo endpoint"
        );

        Ok(identity)
    }

    /// Resolves an authorization code into an [`ExternalIdentity`].
    ///
    /// Extended flow: fetches the provider's discovery document (validating
    /// issuer equality), exchanges the code for tokens at the token
    /// endpoint, then resolves the returned access token via the userinfo
    /// endpoint. Same output contract as [`resolve`](Self::resolve).
    ///
    /// # Errors
    ///
    /// In addition to the userinfo failure modes:
    /// - [`AuthError::Discovery`] when the discovery step fails
    /// - [`AuthError::TokenExchange`] when the code exchange fails
    pub async fn resolve_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ExternalIdentity, AuthError> {
        let issuer = self.config.issuer.as_ref().ok_or_else(|| AuthError::Internal {
            detail: "issuer is not configured".to_string(),
        })?;

        let discovery = self.discovery.discover(issuer).await?;

        let token_endpoint = match &self.config.token_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => Url::parse(&discovery.token_endpoint)
                .map_err(|e| AuthError::token_exchange(format!("invalid token endpoint: {e}")))?,
        };

        let token = self
            .exchange_code(&token_endpoint, code, redirect_uri)
            .await?;

        let userinfo_endpoint = match &self.config.userinfo_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let discovered = discovery.userinfo_endpoint.as_ref().ok_or_else(|| {
                    AuthError::identity_provider("provider advertises no userinfo endpoint")
                })?;
                Url::parse(discovered).map_err(|e| {
                    AuthError::identity_provider(format!("invalid userinfo endpoint: {e}"))
                })?
            }
        };

        let claims = self
            .fetch_userinfo(&userinfo_endpoint, &token.access_token)
            .await?;
        let identity = ExternalIdentity::from_claims(&self.config.claims, &claims)?;

        tracing::debug!(
            external_id = %identity.external_id,
            "Resolved identity via authorization-code exchange"
        );

        Ok(identity)
    }

    /// Fetches and parses the userinfo claims payload.
    async fn fetch_userinfo(
        &self,
        endpoint: &Url,
        bearer_token: &str,
    ) -> Result<serde_json::Value, AuthError> {
        let response = self
            .http_client
            .get(endpoint.as_str())
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Userinfo request to {} failed: {}", endpoint, e);
                AuthError::identity_provider(format!("userinfo request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!("Userinfo request to {} returned HTTP {}", endpoint, status);
            return Err(AuthError::identity_provider(format!(
                "userinfo request returned HTTP {status}"
            )));
        }

        response.json().await.map_err(|e| {
            AuthError::identity_provider(format!("userinfo response is not valid JSON: {e}"))
        })
    }

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        token_endpoint: &Url,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ];

        tracing::debug!("Exchanging authorization code at {}", token_endpoint);

        let response = self
            .http_client
            .post(token_endpoint.as_str())
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::token_exchange(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            // Prefer the provider's own OAuth error code when present.
            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                return Err(AuthError::token_exchange(format!(
                    "{} - {}",
                    oauth_error.error,
                    oauth_error.error_description.unwrap_or_default()
                )));
            }

            return Err(AuthError::token_exchange(format!("HTTP {status} - {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::token_exchange(format!("failed to parse token response: {e}")))
    }
}
