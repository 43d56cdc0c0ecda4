//! OpenID Connect Discovery client.
//!
//! Fetches provider metadata from the `.well-known/openid-configuration`
//! endpoint. Every call is a fresh network round trip: the plugin performs
//! no caching and no retries, and the caller owns any retry policy.
//!
//! # Security Considerations
//!
//! - Only HTTPS issuer URLs are allowed (except when `allow_http` is set
//!   for tests)
//! - The `issuer` claim in the discovery document must equal the configured
//!   issuer URL
//! - Requests carry the configured timeout so a slow provider fails the
//!   login instead of hanging the request
//! - Response bodies over 1 MB are rejected before parsing

use std::time::Duration;

use url::Url;

use crate::oidc::OidcDiscoveryDocument;

/// Maximum accepted size of a discovery document body.
const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Errors that can occur during OIDC discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A network error occurred while fetching the discovery document.
    #[error("Network error: {0}")]
    Network(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// The discovery document could not be parsed as JSON.
    #[error("Failed to parse discovery document: {0}")]
    Parse(String),

    /// The discovery document body exceeded the size limit.
    #[error("Discovery document too large: {0} bytes")]
    ResponseTooLarge(usize),

    /// The issuer in the discovery document does not match the expected
    /// issuer.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The expected issuer URL.
        expected: String,
        /// The actual issuer URL from the discovery document.
        actual: String,
    },

    /// The issuer URL scheme is not allowed.
    #[error("Invalid URL scheme: {0} (only HTTPS is allowed)")]
    InvalidScheme(String),
}

/// Client for fetching OIDC discovery documents.
pub struct OidcDiscoveryClient {
    http_client: reqwest::Client,
    allow_http: bool,
}

impl OidcDiscoveryClient {
    /// Creates a new discovery client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(request_timeout: Duration, allow_http: bool) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            allow_http,
        }
    }

    /// Discovers OIDC configuration from an issuer URL.
    ///
    /// Builds `{issuer}/.well-known/openid-configuration`, fetches the
    /// document, and validates that its `issuer` matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer URL is not HTTPS (unless `allow_http`
    /// is set), the document cannot be fetched or parsed, or the issuer in
    /// the document does not match.
    pub async fn discover(&self, issuer: &Url) -> Result<OidcDiscoveryDocument, DiscoveryError> {
        self.validate_issuer_scheme(issuer)?;

        let discovery_url = build_discovery_url(issuer);

        let response = self
            .http_client
            .get(discovery_url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch OIDC discovery from {}: {}", issuer, e);
                DiscoveryError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Http(response.status().as_u16()));
        }

        if let Some(length) = response.content_length() {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            if length > MAX_RESPONSE_SIZE {
                return Err(DiscoveryError::ResponseTooLarge(length));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;
        if body.len() > MAX_RESPONSE_SIZE {
            return Err(DiscoveryError::ResponseTooLarge(body.len()));
        }

        let document: OidcDiscoveryDocument = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(
                "Failed to parse OIDC discovery document from {}: {}",
                issuer,
                e
            );
            DiscoveryError::Parse(e.to_string())
        })?;

        validate_issuer(&document, issuer)?;

        tracing::debug!(
            "Discovered OIDC configuration for issuer {}",
            document.issuer
        );

        Ok(document)
    }

    /// Validates that the issuer URL uses an allowed scheme.
    fn validate_issuer_scheme(&self, issuer: &Url) -> Result<(), DiscoveryError> {
        let scheme = issuer.scheme();

        if scheme == "https" || (scheme == "http" && self.allow_http) {
            return Ok(());
        }

        Err(DiscoveryError::InvalidScheme(scheme.to_string()))
    }
}

/// Builds the discovery URL from an issuer URL.
///
/// Per the OIDC Discovery spec the document lives at
/// `{issuer}/.well-known/openid-configuration`.
fn build_discovery_url(issuer: &Url) -> Url {
    let mut discovery_url = issuer.clone();
    let path = issuer.path().trim_end_matches('/');
    discovery_url.set_path(&format!("{path}/.well-known/openid-configuration"));
    discovery_url
}

/// Validates that the document's issuer matches the expected issuer.
///
/// Comparison ignores a single trailing slash; providers are inconsistent
/// about emitting it.
fn validate_issuer(
    document: &OidcDiscoveryDocument,
    expected: &Url,
) -> Result<(), DiscoveryError> {
    let expected_str = expected.as_str().trim_end_matches('/');
    let actual_str = document.issuer.trim_end_matches('/');

    if expected_str != actual_str {
        return Err(DiscoveryError::IssuerMismatch {
            expected: expected_str.to_string(),
            actual: actual_str.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn discovery_body(issuer: &str) -> serde_json::Value {
        serde_json::json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/authorize"),
            "token_endpoint": format!("{issuer}/token"),
            "userinfo_endpoint": format!("{issuer}/userinfo"),
            "jwks_uri": format!("{issuer}/.well-known/jwks.json")
        })
    }

    #[test]
    fn test_build_discovery_url() {
        let issuer = Url::parse("https://auth.example.com").unwrap();
        assert_eq!(
            build_discovery_url(&issuer).as_str(),
            "https://auth.example.com/.well-known/openid-configuration"
        );

        let issuer = Url::parse("https://auth.example.com/realms/main/").unwrap();
        assert_eq!(
            build_discovery_url(&issuer).as_str(),
            "https://auth.example.com/realms/main/.well-known/openid-configuration"
        );
    }

    #[test]
    fn test_https_required_by_default() {
        let client = OidcDiscoveryClient::new(Duration::from_secs(1), false);
        let issuer = Url::parse("http://auth.example.com").unwrap();
        let err = client.validate_issuer_scheme(&issuer).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidScheme(_)));
    }

    #[tokio::test]
    async fn test_discover_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server.uri())))
            .mount(&server)
            .await;

        let client = OidcDiscoveryClient::new(Duration::from_secs(5), true);
        let issuer = Url::parse(&server.uri()).unwrap();

        let doc = client.discover(&issuer).await.unwrap();
        assert_eq!(doc.issuer, server.uri());
        assert_eq!(doc.token_endpoint, format!("{}/token", server.uri()));
    }

    #[tokio::test]
    async fn test_discover_issuer_mismatch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(discovery_body("https://evil.example.com")),
            )
            .mount(&server)
            .await;

        let client = OidcDiscoveryClient::new(Duration::from_secs(5), true);
        let issuer = Url::parse(&server.uri()).unwrap();

        let err = client.discover(&issuer).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::IssuerMismatch { .. }));
    }

    #[tokio::test]
    async fn test_discover_http_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = OidcDiscoveryClient::new(Duration::from_secs(5), true);
        let issuer = Url::parse(&server.uri()).unwrap();

        let err = client.discover(&issuer).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Http(404)));
    }

    #[tokio::test]
    async fn test_discover_oversized_body() {
        let server = MockServer::start().await;

        let padding = "x".repeat(MAX_RESPONSE_SIZE + 1);
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_string(padding))
            .mount(&server)
            .await;

        let client = OidcDiscoveryClient::new(Duration::from_secs(5), true);
        let issuer = Url::parse(&server.uri()).unwrap();

        let err = client.discover(&issuer).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::ResponseTooLarge(_)));
    }

    #[tokio::test]
    async fn test_discover_malformed_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = OidcDiscoveryClient::new(Duration::from_secs(5), true);
        let issuer = Url::parse(&server.uri()).unwrap();

        let err = client.discover(&issuer).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Parse(_)));
    }

    #[test]
    fn test_validate_issuer_trailing_slash() {
        let doc: OidcDiscoveryDocument = serde_json::from_value(discovery_body(
            "https://auth.example.com/realms/main",
        ))
        .unwrap();

        let expected = Url::parse("https://auth.example.com/realms/main/").unwrap();
        assert!(validate_issuer(&doc, &expected).is_ok());
    }
}
