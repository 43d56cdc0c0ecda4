//! Plugin configuration.
//!
//! The plugin is configured once at process start with an immutable
//! [`AuthConfig`] that is passed into both resolver components. The host
//! deploys the plugin via environment variables, so [`AuthConfig::from_env`]
//! is the usual construction path; builder methods exist for tests and
//! embedded use.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Default identity-link key stored alongside each external identity.
pub const DEFAULT_PROVIDER_KEY: &str = "access_token_auth";

/// Default role assigned when no group claim resolves to one.
pub const DEFAULT_ROLE: &str = "member";

/// Default group name that grants project admin on a membership.
pub const DEFAULT_ADMIN_GROUP: &str = "admin";

/// Default timeout for identity provider round trips.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("Invalid value for {var}: {detail}")]
    InvalidValue {
        /// The environment variable name.
        var: String,
        /// Description of the parse failure.
        detail: String,
    },
}

impl ConfigError {
    fn invalid(var: &str, detail: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.to_string(),
            detail: detail.into(),
        }
    }
}

/// Names of the claim fields read from the userinfo payload.
///
/// Providers differ in how they name claims; every field the plugin reads
/// is configurable, defaulting to the standard OIDC claim names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimMapping {
    /// Claim holding the stable external id. Default: `sub`.
    pub guid: String,

    /// Claim holding the username. Default: `preferred_username`.
    pub username: String,

    /// Claim holding the email address. Default: `email`.
    pub email: String,

    /// Claim holding the display name. Default: `name`.
    pub full_name: String,

    /// Claim holding the group memberships. Default: `groups`.
    pub groups: String,
}

impl Default for ClaimMapping {
    fn default() -> Self {
        Self {
            guid: "sub".to_string(),
            username: "preferred_username".to_string(),
            email: "email".to_string(),
            full_name: "name".to_string(),
            groups: "groups".to_string(),
        }
    }
}

/// Immutable plugin configuration.
///
/// Constructed once at process start (usually via [`AuthConfig::from_env`])
/// and shared by the identity and membership resolvers. There is no mutable
/// global state: tests construct their own instances directly.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Identity provider issuer URL (required for the authorization-code
    /// flow; used to locate and validate the discovery document).
    pub issuer: Option<Url>,

    /// Userinfo endpoint URL (required for the bearer-token flow).
    pub userinfo_endpoint: Option<Url>,

    /// Token endpoint URL. When absent, the endpoint from the discovery
    /// document is used.
    pub token_endpoint: Option<Url>,

    /// OAuth client id for the code exchange.
    pub client_id: String,

    /// OAuth client secret for the code exchange.
    pub client_secret: String,

    /// Claim field names read from the userinfo payload.
    pub claims: ClaimMapping,

    /// Identity-link key, constant per deployment. Distinguishes links
    /// created by this plugin from other auth backends in the host.
    pub provider_key: String,

    /// Known projects: normalized (uppercase) key from group claims to the
    /// host's project id.
    projects: HashMap<String, i64>,

    /// Role assigned when no group claim resolves to one.
    pub default_role: String,

    /// Project used when no group claim matches and filtering is disabled.
    /// When absent, unmatched logins are provisioned without a membership.
    pub default_project: Option<i64>,

    /// When enabled, a login whose groups match no known project is denied.
    pub filter_groups: bool,

    /// Group name (role side of `role:project`) that grants project admin.
    pub admin_group: String,

    /// Timeout applied to every identity provider round trip.
    pub request_timeout: Duration,

    /// Whether to allow plain HTTP endpoints (testing only).
    pub allow_http: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            userinfo_endpoint: None,
            token_endpoint: None,
            client_id: String::new(),
            client_secret: String::new(),
            claims: ClaimMapping::default(),
            provider_key: DEFAULT_PROVIDER_KEY.to_string(),
            projects: HashMap::new(),
            default_role: DEFAULT_ROLE.to_string(),
            default_project: None,
            filter_groups: false,
            admin_group: DEFAULT_ADMIN_GROUP.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            allow_http: false,
        }
    }
}

impl AuthConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the configuration from environment variables.
    ///
    /// Unset variables fall back to their defaults; see the crate
    /// documentation for the full variable table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a set variable holds a malformed value
    /// (unparseable URL, number, boolean, or project table).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.issuer = read_url("OIDC_ISSUER")?;
        config.userinfo_endpoint = read_url("OIDC_USERINFO_ENDPOINT")?;
        config.token_endpoint = read_url("OIDC_TOKEN_ENDPOINT")?;

        if let Ok(v) = env::var("OIDC_CLIENT_ID") {
            config.client_id = v;
        }
        if let Ok(v) = env::var("OIDC_CLIENT_SECRET") {
            config.client_secret = v;
        }

        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_CLAIM_GUID") {
            config.claims.guid = v;
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_CLAIM_USERNAME") {
            config.claims.username = v;
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_CLAIM_EMAIL") {
            config.claims.email = v;
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_CLAIM_FULL_NAME") {
            config.claims.full_name = v;
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_CLAIM_GROUPS") {
            config.claims.groups = v;
        }

        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_USER_KEY") {
            config.provider_key = v;
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_PROJECTS") {
            config.projects = parse_project_table("GANTRY_TOKEN_AUTH_PROJECTS", &v)?;
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_DEFAULT_ROLE") {
            config.default_role = v;
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_DEFAULT_PROJECT") {
            let id = v.trim().parse::<i64>().map_err(|e| {
                ConfigError::invalid("GANTRY_TOKEN_AUTH_DEFAULT_PROJECT", e.to_string())
            })?;
            config.default_project = Some(id);
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_FILTER_GROUPS") {
            config.filter_groups = parse_bool("GANTRY_TOKEN_AUTH_FILTER_GROUPS", &v)?;
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_ADMIN_GROUP") {
            config.admin_group = v;
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_REQUEST_TIMEOUT") {
            let secs = v.trim().parse::<u64>().map_err(|e| {
                ConfigError::invalid("GANTRY_TOKEN_AUTH_REQUEST_TIMEOUT", e.to_string())
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(v) = env::var("GANTRY_TOKEN_AUTH_ALLOW_HTTP") {
            config.allow_http = parse_bool("GANTRY_TOKEN_AUTH_ALLOW_HTTP", &v)?;
        }

        Ok(config)
    }

    /// Sets the issuer URL.
    #[must_use]
    pub fn with_issuer(mut self, issuer: Url) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Sets the userinfo endpoint URL.
    #[must_use]
    pub fn with_userinfo_endpoint(mut self, endpoint: Url) -> Self {
        self.userinfo_endpoint = Some(endpoint);
        self
    }

    /// Sets the token endpoint URL, overriding discovery.
    #[must_use]
    pub fn with_token_endpoint(mut self, endpoint: Url) -> Self {
        self.token_endpoint = Some(endpoint);
        self
    }

    /// Sets the OAuth client credentials.
    #[must_use]
    pub fn with_client(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.client_id = id.into();
        self.client_secret = secret.into();
        self
    }

    /// Sets the claim field mapping.
    #[must_use]
    pub fn with_claims(mut self, claims: ClaimMapping) -> Self {
        self.claims = claims;
        self
    }

    /// Sets the identity-link key.
    #[must_use]
    pub fn with_provider_key(mut self, key: impl Into<String>) -> Self {
        self.provider_key = key.into();
        self
    }

    /// Adds a known project mapping. The key is normalized to uppercase.
    #[must_use]
    pub fn with_project(mut self, key: impl AsRef<str>, project_id: i64) -> Self {
        self.projects
            .insert(key.as_ref().to_uppercase(), project_id);
        self
    }

    /// Sets the default role for unmatched logins.
    #[must_use]
    pub fn with_default_role(mut self, role: impl Into<String>) -> Self {
        self.default_role = role.into();
        self
    }

    /// Sets the default project for unmatched logins.
    #[must_use]
    pub fn with_default_project(mut self, project_id: i64) -> Self {
        self.default_project = Some(project_id);
        self
    }

    /// Enables or disables group filtering.
    #[must_use]
    pub fn with_filter_groups(mut self, filter: bool) -> Self {
        self.filter_groups = filter;
        self
    }

    /// Sets the admin group name.
    #[must_use]
    pub fn with_admin_group(mut self, group: impl Into<String>) -> Self {
        self.admin_group = group.into();
        self
    }

    /// Sets the identity provider request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Allows plain HTTP endpoints (testing only).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Looks up a project id by its group-claim key, case-insensitively.
    #[must_use]
    pub fn project_id(&self, key: &str) -> Option<i64> {
        self.projects.get(&key.to_uppercase()).copied()
    }

    /// Returns `true` if any project mappings are configured.
    #[must_use]
    pub fn has_projects(&self) -> bool {
        !self.projects.is_empty()
    }
}

fn read_url(var: &str) -> Result<Option<Url>, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Url::parse(v.trim())
            .map(Some)
            .map_err(|e| ConfigError::invalid(var, e.to_string())),
        _ => Ok(None),
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::invalid(
            var,
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

/// Parses a `NAME=id,NAME=id` project table.
fn parse_project_table(var: &str, value: &str) -> Result<HashMap<String, i64>, ConfigError> {
    let mut projects = HashMap::new();
    for entry in value.split(',').filter(|e| !e.trim().is_empty()) {
        let (key, id) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::invalid(var, format!("entry '{entry}' is not NAME=id")))?;
        let id = id
            .trim()
            .parse::<i64>()
            .map_err(|e| ConfigError::invalid(var, format!("project id in '{entry}': {e}")))?;
        projects.insert(key.trim().to_uppercase(), id);
    }
    Ok(projects)
}
