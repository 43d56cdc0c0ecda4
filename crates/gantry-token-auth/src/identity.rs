//! The resolved external identity.
//!
//! [`ExternalIdentity`] is the Identity Resolver's output contract: the
//! verified attributes of one authenticated subject, produced fresh per
//! login and never persisted directly.

use serde_json::Value;

use crate::config::ClaimMapping;
use crate::error::AuthError;

/// Verified identity attributes returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Stable, opaque, provider-issued identifier (unique per provider).
    pub external_id: String,

    /// Username as asserted by the provider.
    pub username: String,

    /// Email address as asserted by the provider.
    pub email: String,

    /// Display name as asserted by the provider.
    pub full_name: String,

    /// Group memberships; empty when the provider sent none.
    pub groups: Vec<String>,
}

impl ExternalIdentity {
    /// Extracts an identity from a userinfo claims payload.
    ///
    /// Claim field names come from the deployment's [`ClaimMapping`]. The
    /// group claim is optional and accepts either a JSON array of strings
    /// or a comma-separated string; every other field is required.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::IncompleteIdentity`] naming the first required
    /// claim that is absent or not a string.
    pub fn from_claims(mapping: &ClaimMapping, claims: &Value) -> Result<Self, AuthError> {
        Ok(Self {
            external_id: required_str(claims, &mapping.guid)?,
            username: required_str(claims, &mapping.username)?,
            email: required_str(claims, &mapping.email)?,
            full_name: required_str(claims, &mapping.full_name)?,
            groups: group_values(claims.get(&mapping.groups)),
        })
    }
}

fn required_str(claims: &Value, field: &str) -> Result<String, AuthError> {
    claims
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| AuthError::incomplete_identity(field))
}

/// Extracts group names from a claim value.
///
/// Providers emit groups either as an array of strings or as one
/// comma-separated string. Anything else yields no groups.
fn group_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}
