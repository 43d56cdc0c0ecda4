//! Group-claim resolution policy.
//!
//! Translates the provider's group claims into a membership target for the
//! host application. The admitted syntax is `<role>:<project-key>`, split
//! on the first `:`; project keys are matched case-insensitively against
//! the configured project table. Groups that do not parse, or whose key is
//! not configured, are skipped; providers routinely send unrelated groups.
//!
//! Pure and synchronous so deployments' policies are trivially testable.

use crate::config::AuthConfig;
use crate::error::AuthError;

/// The `(role, project)` a login resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipTarget {
    /// The host project id.
    pub project_id: i64,

    /// The role name to assign on membership creation.
    pub role_name: String,
}

/// Outcome of resolving a login's group claims.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupResolution {
    /// The primary membership target, if any. `None` means the login is
    /// provisioned without a membership (no match, filtering disabled, no
    /// default project configured).
    pub target: Option<MembershipTarget>,

    /// Projects on which the admin group grants `is_admin`. Elevation is
    /// monotonic: these are only ever added, never revoked.
    pub admin_projects: Vec<i64>,
}

/// Resolves group claims into a membership target and admin grants.
///
/// The first group whose project key is configured determines the target
/// role and project. Admin grants (`<admin-group>:<project-key>`) are
/// collected independently of primary resolution. With no matching group,
/// filtering mode denies the login; otherwise the configured default role
/// and project apply.
///
/// # Errors
///
/// Returns [`AuthError::AccessDenied`] when no group matches and
/// `filter_groups` is enabled.
pub fn resolve_groups(
    config: &AuthConfig,
    groups: &[String],
) -> Result<GroupResolution, AuthError> {
    let mut target: Option<MembershipTarget> = None;
    let mut admin_projects: Vec<i64> = Vec::new();

    for group in groups {
        let Some((role, key)) = group.split_once(':') else {
            continue;
        };
        let Some(project_id) = config.project_id(key.trim()) else {
            continue;
        };
        let role = role.trim();

        if role == config.admin_group && !admin_projects.contains(&project_id) {
            admin_projects.push(project_id);
        }

        // First configured match wins.
        if target.is_none() {
            target = Some(MembershipTarget {
                project_id,
                role_name: role.to_string(),
            });
        }
    }

    if target.is_none() {
        if config.filter_groups {
            tracing::debug!(groups = groups.len(), "No authorized group in claims, denying");
            return Err(AuthError::access_denied(
                "no group claim matches an authorized project",
            ));
        }

        target = config.default_project.map(|project_id| MembershipTarget {
            project_id,
            role_name: config.default_role.clone(),
        });
    }

    if let Some(ref t) = target {
        tracing::debug!(
            project_id = t.project_id,
            role = %t.role_name,
            admin_grants = admin_projects.len(),
            "Resolved group claims"
        );
    }

    Ok(GroupResolution {
        target,
        admin_projects,
    })
}
