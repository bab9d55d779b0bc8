//! Authorization filter: per-chunk allow/deny by source path

use crate::errors::Result;
use crate::policy::registry::PolicyRegistry;
use crate::policy::role::Role;
use crate::policy::scope::normalize_path;

/// Pure allow/deny decision over a borrowed registry
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationFilter<'a> {
    registry: &'a PolicyRegistry,
}

impl<'a> AuthorizationFilter<'a> {
    pub fn new(registry: &'a PolicyRegistry) -> Self {
        Self { registry }
    }

    /// True iff `source_path` matches at least one of the role's rules
    pub fn is_authorized(&self, role: Role, source_path: &str) -> bool {
        let rules = self.registry.scopes(role);
        if rules.is_empty() {
            return false;
        }
        let normalized = normalize_path(source_path);
        rules.iter().any(|rule| rule.matches_normalized(&normalized))
    }

    /// Same decision for a role given by name; unknown names are an error,
    /// never a silent deny.
    pub fn is_authorized_by_name(&self, role: &str, source_path: &str) -> Result<bool> {
        let role = role.parse::<Role>()?;
        Ok(self.is_authorized(role, source_path))
    }
}
