//! Policy registry: role → authorized scope rules
//!
//! Built once at process start and shared read-only (`Arc<PolicyRegistry>`)
//! with every request. There is no mutation or reload API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::errors::{RagError, Result};
use crate::policy::role::Role;
use crate::policy::scope::{normalize_path, ScopeRule};

/// One `[[roles]]` table of a policy file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePolicy {
    pub role: Role,
    #[serde(default)]
    pub scopes: Vec<ScopeRule>,
}

/// On-disk policy representation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub roles: Vec<RolePolicy>,
}

/// Immutable mapping from role to its scope rules
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    scopes: BTreeMap<Role, Vec<ScopeRule>>,
}

impl PolicyRegistry {
    /// Build a registry and check its construction invariants.
    ///
    /// The executive role must match every path: either it holds a
    /// universal rule, or every entry of `known_paths` matches one of its
    /// rules. Roles absent from `policies` get an empty scope.
    pub fn new(policies: Vec<RolePolicy>, known_paths: &[String]) -> Result<Self> {
        let mut scopes: BTreeMap<Role, Vec<ScopeRule>> =
            Role::ALL.iter().map(|r| (*r, Vec::new())).collect();

        for policy in policies {
            let entry = scopes.entry(policy.role).or_default();
            for rule in policy.scopes {
                if !entry.contains(&rule) {
                    entry.push(rule);
                }
            }
        }

        let registry = Self { scopes };
        registry.check_executive_scope(known_paths)?;
        Ok(registry)
    }

    /// Load a TOML policy file
    pub fn from_file(path: &Path, known_paths: &[String]) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let file: PolicyFile = toml::from_str(&contents).map_err(|e| {
            RagError::PolicyError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Self::new(file.roles, known_paths)
    }

    /// Built-in policy of the FinSolve document corpus
    pub fn finsolve_default() -> Self {
        let policies = vec![
            RolePolicy {
                role: Role::Employee,
                scopes: vec![ScopeRule::prefix("general/")],
            },
            RolePolicy {
                role: Role::Finance,
                scopes: vec![
                    ScopeRule::prefix("finance/"),
                    ScopeRule::exact("general/employee_handbook.md"),
                    // Cross-department grant for expense analysis
                    ScopeRule::exact("marketing/marketing_report_2024.md"),
                ],
            },
            RolePolicy {
                role: Role::Marketing,
                scopes: vec![ScopeRule::prefix("marketing/")],
            },
            RolePolicy {
                role: Role::Hr,
                scopes: vec![ScopeRule::prefix("hr/"), ScopeRule::prefix("general/")],
            },
            RolePolicy {
                role: Role::Engineering,
                scopes: vec![ScopeRule::prefix("engineering/")],
            },
            RolePolicy {
                role: Role::Executive,
                scopes: vec![ScopeRule::universal()],
            },
        ];

        let scopes = policies.into_iter().map(|p| (p.role, p.scopes)).collect();
        Self { scopes }
    }

    /// Scope rules of a role given by name.
    ///
    /// Fails with `UnknownRole` when the name is not in the enumeration.
    pub fn scopes_for(&self, role: &str) -> Result<&[ScopeRule]> {
        let role: Role = role.parse()?;
        Ok(self.scopes(role))
    }

    /// Scope rules of an already validated role
    pub fn scopes(&self, role: Role) -> &[ScopeRule] {
        self.scopes.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Roles with their rules, in enumeration order
    pub fn iter(&self) -> impl Iterator<Item = (Role, &[ScopeRule])> {
        self.scopes.iter().map(|(role, rules)| (*role, rules.as_slice()))
    }

    /// Serializable form of the registry
    pub fn to_policy_file(&self) -> PolicyFile {
        PolicyFile {
            roles: self
                .iter()
                .map(|(role, rules)| RolePolicy {
                    role,
                    scopes: rules.to_vec(),
                })
                .collect(),
        }
    }

    fn check_executive_scope(&self, known_paths: &[String]) -> Result<()> {
        let rules = self.scopes(Role::Executive);
        if rules.iter().any(ScopeRule::is_universal) {
            return Ok(());
        }

        if known_paths.is_empty() {
            return Err(RagError::PolicyError(
                "executive role must hold a universal scope rule".to_string(),
            ));
        }

        for path in known_paths {
            let normalized = normalize_path(path);
            if !rules.iter().any(|r| r.matches_normalized(&normalized)) {
                return Err(RagError::PolicyError(format!(
                    "executive role cannot see known path: {}",
                    path
                )));
            }
        }

        Ok(())
    }
}
