//! Closed role enumeration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::RagError;

/// A role governing document visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Finance,
    Marketing,
    Hr,
    Engineering,
    Executive,
}

impl Role {
    /// Every role, in declaration order
    pub const ALL: [Role; 6] = [
        Role::Employee,
        Role::Finance,
        Role::Marketing,
        Role::Hr,
        Role::Engineering,
        Role::Executive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Finance => "finance",
            Role::Marketing => "marketing",
            Role::Hr => "hr",
            Role::Engineering => "engineering",
            Role::Executive => "executive",
        }
    }

    /// Parse a role name, also accepting the legacy team identifiers
    /// (`finance_team`, `c_level_executives`, ...).
    pub fn parse(name: &str) -> Option<Role> {
        let role = match name.trim() {
            "employee" | "employee_level" => Role::Employee,
            "finance" | "finance_team" => Role::Finance,
            "marketing" | "marketing_team" => Role::Marketing,
            "hr" | "hr_team" => Role::Hr,
            "engineering" | "engineering_department" => Role::Engineering,
            "executive" | "c_level_executives" => Role::Executive,
            _ => return None,
        };
        Some(role)
    }
}

impl FromStr for Role {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| RagError::unknown_role(s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
