// Role-based access policy: roles, scope rules, registry and filter

pub mod role;
pub mod scope;
pub mod registry;
pub mod filter;

pub use filter::AuthorizationFilter;
pub use registry::{PolicyFile, PolicyRegistry, RolePolicy};
pub use role::Role;
pub use scope::{normalize_path, ScopeRule};
