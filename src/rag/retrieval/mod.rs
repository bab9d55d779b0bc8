// Retrieval engine module
pub mod engine;

pub use engine::{AuthorizedContext, RetrievalParams, RetrievalStats, RoleFilteredRetriever};
