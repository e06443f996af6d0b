//! Resource document: raw serde types, loading, startup validation and the resolved registry.

mod loader;
mod registry;
mod resolved;
mod types;
mod validator;

pub use loader::{apply_env_overrides, from_json_str, load_from_file, DEBUG_ENV, PREFIX_ENV};
pub use registry::ResourceRegistry;
pub use resolved::{FieldRuleSet, Pagination, ResolvedResource, ResourceConfig, RuleOperation, RuleSets};
pub use types::*;
pub use validator::validate;
