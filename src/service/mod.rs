//! Request-handling services: CRUD orchestration, validation and rule placeholders.

mod crud;
mod placeholders;
mod validation;

pub use crud::{BulkRequest, CrudService};
pub use placeholders::{substitute, Placeholders};
pub use validation::{RequestValidator, Rule};
