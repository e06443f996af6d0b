//! Backend-neutral query value consumed by a [`DataStore`](crate::store::DataStore).

mod params;
pub mod pipeline;

pub use params::{FilterParam, QueryParams};

use crate::config::{Direction, ModelDefinition};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }
}

/// Substring position for text matching. Case sensitivity is up to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchMode {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    Match {
        field: String,
        mode: MatchMode,
        term: String,
    },
    In {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    Between {
        field: String,
        low: Value,
        high: Value,
    },
    /// OR group; an empty group matches nothing.
    Any(Vec<Condition>),
}

/// Which rows a query sees with respect to soft deletion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrashedScope {
    /// Soft-deleted rows are hidden.
    #[default]
    Exclude,
    /// No soft-delete filtering; also the scope for resources without soft deletes.
    Include,
    Only,
}

/// A to-one relation loaded alongside each record.
#[derive(Clone, Debug)]
pub struct EagerLoad {
    /// Key the related record is attached under.
    pub name: String,
    pub model: Arc<ModelDefinition>,
    /// Our column holding the related key.
    pub local_key: String,
    /// Their column matched against `local_key`.
    pub foreign_key: String,
}

#[derive(Clone, Debug, Default)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub order: Vec<(String, Direction)>,
    pub with: Vec<EagerLoad>,
    pub scope: TrashedScope,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn where_eq(self, field: &str, value: Value) -> Self {
        self.where_(Condition::Compare {
            field: field.to_string(),
            op: CompareOp::Eq,
            value,
        })
    }

    pub fn where_in(self, field: &str, values: Vec<Value>) -> Self {
        self.where_(Condition::In {
            field: field.to_string(),
            values,
            negated: false,
        })
    }

    /// OR-combine the given conditions into one group.
    pub fn or_where(self, conditions: Vec<Condition>) -> Self {
        self.where_(Condition::Any(conditions))
    }

    pub fn with(mut self, load: EagerLoad) -> Self {
        self.with.push(load);
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order.push((field.to_string(), direction));
        self
    }

    pub fn scope(mut self, scope: TrashedScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Page window requested from the store. `page` is 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    /// Rows to skip. Saturates for absurd page numbers instead of overflowing.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}
