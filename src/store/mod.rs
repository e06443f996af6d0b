//! Data-access capability: the abstract record store the request pipeline runs against.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::ModelDefinition;
use crate::error::StoreError;
use crate::query::{EagerLoad, PageRequest, Query, TrashedScope};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;

/// A record as a flat JSON object.
pub type Record = serde_json::Map<String, Value>;

/// One page of records plus the total matched by the query.
#[derive(Clone, Debug)]
pub struct Paginated {
    pub records: Vec<Record>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl Paginated {
    /// Build from an optional page window; without one, everything is a single page.
    pub fn new(records: Vec<Record>, total: u64, page: Option<PageRequest>) -> Self {
        let (page, per_page) = match page {
            Some(p) => (p.page, p.per_page),
            None => (1, total.max(1)),
        };
        Self {
            records,
            total,
            page,
            per_page,
        }
    }

    pub fn last_page(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        ((self.total + self.per_page - 1) / self.per_page).max(1)
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Run a list query. Eager loads in `query.with` are attached to the returned records.
    async fn paginate(
        &self,
        model: &ModelDefinition,
        query: &Query,
        page: Option<PageRequest>,
    ) -> Result<Paginated, StoreError>;

    async fn find(
        &self,
        model: &ModelDefinition,
        id: &Value,
        scope: TrashedScope,
    ) -> Result<Option<Record>, StoreError>;

    /// Records whose key is in `ids`; missing ids are simply absent from the result.
    async fn find_many(
        &self,
        model: &ModelDefinition,
        ids: &[Value],
        scope: TrashedScope,
    ) -> Result<Vec<Record>, StoreError>;

    async fn create(&self, model: &ModelDefinition, data: &Record) -> Result<Record, StoreError>;

    async fn update(
        &self,
        model: &ModelDefinition,
        id: &Value,
        data: &Record,
    ) -> Result<Option<Record>, StoreError>;

    /// Returns whether a row was affected. `soft` marks the row instead of removing it.
    async fn delete(&self, model: &ModelDefinition, id: &Value, soft: bool) -> Result<bool, StoreError>;

    async fn restore(&self, model: &ModelDefinition, id: &Value) -> Result<bool, StoreError>;

    async fn force_delete(&self, model: &ModelDefinition, id: &Value) -> Result<bool, StoreError>;

    /// Whether `table.column = value` matches any row, ignoring rows where `except` matches.
    async fn exists(
        &self,
        table: &str,
        column: &str,
        value: &Value,
        except: Option<(&str, &Value)>,
    ) -> Result<bool, StoreError>;

    async fn load_relations(&self, records: &mut [Record], loads: &[EagerLoad]) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub fn primary_key<'a>(model: &ModelDefinition, record: &'a Record) -> Option<&'a Value> {
    record.get(&model.primary_key).filter(|v| !v.is_null())
}

pub fn is_trashed(model: &ModelDefinition, record: &Record) -> bool {
    record
        .get(&model.soft_delete_column)
        .map(|v| !v.is_null())
        .unwrap_or(false)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Text form used for matching; `None` for null, arrays and objects.
pub fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Equality tolerant of query-string typing: `"5" == 5`, `"true" == true`.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::String(s)) | (Value::String(s), Value::Bool(x)) => {
            match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => *x,
                "false" | "0" => !*x,
                _ => false,
            }
        }
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => a == b,
    }
}

/// Ordering for range conditions; `None` when the values are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    let numeric = matches!(a, Value::Number(_)) || matches!(b, Value::Number(_));
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) if numeric || (a.is_string() && b.is_string()) => x.partial_cmp(&y),
        _ => match (text_of(a), text_of(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => None,
        },
    }
}

/// Total order for sorting: nulls first, then `compare_values`.
pub fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_equality_bridges_query_string_types() {
        assert!(loose_eq(&json!(5), &json!("5")));
        assert!(loose_eq(&json!(true), &json!("1")));
        assert!(!loose_eq(&json!("a"), &json!("b")));
        assert!(!loose_eq(&json!(null), &json!("")));
    }

    #[test]
    fn numeric_strings_compare_numerically() {
        assert_eq!(compare_values(&json!("10"), &json!("9")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("Bob"), &json!("Alice")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(null), &json!(1)), None);
    }

    #[test]
    fn last_page_is_at_least_one() {
        let page = Paginated::new(vec![], 0, Some(PageRequest { page: 1, per_page: 10 }));
        assert_eq!(page.last_page(), 1);
        let page = Paginated::new(vec![], 21, Some(PageRequest { page: 1, per_page: 10 }));
        assert_eq!(page.last_page(), 3);
    }
}
