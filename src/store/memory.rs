//! In-process store. Used by tests and by consumers running without a database.

use super::{compare_values, is_trashed, loose_eq, primary_key, sort_cmp, text_of, DataStore, Paginated, Record};
use crate::config::{Direction, KeyType, ModelDefinition};
use crate::error::StoreError;
use crate::query::{CompareOp, Condition, EagerLoad, MatchMode, PageRequest, Query, TrashedScope};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Table {
    rows: Vec<Record>,
    next_id: i64,
}

impl Table {
    fn bump(&mut self, key: &Value) {
        if let Some(n) = key.as_i64().or_else(|| key.as_str().and_then(|s| s.parse().ok())) {
            self.next_id = self.next_id.max(n);
        }
    }

    fn position(&self, column: &str, id: &Value) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.get(column).map(|v| loose_eq(v, id)).unwrap_or(false))
    }
}

/// Rows keyed by table name. Text matching is case-insensitive.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

fn now() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}

fn field<'a>(record: &'a Record, name: &str) -> &'a Value {
    record.get(name).unwrap_or(&Value::Null)
}

fn matches(record: &Record, condition: &Condition) -> bool {
    match condition {
        Condition::Compare { field: f, op, value } => {
            let actual = field(record, f);
            if actual.is_null() {
                return false;
            }
            match op {
                CompareOp::Eq => loose_eq(actual, value),
                CompareOp::Ne => !loose_eq(actual, value),
                CompareOp::Gt => compare_values(actual, value) == Some(Ordering::Greater),
                CompareOp::Lt => compare_values(actual, value) == Some(Ordering::Less),
                CompareOp::Ge => matches!(compare_values(actual, value), Some(Ordering::Greater | Ordering::Equal)),
                CompareOp::Le => matches!(compare_values(actual, value), Some(Ordering::Less | Ordering::Equal)),
            }
        }
        Condition::Match { field: f, mode, term } => {
            let Some(text) = text_of(field(record, f)) else {
                return false;
            };
            let (text, term) = (text.to_lowercase(), term.to_lowercase());
            match mode {
                MatchMode::Contains => text.contains(&term),
                MatchMode::StartsWith => text.starts_with(&term),
                MatchMode::EndsWith => text.ends_with(&term),
            }
        }
        Condition::In { field: f, values, negated } => {
            let actual = field(record, f);
            if actual.is_null() {
                return false;
            }
            values.iter().any(|v| loose_eq(actual, v)) != *negated
        }
        Condition::Between { field: f, low, high } => {
            let actual = field(record, f);
            matches!(compare_values(actual, low), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare_values(actual, high), Some(Ordering::Less | Ordering::Equal))
        }
        Condition::Any(group) => group.iter().any(|c| matches(record, c)),
    }
}

fn in_scope(model: &ModelDefinition, record: &Record, scope: TrashedScope) -> bool {
    match scope {
        TrashedScope::Include => true,
        TrashedScope::Exclude => !is_trashed(model, record),
        TrashedScope::Only => is_trashed(model, record),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    /// Insert rows verbatim, bypassing key generation and timestamps.
    pub fn seed(&self, table: &str, rows: Vec<Record>) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let t = tables.entry(table.to_string()).or_default();
        for row in rows {
            if let Some(id) = row.get("id") {
                t.bump(id);
            }
            t.rows.push(row);
        }
        Ok(())
    }

    /// Every row of a table, trashed included.
    pub fn rows(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .read()?
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default())
    }

    fn select(&self, model: &ModelDefinition, query: &Query) -> Result<Vec<Record>, StoreError> {
        let tables = self.read()?;
        let Some(table) = tables.get(&model.table) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<Record> = table
            .rows
            .iter()
            .filter(|r| in_scope(model, r, query.scope))
            .filter(|r| query.conditions.iter().all(|c| matches(r, c)))
            .cloned()
            .collect();
        if !query.order.is_empty() {
            rows.sort_by(|a, b| {
                query
                    .order
                    .iter()
                    .map(|(f, dir)| {
                        let ord = sort_cmp(a.get(f), b.get(f));
                        match dir {
                            Direction::Asc => ord,
                            Direction::Desc => ord.reverse(),
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        Ok(rows)
    }

    fn mutate<F>(&self, model: &ModelDefinition, id: &Value, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Vec<Record>, usize) -> bool,
    {
        let mut tables = self.write()?;
        let Some(table) = tables.get_mut(&model.table) else {
            return Ok(false);
        };
        match table.position(&model.primary_key, id) {
            Some(idx) => Ok(f(&mut table.rows, idx)),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn paginate(
        &self,
        model: &ModelDefinition,
        query: &Query,
        page: Option<PageRequest>,
    ) -> Result<Paginated, StoreError> {
        let rows = self.select(model, query)?;
        let total = rows.len() as u64;
        let mut records: Vec<Record> = match page {
            Some(p) => rows
                .into_iter()
                .skip(usize::try_from(p.offset()).unwrap_or(usize::MAX))
                .take(p.per_page as usize)
                .collect(),
            None => rows,
        };
        self.load_relations(&mut records, &query.with).await?;
        Ok(Paginated::new(records, total, page))
    }

    async fn find(
        &self,
        model: &ModelDefinition,
        id: &Value,
        scope: TrashedScope,
    ) -> Result<Option<Record>, StoreError> {
        let query = Query::new().where_eq(&model.primary_key, id.clone()).scope(scope);
        Ok(self.select(model, &query)?.into_iter().next())
    }

    async fn find_many(
        &self,
        model: &ModelDefinition,
        ids: &[Value],
        scope: TrashedScope,
    ) -> Result<Vec<Record>, StoreError> {
        let query = Query::new().where_in(&model.primary_key, ids.to_vec()).scope(scope);
        self.select(model, &query)
    }

    async fn create(&self, model: &ModelDefinition, data: &Record) -> Result<Record, StoreError> {
        let mut tables = self.write()?;
        let table = tables.entry(model.table.clone()).or_default();
        let mut row = data.clone();
        let key = match primary_key(model, &row).cloned() {
            Some(key) => {
                if table.position(&model.primary_key, &key).is_some() {
                    return Err(StoreError::UniqueViolation(format!(
                        "duplicate {} on {}",
                        model.primary_key, model.table
                    )));
                }
                table.bump(&key);
                key
            }
            None => match model.key_type {
                KeyType::Int | KeyType::BigInt => {
                    table.next_id += 1;
                    Value::from(table.next_id)
                }
                KeyType::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
                KeyType::Text => {
                    return Err(StoreError::Backend(format!(
                        "{} requires an explicit {}",
                        model.table, model.primary_key
                    )))
                }
            },
        };
        row.insert(model.primary_key.clone(), key);
        if model.timestamps {
            let ts = now();
            row.entry("created_at").or_insert_with(|| ts.clone());
            row.entry("updated_at").or_insert(ts);
        }
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        model: &ModelDefinition,
        id: &Value,
        data: &Record,
    ) -> Result<Option<Record>, StoreError> {
        let mut tables = self.write()?;
        let Some(table) = tables.get_mut(&model.table) else {
            return Ok(None);
        };
        let Some(idx) = table.position(&model.primary_key, id) else {
            return Ok(None);
        };
        let row = &mut table.rows[idx];
        for (k, v) in data {
            if k != &model.primary_key {
                row.insert(k.clone(), v.clone());
            }
        }
        if model.timestamps {
            row.insert("updated_at".into(), now());
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, model: &ModelDefinition, id: &Value, soft: bool) -> Result<bool, StoreError> {
        self.mutate(model, id, |rows, idx| {
            if !soft {
                rows.remove(idx);
                return true;
            }
            if is_trashed(model, &rows[idx]) {
                return false;
            }
            rows[idx].insert(model.soft_delete_column.clone(), now());
            true
        })
    }

    async fn restore(&self, model: &ModelDefinition, id: &Value) -> Result<bool, StoreError> {
        self.mutate(model, id, |rows, idx| {
            if !is_trashed(model, &rows[idx]) {
                return false;
            }
            rows[idx].insert(model.soft_delete_column.clone(), Value::Null);
            true
        })
    }

    async fn force_delete(&self, model: &ModelDefinition, id: &Value) -> Result<bool, StoreError> {
        self.mutate(model, id, |rows, idx| {
            rows.remove(idx);
            true
        })
    }

    async fn exists(
        &self,
        table: &str,
        column: &str,
        value: &Value,
        except: Option<(&str, &Value)>,
    ) -> Result<bool, StoreError> {
        let tables = self.read()?;
        let Some(t) = tables.get(table) else {
            return Ok(false);
        };
        Ok(t.rows.iter().any(|r| {
            let hit = loose_eq(field(r, column), value);
            let excluded = except
                .map(|(col, v)| loose_eq(field(r, col), v))
                .unwrap_or(false);
            hit && !excluded
        }))
    }

    async fn load_relations(&self, records: &mut [Record], loads: &[EagerLoad]) -> Result<(), StoreError> {
        if loads.is_empty() || records.is_empty() {
            return Ok(());
        }
        let tables = self.read()?;
        for load in loads {
            let related = tables.get(&load.model.table);
            for record in records.iter_mut() {
                let local = field(record, &load.local_key);
                let found = match (related, local.is_null()) {
                    (Some(t), false) => t
                        .rows
                        .iter()
                        .find(|r| loose_eq(field(r, &load.foreign_key), local))
                        .cloned()
                        .map(Value::Object),
                    _ => None,
                };
                record.insert(load.name.clone(), found.unwrap_or(Value::Null));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> ModelDefinition {
        ModelDefinition::new("user", "users")
    }

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_assigns_incrementing_keys_and_timestamps() {
        let store = MemoryStore::new();
        let a = store.create(&model(), &record(json!({"name": "a"}))).await.unwrap();
        let b = store.create(&model(), &record(json!({"name": "b"}))).await.unwrap();
        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));
        assert!(a.contains_key("created_at"));
    }

    #[tokio::test]
    async fn duplicate_primary_key_is_a_unique_violation() {
        let store = MemoryStore::new();
        store.create(&model(), &record(json!({"id": 7}))).await.unwrap();
        let err = store.create(&model(), &record(json!({"id": 7}))).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
        let next = store.create(&model(), &record(json!({}))).await.unwrap();
        assert_eq!(next["id"], json!(8));
    }

    #[tokio::test]
    async fn soft_delete_is_scoped_and_not_repeatable() {
        let store = MemoryStore::new();
        let m = model();
        store.create(&m, &record(json!({"name": "a"}))).await.unwrap();
        assert!(store.delete(&m, &json!(1), true).await.unwrap());
        assert!(!store.delete(&m, &json!(1), true).await.unwrap());
        assert!(store.find(&m, &json!(1), TrashedScope::Exclude).await.unwrap().is_none());
        assert!(store.find(&m, &json!("1"), TrashedScope::Only).await.unwrap().is_some());
        assert!(store.restore(&m, &json!(1)).await.unwrap());
        assert!(store.find(&m, &json!(1), TrashedScope::Exclude).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn paginate_filters_sorts_and_windows() {
        let store = MemoryStore::new();
        let m = model();
        for name in ["Charlie", "alice", "Bob"] {
            store.create(&m, &record(json!({"name": name}))).await.unwrap();
        }
        let query = Query::new()
            .where_(Condition::Match {
                field: "name".into(),
                mode: MatchMode::Contains,
                term: "LI".into(),
            })
            .order_by("name", Direction::Asc);
        let page = store
            .paginate(&m, &query, Some(PageRequest { page: 1, per_page: 1 }))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0]["name"], json!("Charlie"));
        assert_eq!(page.last_page(), 2);
    }

    #[tokio::test]
    async fn exists_honors_exception() {
        let store = MemoryStore::new();
        let m = model();
        store.create(&m, &record(json!({"email": "a@x.io"}))).await.unwrap();
        assert!(store.exists("users", "email", &json!("a@x.io"), None).await.unwrap());
        assert!(!store
            .exists("users", "email", &json!("a@x.io"), Some(("id", &json!(1))))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn relations_attach_related_row_or_null() {
        let store = MemoryStore::new();
        let team = std::sync::Arc::new(ModelDefinition::new("team", "teams"));
        store.seed("teams", vec![record(json!({"id": 3, "name": "core"}))]).unwrap();
        let mut rows = vec![record(json!({"team_id": 3})), record(json!({"team_id": null}))];
        let load = EagerLoad {
            name: "team".into(),
            model: team,
            local_key: "team_id".into(),
            foreign_key: "id".into(),
        };
        store.load_relations(&mut rows, &[load]).await.unwrap();
        assert_eq!(rows[0]["team"]["name"], json!("core"));
        assert_eq!(rows[1]["team"], Value::Null);
    }
}
