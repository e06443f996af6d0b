//! PostgreSQL store over a `PgPool`. Rows come back as JSON objects.

use super::{loose_eq, DataStore, Paginated, Record};
use crate::config::ModelDefinition;
use crate::error::StoreError;
use crate::query::{EagerLoad, PageRequest, Query, TrashedScope};
use crate::sql::{self, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn prepare(q: &QueryBuf) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        q.params
            .iter()
            .fold(sqlx::query(&q.sql), |query, p| query.bind(p.clone()))
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Record>, StoreError> {
        let rows = Self::prepare(q).fetch_all(&self.pool).await.map_err(map_db_error)?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Record>, StoreError> {
        let row = Self::prepare(q).fetch_optional(&self.pool).await.map_err(map_db_error)?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, StoreError> {
        let done = Self::prepare(q).execute(&self.pool).await.map_err(map_db_error)?;
        Ok(done.rows_affected())
    }
}

/// 23505 is PostgreSQL's unique_violation.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            return StoreError::UniqueViolation(db.message().to_string());
        }
    }
    StoreError::Db(e)
}

#[async_trait]
impl DataStore for PgStore {
    async fn paginate(
        &self,
        model: &ModelDefinition,
        query: &Query,
        page: Option<PageRequest>,
    ) -> Result<Paginated, StoreError> {
        let count_q = sql::count(model, query);
        let total: i64 = Self::prepare(&count_q)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?
            .try_get(0)?;
        let mut records = self.fetch_all(&sql::select_page(model, query, page)).await?;
        self.load_relations(&mut records, &query.with).await?;
        Ok(Paginated::new(records, total.max(0) as u64, page))
    }

    async fn find(
        &self,
        model: &ModelDefinition,
        id: &Value,
        scope: TrashedScope,
    ) -> Result<Option<Record>, StoreError> {
        self.fetch_optional(&sql::select_by_key(model, id, scope)).await
    }

    async fn find_many(
        &self,
        model: &ModelDefinition,
        ids: &[Value],
        scope: TrashedScope,
    ) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::with_capacity(ids.len());
        for q in sql::select_by_keys_batched(model, ids, scope) {
            records.extend(self.fetch_all(&q).await?);
        }
        Ok(records)
    }

    async fn create(&self, model: &ModelDefinition, data: &Record) -> Result<Record, StoreError> {
        self.fetch_optional(&sql::insert(model, data))
            .await?
            .ok_or_else(|| StoreError::Backend(format!("insert into {} returned no row", model.table)))
    }

    async fn update(
        &self,
        model: &ModelDefinition,
        id: &Value,
        data: &Record,
    ) -> Result<Option<Record>, StoreError> {
        self.fetch_optional(&sql::update(model, id, data)).await
    }

    async fn delete(&self, model: &ModelDefinition, id: &Value, soft: bool) -> Result<bool, StoreError> {
        let q = if soft {
            sql::soft_delete(model, id)
        } else {
            sql::delete(model, id)
        };
        Ok(self.execute(&q).await? > 0)
    }

    async fn restore(&self, model: &ModelDefinition, id: &Value) -> Result<bool, StoreError> {
        Ok(self.execute(&sql::restore(model, id)).await? > 0)
    }

    async fn force_delete(&self, model: &ModelDefinition, id: &Value) -> Result<bool, StoreError> {
        Ok(self.execute(&sql::delete(model, id)).await? > 0)
    }

    async fn exists(
        &self,
        table: &str,
        column: &str,
        value: &Value,
        except: Option<(&str, &Value)>,
    ) -> Result<bool, StoreError> {
        let q = sql::exists(table, column, value, except);
        let found: bool = Self::prepare(&q)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?
            .try_get(0)?;
        Ok(found)
    }

    async fn load_relations(&self, records: &mut [Record], loads: &[EagerLoad]) -> Result<(), StoreError> {
        for load in loads {
            let mut keys: Vec<Value> = Vec::new();
            for r in records.iter() {
                if let Some(v) = r.get(&load.local_key).filter(|v| !v.is_null()) {
                    if !keys.iter().any(|k| loose_eq(k, v)) {
                        keys.push(v.clone());
                    }
                }
            }
            let mut related = Vec::new();
            for chunk in keys.chunks(sql::MAX_KEYS_PER_STATEMENT) {
                related.extend(
                    self.fetch_all(&sql::select_by_column_in(&load.model, &load.foreign_key, chunk))
                        .await?,
                );
            }
            for r in records.iter_mut() {
                let found = r.get(&load.local_key).and_then(|local| {
                    related
                        .iter()
                        .find(|row| row.get(&load.foreign_key).map(|v| loose_eq(v, local)).unwrap_or(false))
                });
                let value = found.cloned().map(Value::Object).unwrap_or(Value::Null);
                r.insert(load.name.clone(), value);
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_record(row: &PgRow) -> Record {
    use sqlx::Column;
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), cell_to_value(row, col.ordinal())))
        .collect()
}

/// Decode one cell by trying the common PostgreSQL types in turn.
fn cell_to_value(row: &PgRow, idx: usize) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(idx) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(idx) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(idx) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(idx) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(idx) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(idx) {
        return j;
    }
    Value::Null
}
