//! Builds parameterized SELECT, INSERT, UPDATE and DELETE statements for a model.
//! Identifiers come from configuration only; values are always bound.

use super::params::PgBindValue;
use crate::config::{Direction, KeyType, ModelDefinition};
use crate::query::{CompareOp, Condition, MatchMode, PageRequest, Query, TrashedScope};
use crate::store::Record;
use serde_json::Value;

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `schema.table` or `table`, each part quoted.
pub fn qualified_table(table: &str) -> String {
    match table.split_once('.') {
        Some((schema, name)) => format!("{}.{}", quoted(schema), quoted(name)),
        None => quoted(table),
    }
}

/// Escape `%`, `_` and `\` for use inside an ILIKE pattern.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    fn push_param(&mut self, v: PgBindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Placeholder for a JSON value being written to `column`; null becomes a literal.
    fn assign(&mut self, model: &ModelDefinition, column: &str, v: &Value) -> String {
        match (model.column_type(column), PgBindValue::from_json(v)) {
            (_, None) => "NULL".to_string(),
            (Some(ty), Some(PgBindValue::Text(s))) => {
                format!("${}::{}", self.push_param(PgBindValue::Text(s)), ty)
            }
            (_, Some(b)) => format!("${}", self.push_param(b)),
        }
    }

    /// `pk = $n` with the bind shaped by the model's key type.
    fn key_match(&mut self, model: &ModelDefinition, id: &Value) -> String {
        let pk = quoted(&model.primary_key);
        match model.key_type {
            KeyType::Int | KeyType::BigInt => {
                let n = id.as_i64().or_else(|| id.as_str().and_then(|s| s.trim().parse().ok()));
                match n {
                    Some(n) => format!("{} = ${}", pk, self.push_param(PgBindValue::I64(n))),
                    None => format!("{}::text = ${}", pk, self.push_param(PgBindValue::text(id))),
                }
            }
            KeyType::Uuid => format!("{} = ${}::uuid", pk, self.push_param(PgBindValue::text(id))),
            KeyType::Text => format!("{} = ${}", pk, self.push_param(PgBindValue::text(id))),
        }
    }

    /// Column expression and placeholder for an equality test against a query value.
    fn equality(&mut self, model: &ModelDefinition, field: &str, v: &Value) -> (String, String) {
        let col = quoted(field);
        match model.column_type(field) {
            Some(ty) => (col, format!("${}::{}", self.push_param(PgBindValue::text(v)), ty)),
            None => (format!("{}::text", col), format!("${}", self.push_param(PgBindValue::text(v)))),
        }
    }

    /// Like `equality`, but untyped columns compare numerically when the value is a number.
    fn ordered(&mut self, model: &ModelDefinition, field: &str, v: &Value) -> (String, String) {
        if model.column_type(field).is_none() {
            if let Some(n) = PgBindValue::numeric(v) {
                return (quoted(field), format!("${}", self.push_param(n)));
            }
        }
        self.equality(model, field, v)
    }

    fn condition(&mut self, model: &ModelDefinition, c: &Condition) -> String {
        match c {
            Condition::Compare { field, op, value } => {
                let (col, ph) = match op {
                    CompareOp::Eq | CompareOp::Ne => self.equality(model, field, value),
                    _ => self.ordered(model, field, value),
                };
                format!("{} {} {}", col, op.sql(), ph)
            }
            Condition::Match { field, mode, term } => {
                let term = escape_like(term);
                let pattern = match mode {
                    MatchMode::Contains => format!("%{}%", term),
                    MatchMode::StartsWith => format!("{}%", term),
                    MatchMode::EndsWith => format!("%{}", term),
                };
                let n = self.push_param(PgBindValue::Text(pattern));
                format!("{}::text ILIKE ${}", quoted(field), n)
            }
            Condition::In { field, values, negated } => {
                if values.is_empty() {
                    return if *negated { "1 = 1".into() } else { "1 = 0".into() };
                }
                let mut col = String::new();
                let phs: Vec<String> = values
                    .iter()
                    .map(|v| {
                        let (c, ph) = self.equality(model, field, v);
                        col = c;
                        ph
                    })
                    .collect();
                let kw = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", col, kw, phs.join(", "))
            }
            Condition::Between { field, low, high } => {
                let (col, lo) = self.ordered(model, field, low);
                let (_, hi) = self.ordered(model, field, high);
                format!("{} BETWEEN {} AND {}", col, lo, hi)
            }
            Condition::Any(group) => {
                if group.is_empty() {
                    return "1 = 0".into();
                }
                let parts: Vec<String> = group.iter().map(|g| self.condition(model, g)).collect();
                format!("({})", parts.join(" OR "))
            }
        }
    }

    fn where_clause(&mut self, model: &ModelDefinition, conditions: &[Condition], scope: TrashedScope) -> String {
        let mut parts: Vec<String> = conditions.iter().map(|c| self.condition(model, c)).collect();
        if let Some(s) = scope_clause(model, scope) {
            parts.push(s);
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }
}

fn scope_clause(model: &ModelDefinition, scope: TrashedScope) -> Option<String> {
    let col = quoted(&model.soft_delete_column);
    match scope {
        TrashedScope::Include => None,
        TrashedScope::Exclude => Some(format!("{} IS NULL", col)),
        TrashedScope::Only => Some(format!("{} IS NOT NULL", col)),
    }
}

fn order_clause(order: &[(String, Direction)]) -> String {
    if order.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = order
        .iter()
        .map(|(f, d)| match d {
            Direction::Asc => format!("{} ASC NULLS FIRST", quoted(f)),
            Direction::Desc => format!("{} DESC NULLS LAST", quoted(f)),
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// SELECT * with filters, scope, ordering and the optional page window.
pub fn select_page(model: &ModelDefinition, query: &Query, page: Option<PageRequest>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.where_clause(model, &query.conditions, query.scope);
    let window = page
        .map(|p| format!(" LIMIT {} OFFSET {}", p.per_page, p.offset().min(i64::MAX as u64)))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT * FROM {}{}{}{}",
        qualified_table(&model.table),
        where_clause,
        order_clause(&query.order),
        window
    );
    q
}

/// COUNT(*) over the same filters and scope as `select_page`.
pub fn count(model: &ModelDefinition, query: &Query) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.where_clause(model, &query.conditions, query.scope);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(&model.table), where_clause);
    q
}

pub fn select_by_key(model: &ModelDefinition, id: &Value, scope: TrashedScope) -> QueryBuf {
    select_by_keys(model, std::slice::from_ref(id), scope)
}

pub fn select_by_keys(model: &ModelDefinition, ids: &[Value], scope: TrashedScope) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut parts = Vec::new();
    if ids.is_empty() {
        parts.push("1 = 0".to_string());
    } else {
        let keys: Vec<String> = ids.iter().map(|id| q.key_match(model, id)).collect();
        parts.push(format!("({})", keys.join(" OR ")));
    }
    parts.extend(scope_clause(model, scope));
    q.sql = format!(
        "SELECT * FROM {} WHERE {}",
        qualified_table(&model.table),
        parts.join(" AND ")
    );
    q
}

/// Keys per `select_by_keys` statement; Postgres caps a statement at 65535 binds.
pub const MAX_KEYS_PER_STATEMENT: usize = 1000;

/// `select_by_keys` split so no statement binds more than [`MAX_KEYS_PER_STATEMENT`] keys.
pub fn select_by_keys_batched(model: &ModelDefinition, ids: &[Value], scope: TrashedScope) -> Vec<QueryBuf> {
    ids.chunks(MAX_KEYS_PER_STATEMENT)
        .map(|chunk| select_by_keys(model, chunk, scope))
        .collect()
}

/// Rows of `model` whose `column` matches any of `values`. Used for eager loading.
pub fn select_by_column_in(model: &ModelDefinition, column: &str, values: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let condition = Condition::In {
        field: column.to_string(),
        values: values.to_vec(),
        negated: false,
    };
    let where_clause = q.where_clause(model, std::slice::from_ref(&condition), TrashedScope::Include);
    q.sql = format!("SELECT * FROM {}{}", qualified_table(&model.table), where_clause);
    q
}

/// INSERT ... RETURNING *. Timestamps default to NOW() unless given.
pub fn insert(model: &ModelDefinition, data: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for (k, v) in data {
        cols.push(quoted(k));
        values.push(q.assign(model, k, v));
    }
    if model.timestamps {
        for ts in ["created_at", "updated_at"] {
            if !data.contains_key(ts) {
                cols.push(quoted(ts));
                values.push("NOW()".to_string());
            }
        }
    }
    let table = qualified_table(&model.table);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table,
            cols.join(", "),
            values.join(", ")
        )
    };
    q
}

/// UPDATE by key: SET only the given columns (never the key). Falls back to a SELECT when nothing changes.
pub fn update(model: &ModelDefinition, id: &Value, data: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (k, v) in data {
        if *k == model.primary_key {
            continue;
        }
        let rhs = q.assign(model, k, v);
        sets.push(format!("{} = {}", quoted(k), rhs));
    }
    if model.timestamps && !data.contains_key("updated_at") {
        sets.push(format!("{} = NOW()", quoted("updated_at")));
    }
    if sets.is_empty() {
        return select_by_key(model, id, TrashedScope::Include);
    }
    let key = q.key_match(model, id);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING *",
        qualified_table(&model.table),
        sets.join(", "),
        key
    );
    q
}

/// Mark as deleted; affects nothing when already trashed.
pub fn soft_delete(model: &ModelDefinition, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let key = q.key_match(model, id);
    let col = quoted(&model.soft_delete_column);
    q.sql = format!(
        "UPDATE {} SET {} = NOW() WHERE {} AND {} IS NULL",
        qualified_table(&model.table),
        col,
        key,
        col
    );
    q
}

pub fn restore(model: &ModelDefinition, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let key = q.key_match(model, id);
    let col = quoted(&model.soft_delete_column);
    q.sql = format!(
        "UPDATE {} SET {} = NULL WHERE {} AND {} IS NOT NULL",
        qualified_table(&model.table),
        col,
        key,
        col
    );
    q
}

pub fn delete(model: &ModelDefinition, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let key = q.key_match(model, id);
    q.sql = format!("DELETE FROM {} WHERE {}", qualified_table(&model.table), key);
    q
}

/// SELECT EXISTS over a raw table; columns compare as text.
pub fn exists(table: &str, column: &str, value: &Value, except: Option<(&str, &Value)>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(PgBindValue::text(value));
    let mut sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {}::text = ${}",
        qualified_table(table),
        quoted(column),
        n
    );
    if let Some((col, v)) = except {
        let n = q.push_param(PgBindValue::text(v));
        sql.push_str(&format!(" AND {}::text IS DISTINCT FROM ${}", quoted(col), n));
    }
    sql.push(')');
    q.sql = sql;
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> ModelDefinition {
        let mut m = ModelDefinition::new("user", "app.users");
        m.column_types.insert("born_on".into(), "date".into());
        m
    }

    #[test]
    fn page_query_combines_filters_scope_and_window() {
        let query = Query::new()
            .or_where(vec![
                Condition::Match {
                    field: "name".into(),
                    mode: MatchMode::Contains,
                    term: "50%".into(),
                },
                Condition::Match {
                    field: "email".into(),
                    mode: MatchMode::StartsWith,
                    term: "jo".into(),
                },
            ])
            .where_eq("status", json!("active"))
            .order_by("name", Direction::Asc);
        let q = select_page(&users(), &query, Some(PageRequest { page: 3, per_page: 10 }));
        assert_eq!(
            q.sql,
            "SELECT * FROM \"app\".\"users\" WHERE (\"name\"::text ILIKE $1 OR \"email\"::text ILIKE $2) \
             AND \"status\"::text = $3 AND \"deleted_at\" IS NULL ORDER BY \"name\" ASC NULLS FIRST LIMIT 10 OFFSET 20"
        );
        assert_eq!(q.params[0], PgBindValue::Text("%50\\%%".into()));
        assert_eq!(q.params[1], PgBindValue::Text("jo%".into()));
    }

    #[test]
    fn typed_columns_cast_and_untyped_ranges_compare_numerically() {
        let query = Query::new()
            .where_(Condition::Compare {
                field: "born_on".into(),
                op: CompareOp::Ge,
                value: json!("2000-01-01"),
            })
            .where_(Condition::Between {
                field: "age".into(),
                low: json!("18"),
                high: json!("30"),
            })
            .scope(TrashedScope::Include);
        let q = count(&users(), &query);
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"app\".\"users\" WHERE \"born_on\" >= $1::date AND \"age\" BETWEEN $2 AND $3"
        );
        assert_eq!(q.params[1], PgBindValue::F64(18.0));
    }

    #[test]
    fn huge_pages_clamp_the_offset() {
        let q = select_page(&users(), &Query::new(), Some(PageRequest { page: u64::MAX, per_page: 15 }));
        assert!(q.sql.ends_with(&format!(" LIMIT 15 OFFSET {}", i64::MAX)));
    }

    #[test]
    fn large_key_lists_are_split_across_statements() {
        let ids: Vec<Value> = (1..=2500).map(|n| json!(n)).collect();
        let batches = select_by_keys_batched(&users(), &ids, TrashedScope::Include);
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|q| q.params.len() <= MAX_KEYS_PER_STATEMENT));
        assert_eq!(batches.iter().map(|q| q.params.len()).sum::<usize>(), 2500);
    }

    #[test]
    fn integer_keys_bind_as_integers() {
        let q = select_by_key(&users(), &json!("42"), TrashedScope::Only);
        assert_eq!(
            q.sql,
            "SELECT * FROM \"app\".\"users\" WHERE (\"id\" = $1) AND \"deleted_at\" IS NOT NULL"
        );
        assert_eq!(q.params, vec![PgBindValue::I64(42)]);
    }

    #[test]
    fn insert_defaults_timestamps_and_inlines_null() {
        let data = json!({"name": "Ann", "team_id": null}).as_object().cloned().unwrap();
        let q = insert(&users(), &data);
        assert_eq!(
            q.sql,
            "INSERT INTO \"app\".\"users\" (\"name\", \"team_id\", \"created_at\", \"updated_at\") \
             VALUES ($1, NULL, NOW(), NOW()) RETURNING *"
        );
    }

    #[test]
    fn update_skips_primary_key() {
        let data = json!({"id": 9, "name": "Ann"}).as_object().cloned().unwrap();
        let q = update(&users(), &json!(1), &data);
        assert_eq!(
            q.sql,
            "UPDATE \"app\".\"users\" SET \"name\" = $1, \"updated_at\" = NOW() WHERE \"id\" = $2 RETURNING *"
        );
    }

    #[test]
    fn soft_delete_only_touches_live_rows() {
        let q = soft_delete(&users(), &json!(1));
        assert_eq!(
            q.sql,
            "UPDATE \"app\".\"users\" SET \"deleted_at\" = NOW() WHERE \"id\" = $1 AND \"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn exists_with_exception() {
        let q = exists("users", "email", &json!("a@b.c"), Some(("id", &json!(4))));
        assert_eq!(
            q.sql,
            "SELECT EXISTS(SELECT 1 FROM \"users\" WHERE \"email\"::text = $1 AND \"id\"::text IS DISTINCT FROM $2)"
        );
        assert_eq!(q.params[1], PgBindValue::Text("4".into()));
    }
}
