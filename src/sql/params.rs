//! Bind values for PostgreSQL. Each value reports its own wire type so untyped
//! placeholders resolve against the column they are compared with or assigned to.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Json(Value),
}

impl PgBindValue {
    /// `None` for JSON null; callers emit a literal `NULL` instead of a placeholder.
    pub fn from_json(v: &Value) -> Option<Self> {
        Some(match v {
            Value::Null => return None,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PgBindValue::I64(i),
                None => PgBindValue::F64(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => PgBindValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        })
    }

    /// Text form, for placeholders that carry an explicit `::type` cast.
    pub fn text(v: &Value) -> Self {
        match v {
            Value::String(s) => PgBindValue::Text(s.clone()),
            other => PgBindValue::Text(other.to_string()),
        }
    }

    /// Numeric form of a query-string value, if it parses as one.
    pub fn numeric(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_f64().map(PgBindValue::F64),
            Value::String(s) => s.trim().parse::<f64>().ok().map(PgBindValue::F64),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            PgBindValue::Bool(_) => "BOOL",
            PgBindValue::I64(_) => "INT8",
            PgBindValue::F64(_) => "FLOAT8",
            PgBindValue::Text(_) => "TEXT",
            PgBindValue::Json(_) => "JSONB",
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf),
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf),
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf),
            PgBindValue::Text(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf),
            PgBindValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(PgTypeInfo::with_name(self.type_name()))
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_keep_their_wire_type() {
        assert_eq!(PgBindValue::from_json(&json!(3)), Some(PgBindValue::I64(3)));
        assert_eq!(PgBindValue::from_json(&json!(1.5)), Some(PgBindValue::F64(1.5)));
        assert_eq!(PgBindValue::from_json(&json!(null)), None);
        assert!(matches!(PgBindValue::from_json(&json!({"a": 1})), Some(PgBindValue::Json(_))));
    }

    #[test]
    fn numeric_parses_query_strings() {
        assert_eq!(PgBindValue::numeric(&json!(" 18 ")), Some(PgBindValue::F64(18.0)));
        assert_eq!(PgBindValue::numeric(&json!("abc")), None);
    }
}
