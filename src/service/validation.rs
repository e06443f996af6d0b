//! Rule engine for request payloads. Every failing field is reported; checks never stop at
//! the first error.

use crate::config::FieldRuleSet;
use crate::error::{AppError, ValidationErrors};
use crate::store::{loose_eq, text_of, DataStore, Record};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// One parsed rule.
#[derive(Clone, Debug, PartialEq)]
pub enum Rule {
    Required,
    Nullable,
    Sometimes,
    String,
    Integer,
    Numeric,
    Boolean,
    Array,
    Email,
    Url,
    Uuid,
    Date,
    Min(f64),
    Max(f64),
    Between(f64, f64),
    In(Vec<String>),
    NotIn(Vec<String>),
    Regex(String),
    Confirmed,
    Unique {
        table: Option<String>,
        column: Option<String>,
        except: Option<String>,
        id_column: String,
    },
    Exists {
        table: String,
        column: Option<String>,
    },
    Unknown(String),
}

fn list(args: &str) -> Vec<String> {
    args.split(',').map(|s| s.trim().to_string()).collect()
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

impl Rule {
    pub fn parse(raw: &str) -> Rule {
        let raw = raw.trim();
        let (name, args) = match raw.split_once(':') {
            Some((n, a)) => (n.trim(), a),
            None => (raw, ""),
        };
        let number = |s: &str| s.trim().parse::<f64>().ok();
        match name {
            "required" => Rule::Required,
            "nullable" => Rule::Nullable,
            "sometimes" => Rule::Sometimes,
            "string" => Rule::String,
            "integer" | "int" => Rule::Integer,
            "numeric" => Rule::Numeric,
            "boolean" | "bool" => Rule::Boolean,
            "array" => Rule::Array,
            "email" => Rule::Email,
            "url" => Rule::Url,
            "uuid" => Rule::Uuid,
            "date" => Rule::Date,
            "confirmed" => Rule::Confirmed,
            "min" => number(args).map(Rule::Min).unwrap_or_else(|| Rule::Unknown(raw.into())),
            "max" => number(args).map(Rule::Max).unwrap_or_else(|| Rule::Unknown(raw.into())),
            "between" => match args.split_once(',') {
                Some((lo, hi)) => match (number(lo), number(hi)) {
                    (Some(lo), Some(hi)) => Rule::Between(lo, hi),
                    _ => Rule::Unknown(raw.into()),
                },
                None => Rule::Unknown(raw.into()),
            },
            "in" => Rule::In(list(args)),
            "not_in" => Rule::NotIn(list(args)),
            "regex" => Rule::Regex(args.to_string()),
            "unique" => {
                let mut parts = args.split(',');
                let table = non_empty(parts.next());
                let column = non_empty(parts.next());
                let except = non_empty(parts.next()).filter(|e| !e.eq_ignore_ascii_case("null"));
                let id_column = non_empty(parts.next()).unwrap_or_else(|| "id".to_string());
                Rule::Unique {
                    table,
                    column,
                    except,
                    id_column,
                }
            }
            "exists" => {
                let mut parts = args.split(',');
                match non_empty(parts.next()) {
                    Some(table) => Rule::Exists {
                        table,
                        column: non_empty(parts.next()),
                    },
                    None => Rule::Unknown(raw.into()),
                }
            }
            _ => Rule::Unknown(raw.into()),
        }
    }

    /// Rule name used to look up message overrides.
    pub fn name(&self) -> &str {
        match self {
            Rule::Required => "required",
            Rule::Nullable => "nullable",
            Rule::Sometimes => "sometimes",
            Rule::String => "string",
            Rule::Integer => "integer",
            Rule::Numeric => "numeric",
            Rule::Boolean => "boolean",
            Rule::Array => "array",
            Rule::Email => "email",
            Rule::Url => "url",
            Rule::Uuid => "uuid",
            Rule::Date => "date",
            Rule::Min(_) => "min",
            Rule::Max(_) => "max",
            Rule::Between(..) => "between",
            Rule::In(_) => "in",
            Rule::NotIn(_) => "not_in",
            Rule::Regex(_) => "regex",
            Rule::Confirmed => "confirmed",
            Rule::Unique { .. } => "unique",
            Rule::Exists { .. } => "exists",
            Rule::Unknown(s) => s,
        }
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_integer(v: &Value) -> bool {
    match v {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_boolean(v: &Value) -> bool {
    match v {
        Value::Bool(_) => true,
        Value::Number(n) => matches!(n.as_i64(), Some(0 | 1)),
        Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
        _ => false,
    }
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains(char::is_whitespace)
}

fn is_url(s: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .filter_map(|scheme| s.strip_prefix(scheme))
        .any(|rest| !rest.is_empty() && !rest.starts_with('/') && !rest.contains(char::is_whitespace))
}

fn is_date(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
}

/// `/pattern/flags` as written in rule strings; bare patterns are accepted too.
/// Compiled `regex:` rules keyed by their raw text. Invalid patterns are cached as `None`.
static PATTERNS: OnceLock<RwLock<HashMap<String, Option<Regex>>>> = OnceLock::new();

fn cached_pattern(raw: &str) -> Option<Regex> {
    let cache = PATTERNS.get_or_init(Default::default);
    if let Ok(patterns) = cache.read() {
        if let Some(hit) = patterns.get(raw) {
            return hit.clone();
        }
    }
    let compiled = compile_pattern(raw);
    if let Ok(mut patterns) = cache.write() {
        patterns.insert(raw.to_string(), compiled.clone());
    }
    compiled
}

fn compile_pattern(raw: &str) -> Option<Regex> {
    let pattern = match raw.strip_prefix('/').and_then(|r| r.rsplit_once('/')) {
        Some((body, flags)) if flags.contains('i') => format!("(?i){}", body),
        Some((body, _)) => body.to_string(),
        None => raw.to_string(),
    };
    Regex::new(&pattern).ok()
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Size of a value for min/max/between: numeric value, character count, or element count.
fn size_of(v: &Value, numeric: bool) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if numeric => s.trim().parse().ok(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(a) => Some(a.len() as f64),
        _ => None,
    }
}

fn size_unit(v: &Value, numeric: bool) -> &'static str {
    match v {
        Value::String(_) if !numeric => " characters",
        Value::Array(_) => " items",
        _ => "",
    }
}

/// Evaluates a rule set against a payload, consulting the store for `unique` and `exists`.
pub struct RequestValidator<'a> {
    store: &'a dyn DataStore,
    /// Table used by a bare `unique` rule.
    default_table: &'a str,
    messages: HashMap<String, String>,
}

impl<'a> RequestValidator<'a> {
    pub fn new(store: &'a dyn DataStore, default_table: &'a str) -> Self {
        Self {
            store,
            default_table,
            messages: HashMap::new(),
        }
    }

    pub fn with_messages(mut self, messages: HashMap<String, String>) -> Self {
        self.messages = messages;
        self
    }

    fn message(&self, field: &str, rule: &Rule, fallback: String) -> String {
        let key = format!("{}.{}", field, rule.name());
        self.messages
            .get(&key)
            .or_else(|| self.messages.get(rule.name()))
            .map(|m| m.replace(":attribute", field))
            .unwrap_or(fallback)
    }

    /// Validate `data`; all failing fields are returned together as a 422.
    pub async fn validate(&self, data: &Record, rules: &FieldRuleSet) -> Result<(), AppError> {
        let mut errors = ValidationErrors::new();
        for (field, raw_rules) in rules.iter() {
            let parsed: Vec<Rule> = raw_rules.iter().map(|r| Rule::parse(r)).collect();
            self.validate_field(field, data, &parsed, &mut errors).await?;
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    async fn validate_field(
        &self,
        field: &str,
        data: &Record,
        rules: &[Rule],
        errors: &mut ValidationErrors,
    ) -> Result<(), AppError> {
        let value = data.get(field);
        if value.is_none() && rules.contains(&Rule::Sometimes) {
            return Ok(());
        }
        if rules.contains(&Rule::Required) && value.map(is_blank).unwrap_or(true) {
            let msg = self.message(field, &Rule::Required, format!("The {} field is required.", field));
            errors.add(field, msg);
            return Ok(());
        }
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return Ok(());
        };
        let numeric = rules.iter().any(|r| matches!(r, Rule::Integer | Rule::Numeric));
        for rule in rules {
            if let Some(fallback) = self.check(field, value, data, rule, numeric).await? {
                errors.add(field, self.message(field, rule, fallback));
            }
        }
        Ok(())
    }

    /// `Some(message)` when `rule` fails.
    async fn check(
        &self,
        field: &str,
        value: &Value,
        data: &Record,
        rule: &Rule,
        numeric: bool,
    ) -> Result<Option<String>, AppError> {
        let text = text_of(value);
        let fail = |ok: bool, msg: String| if ok { None } else { Some(msg) };
        Ok(match rule {
            Rule::Required | Rule::Nullable | Rule::Sometimes => None,
            Rule::String => fail(value.is_string(), format!("The {} field must be a string.", field)),
            Rule::Integer => fail(is_integer(value), format!("The {} field must be an integer.", field)),
            Rule::Numeric => fail(as_f64(value).is_some(), format!("The {} field must be a number.", field)),
            Rule::Boolean => fail(is_boolean(value), format!("The {} field must be true or false.", field)),
            Rule::Array => fail(
                value.is_array() || value.is_object(),
                format!("The {} field must be an array.", field),
            ),
            Rule::Email => fail(
                value.as_str().map(is_email).unwrap_or(false),
                format!("The {} field must be a valid email address.", field),
            ),
            Rule::Url => fail(
                value.as_str().map(is_url).unwrap_or(false),
                format!("The {} field must be a valid URL.", field),
            ),
            Rule::Uuid => fail(
                value.as_str().map(|s| uuid::Uuid::parse_str(s).is_ok()).unwrap_or(false),
                format!("The {} field must be a valid UUID.", field),
            ),
            Rule::Date => fail(
                value.as_str().map(is_date).unwrap_or(false),
                format!("The {} field must be a valid date.", field),
            ),
            Rule::Min(min) => size_of(value, numeric).and_then(|size| {
                fail(
                    size >= *min,
                    format!(
                        "The {} field must be at least {}{}.",
                        field,
                        format_number(*min),
                        size_unit(value, numeric)
                    ),
                )
            }),
            Rule::Max(max) => size_of(value, numeric).and_then(|size| {
                fail(
                    size <= *max,
                    format!(
                        "The {} field must not be greater than {}{}.",
                        field,
                        format_number(*max),
                        size_unit(value, numeric)
                    ),
                )
            }),
            Rule::Between(lo, hi) => size_of(value, numeric).and_then(|size| {
                fail(
                    size >= *lo && size <= *hi,
                    format!(
                        "The {} field must be between {} and {}{}.",
                        field,
                        format_number(*lo),
                        format_number(*hi),
                        size_unit(value, numeric)
                    ),
                )
            }),
            Rule::In(allowed) => fail(
                text.as_deref().map(|t| allowed.iter().any(|a| a == t)).unwrap_or(false),
                format!("The selected {} is invalid.", field),
            ),
            Rule::NotIn(denied) => fail(
                !text.as_deref().map(|t| denied.iter().any(|a| a == t)).unwrap_or(false),
                format!("The selected {} is invalid.", field),
            ),
            Rule::Regex(pattern) => match cached_pattern(pattern) {
                Some(re) => fail(
                    text.as_deref().map(|t| re.is_match(t)).unwrap_or(false),
                    format!("The {} field format is invalid.", field),
                ),
                None => {
                    tracing::debug!(field = %field, pattern = %pattern, "invalid regex rule ignored");
                    None
                }
            },
            Rule::Confirmed => {
                let confirmation = data.get(&format!("{}_confirmation", field));
                fail(
                    confirmation.map(|c| loose_eq(c, value)).unwrap_or(false),
                    format!("The {} field confirmation does not match.", field),
                )
            }
            Rule::Unique {
                table,
                column,
                except,
                id_column,
            } => {
                let table = table.as_deref().unwrap_or(self.default_table);
                let column = column.as_deref().unwrap_or(field);
                let except_value = except.clone().map(Value::String);
                let except = except_value.as_ref().map(|v| (id_column.as_str(), v));
                let taken = self.store.exists(table, column, value, except).await?;
                fail(!taken, format!("The {} has already been taken.", field))
            }
            Rule::Exists { table, column } => {
                let column = column.as_deref().unwrap_or(field);
                let found = self.store.exists(table, column, value, None).await?;
                fail(found, format!("The selected {} is invalid.", field))
            }
            Rule::Unknown(raw) => {
                tracing::debug!(field = %field, rule = %raw, "unknown validation rule ignored");
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelDefinition;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn rules() -> FieldRuleSet {
        FieldRuleSet::new()
            .with("name", "required|string|max:255")
            .with("email", "required|email|unique")
    }

    #[test]
    fn parses_rule_arguments() {
        assert_eq!(Rule::parse("max:255"), Rule::Max(255.0));
        assert_eq!(Rule::parse("between:1,5"), Rule::Between(1.0, 5.0));
        assert_eq!(Rule::parse("in:a, b"), Rule::In(vec!["a".into(), "b".into()]));
        assert_eq!(
            Rule::parse("unique:users,email,NULL"),
            Rule::Unique {
                table: Some("users".into()),
                column: Some("email".into()),
                except: None,
                id_column: "id".into(),
            }
        );
        assert!(matches!(Rule::parse("shiny"), Rule::Unknown(_)));
    }

    #[tokio::test]
    async fn empty_payload_reports_every_required_field() {
        let store = MemoryStore::new();
        let err = RequestValidator::new(&store, "test_users")
            .validate(&Record::new(), &rules())
            .await
            .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("name").unwrap(), ["The name field is required."]);
        assert!(errors.has("email"));
    }

    #[tokio::test]
    async fn collects_multiple_failures() {
        let store = MemoryStore::new();
        let data = record(json!({"name": "x".repeat(300), "email": "nope"}));
        let err = RequestValidator::new(&store, "test_users")
            .validate(&data, &rules())
            .await
            .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors.get("name").unwrap(),
            ["The name field must not be greater than 255 characters."]
        );
        assert_eq!(errors.get("email").unwrap(), ["The email field must be a valid email address."]);
    }

    #[tokio::test]
    async fn unique_checks_the_store_and_honors_exception() {
        let store = MemoryStore::new();
        let model = ModelDefinition::new("user", "test_users");
        store
            .create(&model, &record(json!({"name": "a", "email": "a@x.io"})))
            .await
            .unwrap();
        let data = record(json!({"name": "b", "email": "a@x.io"}));
        let validator = RequestValidator::new(&store, "test_users");
        assert!(validator.validate(&data, &rules()).await.is_err());
        let except = FieldRuleSet::new().with("email", "unique:test_users,email,1");
        assert!(validator.validate(&data, &except).await.is_ok());
    }

    #[tokio::test]
    async fn sometimes_and_nullable_skip_checks() {
        let store = MemoryStore::new();
        let rules = FieldRuleSet::new()
            .with("age", "sometimes|integer|min:18")
            .with("bio", "nullable|string|min:10");
        let validator = RequestValidator::new(&store, "t");
        assert!(validator.validate(&record(json!({"bio": null})), &rules).await.is_ok());
        let err = validator
            .validate(&record(json!({"age": "12"})), &rules)
            .await
            .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("age").unwrap(), ["The age field must be at least 18."]);
    }

    #[tokio::test]
    async fn custom_messages_override_defaults() {
        let store = MemoryStore::new();
        let mut messages = HashMap::new();
        messages.insert("name.required".to_string(), "Tell us :attribute".to_string());
        let err = RequestValidator::new(&store, "t")
            .with_messages(messages)
            .validate(&Record::new(), &FieldRuleSet::new().with("name", "required"))
            .await
            .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("name").unwrap(), ["Tell us name"]);
    }

    #[tokio::test]
    async fn format_rules() {
        let store = MemoryStore::new();
        let rules = FieldRuleSet::new()
            .with("code", "regex:/^[A-Z]{3}$/")
            .with("site", "url")
            .with("status", "in:draft,published")
            .with("password", "confirmed");
        let ok = record(json!({
            "code": "ABC",
            "site": "https://example.com",
            "status": "draft",
            "password": "s3cret",
            "password_confirmation": "s3cret"
        }));
        let validator = RequestValidator::new(&store, "t");
        assert!(validator.validate(&ok, &rules).await.is_ok());
        let bad = record(json!({"code": "abc", "site": "ftp://x", "status": "gone", "password": "a"}));
        let AppError::Validation(errors) = validator.validate(&bad, &rules).await.unwrap_err() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 4);
    }

    #[tokio::test]
    async fn regex_rules_compile_once_and_are_reused() {
        let store = MemoryStore::new();
        let rules = FieldRuleSet::new().with("sku", "regex:/^sku-[0-9]+$/i");
        let validator = RequestValidator::new(&store, "t");
        assert!(validator.validate(&record(json!({"sku": "SKU-12"})), &rules).await.is_ok());

        let cached = PATTERNS
            .get()
            .and_then(|cache| cache.read().ok()?.get("/^sku-[0-9]+$/i").cloned())
            .flatten()
            .expect("pattern cached after first use");
        assert_eq!(cached.as_str(), "(?i)^sku-[0-9]+$");

        assert!(validator.validate(&record(json!({"sku": "sku-x"})), &rules).await.is_err());
        let again = cached_pattern("/^sku-[0-9]+$/i").unwrap();
        assert_eq!(again.as_str(), cached.as_str());
    }

    #[test]
    fn invalid_patterns_are_cached_as_absent() {
        assert!(cached_pattern("([unclosed").is_none());
        let cache = PATTERNS.get().unwrap().read().unwrap();
        assert!(matches!(cache.get("([unclosed"), Some(None)));
    }
}
