//! Raw config types matching the JSON resource document.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

fn default_true() -> bool {
    true
}

fn default_prefix() -> String {
    "api".into()
}

fn default_per_page() -> u64 {
    15
}

fn default_max_per_page() -> u64 {
    100
}

fn default_permission_format() -> String {
    "{action}-{resource}".into()
}

fn default_super_admin_role() -> String {
    "super-admin".into()
}

fn default_body_limit() -> usize {
    1024 * 1024
}

fn default_primary_key() -> String {
    "id".into()
}

fn default_soft_delete_column() -> String {
    "deleted_at".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaginationSettings {
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u64,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GlobalPermissionSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_permission_format")]
    pub format: String,
    #[serde(default = "default_super_admin_role")]
    pub super_admin_role: String,
}

impl Default for GlobalPermissionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            format: default_permission_format(),
            super_admin_role: default_super_admin_role(),
        }
    }
}

/// Process-wide settings shared by every resource.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Path prefix the host mounts the generated routes under (used in documentation paths).
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub pagination: PaginationSettings,
    #[serde(default)]
    pub permissions: GlobalPermissionSettings,
    /// Surface internal error details in 500 responses.
    #[serde(default)]
    pub debug: bool,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            pagination: PaginationSettings::default(),
            permissions: GlobalPermissionSettings::default(),
            debug: false,
            body_limit: default_body_limit(),
        }
    }
}

/// Primary key type for parsing path/body ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    #[default]
    Int,
    BigInt,
    Uuid,
    Text,
}

/// Backing record type a resource's model reference resolves to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Registry key; filled in when the registry is built.
    #[serde(skip)]
    pub name: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub key_type: KeyType,
    #[serde(default = "default_soft_delete_column")]
    pub soft_delete_column: String,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// SQL type per column, used to cast bound parameters (e.g. "timestamptz", "integer").
    #[serde(default)]
    pub column_types: HashMap<String, String>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_primary_key(),
            key_type: KeyType::Int,
            soft_delete_column: default_soft_delete_column(),
            timestamps: true,
            column_types: HashMap::new(),
        }
    }

    pub fn column_type(&self, column: &str) -> Option<&str> {
        self.column_types.get(column).map(String::as_str)
    }
}

/// A field's rules: `"required|string|max:255"` or `["required", "string"]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleExpr {
    Pipe(String),
    List(Vec<String>),
}

impl RuleExpr {
    pub fn into_rules(self) -> Vec<String> {
        match self {
            RuleExpr::Pipe(s) => s
                .split('|')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect(),
            RuleExpr::List(v) => v
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }
}

pub type RawFieldRules = BTreeMap<String, RuleExpr>;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawRuleSets {
    #[serde(default)]
    pub store: RawFieldRules,
    #[serde(default)]
    pub update: RawFieldRules,
}

/// Comparison used by search and filter conditions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Like,
    #[serde(alias = "eq", alias = "=")]
    Exact,
    #[serde(alias = "ne", alias = "!=")]
    NotEqual,
    #[serde(alias = "gt", alias = ">")]
    GreaterThan,
    #[serde(alias = "lt", alias = "<")]
    LessThan,
    #[serde(alias = "gte", alias = ">=")]
    GreaterEqual,
    #[serde(alias = "lte", alias = "<=")]
    LessEqual,
    In,
    NotIn,
    Between,
    StartsWith,
    EndsWith,
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "like" | "contains" => Operator::Like,
            "exact" | "eq" | "=" => Operator::Exact,
            "not_equal" | "ne" | "neq" | "!=" => Operator::NotEqual,
            "greater_than" | "gt" | ">" => Operator::GreaterThan,
            "less_than" | "lt" | "<" => Operator::LessThan,
            "greater_equal" | "gte" | ">=" => Operator::GreaterEqual,
            "less_equal" | "lte" | "<=" => Operator::LessEqual,
            "in" => Operator::In,
            "not_in" | "nin" => Operator::NotIn,
            "between" => Operator::Between,
            "starts_with" => Operator::StartsWith,
            "ends_with" => Operator::EndsWith,
            other => return Err(format!("unknown operator '{}'", other)),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Like => "like",
            Operator::Exact => "exact",
            Operator::NotEqual => "not_equal",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::GreaterEqual => "greater_equal",
            Operator::LessEqual => "less_equal",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Between => "between",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub operator: Operator,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SortDefault {
    /// Falls back to the model's primary key when absent.
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, alias = "sortable_fields")]
    pub fields: Vec<String>,
    #[serde(default)]
    pub default: SortDefault,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fields: Vec::new(),
            default: SortDefault::default(),
        }
    }
}

/// `filters` entry: either a bare operator name or `{ "operator": ... }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterEntry {
    Operator(Operator),
    Detailed {
        #[serde(default)]
        operator: Option<Operator>,
    },
}

impl FilterEntry {
    pub fn operator(&self) -> Option<Operator> {
        match self {
            FilterEntry::Operator(op) => Some(*op),
            FilterEntry::Detailed { operator } => *operator,
        }
    }
}

/// Client form metadata for a foreign-key field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipMeta {
    /// Related model name.
    pub entity: String,
    #[serde(default, rename = "labelField", alias = "label_field")]
    pub label_field: Option<String>,
    #[serde(default, rename = "valueField", alias = "value_field")]
    pub value_field: Option<String>,
    #[serde(default, rename = "displayField", alias = "display_field")]
    pub display_field: Option<String>,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub depends_on: Option<String>,
    #[serde(default)]
    pub filter_by: Option<String>,
    /// Key the loaded relation is attached under; defaults to the field without `_id`.
    #[serde(default)]
    pub relation: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PermissionConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub middleware: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperation {
    Delete,
    Restore,
    Update,
    #[serde(alias = "force-delete")]
    ForceDelete,
}

impl BulkOperation {
    pub const ALL: [BulkOperation; 4] = [
        BulkOperation::Delete,
        BulkOperation::Restore,
        BulkOperation::Update,
        BulkOperation::ForceDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BulkOperation::Delete => "delete",
            BulkOperation::Restore => "restore",
            BulkOperation::Update => "update",
            BulkOperation::ForceDelete => "force_delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delete" => Some(BulkOperation::Delete),
            "restore" => Some(BulkOperation::Restore),
            "update" => Some(BulkOperation::Update),
            "force_delete" | "force-delete" => Some(BulkOperation::ForceDelete),
            _ => None,
        }
    }

    pub fn needs_soft_deletes(self) -> bool {
        matches!(self, BulkOperation::Restore | BulkOperation::ForceDelete)
    }
}

fn default_bulk_operations() -> Vec<BulkOperation> {
    BulkOperation::ALL.to_vec()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bulk_operations")]
    pub operations: Vec<BulkOperation>,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            operations: default_bulk_operations(),
        }
    }
}

/// Per-resource override of the global pagination defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiOptions {
    #[serde(default)]
    pub paginate: Option<bool>,
    #[serde(default)]
    pub per_page: Option<u64>,
    #[serde(default)]
    pub max_per_page: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceDefinition {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub fillable: Vec<String>,
    #[serde(default)]
    pub hidden: Vec<String>,
    #[serde(default)]
    pub rules: Option<RawRuleSets>,
    /// Legacy flat rules applied to both store and update.
    #[serde(default)]
    pub validation: Option<RawFieldRules>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub sort: SortConfig,
    #[serde(default)]
    pub filterable_fields: Vec<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterEntry>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipMeta>,
    #[serde(default)]
    pub permissions: PermissionConfig,
    #[serde(default)]
    pub soft_deletes: bool,
    #[serde(default)]
    pub bulk_operations: BulkConfig,
    #[serde(default)]
    pub api: ApiOptions,
    #[serde(default)]
    pub middleware: Vec<String>,
    #[serde(default)]
    pub logic: Option<String>,
}

/// The whole configuration document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub settings: ApiSettings,
    #[serde(default)]
    pub models: BTreeMap<String, ModelDefinition>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDefinition>,
}
