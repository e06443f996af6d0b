//! Resolved resource model: config normalized and flattened for runtime use.

use crate::config::types::*;
use crate::logic::ResourceLogic;
use crate::query::{EagerLoad, TrashedScope};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Field name -> ordered rule strings (`["required", "max:255"]`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldRuleSet(BTreeMap<String, Vec<String>>);

impl FieldRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_raw(raw: RawFieldRules) -> Self {
        Self(
            raw.into_iter()
                .map(|(field, expr)| (field, expr.into_rules()))
                .collect(),
        )
    }

    /// Builder-style insert; `rules` uses the pipe syntax.
    pub fn with(mut self, field: impl Into<String>, rules: &str) -> Self {
        self.0
            .insert(field.into(), RuleExpr::Pipe(rules.to_string()).into_rules());
        self
    }

    /// Additive merge: rules for a field already present are appended, duplicates skipped.
    pub fn merge(mut self, other: FieldRuleSet) -> Self {
        for (field, rules) in other.0 {
            let entry = self.0.entry(field).or_default();
            for rule in rules {
                if !entry.contains(&rule) {
                    entry.push(rule);
                }
            }
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Vec<String>)> {
        self.0.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Restrict to the given fields (partial validation of present keys).
    pub fn only<'a>(&self, fields: impl IntoIterator<Item = &'a String>) -> Self {
        let mut out = BTreeMap::new();
        for f in fields {
            if let Some(rules) = self.0.get(f) {
                out.insert(f.clone(), rules.clone());
            }
        }
        Self(out)
    }
}

/// Operation a rule set applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleOperation {
    Store,
    Update,
}

#[derive(Clone, Debug, Default)]
pub struct RuleSets {
    pub store: FieldRuleSet,
    pub update: FieldRuleSet,
}

impl RuleSets {
    pub fn for_operation(&self, op: RuleOperation) -> &FieldRuleSet {
        match op {
            RuleOperation::Store => &self.store,
            RuleOperation::Update => &self.update,
        }
    }
}

/// Effective pagination after applying resource overrides to the global defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub paginate: bool,
    pub per_page: u64,
    pub max_per_page: u64,
}

/// Normalized configuration of one resource. Immutable once the registry is built.
#[derive(Clone, Debug)]
pub struct ResourceConfig {
    pub name: String,
    pub model: Option<String>,
    pub fillable: Vec<String>,
    pub hidden: Vec<String>,
    pub rules: RuleSets,
    pub search: SearchConfig,
    pub sort: SortConfig,
    /// Allow-listed filter fields with their default operator.
    pub filters: BTreeMap<String, Option<Operator>>,
    pub relationships: BTreeMap<String, RelationshipMeta>,
    pub permissions: PermissionConfig,
    pub soft_deletes: bool,
    pub bulk: BulkConfig,
    pub pagination: Pagination,
    pub middleware: Vec<String>,
    pub logic: Option<String>,
}

impl ResourceConfig {
    pub fn from_definition(name: &str, def: ResourceDefinition, settings: &ApiSettings) -> Self {
        let rules = match (def.rules, def.validation) {
            (Some(sets), _) => RuleSets {
                store: FieldRuleSet::from_raw(sets.store),
                update: FieldRuleSet::from_raw(sets.update),
            },
            (None, Some(flat)) => {
                let both = FieldRuleSet::from_raw(flat);
                RuleSets {
                    store: both.clone(),
                    update: both,
                }
            }
            (None, None) => RuleSets::default(),
        };

        let mut filters: BTreeMap<String, Option<Operator>> = def
            .filterable_fields
            .into_iter()
            .map(|f| (f, None))
            .collect();
        for (field, entry) in def.filters {
            filters.insert(field, entry.operator());
        }

        let global_max = settings.pagination.max_per_page.max(1);
        let max_per_page = def
            .api
            .max_per_page
            .map(|m| m.min(global_max))
            .unwrap_or(global_max)
            .max(1);
        let per_page = def
            .api
            .per_page
            .unwrap_or(settings.pagination.per_page)
            .clamp(1, max_per_page);

        ResourceConfig {
            name: name.to_string(),
            model: def.model.filter(|m| !m.trim().is_empty()),
            fillable: def.fillable,
            hidden: def.hidden,
            rules,
            search: def.search,
            sort: def.sort,
            filters,
            relationships: def.relationships,
            permissions: def.permissions,
            soft_deletes: def.soft_deletes,
            bulk: def.bulk_operations,
            pagination: Pagination {
                paginate: def.api.paginate.unwrap_or(true),
                per_page,
                max_per_page,
            },
            middleware: def.middleware,
            logic: def.logic,
        }
    }

    /// Relation name for a relationship field: explicit `relation`, else the field without `_id`.
    pub fn relation_name(field: &str, meta: &RelationshipMeta) -> String {
        meta.relation
            .clone()
            .unwrap_or_else(|| field.strip_suffix("_id").unwrap_or(field).to_string())
    }

    pub fn bulk_allows(&self, op: BulkOperation) -> bool {
        self.bulk.enabled && self.bulk.operations.contains(&op)
    }
}

/// A resource whose model reference has been checked against the model registry.
#[derive(Clone)]
pub struct ResolvedResource {
    pub config: Arc<ResourceConfig>,
    pub model: Arc<ModelDefinition>,
    pub logic: Arc<dyn ResourceLogic>,
    /// Related models for eager loading, keyed by relationship field.
    pub related: BTreeMap<String, Arc<ModelDefinition>>,
}

impl ResolvedResource {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Scope for single-record lookups that should not see trashed rows.
    pub fn default_scope(&self) -> TrashedScope {
        if self.config.soft_deletes {
            TrashedScope::Exclude
        } else {
            TrashedScope::Include
        }
    }

    /// Eager loads for every relationship whose entity is a known model.
    pub fn eager_loads(&self) -> Vec<EagerLoad> {
        self.related
            .iter()
            .filter_map(|(field, model)| {
                let meta = self.config.relationships.get(field)?;
                Some(EagerLoad {
                    name: ResourceConfig::relation_name(field, meta),
                    model: model.clone(),
                    local_key: field.clone(),
                    foreign_key: meta
                        .value_field
                        .clone()
                        .unwrap_or_else(|| model.primary_key.clone()),
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for ResolvedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedResource")
            .field("config", &self.config.name)
            .field("model", &self.model.name)
            .finish()
    }
}
