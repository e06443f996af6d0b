//! Lifecycle hooks a resource can override. Every method has a no-op default, so a
//! resource-specific implementation only writes the hooks it cares about.

use crate::config::{BulkOperation, FieldRuleSet};
use crate::context::RequestContext;
use crate::error::AppError;
use crate::permission::Action;
use crate::query::Query;
use crate::store::Record;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait ResourceLogic: Send + Sync {
    /// Customize the list query before the transformation pipeline runs.
    async fn before_index(&self, query: Query, _ctx: &RequestContext) -> Result<Query, AppError> {
        Ok(query)
    }

    async fn before_create(&self, data: Record, _ctx: &RequestContext) -> Result<Record, AppError> {
        Ok(data)
    }

    async fn after_create(&self, _record: &Record, _ctx: &RequestContext) -> Result<(), AppError> {
        Ok(())
    }

    async fn before_update(
        &self,
        data: Record,
        _record: &Record,
        _ctx: &RequestContext,
    ) -> Result<Record, AppError> {
        Ok(data)
    }

    async fn after_update(&self, _record: &Record, _ctx: &RequestContext) -> Result<(), AppError> {
        Ok(())
    }

    /// Returning `false` vetoes the deletion.
    async fn before_delete(&self, _record: &Record, _ctx: &RequestContext) -> Result<bool, AppError> {
        Ok(true)
    }

    async fn after_delete(&self, _record: &Record, _ctx: &RequestContext) -> Result<(), AppError> {
        Ok(())
    }

    /// Returning `false` vetoes the restore.
    async fn before_restore(&self, _record: &Record, _ctx: &RequestContext) -> Result<bool, AppError> {
        Ok(true)
    }

    async fn after_restore(&self, _record: &Record, _ctx: &RequestContext) -> Result<(), AppError> {
        Ok(())
    }

    /// Extra rules, merged additively with the configured ones. `record` is set on update.
    fn validation_rules(&self, _ctx: &RequestContext, _record: Option<&Record>) -> FieldRuleSet {
        FieldRuleSet::new()
    }

    /// Message overrides keyed `field.rule` or `rule`; `:attribute` is replaced by the field name.
    fn validation_messages(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Response shape of one record.
    fn transform_resource(&self, record: Record, ctx: &RequestContext) -> Value {
        default_transform(record, &ctx.resource.config.hidden)
    }

    /// Returning `false` skips this record in the batch.
    async fn before_bulk_operation(
        &self,
        _op: BulkOperation,
        _record: &Record,
        _data: &Record,
        _ctx: &RequestContext,
    ) -> Result<bool, AppError> {
        Ok(true)
    }

    async fn after_bulk_operation(
        &self,
        _op: BulkOperation,
        _records: &[Record],
        _ctx: &RequestContext,
    ) -> Result<(), AppError> {
        Ok(())
    }

    /// Consulted after the permission check passes.
    async fn authorize(
        &self,
        _action: Action,
        _record: Option<&Record>,
        _ctx: &RequestContext,
    ) -> Result<bool, AppError> {
        Ok(true)
    }
}

/// Full field dump minus `hidden`.
pub fn default_transform(mut record: Record, hidden: &[String]) -> Value {
    for field in hidden {
        record.remove(field);
    }
    Value::Object(record)
}

/// The no-op handler used by resources without a `logic` reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultLogic;

impl ResourceLogic for DefaultLogic {}

/// Named logic implementations that resource configs refer to by `logic`.
#[derive(Clone, Default)]
pub struct LogicRegistry {
    handlers: HashMap<String, Arc<dyn ResourceLogic>>,
}

impl LogicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, logic: Arc<dyn ResourceLogic>) -> Self {
        self.handlers.insert(name.into(), logic);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Unknown or absent names fall back to [`DefaultLogic`].
    pub fn for_resource(&self, name: Option<&str>) -> Arc<dyn ResourceLogic> {
        match name {
            Some(n) => match self.handlers.get(n) {
                Some(logic) => logic.clone(),
                None => {
                    tracing::warn!(logic = %n, "logic handler not registered; using default");
                    Arc::new(DefaultLogic)
                }
            },
            None => Arc::new(DefaultLogic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_transform_strips_hidden_fields() {
        let record = json!({"id": 1, "name": "a", "password": "x"}).as_object().cloned().unwrap();
        let out = default_transform(record, &["password".to_string()]);
        assert_eq!(out, json!({"id": 1, "name": "a"}));
    }

    #[test]
    fn registry_falls_back_to_default() {
        struct Custom;
        impl ResourceLogic for Custom {}
        let registry = LogicRegistry::new().register("custom", Arc::new(Custom));
        assert!(registry.contains("custom"));
        assert!(!registry.contains("missing"));
        let _ = registry.for_resource(Some("missing"));
        let _ = registry.for_resource(None);
    }
}
