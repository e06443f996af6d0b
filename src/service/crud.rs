//! Per-endpoint orchestration: authorize, run hooks, validate, touch the store, transform.

use super::placeholders::{substitute, Placeholders};
use super::validation::RequestValidator;
use crate::config::{BulkOperation, FieldRuleSet, RuleOperation};
use crate::context::RequestContext;
use crate::error::{AppError, ValidationErrors};
use crate::permission::{self, Action};
use crate::query::{pipeline, Query, TrashedScope};
use crate::response::{BulkResponse, PageResponse};
use crate::state::AppState;
use crate::store::{primary_key, text_of, Record};
use serde_json::Value;

pub struct CrudService<'a> {
    state: &'a AppState,
}

/// Body of `POST /{resource}/bulk`.
#[derive(Debug)]
pub struct BulkRequest {
    pub operation: BulkOperation,
    pub ids: Vec<Value>,
    pub data: Record,
}

impl BulkRequest {
    /// An unknown operation is a 400; missing or empty `ids` is a 422.
    pub fn parse(body: &Value) -> Result<Self, AppError> {
        let op_name = body.get("operation").and_then(Value::as_str).unwrap_or("");
        let operation = BulkOperation::parse(op_name)
            .ok_or_else(|| AppError::BadRequest(format!("invalid bulk operation '{}'", op_name)))?;
        let ids: Vec<Value> = body
            .get("ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter(|v| !v.is_null()).cloned().collect())
            .unwrap_or_default();
        if ids.is_empty() {
            return Err(ValidationErrors::single("ids", "The ids field is required.").into());
        }
        let data = body
            .get("data")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Ok(Self { operation, ids, data })
    }
}

fn require_object(body: Value) -> Result<Record, AppError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::BadRequest("request body must be a JSON object".into())),
    }
}

fn require_soft_deletes(ctx: &RequestContext) -> Result<(), AppError> {
    if ctx.resource.config.soft_deletes {
        Ok(())
    } else {
        Err(AppError::Unsupported(format!(
            "soft deletes are not enabled for '{}'",
            ctx.resource.name()
        )))
    }
}

fn not_found(ctx: &RequestContext) -> AppError {
    AppError::NotFound(ctx.resource.name().to_string())
}

/// Keep only mass-assignable keys: `fillable`, else the rule keys, else everything but the key.
fn mass_assign(ctx: &RequestContext, body: &Record, rules: &FieldRuleSet) -> Record {
    let config = &ctx.resource.config;
    let pk = &ctx.resource.model.primary_key;
    body.iter()
        .filter(|&(k, _)| {
            if !config.fillable.is_empty() {
                config.fillable.contains(k)
            } else if !rules.is_empty() {
                rules.get(k).is_some()
            } else {
                k != pk
            }
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl<'a> CrudService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Lifecycle-level authorization, consulted after the permission gate.
    async fn authorize(&self, ctx: &RequestContext, action: Action, record: Option<&Record>) -> Result<(), AppError> {
        if ctx.resource.logic.authorize(action, record, ctx).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    async fn can_view_trashed(&self, ctx: &RequestContext) -> Result<bool, AppError> {
        let settings = &self.state.registry.settings().permissions;
        if permission::check(settings, &ctx.resource.config, Action::View, ctx.principal()).is_err() {
            return Ok(false);
        }
        ctx.resource.logic.authorize(Action::View, None, ctx).await
    }

    fn transform(&self, ctx: &RequestContext, record: Record) -> Value {
        ctx.resource.logic.transform_resource(record, ctx)
    }

    async fn with_relations(&self, ctx: &RequestContext, record: Record) -> Result<Record, AppError> {
        let mut records = [record];
        self.state
            .store
            .load_relations(&mut records, &ctx.resource.eager_loads())
            .await?;
        let [record] = records;
        Ok(record)
    }

    async fn find(&self, ctx: &RequestContext, id: &Value, scope: TrashedScope) -> Result<Record, AppError> {
        self.state
            .store
            .find(&ctx.resource.model, id, scope)
            .await?
            .ok_or_else(|| not_found(ctx))
    }

    /// Config rules for `op` merged with hook rules, placeholders substituted.
    fn rules_for(&self, ctx: &RequestContext, op: RuleOperation, record: Option<&Record>) -> FieldRuleSet {
        let resource = &ctx.resource;
        let base = resource.config.rules.for_operation(op).clone();
        let rules = base.merge(resource.logic.validation_rules(ctx, record));
        let vars = match record.and_then(|r| primary_key(&resource.model, r)).and_then(text_of) {
            Some(id) => Placeholders::for_record(id, ctx.user_id(), resource.name()),
            None => Placeholders::for_store(ctx.user_id(), resource.name()),
        };
        substitute(rules, &vars)
    }

    async fn validate(&self, ctx: &RequestContext, data: &Record, rules: &FieldRuleSet) -> Result<(), AppError> {
        RequestValidator::new(self.state.store.as_ref(), &ctx.resource.model.table)
            .with_messages(ctx.resource.logic.validation_messages())
            .validate(data, rules)
            .await
    }

    async fn list(&self, ctx: &RequestContext, only_trashed: bool) -> Result<PageResponse, AppError> {
        self.authorize(ctx, Action::View, None).await?;
        let resource = &ctx.resource;
        let query = resource
            .eager_loads()
            .into_iter()
            .fold(Query::new(), |q, load| q.with(load));
        let query = resource.logic.before_index(query, ctx).await?;
        let can_view_trashed = self.can_view_trashed(ctx).await?;
        let (mut query, page) = pipeline::run(query, resource, &ctx.params, can_view_trashed);
        if only_trashed {
            query = query.scope(TrashedScope::Only);
        }
        let result = self.state.store.paginate(&resource.model, &query, page).await?;
        let data = result
            .records
            .iter()
            .cloned()
            .map(|r| self.transform(ctx, r))
            .collect();
        Ok(PageResponse::new(&result, data))
    }

    pub async fn index(&self, ctx: &RequestContext) -> Result<PageResponse, AppError> {
        self.list(ctx, false).await
    }

    pub async fn trashed(&self, ctx: &RequestContext) -> Result<PageResponse, AppError> {
        require_soft_deletes(ctx)?;
        self.list(ctx, true).await
    }

    pub async fn show(&self, ctx: &RequestContext, id: &Value) -> Result<Value, AppError> {
        let resource = &ctx.resource;
        let scope = if resource.config.soft_deletes
            && (ctx.params.with_trashed || ctx.params.only_trashed)
            && self.can_view_trashed(ctx).await?
        {
            TrashedScope::Include
        } else {
            resource.default_scope()
        };
        let record = self.find(ctx, id, scope).await?;
        self.authorize(ctx, Action::View, Some(&record)).await?;
        let record = self.with_relations(ctx, record).await?;
        Ok(self.transform(ctx, record))
    }

    pub async fn store(&self, ctx: &RequestContext, body: Value) -> Result<Value, AppError> {
        let body = require_object(body)?;
        self.authorize(ctx, Action::Create, None).await?;
        let rules = self.rules_for(ctx, RuleOperation::Store, None);
        self.validate(ctx, &body, &rules).await?;
        let data = mass_assign(ctx, &body, &rules);
        let logic = &ctx.resource.logic;
        let data = logic.before_create(data, ctx).await?;
        let record = self.state.store.create(&ctx.resource.model, &data).await?;
        let record = self.with_relations(ctx, record).await?;
        logic.after_create(&record, ctx).await?;
        Ok(self.transform(ctx, record))
    }

    pub async fn update(&self, ctx: &RequestContext, id: &Value, body: Value) -> Result<Value, AppError> {
        let body = require_object(body)?;
        let resource = &ctx.resource;
        let record = self.find(ctx, id, resource.default_scope()).await?;
        self.authorize(ctx, Action::Edit, Some(&record)).await?;
        let rules = self.rules_for(ctx, RuleOperation::Update, Some(&record));
        self.validate(ctx, &body, &rules).await?;
        let data = mass_assign(ctx, &body, &rules);
        let data = resource.logic.before_update(data, &record, ctx).await?;
        let updated = self
            .state
            .store
            .update(&resource.model, id, &data)
            .await?
            .ok_or_else(|| not_found(ctx))?;
        let updated = self.with_relations(ctx, updated).await?;
        resource.logic.after_update(&updated, ctx).await?;
        Ok(self.transform(ctx, updated))
    }

    pub async fn destroy(&self, ctx: &RequestContext, id: &Value) -> Result<(), AppError> {
        let resource = &ctx.resource;
        let record = self.find(ctx, id, resource.default_scope()).await?;
        self.authorize(ctx, Action::Delete, Some(&record)).await?;
        if !resource.logic.before_delete(&record, ctx).await? {
            return Err(AppError::Vetoed("deletion was cancelled".into()));
        }
        if !self
            .state
            .store
            .delete(&resource.model, id, resource.config.soft_deletes)
            .await?
        {
            return Err(not_found(ctx));
        }
        resource.logic.after_delete(&record, ctx).await?;
        Ok(())
    }

    pub async fn restore(&self, ctx: &RequestContext, id: &Value) -> Result<Value, AppError> {
        require_soft_deletes(ctx)?;
        let resource = &ctx.resource;
        let record = self.find(ctx, id, TrashedScope::Only).await?;
        self.authorize(ctx, Action::Edit, Some(&record)).await?;
        if !resource.logic.before_restore(&record, ctx).await? {
            return Err(AppError::Vetoed("restore was cancelled".into()));
        }
        if !self.state.store.restore(&resource.model, id).await? {
            return Err(not_found(ctx));
        }
        let restored = self.find(ctx, id, TrashedScope::Include).await?;
        let restored = self.with_relations(ctx, restored).await?;
        resource.logic.after_restore(&restored, ctx).await?;
        Ok(self.transform(ctx, restored))
    }

    pub async fn force_delete(&self, ctx: &RequestContext, id: &Value) -> Result<(), AppError> {
        require_soft_deletes(ctx)?;
        let resource = &ctx.resource;
        let record = self.find(ctx, id, TrashedScope::Include).await?;
        self.authorize(ctx, Action::ForceDelete, Some(&record)).await?;
        if !resource.logic.before_delete(&record, ctx).await? {
            return Err(AppError::Vetoed("deletion was cancelled".into()));
        }
        if !self.state.store.force_delete(&resource.model, id).await? {
            return Err(not_found(ctx));
        }
        resource.logic.after_delete(&record, ctx).await?;
        Ok(())
    }

    /// Apply one operation to every listed record. Records that are missing, vetoed or fail
    /// are skipped; the batch itself always completes.
    pub async fn bulk(&self, ctx: &RequestContext, body: Value) -> Result<BulkResponse, AppError> {
        let resource = &ctx.resource;
        let config = &resource.config;
        if !config.bulk.enabled {
            return Err(AppError::Unsupported(format!(
                "bulk operations are not enabled for '{}'",
                resource.name()
            )));
        }
        let request = BulkRequest::parse(&body)?;
        let op = request.operation;
        if !config.bulk_allows(op) {
            return Err(AppError::BadRequest(format!(
                "bulk operation '{}' is not allowed for '{}'",
                op.as_str(),
                resource.name()
            )));
        }
        if op.needs_soft_deletes() {
            require_soft_deletes(ctx)?;
        }
        let data = if op == BulkOperation::Update {
            let rules = self.rules_for(ctx, RuleOperation::Update, None);
            self.validate(ctx, &request.data, &rules.only(request.data.keys()))
                .await?;
            mass_assign(ctx, &request.data, &rules)
        } else {
            Record::new()
        };

        let scope = if op.needs_soft_deletes() {
            TrashedScope::Include
        } else {
            resource.default_scope()
        };
        let records = self
            .state
            .store
            .find_many(&resource.model, &request.ids, scope)
            .await?;

        let mut affected = Vec::new();
        for record in records {
            let key = primary_key(&resource.model, &record).cloned();
            match self.bulk_one(ctx, op, record, &data).await {
                Ok(Some(done)) => affected.push(done),
                Ok(None) => {
                    tracing::warn!(resource = %resource.name(), operation = op.as_str(), id = ?key, "bulk record skipped");
                }
                Err(e) => {
                    tracing::warn!(resource = %resource.name(), operation = op.as_str(), id = ?key, error = %e, "bulk record failed");
                }
            }
        }
        resource.logic.after_bulk_operation(op, &affected, ctx).await?;

        Ok(BulkResponse {
            message: format!("Bulk {} completed", op.as_str()),
            operation: op.as_str(),
            affected_count: affected.len(),
            requested_count: request.ids.len(),
        })
    }

    /// `Ok(None)` when the record was vetoed or nothing changed.
    async fn bulk_one(
        &self,
        ctx: &RequestContext,
        op: BulkOperation,
        record: Record,
        data: &Record,
    ) -> Result<Option<Record>, AppError> {
        let resource = &ctx.resource;
        let logic = &resource.logic;
        let model = &resource.model;
        let store = &self.state.store;
        let Some(id) = primary_key(model, &record).cloned() else {
            return Ok(None);
        };
        let action = match op {
            BulkOperation::Delete => Action::Delete,
            BulkOperation::ForceDelete => Action::ForceDelete,
            BulkOperation::Restore | BulkOperation::Update => Action::Edit,
        };
        if !logic.authorize(action, Some(&record), ctx).await? {
            return Ok(None);
        }
        if !logic.before_bulk_operation(op, &record, data, ctx).await? {
            return Ok(None);
        }
        match op {
            BulkOperation::Delete => {
                if !logic.before_delete(&record, ctx).await?
                    || !store.delete(model, &id, resource.config.soft_deletes).await?
                {
                    return Ok(None);
                }
                logic.after_delete(&record, ctx).await?;
                Ok(Some(record))
            }
            BulkOperation::ForceDelete => {
                if !logic.before_delete(&record, ctx).await? || !store.force_delete(model, &id).await? {
                    return Ok(None);
                }
                logic.after_delete(&record, ctx).await?;
                Ok(Some(record))
            }
            BulkOperation::Restore => {
                if !logic.before_restore(&record, ctx).await? || !store.restore(model, &id).await? {
                    return Ok(None);
                }
                logic.after_restore(&record, ctx).await?;
                Ok(Some(record))
            }
            BulkOperation::Update => {
                let changes = logic.before_update(data.clone(), &record, ctx).await?;
                let Some(updated) = store.update(model, &id, &changes).await? else {
                    return Ok(None);
                };
                logic.after_update(&updated, ctx).await?;
                Ok(Some(updated))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bulk_request_requires_known_operation_and_ids() {
        assert!(matches!(
            BulkRequest::parse(&json!({"operation": "explode", "ids": [1]})),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            BulkRequest::parse(&json!({"operation": "delete", "ids": []})),
            Err(AppError::Validation(_))
        ));
        let req = BulkRequest::parse(&json!({"operation": "force-delete", "ids": [1, null, 2]})).unwrap();
        assert_eq!(req.operation, BulkOperation::ForceDelete);
        assert_eq!(req.ids, vec![json!(1), json!(2)]);
        assert!(req.data.is_empty());
    }
}
