//! OpenAPI-shaped description of each resource's endpoints, derived from its config.

use crate::config::{ApiSettings, FieldRuleSet, ResolvedResource, ResourceRegistry};
use crate::error::ConfigError;
use serde_json::{json, Value};
use utoipa::openapi::content::ContentBuilder;
use utoipa::openapi::info::InfoBuilder;
use utoipa::openapi::path::{
    HttpMethod, Operation, OperationBuilder, Parameter, ParameterBuilder, ParameterIn, PathItem,
    PathItemBuilder, PathsBuilder,
};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::response::ResponseBuilder;
use utoipa::openapi::schema::{ObjectBuilder, Schema, Type};
use utoipa::openapi::{OpenApi, OpenApiBuilder, RefOr, Required};

const JSON: &str = "application/json";

fn scalar(ty: Type, description: Option<String>) -> RefOr<Schema> {
    RefOr::T(Schema::Object(
        ObjectBuilder::new().schema_type(ty).description(description).build(),
    ))
}

/// Schema type implied by a field's rules.
fn field_type(rules: Option<&[String]>) -> Type {
    let rules = rules.unwrap_or_default();
    let has = |name: &str| rules.iter().any(|r| r.split(':').next() == Some(name));
    if has("integer") || has("int") {
        Type::Integer
    } else if has("numeric") {
        Type::Number
    } else if has("boolean") || has("bool") {
        Type::Boolean
    } else if has("array") {
        Type::Array
    } else {
        Type::String
    }
}

/// Request/record schema: `fillable` fields plus anything with rules.
fn record_schema(resource: &ResolvedResource, rules: &FieldRuleSet) -> RefOr<Schema> {
    let config = &resource.config;
    let mut fields: Vec<&str> = config.fillable.iter().map(String::as_str).collect();
    for f in rules.fields() {
        if !fields.contains(&f) {
            fields.push(f);
        }
    }
    let mut object = ObjectBuilder::new().schema_type(Type::Object);
    for field in fields {
        let field_rules = rules.get(field);
        object = object.property(field, scalar(field_type(field_rules), Some(field_rules.unwrap_or_default().join("|"))));
        if field_rules.map(|r| r.iter().any(|x| x == "required")).unwrap_or(false) {
            object = object.required(field);
        }
    }
    RefOr::T(Schema::Object(object.build()))
}

fn query_param(name: &str, ty: Type, description: &str) -> Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Query)
        .required(Required::False)
        .description(Some(description))
        .schema(Some(scalar(ty, None)))
        .build()
}

fn id_param() -> Parameter {
    ParameterBuilder::new()
        .name("id")
        .parameter_in(ParameterIn::Path)
        .required(Required::True)
        .schema(Some(scalar(Type::String, None)))
        .build()
}

fn json_body(schema: RefOr<Schema>) -> utoipa::openapi::request_body::RequestBody {
    RequestBodyBuilder::new()
        .content(JSON, ContentBuilder::new().schema(Some(schema)).build())
        .required(Some(Required::True))
        .build()
}

fn operation(resource: &str, id: &str, summary: String) -> OperationBuilder {
    OperationBuilder::new()
        .summary(Some(summary))
        .operation_id(Some(format!("{}.{}", resource, id)))
        .tag(resource)
}

fn ok(builder: OperationBuilder, code: &str, description: &str) -> Operation {
    builder
        .response(code, ResponseBuilder::new().description(description).build())
        .build()
}

fn list_params(resource: &ResolvedResource) -> Vec<Parameter> {
    let config = &resource.config;
    let mut params = vec![
        query_param("page", Type::Integer, "Page number, starting at 1"),
        query_param(
            "per_page",
            Type::Integer,
            &format!("Page size, at most {}", config.pagination.max_per_page),
        ),
    ];
    if config.search.enabled && !config.search.fields.is_empty() {
        params.push(query_param(
            "search",
            Type::String,
            &format!("Matches {} ({})", config.search.fields.join(", "), config.search.operator),
        ));
    }
    if config.sort.enabled {
        params.push(query_param(
            "sort",
            Type::String,
            &format!("One of: {}", config.sort.fields.join(", ")),
        ));
        params.push(query_param("direction", Type::String, "asc or desc"));
    }
    for (field, op) in &config.filters {
        let op = op.map(|o| o.to_string()).unwrap_or_else(|| "exact".into());
        params.push(query_param(&format!("filter[{}]", field), Type::String, &format!("Filter ({})", op)));
    }
    if config.soft_deletes {
        params.push(query_param("with_trashed", Type::Boolean, "Include soft-deleted records"));
        params.push(query_param("only_trashed", Type::Boolean, "Only soft-deleted records"));
    }
    params
}

/// Path items for one resource, keyed by full path.
pub fn resource_paths(settings: &ApiSettings, resource: &ResolvedResource) -> Vec<(String, PathItem)> {
    let config = &resource.config;
    let name = config.name.as_str();
    let prefix = settings.prefix.trim_matches('/');
    let base = if prefix.is_empty() {
        format!("/{}", name)
    } else {
        format!("/{}/{}", prefix, name)
    };
    let store_schema = record_schema(resource, &config.rules.store);
    let update_schema = record_schema(resource, &config.rules.update);

    let mut list = operation(name, "index", format!("List {}", name));
    for p in list_params(resource) {
        list = list.parameter(p);
    }
    let collection = PathItemBuilder::new()
        .operation(HttpMethod::Get, ok(list, "200", "Paginated list"))
        .operation(
            HttpMethod::Post,
            ok(
                operation(name, "store", format!("Create {}", name)).request_body(Some(json_body(store_schema))),
                "201",
                "Created",
            ),
        )
        .build();

    let update = |id: &str| {
        ok(
            operation(name, id, format!("Update {}", name))
                .parameter(id_param())
                .request_body(Some(json_body(update_schema.clone()))),
            "200",
            "Updated",
        )
    };
    let member = PathItemBuilder::new()
        .operation(
            HttpMethod::Get,
            ok(operation(name, "show", format!("Show {}", name)).parameter(id_param()), "200", "Record"),
        )
        .operation(HttpMethod::Put, update("update"))
        .operation(HttpMethod::Patch, update("patch"))
        .operation(
            HttpMethod::Delete,
            ok(operation(name, "destroy", format!("Delete {}", name)).parameter(id_param()), "204", "Deleted"),
        )
        .build();

    let mut paths = vec![(base.clone(), collection), (format!("{}/{{id}}", base), member)];

    if config.bulk.enabled {
        let ops: Vec<&str> = config.bulk.operations.iter().map(|o| o.as_str()).collect();
        let body = ObjectBuilder::new()
            .schema_type(Type::Object)
            .property("operation", scalar(Type::String, Some(ops.join(", "))))
            .property("ids", scalar(Type::Array, None))
            .property("data", scalar(Type::Object, None))
            .required("operation")
            .required("ids")
            .build();
        let op = operation(name, "bulk", format!("Bulk operation on {}", name))
            .request_body(Some(json_body(RefOr::T(Schema::Object(body)))));
        paths.push((
            format!("{}/bulk", base),
            PathItemBuilder::new().operation(HttpMethod::Post, ok(op, "200", "Bulk result")).build(),
        ));
    }
    if config.soft_deletes {
        let mut trashed = operation(name, "trashed", format!("List deleted {}", name));
        for p in list_params(resource) {
            trashed = trashed.parameter(p);
        }
        paths.push((
            format!("{}/trashed", base),
            PathItemBuilder::new().operation(HttpMethod::Get, ok(trashed, "200", "Paginated list")).build(),
        ));
        paths.push((
            format!("{}/{{id}}/restore", base),
            PathItemBuilder::new()
                .operation(
                    HttpMethod::Post,
                    ok(operation(name, "restore", format!("Restore {}", name)).parameter(id_param()), "200", "Restored"),
                )
                .build(),
        ));
        paths.push((
            format!("{}/{{id}}/force", base),
            PathItemBuilder::new()
                .operation(
                    HttpMethod::Delete,
                    ok(
                        operation(name, "force-delete", format!("Permanently delete {}", name)).parameter(id_param()),
                        "204",
                        "Deleted",
                    ),
                )
                .build(),
        ));
    }
    for (suffix, summary) in [("docs", "API documentation"), ("meta", "Form metadata")] {
        paths.push((
            format!("{}/{}", base, suffix),
            PathItemBuilder::new()
                .operation(HttpMethod::Get, ok(operation(name, suffix, summary.to_string()), "200", summary))
                .build(),
        ));
    }
    paths
}

fn document(title: String, paths: Vec<(String, PathItem)>) -> OpenApi {
    let paths = paths
        .into_iter()
        .fold(PathsBuilder::new(), |b, (path, item)| b.path(path, item))
        .build();
    OpenApiBuilder::new()
        .info(InfoBuilder::new().title(title).version(env!("CARGO_PKG_VERSION")).build())
        .paths(paths)
        .build()
}

pub fn resource_document(settings: &ApiSettings, resource: &ResolvedResource) -> OpenApi {
    document(
        format!("{} API", resource.config.name),
        resource_paths(settings, resource),
    )
}

/// One document covering every configured resource.
pub fn aggregate_document(registry: &ResourceRegistry) -> Result<OpenApi, ConfigError> {
    let mut paths = Vec::new();
    for name in registry.resource_names() {
        let resource = registry.resolve(name)?;
        paths.extend(resource_paths(registry.settings(), &resource));
    }
    Ok(document("Resource API".to_string(), paths))
}

fn rules_json(rules: &FieldRuleSet) -> Value {
    rules
        .iter()
        .map(|(field, r)| (field.clone(), json!(r)))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

/// Client form metadata for `GET /{resource}/meta`.
pub fn resource_meta(resource: &ResolvedResource) -> Value {
    let config = &resource.config;
    let filters: serde_json::Map<String, Value> = config
        .filters
        .iter()
        .map(|(f, op)| (f.clone(), op.map(|o| json!(o.to_string())).unwrap_or(Value::Null)))
        .collect();
    json!({
        "resource": config.name,
        "model": resource.model.name,
        "primary_key": resource.model.primary_key,
        "fillable": config.fillable,
        "hidden": config.hidden,
        "rules": {
            "store": rules_json(&config.rules.store),
            "update": rules_json(&config.rules.update),
        },
        "relationships": config.relationships,
        "search": config.search,
        "sort": config.sort,
        "filters": filters,
        "soft_deletes": config.soft_deletes,
        "bulk_operations": config.bulk,
        "pagination": {
            "paginate": config.pagination.paginate,
            "per_page": config.pagination.per_page,
            "max_per_page": config.pagination.max_per_page,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_json_str;
    use crate::logic::LogicRegistry;

    const DOC: &str = r#"{
        "models": { "post": { "table": "posts" } },
        "resources": {
            "posts": {
                "model": "post",
                "fillable": ["title", "views"],
                "rules": {
                    "store": { "title": "required|string", "views": "integer" },
                    "update": { "title": "sometimes|string" }
                },
                "search": { "enabled": true, "fields": ["title"] },
                "filterable_fields": ["status"],
                "soft_deletes": true
            }
        }
    }"#;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::build(from_json_str(DOC).unwrap(), LogicRegistry::new()).unwrap()
    }

    #[test]
    fn resource_document_lists_configured_endpoints() {
        let registry = registry();
        let posts = registry.resolve("posts").unwrap();
        let doc = serde_json::to_value(resource_document(registry.settings(), &posts)).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/posts"));
        assert!(paths.contains_key("/api/posts/{id}"));
        assert!(paths.contains_key("/api/posts/trashed"));
        assert!(paths.contains_key("/api/posts/{id}/force"));
        assert!(!paths.contains_key("/api/posts/bulk"));
        let params: Vec<&str> = doc["paths"]["/api/posts"]["get"]["parameters"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert!(params.contains(&"search"));
        assert!(params.contains(&"filter[status]"));
        let schema = &doc["paths"]["/api/posts"]["post"]["requestBody"]["content"]["application/json"]["schema"];
        assert_eq!(schema["required"], json!(["title"]));
        assert_eq!(schema["properties"]["views"]["type"], json!("integer"));
    }

    #[test]
    fn aggregate_covers_all_resources() {
        let doc = serde_json::to_value(aggregate_document(&registry()).unwrap()).unwrap();
        assert!(doc["paths"]["/api/posts/{id}/restore"]["post"].is_object());
    }

    #[test]
    fn meta_echoes_form_settings() {
        let registry = registry();
        let meta = resource_meta(&registry.resolve("posts").unwrap());
        assert_eq!(meta["fillable"], json!(["title", "views"]));
        assert_eq!(meta["soft_deletes"], json!(true));
        assert_eq!(meta["rules"]["update"]["title"], json!(["sometimes", "string"]));
    }
}
