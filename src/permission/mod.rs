//! Permission resolution: derive the action a route performs, build the permission
//! string, and check it against the principal.

mod middleware;

pub use middleware::{require_permission, PermissionGate};

use crate::config::{BulkOperation, GlobalPermissionSettings, ResourceConfig};
use crate::error::AppError;
use axum::http::Method;
use std::collections::HashSet;
use std::sync::Arc;

/// The authenticated caller, as far as permission checks are concerned.
pub trait Principal: Send + Sync {
    fn id(&self) -> String;
    fn has_role(&self, role: &str) -> bool;
    fn can(&self, permission: &str) -> bool;
}

pub type SharedPrincipal = Arc<dyn Principal>;

/// Fixed roles and grants; for hosts with their own lookup done up front, and for tests.
#[derive(Clone, Debug, Default)]
pub struct StaticPrincipal {
    pub id: String,
    pub roles: HashSet<String>,
    pub permissions: HashSet<String>,
}

impl StaticPrincipal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn shared(self) -> SharedPrincipal {
        Arc::new(self)
    }
}

impl Principal for StaticPrincipal {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    fn can(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    ForceDelete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::ForceDelete => "force-delete",
        }
    }

    /// Bulk routes act according to the payload's `operation`; unknown or absent means edit.
    pub fn for_bulk(operation: Option<&str>) -> Self {
        match operation.and_then(BulkOperation::parse) {
            Some(BulkOperation::Delete | BulkOperation::ForceDelete) => Action::Delete,
            _ => Action::Edit,
        }
    }
}

/// Logical route kind, attached to each resource route when it is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteKind {
    Index,
    Show,
    Store,
    Update,
    Destroy,
    Bulk,
    Trashed,
    Restore,
    ForceDelete,
    Docs,
    Meta,
}

impl RouteKind {
    /// Route-name suffix, as in `posts.index`.
    pub fn suffix(self) -> &'static str {
        match self {
            RouteKind::Index => "index",
            RouteKind::Show => "show",
            RouteKind::Store => "store",
            RouteKind::Update => "update",
            RouteKind::Destroy => "destroy",
            RouteKind::Bulk => "bulk",
            RouteKind::Trashed => "trashed",
            RouteKind::Restore => "restore",
            RouteKind::ForceDelete => "force-delete",
            RouteKind::Docs => "docs",
            RouteKind::Meta => "meta",
        }
    }

    pub fn route_name(self, resource: &str) -> String {
        format!("{}.{}", resource, self.suffix())
    }
}

/// What the middleware knows about the matched route.
#[derive(Clone, Debug)]
pub struct RouteDescriptor {
    pub method: Method,
    pub name: Option<String>,
    /// Route pattern relative to the resource group, e.g. `/:id/restore`.
    pub pattern: String,
    pub bulk_operation: Option<String>,
}

fn action_for_suffix(suffix: &str, bulk_operation: Option<&str>) -> Option<Action> {
    Some(match suffix {
        "index" | "show" | "trashed" | "docs" | "meta" => Action::View,
        "store" => Action::Create,
        "update" | "patch" | "restore" => Action::Edit,
        "destroy" => Action::Delete,
        "bulk" => Action::for_bulk(bulk_operation),
        "force-delete" | "force_delete" => Action::ForceDelete,
        _ => return None,
    })
}

/// Route name suffix first, then method and pattern segments; `None` for non-CRUD routes.
pub fn derive_action(route: &RouteDescriptor) -> Option<Action> {
    let bulk_op = route.bulk_operation.as_deref();
    if let Some(action) = route
        .name
        .as_deref()
        .and_then(|n| n.rsplit('.').next())
        .and_then(|suffix| action_for_suffix(suffix, bulk_op))
    {
        return Some(action);
    }
    let segments: Vec<&str> = route.pattern.split('/').filter(|s| !s.is_empty()).collect();
    let last = segments.last().copied();
    let after_param = segments.len() >= 2 && segments[segments.len() - 2].starts_with(':');
    match route.method {
        Method::GET | Method::HEAD => Some(Action::View),
        Method::POST if last == Some("bulk") && segments.len() == 1 => Some(Action::for_bulk(bulk_op)),
        Method::POST if last == Some("restore") && after_param => Some(Action::Edit),
        Method::POST => Some(Action::Create),
        Method::PUT | Method::PATCH => Some(Action::Edit),
        Method::DELETE if last == Some("force") && after_param => Some(Action::ForceDelete),
        Method::DELETE => Some(Action::Delete),
        _ => None,
    }
}

/// Substitute `{action}` and `{resource}` into the permission format.
pub fn permission_string(format: &str, action: Action, resource: &str) -> String {
    format
        .replace("{action}", action.as_str())
        .replace("{resource}", resource)
}

pub fn permissions_enabled(settings: &GlobalPermissionSettings, resource: &ResourceConfig) -> bool {
    settings.enabled && resource.permissions.enabled.unwrap_or(true)
}

/// Enforce `action` on `resource` for `principal`.
pub fn check(
    settings: &GlobalPermissionSettings,
    resource: &ResourceConfig,
    action: Action,
    principal: Option<&dyn Principal>,
) -> Result<(), AppError> {
    if !permissions_enabled(settings, resource) {
        return Ok(());
    }
    let principal = principal.ok_or(AppError::NotAuthenticated)?;
    if principal.has_role(&settings.super_admin_role) {
        return Ok(());
    }
    let format = resource
        .permissions
        .format
        .as_deref()
        .unwrap_or(&settings.format);
    let permission = permission_string(format, action, &resource.name);
    if principal.can(&permission) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied(permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiSettings, ResourceDefinition};

    fn descriptor(method: Method, name: Option<&str>, pattern: &str, op: Option<&str>) -> RouteDescriptor {
        RouteDescriptor {
            method,
            name: name.map(String::from),
            pattern: pattern.to_string(),
            bulk_operation: op.map(String::from),
        }
    }

    fn posts(def: ResourceDefinition) -> ResourceConfig {
        ResourceConfig::from_definition("posts", def, &ApiSettings::default())
    }

    #[test]
    fn route_names_take_precedence() {
        let d = descriptor(Method::POST, Some("posts.restore"), "/:id/restore", None);
        assert_eq!(derive_action(&d), Some(Action::Edit));
        let d = descriptor(Method::DELETE, Some("posts.force-delete"), "/:id/force", None);
        assert_eq!(derive_action(&d), Some(Action::ForceDelete));
        let d = descriptor(Method::GET, Some("posts.docs"), "/docs", None);
        assert_eq!(derive_action(&d), Some(Action::View));
    }

    #[test]
    fn bulk_action_follows_operation() {
        let d = descriptor(Method::POST, Some("posts.bulk"), "/bulk", Some("force_delete"));
        assert_eq!(derive_action(&d), Some(Action::Delete));
        let d = descriptor(Method::POST, Some("posts.bulk"), "/bulk", Some("restore"));
        assert_eq!(derive_action(&d), Some(Action::Edit));
        let d = descriptor(Method::POST, Some("posts.bulk"), "/bulk", None);
        assert_eq!(derive_action(&d), Some(Action::Edit));
    }

    #[test]
    fn unnamed_routes_fall_back_to_method_and_pattern() {
        assert_eq!(derive_action(&descriptor(Method::GET, None, "/", None)), Some(Action::View));
        assert_eq!(derive_action(&descriptor(Method::POST, None, "/", None)), Some(Action::Create));
        assert_eq!(
            derive_action(&descriptor(Method::POST, None, "/bulk", Some("delete"))),
            Some(Action::Delete)
        );
        assert_eq!(
            derive_action(&descriptor(Method::POST, None, "/:id/restore", None)),
            Some(Action::Edit)
        );
        assert_eq!(derive_action(&descriptor(Method::PATCH, None, "/:id", None)), Some(Action::Edit));
        assert_eq!(
            derive_action(&descriptor(Method::DELETE, None, "/:id/force", None)),
            Some(Action::ForceDelete)
        );
        assert_eq!(derive_action(&descriptor(Method::DELETE, None, "/:id", None)), Some(Action::Delete));
        assert_eq!(derive_action(&descriptor(Method::OPTIONS, None, "/", None)), None);
    }

    #[test]
    fn unknown_suffix_defers_to_pattern() {
        let d = descriptor(Method::DELETE, Some("posts.archive"), "/:id", None);
        assert_eq!(derive_action(&d), Some(Action::Delete));
    }

    #[test]
    fn permission_format_substitution() {
        assert_eq!(permission_string("{action}-{resource}", Action::ForceDelete, "posts"), "force-delete-posts");
        assert_eq!(permission_string("{resource}.{action}", Action::View, "posts"), "posts.view");
    }

    #[test]
    fn enforcement_order() {
        let settings = GlobalPermissionSettings::default();
        let cfg = posts(ResourceDefinition::default());
        assert!(matches!(
            check(&settings, &cfg, Action::Delete, None),
            Err(AppError::NotAuthenticated)
        ));
        let reader = StaticPrincipal::new("1").with_permission("view-posts");
        assert!(check(&settings, &cfg, Action::View, Some(&reader)).is_ok());
        assert!(matches!(
            check(&settings, &cfg, Action::Delete, Some(&reader)),
            Err(AppError::PermissionDenied(p)) if p == "delete-posts"
        ));
        let admin = StaticPrincipal::new("2").with_role("super-admin");
        assert!(check(&settings, &cfg, Action::Delete, Some(&admin)).is_ok());
    }

    #[test]
    fn disabled_permissions_allow_anyone() {
        let mut def = ResourceDefinition::default();
        def.permissions.enabled = Some(false);
        let cfg = posts(def);
        assert!(check(&GlobalPermissionSettings::default(), &cfg, Action::Delete, None).is_ok());
        let global = GlobalPermissionSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(check(&global, &posts(ResourceDefinition::default()), Action::Delete, None).is_ok());
    }
}
