//! List-query transformations, applied in a fixed order:
//! soft-delete scoping, search, filter, sort, pagination.

use crate::config::{Direction, Operator, Pagination, ResolvedResource, SearchConfig, SortConfig};
use crate::query::{CompareOp, Condition, FilterParam, MatchMode, PageRequest, Query, QueryParams, TrashedScope};
use serde_json::Value;
use std::collections::BTreeMap;

/// Run every stage. Returns `None` for the page when the resource disables pagination.
pub fn run(
    query: Query,
    resource: &ResolvedResource,
    params: &QueryParams,
    can_view_trashed: bool,
) -> (Query, Option<PageRequest>) {
    let config = &resource.config;
    let query = scope_trashed(query, config.soft_deletes, params, can_view_trashed);
    let query = apply_search(query, &config.search, params.search_term());
    let query = apply_filters(query, &config.filters, &params.filters);
    let fallback = config
        .sort
        .default
        .field
        .as_deref()
        .unwrap_or(resource.model.primary_key.as_str());
    let query = apply_sort(query, &config.sort, fallback, params);
    (query, page_request(params, &config.pagination))
}

/// Stage 1. Resources without soft deletes are never scoped; without view authorization the
/// default exclusion stands.
pub fn scope_trashed(query: Query, soft_deletes: bool, params: &QueryParams, can_view_trashed: bool) -> Query {
    if !soft_deletes {
        return query.scope(TrashedScope::Include);
    }
    if !can_view_trashed {
        return query.scope(TrashedScope::Exclude);
    }
    if params.only_trashed {
        query.scope(TrashedScope::Only)
    } else if params.with_trashed {
        query.scope(TrashedScope::Include)
    } else {
        query
    }
}

/// Stage 2. One OR group over the searchable fields; an empty term is a no-op.
pub fn apply_search(query: Query, search: &SearchConfig, term: Option<&str>) -> Query {
    let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
        return query;
    };
    if !search.enabled || search.fields.is_empty() {
        return query;
    }
    let values = [term.to_string()];
    let group: Vec<Condition> = search
        .fields
        .iter()
        .filter_map(|field| operator_condition(field, search.operator, &values))
        .collect();
    if group.is_empty() {
        return query;
    }
    query.or_where(group)
}

/// Stage 3. Only allow-listed fields are applied; anything else is skipped.
pub fn apply_filters(
    mut query: Query,
    allowed: &BTreeMap<String, Option<Operator>>,
    filters: &[FilterParam],
) -> Query {
    for filter in filters {
        let Some(default_op) = allowed.get(&filter.field) else {
            tracing::debug!(field = %filter.field, "filter field not allow-listed; skipped");
            continue;
        };
        let values: Vec<String> = filter
            .values
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            continue;
        }
        let is_list = filter.list || values.len() > 1;
        let op = match filter.operator.or(*default_op) {
            Some(op) => op,
            None if is_list => Operator::In,
            None => Operator::Exact,
        };
        if let Some(condition) = operator_condition(&filter.field, op, &values) {
            query = query.where_(condition);
        }
    }
    query
}

/// Stage 4. Unknown sort fields fall back to the default; unknown directions force `desc`.
pub fn apply_sort(query: Query, sort: &SortConfig, fallback_field: &str, params: &QueryParams) -> Query {
    if !sort.enabled {
        return query;
    }
    let requested = params
        .sort
        .as_deref()
        .map(str::trim)
        .filter(|s| sort.fields.iter().any(|f| f == s));
    match requested {
        Some(field) => {
            let direction = match params.direction.as_deref() {
                None => sort.default.direction,
                Some(d) => match d.trim().to_ascii_lowercase().as_str() {
                    "asc" => Direction::Asc,
                    _ => Direction::Desc,
                },
            };
            query.order_by(field, direction)
        }
        None => query.order_by(fallback_field, sort.default.direction),
    }
}

/// Stage 5. `per_page` is clamped to `[1, max_per_page]`; absent means the resource default.
pub fn page_request(params: &QueryParams, pagination: &Pagination) -> Option<PageRequest> {
    if !pagination.paginate {
        return None;
    }
    let max = pagination.max_per_page.max(1);
    let per_page = params.per_page.unwrap_or(pagination.per_page).clamp(1, max);
    Some(PageRequest {
        page: params.page.unwrap_or(1).max(1),
        per_page,
    })
}

/// Expand comma-separated values (`in`, `between` accept `a,b`).
fn split_values(values: &[String]) -> Vec<Value> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| Value::String(v.to_string()))
        .collect()
}

/// Translate one operator and its raw values into a condition.
pub fn operator_condition(field: &str, op: Operator, values: &[String]) -> Option<Condition> {
    let field = field.to_string();
    let first = values.first()?.clone();
    let compare = |field: String, op: CompareOp, value: String| Condition::Compare {
        field,
        op,
        value: Value::String(value),
    };
    Some(match op {
        Operator::Like => Condition::Match {
            field,
            mode: MatchMode::Contains,
            term: first,
        },
        Operator::StartsWith => Condition::Match {
            field,
            mode: MatchMode::StartsWith,
            term: first,
        },
        Operator::EndsWith => Condition::Match {
            field,
            mode: MatchMode::EndsWith,
            term: first,
        },
        Operator::Exact if values.len() > 1 => Condition::In {
            field,
            values: values.iter().cloned().map(Value::String).collect(),
            negated: false,
        },
        Operator::NotEqual if values.len() > 1 => Condition::In {
            field,
            values: values.iter().cloned().map(Value::String).collect(),
            negated: true,
        },
        Operator::Exact => compare(field, CompareOp::Eq, first),
        Operator::NotEqual => compare(field, CompareOp::Ne, first),
        Operator::GreaterThan => compare(field, CompareOp::Gt, first),
        Operator::LessThan => compare(field, CompareOp::Lt, first),
        Operator::GreaterEqual => compare(field, CompareOp::Ge, first),
        Operator::LessEqual => compare(field, CompareOp::Le, first),
        Operator::In | Operator::NotIn => {
            let values = split_values(values);
            if values.is_empty() {
                return None;
            }
            Condition::In {
                field,
                values,
                negated: op == Operator::NotIn,
            }
        }
        Operator::Between => {
            let mut bounds = split_values(values).into_iter();
            let (low, high) = (bounds.next()?, bounds.next()?);
            Condition::Between { field, low, high }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SortDefault;

    fn params(items: &[(&str, &str)]) -> QueryParams {
        QueryParams::from_pairs(items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    fn sort_config() -> SortConfig {
        SortConfig {
            enabled: true,
            fields: vec!["name".into(), "created_at".into()],
            default: SortDefault {
                field: Some("created_at".into()),
                direction: Direction::Desc,
            },
        }
    }

    fn pagination() -> Pagination {
        Pagination {
            paginate: true,
            per_page: 15,
            max_per_page: 100,
        }
    }

    #[test]
    fn per_page_is_clamped_to_max() {
        let page = page_request(&params(&[("per_page", "200")]), &pagination()).unwrap();
        assert_eq!(page.per_page, 100);
    }

    #[test]
    fn per_page_zero_is_raised_to_one() {
        let page = page_request(&params(&[("per_page", "0")]), &pagination()).unwrap();
        assert_eq!(page.per_page, 1);
    }

    #[test]
    fn huge_page_numbers_saturate_the_offset() {
        let page = page_request(&params(&[("page", "18446744073709551615")]), &pagination()).unwrap();
        assert_eq!(page.page, u64::MAX);
        assert_eq!(page.offset(), u64::MAX);
    }

    #[test]
    fn per_page_defaults_when_absent() {
        let page = page_request(&params(&[]), &pagination()).unwrap();
        assert_eq!((page.page, page.per_page), (1, 15));
    }

    #[test]
    fn unpaginated_resources_yield_no_page() {
        let mut p = pagination();
        p.paginate = false;
        assert!(page_request(&params(&[]), &p).is_none());
    }

    #[test]
    fn invalid_sort_field_falls_back_to_default() {
        let q = apply_sort(Query::new(), &sort_config(), "id", &params(&[("sort", "password"), ("direction", "asc")]));
        assert_eq!(q.order, vec![("created_at".to_string(), Direction::Desc)]);
    }

    #[test]
    fn invalid_direction_forces_desc() {
        let q = apply_sort(Query::new(), &sort_config(), "id", &params(&[("sort", "name"), ("direction", "sideways")]));
        assert_eq!(q.order, vec![("name".to_string(), Direction::Desc)]);
    }

    #[test]
    fn valid_sort_is_applied() {
        let q = apply_sort(Query::new(), &sort_config(), "id", &params(&[("sort", "name"), ("direction", "ASC")]));
        assert_eq!(q.order, vec![("name".to_string(), Direction::Asc)]);
    }

    #[test]
    fn disabled_sort_leaves_order_empty() {
        let mut sort = sort_config();
        sort.enabled = false;
        let q = apply_sort(Query::new(), &sort, "id", &params(&[("sort", "name")]));
        assert!(q.order.is_empty());
    }

    #[test]
    fn empty_search_is_a_no_op() {
        let search = SearchConfig {
            enabled: true,
            fields: vec!["name".into()],
            operator: Operator::Like,
        };
        assert!(apply_search(Query::new(), &search, Some("   ")).conditions.is_empty());
        assert!(apply_search(Query::new(), &search, None).conditions.is_empty());
    }

    #[test]
    fn search_or_combines_fields() {
        let search = SearchConfig {
            enabled: true,
            fields: vec!["name".into(), "email".into()],
            operator: Operator::Like,
        };
        let q = apply_search(Query::new(), &search, Some("john"));
        assert_eq!(q.conditions.len(), 1);
        match &q.conditions[0] {
            Condition::Any(group) => assert_eq!(group.len(), 2),
            other => panic!("expected OR group, got {:?}", other),
        }
    }

    #[test]
    fn filters_outside_allow_list_are_skipped() {
        let mut allowed = BTreeMap::new();
        allowed.insert("status".to_string(), None);
        let p = params(&[("filter[status]", "draft"), ("filter[password]", "x")]);
        let q = apply_filters(Query::new(), &allowed, &p.filters);
        assert_eq!(
            q.conditions,
            vec![Condition::Compare {
                field: "status".into(),
                op: CompareOp::Eq,
                value: Value::String("draft".into()),
            }]
        );
    }

    #[test]
    fn list_filters_become_membership() {
        let mut allowed = BTreeMap::new();
        allowed.insert("status".to_string(), None);
        let p = params(&[("filter[status][]", "draft"), ("filter[status][]", "archived")]);
        let q = apply_filters(Query::new(), &allowed, &p.filters);
        assert!(matches!(&q.conditions[0], Condition::In { values, negated: false, .. } if values.len() == 2));
    }

    #[test]
    fn empty_filter_values_are_ignored() {
        let mut allowed = BTreeMap::new();
        allowed.insert("status".to_string(), None);
        let p = params(&[("filter[status]", "")]);
        assert!(apply_filters(Query::new(), &allowed, &p.filters).conditions.is_empty());
    }

    #[test]
    fn between_needs_two_bounds() {
        assert!(operator_condition("age", Operator::Between, &["18".into()]).is_none());
        assert!(matches!(
            operator_condition("age", Operator::Between, &["18,30".into()]),
            Some(Condition::Between { .. })
        ));
    }

    #[test]
    fn trashed_flags_need_soft_deletes_and_view() {
        let p = params(&[("only_trashed", "1")]);
        assert_eq!(scope_trashed(Query::new(), true, &p, true).scope, TrashedScope::Only);
        assert_eq!(scope_trashed(Query::new(), false, &p, true).scope, TrashedScope::Include);
        assert_eq!(scope_trashed(Query::new(), true, &p, false).scope, TrashedScope::Exclude);
        let p = params(&[("with_trashed", "1")]);
        assert_eq!(scope_trashed(Query::new(), true, &p, true).scope, TrashedScope::Include);
    }
}
