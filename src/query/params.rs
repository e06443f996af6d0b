//! Query-string parameters understood by list endpoints.

use crate::config::Operator;
use std::collections::BTreeMap;

/// One `filter[field]`, `filter[field][]` or `filter[field][op]` group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterParam {
    pub field: String,
    pub operator: Option<Operator>,
    pub values: Vec<String>,
    /// True when given in list form (`filter[f][]=a&filter[f][]=b`).
    pub list: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub filters: Vec<FilterParam>,
    pub with_trashed: bool,
    pub only_trashed: bool,
}

fn flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no")
}

/// Split `filter[a][b][]` into (`a`, Some(`b`), list=true).
fn parse_filter_key(key: &str) -> Option<(String, Option<String>, bool)> {
    let rest = key.strip_prefix("filter[")?;
    let (field, mut tail) = rest.split_once(']')?;
    if field.is_empty() {
        return None;
    }
    let mut op = None;
    let mut list = false;
    while let Some(inner) = tail.strip_prefix('[') {
        let (seg, after) = inner.split_once(']')?;
        if seg.is_empty() {
            list = true;
        } else if op.is_none() {
            op = Some(seg.to_string());
        } else {
            return None;
        }
        tail = after;
    }
    if !tail.is_empty() {
        return None;
    }
    Some((field.to_string(), op, list))
}

impl QueryParams {
    /// Build from raw pairs; unparsable numbers and malformed filter keys are dropped.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = QueryParams::default();
        let mut groups: BTreeMap<(String, Option<String>), FilterParam> = BTreeMap::new();
        for (key, value) in pairs {
            match key.as_str() {
                "page" => params.page = value.trim().parse().ok().filter(|p| *p > 0),
                "per_page" => params.per_page = value.trim().parse().ok(),
                "search" => params.search = Some(value),
                "sort" => params.sort = Some(value),
                "direction" => params.direction = Some(value),
                "with_trashed" => params.with_trashed = flag(&value),
                "only_trashed" => params.only_trashed = flag(&value),
                _ => {
                    let Some((field, op, list)) = parse_filter_key(&key) else {
                        continue;
                    };
                    let operator = match op.as_deref().map(str::parse::<Operator>) {
                        None => None,
                        Some(Ok(o)) => Some(o),
                        Some(Err(e)) => {
                            tracing::debug!(key = %key, error = %e, "ignoring filter");
                            continue;
                        }
                    };
                    let entry = groups
                        .entry((field.clone(), op))
                        .or_insert_with(|| FilterParam {
                            field,
                            operator,
                            values: Vec::new(),
                            list: false,
                        });
                    entry.list |= list;
                    entry.values.push(value);
                }
            }
        }
        params.filters = groups.into_values().collect();
        params
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_paging_and_sorting() {
        let p = QueryParams::from_pairs(pairs(&[
            ("page", "3"),
            ("per_page", "200"),
            ("sort", "name"),
            ("direction", "asc"),
        ]));
        assert_eq!(p.page, Some(3));
        assert_eq!(p.per_page, Some(200));
        assert_eq!(p.sort.as_deref(), Some("name"));
        assert_eq!(p.direction.as_deref(), Some("asc"));
    }

    #[test]
    fn zero_or_garbage_page_is_dropped() {
        let p = QueryParams::from_pairs(pairs(&[("page", "0"), ("per_page", "lots")]));
        assert_eq!(p.page, None);
        assert_eq!(p.per_page, None);
    }

    #[test]
    fn groups_list_filters() {
        let p = QueryParams::from_pairs(pairs(&[
            ("filter[status][]", "draft"),
            ("filter[status][]", "published"),
            ("filter[author_id]", "7"),
        ]));
        assert_eq!(p.filters.len(), 2);
        let author = p.filters.iter().find(|f| f.field == "author_id").unwrap();
        assert_eq!(author.values, ["7"]);
        assert!(!author.list);
        let status = p.filters.iter().find(|f| f.field == "status").unwrap();
        assert_eq!(status.values, ["draft", "published"]);
        assert!(status.list);
    }

    #[test]
    fn parses_operator_filters() {
        let p = QueryParams::from_pairs(pairs(&[("filter[age][gte]", "18"), ("filter[age][bogus]", "1")]));
        assert_eq!(p.filters.len(), 1);
        assert_eq!(p.filters[0].operator, Some(Operator::GreaterEqual));
    }

    #[test]
    fn trashed_flags_honor_false_values() {
        let p = QueryParams::from_pairs(pairs(&[("with_trashed", ""), ("only_trashed", "false")]));
        assert!(p.with_trashed);
        assert!(!p.only_trashed);
    }

    #[test]
    fn malformed_filter_keys_are_ignored() {
        let p = QueryParams::from_pairs(pairs(&[("filter[]", "x"), ("filter[a]junk", "y"), ("filter[a][b][c]", "z")]));
        assert!(p.filters.is_empty());
    }
}
