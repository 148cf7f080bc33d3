//! Query model, validation and scan predicates
//!
//! Queries are evaluated as predicates over each candidate record during a
//! scan; neither client keeps secondary indexes for scope or routing prefix.

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use converge_core::errors::{Error, ErrorKind};
use converge_core::model::ResourceId;
use regex::Regex;
use serde_json::Value;

use crate::client::{Object, QueryOptions, QueryResult};
use crate::errors::{invalid_token, Result};

const FIELD_PATTERN: &str = r"^([a-zA-Z$_][a-zA-Z0-9$_]*)(\.[a-zA-Z$_][a-zA-Z0-9$_]*)*$";

fn field_regex() -> Option<&'static Regex> {
    static FIELD_RE: OnceLock<Option<Regex>> = OnceLock::new();
    FIELD_RE.get_or_init(|| Regex::new(FIELD_PATTERN).ok()).as_ref()
}

/// Whether `field` is a dotted JSON property path such as `properties.application`
pub fn is_valid_field(field: &str) -> bool {
    field_regex().is_some_and(|re| re.is_match(field))
}

/// Equality filter on a property of the stored document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    /// Dotted JSON path into the record
    pub field: String,
    /// Value compared case-insensitively
    pub value: String,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    fn matches(&self, data: &Value) -> bool {
        let mut current = data;
        for part in self.field.split('.') {
            match current.get(part) {
                Some(next) => current = next,
                None => return self.value.is_empty(),
            }
        }
        match current {
            Value::String(s) => s.eq_ignore_ascii_case(&self.value),
            Value::Null => self.value.is_empty(),
            other => other.to_string().eq_ignore_ascii_case(&self.value),
        }
    }
}

/// Scan over stored records
///
/// A resource query returns resources of `resource_type` directly in
/// `root_scope` (or anywhere beneath it when `scope_recursive`). A scope
/// query returns scope records instead: the children of `root_scope`, or all
/// descendants when recursive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub root_scope: String,
    pub scope_recursive: bool,
    pub resource_type: String,
    pub routing_scope_prefix: String,
    pub is_scope_query: bool,
    pub filters: Vec<QueryFilter>,
}

impl Query {
    /// Check the query is well formed, reporting every problem at once.
    ///
    /// # Errors
    ///
    /// Returns an `Invalid` error listing each violated rule.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.root_scope.is_empty() {
            problems.push("root scope is required".to_string());
        }
        if self.resource_type.is_empty() && !self.is_scope_query {
            problems.push("resource type is required".to_string());
        }
        if self.is_scope_query && !self.routing_scope_prefix.is_empty() {
            problems.push("routing scope prefix is not supported for scope queries".to_string());
        }
        for filter in &self.filters {
            if filter.field.is_empty() {
                problems.push(format!("filter field is required (value '{}')", filter.value));
            } else if !is_valid_field(&filter.field) {
                problems.push(format!("filter field '{}' is invalid", filter.field));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::Invalid)
                .with_op("query_validate")
                .with_message(problems.join("; ")))
        }
    }

    /// Whether a stored record satisfies this query
    pub fn matches(&self, id: &str, data: &Value) -> bool {
        let Ok(id) = ResourceId::parse(id) else {
            return false;
        };

        if self.is_scope_query {
            if !id.is_scope() {
                return false;
            }
            let in_scope = if self.scope_recursive {
                scope_under(id.as_str(), &self.root_scope)
            } else {
                scope_eq(&id.parent_scope(), &self.root_scope)
            };
            if !in_scope {
                return false;
            }
        } else {
            if !id.is_resource() {
                return false;
            }
            let root = id.root_scope();
            let in_scope = scope_eq(root, &self.root_scope)
                || (self.scope_recursive && scope_under(root, &self.root_scope));
            if !in_scope {
                return false;
            }
            if !self.routing_scope_prefix.is_empty()
                && !id
                    .routing_scope()
                    .to_ascii_lowercase()
                    .starts_with(&self.routing_scope_prefix.to_ascii_lowercase())
            {
                return false;
            }
        }

        if !self.resource_type.is_empty() && !id.type_name().eq_ignore_ascii_case(&self.resource_type)
        {
            return false;
        }

        self.filters.iter().all(|f| f.matches(data))
    }
}

fn normalize(scope: &str) -> String {
    scope.trim_end_matches('/').to_ascii_lowercase()
}

fn scope_eq(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn scope_under(child: &str, parent: &str) -> bool {
    let parent = normalize(parent);
    let child = normalize(child);
    child.len() > parent.len() && child.starts_with(&parent) && child[parent.len()..].starts_with('/')
}

/// Encode the storage key of the last returned item
pub fn encode_token(key: &str) -> String {
    STANDARD.encode(key.as_bytes())
}

/// Decode a token produced by [`encode_token`]
///
/// # Errors
///
/// Returns `Invalid` if the token is not one this store issued.
pub fn decode_token(token: &str) -> Result<String> {
    let bytes = STANDARD.decode(token).map_err(|_| invalid_token(token))?;
    String::from_utf8(bytes).map_err(|_| invalid_token(token))
}

/// Cut one page out of matches sorted by storage key
///
/// # Errors
///
/// Returns `Invalid` for a malformed pagination token.
pub fn paginate(matched: Vec<(String, Object)>, options: &QueryOptions) -> Result<QueryResult> {
    let after = options
        .pagination_token
        .as_deref()
        .map(decode_token)
        .transpose()?;

    let mut page: Vec<(String, Object)> = matched
        .into_iter()
        .filter(|(key, _)| after.as_deref().map_or(true, |after| key.as_str() > after))
        .collect();

    let mut pagination_token = None;
    if options.max_query_item_count > 0 && page.len() > options.max_query_item_count {
        page.truncate(options.max_query_item_count);
        pagination_token = page.last().map(|(key, _)| encode_token(key));
    }

    Ok(QueryResult {
        items: page.into_iter().map(|(_, obj)| obj).collect(),
        pagination_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const RG: &str = "/planes/radius/local/resourceGroups/rg";

    fn container(name: &str) -> String {
        format!("{}/providers/Applications.Core/containers/{}", RG, name)
    }

    fn resource_query() -> Query {
        Query {
            root_scope: RG.to_string(),
            resource_type: "Applications.Core/containers".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_field_pattern_compiles() {
        assert!(field_regex().is_some());
    }

    #[test]
    fn test_valid_query() {
        assert!(resource_query().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let q = Query {
            is_scope_query: true,
            routing_scope_prefix: "/Applications.Core".to_string(),
            filters: vec![QueryFilter::new("1bad", "x")],
            ..Default::default()
        };
        let err = q.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(err.message().contains("root scope"));
        assert!(err.message().contains("routing scope prefix"));
        assert!(err.message().contains("1bad"));
        assert!(!err.message().contains("resource type"));
    }

    #[test]
    fn test_resource_type_required_unless_scope_query() {
        let q = Query {
            root_scope: RG.to_string(),
            ..Default::default()
        };
        assert!(q.validate().is_err());

        let scope = Query {
            root_scope: RG.to_string(),
            is_scope_query: true,
            ..Default::default()
        };
        assert!(scope.validate().is_ok());
    }

    #[test]
    fn test_empty_filter_field_rejected() {
        let mut q = resource_query();
        q.filters.push(QueryFilter::new("", "x"));
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_matches_resource_in_scope() {
        let q = resource_query();
        assert!(q.matches(&container("web"), &json!({})));
        assert!(q.matches(&container("web").to_uppercase(), &json!({})));
        assert!(!q.matches(
            "/planes/radius/local/resourceGroups/other/providers/Applications.Core/containers/web",
            &json!({})
        ));
        assert!(!q.matches(
            &format!("{}/providers/Applications.Core/gateways/gw", RG),
            &json!({})
        ));
        assert!(!q.matches(RG, &json!({})));
    }

    #[test]
    fn test_recursive_scope_respects_segment_boundary() {
        let q = Query {
            root_scope: "/planes/radius/local".to_string(),
            scope_recursive: true,
            ..resource_query()
        };
        assert!(q.matches(&container("web"), &json!({})));
        assert!(!q.matches(
            "/planes/radius/localother/resourceGroups/rg/providers/Applications.Core/containers/web",
            &json!({})
        ));
    }

    #[test]
    fn test_routing_scope_prefix() {
        let q = Query {
            routing_scope_prefix: "/applications.core/containers/we".to_string(),
            ..resource_query()
        };
        assert!(q.matches(&container("web"), &json!({})));
        assert!(!q.matches(&container("api"), &json!({})));
    }

    #[test]
    fn test_scope_query() {
        let q = Query {
            root_scope: "/planes/radius/local".to_string(),
            resource_type: "resourceGroups".to_string(),
            is_scope_query: true,
            ..Default::default()
        };
        assert!(q.matches(RG, &json!({})));
        assert!(!q.matches(&container("web"), &json!({})));
        assert!(!q.matches("/planes/radius/local", &json!({})));
    }

    #[test]
    fn test_filters_compare_case_insensitively() {
        let mut q = resource_query();
        q.filters
            .push(QueryFilter::new("properties.application", "/APP/ID"));
        let data = json!({"properties": {"application": "/app/id"}});
        assert!(q.matches(&container("web"), &data));
        assert!(!q.matches(&container("web"), &json!({"properties": {}})));

        let mut empty = resource_query();
        empty.filters.push(QueryFilter::new("properties.application", ""));
        assert!(empty.matches(&container("web"), &json!({"properties": {}})));
    }

    #[test]
    fn test_paginate_pages_and_resumes() {
        let matched: Vec<(String, Object)> = ["a", "b", "c"]
            .iter()
            .map(|k| (k.to_string(), Object::new(*k, json!({}))))
            .collect();
        let options = QueryOptions {
            pagination_token: None,
            max_query_item_count: 2,
        };
        let first = paginate(matched.clone(), &options).unwrap();
        assert_eq!(first.items.len(), 2);
        let token = first.pagination_token.unwrap();

        let next = paginate(
            matched,
            &QueryOptions {
                pagination_token: Some(token),
                max_query_item_count: 2,
            },
        )
        .unwrap();
        assert_eq!(next.items.len(), 1);
        assert_eq!(next.items[0].id(), "c");
        assert!(next.pagination_token.is_none());
    }

    #[test]
    fn test_bad_token_is_invalid() {
        let err = decode_token("!!!").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    proptest! {
        #[test]
        fn prop_dotted_identifiers_are_valid(
            field in "[a-zA-Z$_][a-zA-Z0-9$_]{0,8}(\\.[a-zA-Z$_][a-zA-Z0-9$_]{0,8}){0,3}"
        ) {
            prop_assert!(is_valid_field(&field));
        }

        #[test]
        fn prop_leading_digit_is_invalid(field in "[0-9][a-zA-Z0-9]{0,8}") {
            prop_assert!(!is_valid_field(&field));
        }

        #[test]
        fn prop_empty_segment_is_invalid(a in "[a-z]{1,5}", b in "[a-z]{1,5}") {
            let dotted = format!("{}..{}", a, b);
            let trailing = format!("{}.", a);
            prop_assert!(!is_valid_field(&dotted));
            prop_assert!(!is_valid_field(&trailing));
        }
    }
}
