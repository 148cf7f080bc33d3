//! Hierarchical resource identifiers
//!
//! An identifier is a path of scope pairs followed, for resources, by a
//! provider namespace and one or more type/name pairs:
//!
//! ```text
//! /planes/radius/local/resourceGroups/rg/providers/Applications.Core/containers/web
//! └────────── root scope ──────────────┘          └──────── routing scope ───────┘
//! ```
//!
//! A `/planes/<type>/<name>` prefix is treated as a single scope pair. Any
//! other prefix (for example `/subscriptions/<id>`) is parsed as plain pairs.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::errors::{Error, ErrorKind};

const PLANES_SEGMENT: &str = "planes";
const PROVIDERS_SEGMENT: &str = "providers";

/// Reasons a string is not a valid resource id
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceIdError {
    #[error("resource id is empty")]
    Empty,

    #[error("resource id '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("resource id '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("resource id '{0}' has a scope type without a name")]
    UnbalancedScope(String),

    #[error("resource id '{0}' has an invalid provider segment: {1}")]
    InvalidProvider(String, String),
}

impl From<ResourceIdError> for Error {
    fn from(err: ResourceIdError) -> Self {
        Error::new(ErrorKind::Invalid)
            .with_op("parse_resource_id")
            .with_message(err.to_string())
    }
}

/// One `type/name` pair of an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub type_name: String,
    pub name: String,
}

/// A parsed scope or resource identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    id: String,
    root_scope: String,
    scopes: Vec<Segment>,
    namespace: Option<String>,
    types: Vec<Segment>,
}

impl ResourceId {
    /// Parse an identifier string
    ///
    /// A single trailing `/` is accepted and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceIdError`] if the id is empty, relative, has empty
    /// segments, an odd scope pair, or a malformed provider section.
    pub fn parse(id: &str) -> Result<Self, ResourceIdError> {
        if id.is_empty() {
            return Err(ResourceIdError::Empty);
        }
        if !id.starts_with('/') {
            return Err(ResourceIdError::MissingLeadingSlash(id.to_string()));
        }

        let trimmed = id.strip_suffix('/').unwrap_or(id);
        if trimmed.is_empty() {
            return Err(ResourceIdError::Empty);
        }

        let segments: Vec<&str> = trimmed[1..].split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ResourceIdError::EmptySegment(id.to_string()));
        }

        let providers_at = segments
            .iter()
            .position(|s| s.eq_ignore_ascii_case(PROVIDERS_SEGMENT));
        let (scope_part, provider_part) = match providers_at {
            Some(i) => (&segments[..i], Some(&segments[i + 1..])),
            None => (&segments[..], None),
        };

        let scope_pairs = if scope_part
            .first()
            .is_some_and(|s| s.eq_ignore_ascii_case(PLANES_SEGMENT))
        {
            &scope_part[1..]
        } else {
            scope_part
        };
        let scopes = pairs(scope_pairs)
            .ok_or_else(|| ResourceIdError::UnbalancedScope(id.to_string()))?;

        let root_scope = format!("/{}", scope_part.join("/"));

        let (namespace, types) = match provider_part {
            None => (None, Vec::new()),
            Some(rest) => {
                let Some((namespace, type_pairs)) = rest.split_first() else {
                    return Err(ResourceIdError::InvalidProvider(
                        id.to_string(),
                        "missing namespace".to_string(),
                    ));
                };
                if !namespace.contains('.') {
                    return Err(ResourceIdError::InvalidProvider(
                        id.to_string(),
                        format!("namespace '{}' is not qualified", namespace),
                    ));
                }
                let types = pairs(type_pairs).ok_or_else(|| {
                    ResourceIdError::InvalidProvider(
                        id.to_string(),
                        "resource type without a name".to_string(),
                    )
                })?;
                if types.is_empty() {
                    return Err(ResourceIdError::InvalidProvider(
                        id.to_string(),
                        "missing resource type".to_string(),
                    ));
                }
                (Some((*namespace).to_string()), types)
            }
        };

        Ok(Self {
            id: trimmed.to_string(),
            root_scope,
            scopes,
            namespace,
            types,
        })
    }

    /// The identifier as given (without a trailing `/`)
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Case-folded form used as a storage key
    pub fn storage_key(&self) -> String {
        self.id.to_ascii_lowercase()
    }

    /// True for scope identifiers (no `providers` section)
    pub fn is_scope(&self) -> bool {
        self.namespace.is_none()
    }

    /// True for resource identifiers
    pub fn is_resource(&self) -> bool {
        self.namespace.is_some()
    }

    /// Everything before `/providers`; the full id for scopes
    pub fn root_scope(&self) -> &str {
        &self.root_scope
    }

    /// The scope containing this id
    ///
    /// For resources this is the root scope; for scopes it is the root scope
    /// with the last pair removed.
    pub fn parent_scope(&self) -> String {
        if self.is_resource() {
            return self.root_scope.clone();
        }
        let segments: Vec<&str> = self.root_scope[1..].split('/').collect();
        if segments.len() <= 2 {
            return "/".to_string();
        }
        format!("/{}", segments[..segments.len() - 2].join("/"))
    }

    pub fn scope_segments(&self) -> &[Segment] {
        &self.scopes
    }

    /// Provider namespace such as `Applications.Core`
    pub fn provider_namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Fully-qualified type
    ///
    /// `Applications.Core/containers` for a resource, the last scope type
    /// (e.g. `resourceGroups`) for a scope.
    pub fn type_name(&self) -> String {
        match &self.namespace {
            Some(ns) => {
                let mut out = ns.clone();
                for t in &self.types {
                    out.push('/');
                    out.push_str(&t.type_name);
                }
                out
            }
            None => self
                .scopes
                .last()
                .map(|s| s.type_name.clone())
                .unwrap_or_default(),
        }
    }

    /// Name of the last segment
    pub fn name(&self) -> &str {
        match self.types.last().or(self.scopes.last()) {
            Some(seg) => &seg.name,
            None => "",
        }
    }

    /// Provider section without the `/providers` prefix, e.g. `/Applications.Core/containers/web`
    pub fn routing_scope(&self) -> String {
        let Some(ns) = &self.namespace else {
            return String::new();
        };
        let mut out = format!("/{}", ns);
        for t in &self.types {
            out.push('/');
            out.push_str(&t.type_name);
            out.push('/');
            out.push_str(&t.name);
        }
        out
    }
}

fn pairs(segments: &[&str]) -> Option<Vec<Segment>> {
    if segments.len() % 2 != 0 {
        return None;
    }
    Some(
        segments
            .chunks(2)
            .map(|c| Segment {
                type_name: c[0].to_string(),
                name: c[1].to_string(),
            })
            .collect(),
    )
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl FromStr for ResourceId {
    type Err = ResourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
