//! HTTP request shaping.
//!
//! Breaks a request line (`GET /users/42?active=true HTTP/1.1`) or a bare
//! path into sub-fields named `<prefix>_<field>_<part>`:
//!
//! | part | example |
//! |---|---|
//! | `method` | `GET` |
//! | `protocol_version` | `HTTP/1.1` |
//! | `uri` | `/users/42?active=true` |
//! | `path` | `/users/42` |
//! | `query` | `active=true` |
//! | `pathshape` | `/users/:id` |
//! | `queryshape` | `active=?` |
//! | `shape` | `/users/:id?active=?` |
//! | `path_<name>` | `path_id` = `42` |
//! | `query_<key>` | `query_active` = `true` |

use super::TransformError;
use crate::domain::{Event, FieldValue};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::{Url, form_urlencoded};

/// Which query parameters become individual fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPolicy {
    /// Only keys listed in `--request_query_keys`.
    Whitelist(Vec<String>),
    All,
}

impl QueryPolicy {
    fn includes(&self, key: &str) -> bool {
        match self {
            QueryPolicy::Whitelist(keys) => keys.iter().any(|k| k == key),
            QueryPolicy::All => true,
        }
    }
}

/// `--request_parse_query` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Whitelist,
    All,
}

impl QueryMode {
    pub fn policy(self, keys: &[String]) -> QueryPolicy {
        match self {
            QueryMode::Whitelist => QueryPolicy::Whitelist(keys.to_vec()),
            QueryMode::All => QueryPolicy::All,
        }
    }
}

/// A path template such as `/users/:id/orders/:order`.
#[derive(Debug, Clone)]
struct PathPattern {
    template: String,
    regex: Regex,
}

impl PathPattern {
    fn new(template: &str) -> Result<Self, TransformError> {
        let mut pattern = String::from("^");
        for (i, segment) in template.trim_end_matches('/').split('/').enumerate() {
            if i > 0 {
                pattern.push('/');
            }
            match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() => {
                    pattern.push_str(&format!("(?P<{name}>[^/]+)"));
                }
                _ if segment == "*" => pattern.push_str("[^/]+"),
                _ => pattern.push_str(&regex::escape(segment)),
            }
        }
        pattern.push_str("/?$");

        let regex = Regex::new(&pattern).map_err(|source| TransformError::InvalidRequestPattern {
            pattern: template.to_string(),
            source,
        })?;
        Ok(Self {
            template: template.to_string(),
            regex,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RequestShaper {
    fields: Vec<String>,
    prefix: Option<String>,
    patterns: Vec<PathPattern>,
    query: QueryPolicy,
}

impl RequestShaper {
    pub fn new(
        fields: Vec<String>,
        prefix: Option<String>,
        patterns: &[String],
        query: QueryPolicy,
    ) -> Result<Self, TransformError> {
        let patterns = patterns
            .iter()
            .map(|p| PathPattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            fields,
            prefix: prefix.filter(|p| !p.is_empty()),
            patterns,
            query,
        })
    }

    /// Shape every configured field that holds a string.
    pub fn apply(&self, event: &mut Event) {
        for field in &self.fields {
            let Some(value) = event.get(field).and_then(FieldValue::as_str) else {
                continue;
            };
            let Some(request) = ShapedRequest::parse(value) else {
                tracing::trace!(field = %field, "Value is not a request line");
                continue;
            };

            let name_prefix = match &self.prefix {
                Some(prefix) => format!("{prefix}_{field}_"),
                None => format!("{field}_"),
            };
            for (part, value) in self.decompose(request) {
                event.insert(format!("{name_prefix}{part}"), value);
            }
        }
    }

    fn decompose(&self, request: ShapedRequest) -> Vec<(String, FieldValue)> {
        let mut out = Vec::new();
        if let Some(method) = request.method {
            out.push(("method".to_string(), FieldValue::Str(method)));
        }
        if let Some(version) = request.protocol_version {
            out.push(("protocol_version".to_string(), FieldValue::Str(version)));
        }
        out.push(("uri".to_string(), FieldValue::Str(request.uri)));
        out.push(("path".to_string(), FieldValue::Str(request.path.clone())));

        let mut pathshape = request.path.clone();
        if let Some((pattern, captures)) = self
            .patterns
            .iter()
            .find_map(|p| p.regex.captures(&request.path).map(|caps| (p, caps)))
        {
            pathshape = pattern.template.clone();
            for name in pattern.regex.capture_names().flatten() {
                if let Some(m) = captures.name(name) {
                    out.push((format!("path_{name}"), FieldValue::Str(m.as_str().to_string())));
                }
            }
        }

        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(query) = &request.query {
            out.push(("query".to_string(), FieldValue::Str(query.clone())));
            for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                params
                    .entry(key.into_owned())
                    .or_default()
                    .push(value.into_owned());
            }
        }

        let queryshape = params
            .keys()
            .map(|k| format!("{k}=?"))
            .collect::<Vec<_>>()
            .join("&");
        for (key, values) in &params {
            if self.query.includes(key) {
                out.push((format!("query_{key}"), FieldValue::Str(values.join(","))));
            }
        }

        let shape = if queryshape.is_empty() {
            pathshape.clone()
        } else {
            format!("{pathshape}?{queryshape}")
        };
        out.push(("pathshape".to_string(), FieldValue::Str(pathshape)));
        out.push(("queryshape".to_string(), FieldValue::Str(queryshape)));
        out.push(("shape".to_string(), FieldValue::Str(shape)));
        out
    }
}

#[derive(Debug, PartialEq)]
struct ShapedRequest {
    method: Option<String>,
    protocol_version: Option<String>,
    uri: String,
    path: String,
    query: Option<String>,
}

impl ShapedRequest {
    /// Accepts `METHOD URI [PROTOCOL]` or a bare URI.
    fn parse(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        let (method, uri, protocol_version) = match parts.as_slice() {
            [uri] => (None, *uri, None),
            [method, uri] => (Some(*method), *uri, None),
            [method, uri, version] => (Some(*method), *uri, Some(*version)),
            _ => return None,
        };

        let (path, query) = if uri.contains("://") {
            let url = Url::parse(uri).ok()?;
            (url.path().to_string(), url.query().map(str::to_string))
        } else if uri.starts_with('/') {
            match uri.split_once('?') {
                Some((path, query)) => (path.to_string(), Some(query.to_string())),
                None => (uri.to_string(), None),
            }
        } else {
            return None;
        };

        Some(Self {
            method: method.map(str::to_string),
            protocol_version: protocol_version.map(str::to_string),
            uri: uri.to_string(),
            path,
            query: query.filter(|q| !q.is_empty()),
        })
    }
}
