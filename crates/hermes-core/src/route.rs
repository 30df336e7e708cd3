//! Route classification.
//!
//! A forwarded URL is classified into one of four operations by matching
//! fixed markers against its path. The markers live in [`ROUTE_RULES`] and are
//! evaluated top to bottom, so precedence is data rather than control flow.
//!
//! Classification is total: undecodable query strings, missing parameters and
//! paths without a capturable identifier all produce a value, never an error.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Name of the query parameter carrying the category identifier on create
/// and update routes.
pub const FRAMEWORK_PARAM: &str = "framework";

/// The operation a forwarded request asks the upstream to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Publishing an existing category.
    Publish,
    /// Creating a new resource under a category.
    Create,
    /// Updating a resource under a category.
    Update,
    /// Anything else. Never gated.
    Generic,
}

impl OperationKind {
    /// Stable label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Create => "create",
            Self::Update => "update",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified request, carrying the resource identifier for sensitive
/// operations.
///
/// `None` means no identifier could be recovered from the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClassifiedOperation {
    /// Create, with the identifier taken from the `framework` parameter.
    Create(Option<String>),
    /// Update, with the identifier taken from the `framework` parameter.
    Update(Option<String>),
    /// Publish, with the identifier taken from the path.
    Publish(Option<String>),
    /// Pass-through request.
    Generic,
}

impl ClassifiedOperation {
    /// The operation kind without its payload.
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Update(_) => OperationKind::Update,
            Self::Publish(_) => OperationKind::Publish,
            Self::Generic => OperationKind::Generic,
        }
    }

    /// The extracted resource identifier, if any.
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::Create(id) | Self::Update(id) | Self::Publish(id) => id.as_deref(),
            Self::Generic => None,
        }
    }

    /// Returns `true` for operations that go through the authorization decider.
    pub const fn is_sensitive(&self) -> bool {
        !matches!(self, Self::Generic)
    }
}

/// One entry of the classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRule {
    /// Substring searched for in the path.
    pub marker: &'static str,
    /// Operation assigned when the marker is present.
    pub kind: OperationKind,
}

/// Classification rules in precedence order. First match wins.
pub const ROUTE_RULES: &[RouteRule] = &[
    RouteRule {
        marker: "/publish/",
        kind: OperationKind::Publish,
    },
    RouteRule {
        marker: "/create/",
        kind: OperationKind::Create,
    },
    RouteRule {
        marker: "/update/",
        kind: OperationKind::Update,
    },
];

/// Removes the gateway mount prefix from `path`.
///
/// Returns `path` unchanged when it does not start with `prefix`.
pub fn strip_mount_prefix<'a>(prefix: &str, path: &'a str) -> &'a str {
    path.strip_prefix(prefix).unwrap_or(path)
}

/// Decoded query string parameters.
///
/// Repeated keys keep every value; lookups return the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Decodes an `application/x-www-form-urlencoded` query string.
    ///
    /// Input that cannot be decoded yields an empty parameter set.
    pub fn parse(query: Option<&str>) -> Self {
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            return Self::default();
        };

        match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            Ok(pairs) => Self { pairs },
            Err(e) => {
                tracing::debug!(error = %e, "undecodable query string, treating as empty");
                Self::default()
            }
        }
    }

    /// Returns the first value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of decoded pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if no parameters were decoded.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<(String, String)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

fn publish_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/publish/([^_]+)").expect("valid regex"))
}

/// Extracts the publish identifier: the run of non-underscore characters
/// following the first `/publish/` in `path`.
pub fn extract_publish_id(path: &str) -> Option<String> {
    publish_pattern()
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extracts the category identifier from the `framework` query parameter.
///
/// A value such as `k12_v2` yields its slug prefix `k12`. When the prefix is
/// numeric or empty, or there is no underscore, the whole value is the
/// identifier.
pub fn extract_framework_id(query: &QueryParams) -> Option<String> {
    let raw = query.get(FRAMEWORK_PARAM).filter(|v| !v.is_empty())?;

    match raw.split_once('_') {
        Some((prefix, _)) if !prefix.is_empty() && !crate::is_numeric(prefix) => {
            Some(prefix.to_string())
        }
        _ => Some(raw.to_string()),
    }
}

/// Classifies a mount-stripped path and its decoded query.
pub fn classify(path: &str, query: &QueryParams) -> ClassifiedOperation {
    let kind = ROUTE_RULES
        .iter()
        .find(|rule| path.contains(rule.marker))
        .map_or(OperationKind::Generic, |rule| rule.kind);

    match kind {
        OperationKind::Publish => ClassifiedOperation::Publish(extract_publish_id(path)),
        OperationKind::Create => ClassifiedOperation::Create(extract_framework_id(query)),
        OperationKind::Update => ClassifiedOperation::Update(extract_framework_id(query)),
        OperationKind::Generic => ClassifiedOperation::Generic,
    }
}

/// Classifies a raw `path?query` string.
pub fn classify_path_and_query(path_and_query: &str) -> ClassifiedOperation {
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };
    classify(path, &QueryParams::parse(query))
}
