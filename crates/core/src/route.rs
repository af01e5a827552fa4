//! Route paths and href parsing.

use serde::{Deserialize, Serialize};
use url::Url;

/// Placeholder origin used to resolve relative hrefs; only the path survives.
const RESOLVE_BASE: &str = "http://docgate.invalid/";

/// Logical page path (the pathname part of a URL, e.g. `/fields/Account`).
///
/// Policy lookups use the path exactly as given. [`RoutePath::normalized`] is
/// only used where the gate compares against configured path lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutePath(String);

impl RoutePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Extract the pathname from an href (absolute URL or relative path).
    ///
    /// Empty or unparseable input falls back to `current`.
    pub fn from_href(href: Option<&str>, current: &RoutePath) -> Self {
        let Some(href) = href.map(str::trim).filter(|h| !h.is_empty()) else {
            return current.clone();
        };

        let parsed = Url::parse(RESOLVE_BASE).and_then(|base| base.join(href));
        match parsed {
            Ok(url) => Self(url.path().to_string()),
            Err(err) => {
                tracing::debug!(href, error = %err, "unparseable href; keeping current path");
                current.clone()
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path with a single trailing slash removed (`/` stays `/`, empty becomes `/`).
    pub fn normalized(&self) -> &str {
        let p = self.0.as_str();
        if p.is_empty() {
            "/"
        } else if p.len() > 1 && p.ends_with('/') {
            &p[..p.len() - 1]
        } else {
            p
        }
    }

    /// Whether this path is one of `paths`, ignoring a trailing slash.
    pub fn matches_any<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> bool {
        let current = self.normalized();
        paths
            .into_iter()
            .any(|p| RoutePath::new(p).normalized() == current)
    }

    /// Whether `prefix` is this path or one of its ancestors.
    pub fn is_under(&self, prefix: &str) -> bool {
        let prefix = RoutePath::new(prefix);
        let prefix = prefix.normalized();
        let current = self.normalized();
        current == prefix
            || (current.starts_with(prefix)
                && (prefix.ends_with('/') || current[prefix.len()..].starts_with('/')))
    }
}

impl core::fmt::Display for RoutePath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoutePath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
