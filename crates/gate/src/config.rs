//! Gate configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use docgate_auth::{AccessPolicy, RouteAccessRule, default_rules, policy::DEFAULT_RESTRICTED_PREFIXES};
use docgate_core::RoutePath;
use docgate_observability::LogSettings;

pub const ENV_IDENTITY_URL: &str = "DOCGATE_IDENTITY_URL";
pub const ENV_LOGIN_PATH: &str = "DOCGATE_LOGIN_PATH";

const DEFAULT_IDENTITY_URL: &str = "https://marketplace-as-a-service.herokuapp.com";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub identity_base_url: String,
    pub login_path: String,
    pub home_path: String,
    /// Routes on which the loading overlay is shown (trailing slash ignored).
    pub loader_paths: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub session_max_age: Duration,
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub loader_min_display: Duration,
    pub restricted_prefixes: Vec<String>,
    pub routes: Vec<RouteAccessRule>,
    pub logging: LogSettings,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            identity_base_url: DEFAULT_IDENTITY_URL.to_string(),
            login_path: "/login".to_string(),
            home_path: "/".to_string(),
            loader_paths: vec!["/".to_string(), "/api-reference".to_string()],
            session_max_age: Duration::from_secs(60 * 60),
            fetch_timeout: Duration::from_secs(10),
            loader_min_display: Duration::from_millis(500),
            restricted_prefixes: DEFAULT_RESTRICTED_PREFIXES.iter().map(|p| p.to_string()).collect(),
            routes: default_rules(),
            logging: LogSettings::default(),
        }
    }
}

impl GateConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// File (if given) then process environment, validated.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `DOCGATE_*` overrides from `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_IDENTITY_URL).filter(|v| !v.trim().is_empty()) {
            self.identity_base_url = url.trim().to_string();
        }
        if let Some(path) = lookup(ENV_LOGIN_PATH).filter(|v| !v.trim().is_empty()) {
            self.login_path = path.trim().to_string();
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.identity_base_url.trim().is_empty() {
            anyhow::bail!("identity_base_url must not be empty");
        }
        for (name, path) in [("login_path", &self.login_path), ("home_path", &self.home_path)] {
            if !path.starts_with('/') {
                anyhow::bail!("{name} must be an absolute path, got {path:?}");
            }
        }
        if self.restricted_prefixes.iter().any(|p| p.is_empty()) {
            anyhow::bail!("restricted_prefixes must not contain empty markers");
        }
        Ok(())
    }

    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.routes.iter().cloned(), self.restricted_prefixes.iter().cloned())
    }

    pub fn login_route(&self) -> RoutePath {
        RoutePath::new(self.login_path.clone())
    }

    pub fn home_route(&self) -> RoutePath {
        RoutePath::new(self.home_path.clone())
    }

    pub fn is_login_route(&self, route: &RoutePath) -> bool {
        route.matches_any([self.login_path.as_str()])
    }

    pub fn shows_loader_for(&self, route: &RoutePath) -> bool {
        route.matches_any(self.loader_paths.iter().map(String::as_str))
    }
}
