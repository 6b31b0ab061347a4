//! Remote transport configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, a TOML file
//! (`--config`, or `config.toml` in the platform config directory), then the
//! environment. Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::pagination::DEFAULT_PER_PAGE;

/// Public GitHub REST root.
pub const DEFAULT_API_URL: &str = "https://api.github.com/";

/// Public GitHub GraphQL endpoint.
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Environment variables consulted for a token, first match wins.
pub const TOKEN_ENV_VARS: [&str; 2] = ["GH_TOKEN", "GITHUB_TOKEN"];

/// Environment override for the REST root.
pub const API_URL_ENV: &str = "GHFS_API_URL";

/// Environment override for the GraphQL endpoint.
pub const GRAPHQL_URL_ENV: &str = "GHFS_GRAPHQL_URL";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid URL in {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// How the HTTP transport talks to the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// REST API root. Must end with `/` for relative paths to resolve under it.
    pub api_url: Url,
    /// GraphQL endpoint.
    pub graphql_url: Url,
    /// Bearer token. Falls back to the `gh` CLI when unset.
    pub token: Option<String>,
    /// Page size for paginated collections. Values above 100 are clamped.
    pub per_page: u32,
    /// How long a successful response is reused. Zero disables the cache.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Maximum number of cached responses.
    pub cache_capacity: u64,
    /// `User-Agent` header.
    pub user_agent: String,
    /// Per-request timeout enforced by the HTTP client.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            graphql_url: Url::parse(DEFAULT_GRAPHQL_URL).expect("default GraphQL URL is valid"),
            token: None,
            per_page: DEFAULT_PER_PAGE,
            cache_ttl: Duration::from_secs(60),
            cache_capacity: 10_000,
            user_agent: format!("ghfs/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RemoteConfig {
    /// Default location of the config file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "ghfs", "ghfs")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads the file at `path` (or the default location) and applies
    /// environment overrides.
    ///
    /// An explicit `path` must exist; a missing default file just means
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parses one TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Applies overrides from an environment lookup.
    pub fn apply_env(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = TOKEN_ENV_VARS.iter().find_map(|name| non_empty(name)) {
            self.token = Some(token);
        }
        if let Some(url) = non_empty(API_URL_ENV) {
            self.api_url = parse_url(API_URL_ENV, &url)?;
        }
        if let Some(url) = non_empty(GRAPHQL_URL_ENV) {
            self.graphql_url = parse_url(GRAPHQL_URL_ENV, &url)?;
        }
        Ok(())
    }

    /// Sets the REST root, adding the trailing slash relative resolution
    /// needs.
    pub fn set_api_url(&mut self, url: &str) -> Result<(), ConfigError> {
        self.api_url = parse_url("--api-url", url)?;
        Ok(())
    }

    /// Sets the GraphQL endpoint.
    pub fn set_graphql_url(&mut self, url: &str) -> Result<(), ConfigError> {
        self.graphql_url = parse_url("--graphql-url", url)?;
        Ok(())
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { name, source })
}
