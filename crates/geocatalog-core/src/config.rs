//! Index configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default per-request timeout, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 1000;

/// Default cap on pages fetched for a single query
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Configuration of a spatial index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index id, also the attribute name read from indexed content
    pub id: String,

    /// Service URI, for example `http://localhost:8889`.
    /// Leave empty when `uri_env_var` is used.
    #[serde(default)]
    pub uri_static: String,

    /// Name of an environment variable holding the service URI.
    /// Ignored when `uri_static` is non-empty.
    #[serde(default)]
    pub uri_env_var: String,

    /// Items per response page; 0 lets the service decide
    #[serde(default)]
    pub response_page_size: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Physical path of the site root, stripped from indexed paths
    #[serde(default)]
    pub site_root: String,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

impl IndexConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri_static: String::new(),
            uri_env_var: String::new(),
            response_page_size: 0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_pages: DEFAULT_MAX_PAGES,
            site_root: String::new(),
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri_static = uri.into();
        self
    }

    pub fn with_uri_env_var(mut self, name: impl Into<String>) -> Self {
        self.uri_env_var = name.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.response_page_size = page_size;
        self
    }

    pub fn with_site_root(mut self, site_root: impl Into<String>) -> Self {
        self.site_root = site_root.into();
        self
    }

    /// The URI requests go to: the static value if set, else the environment variable
    pub fn effective_uri(&self) -> Result<String> {
        if !self.uri_static.is_empty() {
            return Ok(self.uri_static.clone());
        }
        if !self.uri_env_var.is_empty() {
            let uri = std::env::var(&self.uri_env_var)
                .map_err(|_| Error::MissingEnvVar(self.uri_env_var.clone()))?;
            tracing::debug!("Spatial service URI for {} taken from ${}", self.id, self.uri_env_var);
            return Ok(uri);
        }
        Err(Error::NoUri)
    }
}

/// Index settings as exchanged by configuration import and export.
///
/// Absent fields leave the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_static: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_env_var: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_page_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_root: Option<String>,
}

impl ConfigUpdate {
    /// Apply onto `config`. With `purge`, every setting not in the update
    /// goes back to its default first.
    pub fn apply(&self, config: &mut IndexConfig, purge: bool) {
        if purge {
            *config = IndexConfig::new(config.id.clone());
        }
        if let Some(uri) = &self.uri_static {
            config.uri_static = uri.clone();
        }
        if let Some(name) = &self.uri_env_var {
            config.uri_env_var = name.clone();
        }
        if let Some(page_size) = self.response_page_size {
            config.response_page_size = page_size;
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(max_pages) = self.max_pages {
            config.max_pages = max_pages;
        }
        if let Some(root) = &self.site_root {
            config.site_root = root.clone();
        }
    }
}

impl From<&IndexConfig> for ConfigUpdate {
    fn from(config: &IndexConfig) -> Self {
        Self {
            uri_static: Some(config.uri_static.clone()),
            uri_env_var: Some(config.uri_env_var.clone()),
            response_page_size: Some(config.response_page_size),
            timeout_secs: Some(config.timeout_secs),
            max_pages: Some(config.max_pages),
            site_root: Some(config.site_root.clone()),
        }
    }
}

/// Configuration of a location (container) query index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationIndexConfig {
    pub id: String,

    /// Id of the spatial index to re-query, for example `geolocation`
    #[serde(default)]
    pub geoindex_id: String,
}

impl LocationIndexConfig {
    pub fn new(id: impl Into<String>, geoindex_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            geoindex_id: geoindex_id.into(),
        }
    }
}
