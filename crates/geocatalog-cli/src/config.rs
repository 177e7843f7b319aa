//! CLI configuration

use std::path::{Path, PathBuf};

use geocatalog_core::{IndexConfig, DEFAULT_MAX_PAGES, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

/// Index id used when none is configured
pub const DEFAULT_INDEX_ID: &str = "geolocation";

/// Location of the config file, `$GEOCATALOG_CONFIG` if set
pub fn config_file_path() -> PathBuf {
    if let Some(path) = std::env::var_os("GEOCATALOG_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geocatalog")
        .join("config.toml")
}

/// Configuration for the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index_id: String,
    pub uri: String,
    pub uri_env_var: String,
    pub page_size: usize,
    pub timeout_secs: u64,
    pub max_pages: usize,
    pub site_root: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_id: DEFAULT_INDEX_ID.to_string(),
            uri: String::new(),
            uri_env_var: String::new(),
            page_size: 0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_pages: DEFAULT_MAX_PAGES,
            site_root: String::new(),
        }
    }
}

/// Contents of the config file, `None` when there is no file
fn read_config_file(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl Config {
    /// Load the config file, falling back to defaults
    pub fn load() -> Self {
        let path = config_file_path();
        match read_config_file(&path) {
            Ok(Some(text)) => toml::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config file {}: {}", path.display(), e);
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("Cannot read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_file_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;
        tracing::debug!("Wrote config to {}", path.display());
        Ok(())
    }

    pub fn keys() -> &'static [&'static str] {
        &[
            "index_id",
            "uri",
            "uri_env_var",
            "page_size",
            "timeout_secs",
            "max_pages",
            "site_root",
        ]
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "index_id" => self.index_id.clone(),
            "uri" => self.uri.clone(),
            "uri_env_var" => self.uri_env_var.clone(),
            "page_size" => self.page_size.to_string(),
            "timeout_secs" => self.timeout_secs.to_string(),
            "max_pages" => self.max_pages.to_string(),
            "site_root" => self.site_root.clone(),
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "index_id" => self.index_id = value.to_string(),
            "uri" => self.uri = value.to_string(),
            "uri_env_var" => self.uri_env_var = value.to_string(),
            "page_size" => self.page_size = value.parse()?,
            "timeout_secs" => self.timeout_secs = value.parse()?,
            "max_pages" => self.max_pages = value.parse()?,
            "site_root" => self.site_root = value.to_string(),
            _ => anyhow::bail!(
                "Unknown config key: {} (available: {})",
                key,
                Self::keys().join(", ")
            ),
        }
        Ok(())
    }

    /// Index configuration with command-line overrides applied
    pub fn index_config(
        &self,
        index_id: Option<&str>,
        uri: Option<&str>,
        uri_env_var: Option<&str>,
    ) -> IndexConfig {
        let mut config = IndexConfig::new(index_id.unwrap_or(&self.index_id))
            .with_uri(uri.unwrap_or(&self.uri))
            .with_uri_env_var(uri_env_var.unwrap_or(&self.uri_env_var))
            .with_page_size(self.page_size)
            .with_site_root(self.site_root.clone());
        config.timeout_secs = self.timeout_secs;
        config.max_pages = self.max_pages;
        config
    }
}
