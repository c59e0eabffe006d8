//! Importer configuration types
//!
//! Loaded from TOML; every field has a default so partial files are accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::visualization::MAX_ZOOM;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::Io(e) => format!(
                "Could not read the importer configuration: {}\n\n\
                Hint: Check that the file exists and is readable.",
                e
            ),
            ConfigError::Parse(e) => format!(
                "The importer configuration is not valid TOML: {}\n\n\
                Hint: Compare it against the documented defaults.",
                e
            ),
            ConfigError::Invalid(msg) => format!("Invalid importer configuration: {}", msg),
        }
    }
}

/// Main importer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImporterConfig {
    /// Schema extraction writes staged tables into
    pub origin_schema: String,
    /// Default schema registered tables end up in
    pub destination_schema: String,
    /// Maximum number of tables per tenant (None = unlimited)
    pub table_quota: Option<u64>,
    pub overviews: OverviewConfig,
    pub basemap: BasemapConfig,
    pub common_data: CommonDataConfig,
    /// Timeout for remote metadata requests, in seconds
    pub http_timeout_secs: u64,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            origin_schema: "cdb_importer".to_string(),
            destination_schema: "public".to_string(),
            table_quota: None,
            overviews: OverviewConfig::default(),
            basemap: BasemapConfig::default(),
            common_data: CommonDataConfig::default(),
            http_timeout_secs: 30,
        }
    }
}

impl ImporterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ImporterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn with_origin_schema(mut self, schema: impl Into<String>) -> Self {
        self.origin_schema = schema.into();
        self
    }

    pub fn with_destination_schema(mut self, schema: impl Into<String>) -> Self {
        self.destination_schema = schema.into();
        self
    }

    /// Set the per-tenant table quota
    pub fn with_table_quota(mut self, quota: Option<u64>) -> Self {
        self.table_quota = quota;
        self
    }

    pub fn with_overviews(mut self, overviews: OverviewConfig) -> Self {
        self.overviews = overviews;
        self
    }

    pub fn with_basemap(mut self, basemap: BasemapConfig) -> Self {
        self.basemap = basemap;
        self
    }

    pub fn with_common_data(mut self, common_data: CommonDataConfig) -> Self {
        self.common_data = common_data;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origin_schema.trim().is_empty() {
            return Err(ConfigError::Invalid("origin_schema must not be empty".into()));
        }
        if self.destination_schema.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "destination_schema must not be empty".into(),
            ));
        }
        if self.overviews.zoom_levels.iter().any(|z| *z > MAX_ZOOM) {
            return Err(ConfigError::Invalid(format!(
                "overview zoom levels must be at most {}",
                MAX_ZOOM
            )));
        }
        if self.basemap.url_template.trim().is_empty() {
            return Err(ConfigError::Invalid("basemap url_template must not be empty".into()));
        }
        Ok(())
    }
}

/// Overview generation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverviewConfig {
    pub enabled: bool,
    /// Tables with fewer rows get no overviews
    pub min_rows: u64,
    /// Zoom levels to build, one overview table each
    pub zoom_levels: Vec<u8>,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_rows: 2_000_000,
            zoom_levels: (0..=14).collect(),
        }
    }
}

impl OverviewConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_min_rows(mut self, min_rows: u64) -> Self {
        self.min_rows = min_rows;
        self
    }

    pub fn with_zoom_levels(mut self, zoom_levels: Vec<u8>) -> Self {
        self.zoom_levels = zoom_levels;
        self
    }
}

/// Default base layer for assembled visualizations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BasemapConfig {
    pub name: String,
    pub url_template: String,
    /// Labels tiles drawn above the data layers
    pub labels_url_template: Option<String>,
    pub attribution: String,
}

impl Default for BasemapConfig {
    fn default() -> Self {
        Self {
            name: "Positron".to_string(),
            url_template:
                "https://{s}.basemaps.cartocdn.com/light_nolabels/{z}/{x}/{y}.png".to_string(),
            labels_url_template: Some(
                "https://{s}.basemaps.cartocdn.com/light_only_labels/{z}/{x}/{y}.png"
                    .to_string(),
            ),
            attribution: "&copy; OpenStreetMap contributors &copy; CARTO".to_string(),
        }
    }
}

/// Common-data catalog shared datasets are copied from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommonDataConfig {
    /// Account owning the shared datasets
    pub username: String,
    /// Explicit API base URL; derived from `protocol` and `username` when absent
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub protocol: String,
}

impl Default for CommonDataConfig {
    fn default() -> Self {
        Self {
            username: "common-data".to_string(),
            base_url: None,
            api_key: None,
            protocol: "https".to_string(),
        }
    }
}

impl CommonDataConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Base URL of the common-data API, without trailing slash
    pub fn resolved_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}://{}.cartodb.com", self.protocol, self.username),
        }
    }

    /// API key, if a non-empty one is configured
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImporterConfig::default();
        assert_eq!(config.origin_schema, "cdb_importer");
        assert_eq!(config.destination_schema, "public");
        assert!(config.table_quota.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = ImporterConfig::from_toml_str(
            r#"
            table_quota = 5

            [overviews]
            min_rows = 10
            zoom_levels = [0, 1, 2]

            [common_data]
            username = "shared"
            api_key = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.table_quota, Some(5));
        assert_eq!(config.overviews.zoom_levels, vec![0, 1, 2]);
        assert!(config.overviews.enabled);
        assert_eq!(config.origin_schema, "cdb_importer");
        assert_eq!(
            config.common_data.resolved_base_url(),
            "https://shared.cartodb.com"
        );
        assert_eq!(config.common_data.api_key(), Some("secret"));
    }

    #[test]
    fn test_invalid_zoom_rejected() {
        let err = ImporterConfig::from_toml_str("[overviews]\nzoom_levels = [25]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("importer.toml");
        std::fs::write(&path, "destination_schema = \"tenant_1\"\n").unwrap();
        let config = ImporterConfig::load(&path).unwrap();
        assert_eq!(config.destination_schema, "tenant_1");

        assert!(matches!(
            ImporterConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_base_url_override() {
        let common = CommonDataConfig::default()
            .with_base_url("http://localhost:8080/")
            .with_api_key("  ");
        assert_eq!(common.resolved_base_url(), "http://localhost:8080");
        assert_eq!(common.api_key(), None);
    }
}
