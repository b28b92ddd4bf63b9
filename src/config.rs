//! Configuration management for nonnative.
//!
//! Effective [`Settings`] are built from defaults, then an optional config
//! file (explicit path, or discovered with the prefer crate), then environment
//! variables. CLI flags are applied last by the binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fetcher::HttpFetcher;
use crate::models::DEFAULT_FACET_FIELD;
use crate::pipeline::Pipeline;
use crate::query::{
    QueryTemplate, DEFAULT_API_URL, DEFAULT_ESTABLISHMENT_MEANS, DEFAULT_REGION_CALLBACK,
    DEFAULT_STATE_CALLBACK,
};
use crate::reference::ReferenceTable;
use crate::render::{RenderOptions, DEFAULT_ELEMENT_ID, DEFAULT_LOOKUP_URL, DEFAULT_PORTAL_URL};

/// Name used for config file discovery.
pub const CONFIG_NAME: &str = "nonnative";

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Occurrence API endpoint.
    pub api_url: String,
    /// `establishmentMeans` filter value.
    pub establishment_means: String,
    /// Facet field holding scientific names.
    pub facet_field: String,
    /// JSONP callback for the region query.
    pub region_callback: String,
    /// JSONP callback for the state query.
    pub state_callback: String,
    /// Per-species lookup page.
    pub lookup_url: String,
    /// Portal linked from the summary sentence.
    pub portal_url: String,
    /// Id of the element receiving the rendered list.
    pub element_id: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Custom user agent; the crate default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Reference table file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_table: Option<PathBuf>,
    /// HTML-escape names in rendered output.
    pub escape_names: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            establishment_means: DEFAULT_ESTABLISHMENT_MEANS.to_string(),
            facet_field: DEFAULT_FACET_FIELD.to_string(),
            region_callback: DEFAULT_REGION_CALLBACK.to_string(),
            state_callback: DEFAULT_STATE_CALLBACK.to_string(),
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            element_id: DEFAULT_ELEMENT_ID.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: None,
            reference_table: None,
            escape_names: false,
        }
    }
}

impl Settings {
    /// Apply `NONNATIVE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `NONNATIVE_*` overrides read through `lookup`. Empty values are
    /// ignored, as are timeouts that are not a positive number of seconds.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let value = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        if let Some(url) = value("NONNATIVE_API_URL") {
            tracing::debug!("Using NONNATIVE_API_URL from environment: {}", url);
            self.api_url = url;
        }
        if let Some(timeout) = value("NONNATIVE_TIMEOUT") {
            match timeout.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout = secs,
                _ => tracing::warn!("Ignoring invalid NONNATIVE_TIMEOUT: {}", timeout),
            }
        }
        if let Some(ua) = value("NONNATIVE_USER_AGENT") {
            self.user_agent = Some(ua);
        }
    }

    /// Request timeout; a zero setting falls back to the default.
    pub fn timeout(&self) -> Duration {
        match self.request_timeout {
            0 => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT),
            secs => Duration::from_secs(secs),
        }
    }

    /// Build the query template for these settings.
    pub fn query_template(&self) -> Result<QueryTemplate> {
        Ok(QueryTemplate::new(&self.api_url)?
            .with_establishment_means(&self.establishment_means)
            .with_facet_field(&self.facet_field)
            .with_callbacks(&self.region_callback, &self.state_callback))
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            lookup_url: self.lookup_url.clone(),
            portal_url: self.portal_url.clone(),
            escape: self.escape_names,
        }
    }

    pub fn fetcher(&self) -> Result<HttpFetcher> {
        HttpFetcher::with_user_agent(self.timeout(), self.user_agent.as_deref())
    }

    /// Load the configured reference table, or an empty one.
    pub async fn load_reference(&self) -> Result<ReferenceTable> {
        match &self.reference_table {
            Some(path) => ReferenceTable::load(path).await,
            None => Ok(ReferenceTable::new()),
        }
    }

    /// Assemble an HTTP-backed pipeline.
    pub async fn build_pipeline(&self) -> Result<Pipeline> {
        Ok(
            Pipeline::new(Arc::new(self.fetcher()?), self.query_template()?)
                .with_reference(self.load_reference().await?)
                .with_render_options(self.render_options()),
        )
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub establishment_means: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_callback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_callback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Reference table path, relative to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escape_names: Option<bool>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults when no config file is found.
    pub async fn load() -> Self {
        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config {}: {}", path.display(), e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> std::result::Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config contents in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> std::result::Result<Self, String> {
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        let set = |target: &mut String, value: &Option<String>| {
            if let Some(v) = value {
                *target = v.clone();
            }
        };
        set(&mut settings.api_url, &self.api_url);
        set(&mut settings.establishment_means, &self.establishment_means);
        set(&mut settings.facet_field, &self.facet_field);
        set(&mut settings.region_callback, &self.region_callback);
        set(&mut settings.state_callback, &self.state_callback);
        set(&mut settings.lookup_url, &self.lookup_url);
        set(&mut settings.portal_url, &self.portal_url);
        set(&mut settings.element_id, &self.element_id);

        match self.request_timeout {
            Some(0) => tracing::warn!("Ignoring request_timeout = 0 in config"),
            Some(timeout) => settings.request_timeout = timeout,
            None => {}
        }
        if let Some(ref ua) = self.user_agent {
            settings.user_agent = Some(ua.clone());
        }
        if let Some(ref table) = self.reference_table {
            settings.reference_table = Some(self.resolve_path(table, base_dir));
        }
        if let Some(escape) = self.escape_names {
            settings.escape_names = escape;
        }
    }
}

/// Load settings from an explicit config file, or discover one.
/// Returns (Settings, Config) tuple.
pub async fn load_settings(config_path: Option<&Path>) -> anyhow::Result<(Settings, Config)> {
    let config = match config_path {
        Some(path) => Config::load_from_path(path)
            .await
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?,
        None => Config::load().await,
    };

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env_overrides();

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_public_api() {
        let settings = Settings::default();
        assert_eq!(settings.api_url, "https://data.usgs.gov/solr/occurrences/select/");
        assert_eq!(settings.establishment_means, "L48");
        assert_eq!(settings.element_id, "listHTML3");
        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert!(!settings.escape_names);
    }

    #[test]
    fn test_parse_toml_config() {
        let config = Config::parse(
            "api_url = \"http://localhost:8983/solr/select/\"\nrequest_timeout = 5\nescape_names = true\n",
            "toml",
        )
        .unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/tmp"));

        assert_eq!(settings.api_url, "http://localhost:8983/solr/select/");
        assert_eq!(settings.request_timeout, 5);
        assert!(settings.escape_names);
        assert_eq!(settings.facet_field, "ITISscientificName");
    }

    #[test]
    fn test_parse_rejects_bad_config() {
        assert!(Config::parse("request_timeout: soon", "yaml").is_err());
        assert!(Config::parse("{", "json").is_err());
    }

    #[test]
    fn test_reference_table_relative_to_config() {
        let config = Config {
            reference_table: Some("species.json".to_string()),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/etc/nonnative"));
        assert_eq!(
            settings.reference_table,
            Some(PathBuf::from("/etc/nonnative/species.json"))
        );
    }

    #[tokio::test]
    async fn test_load_settings_from_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonnative.yaml");
        std::fs::write(
            &path,
            "establishment_means: AK\nreference_table: ref.json\nelement_id: out\n",
        )
        .unwrap();

        let (settings, config) = load_settings(Some(&path)).await.unwrap();
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
        assert_eq!(settings.establishment_means, "AK");
        assert_eq!(settings.element_id, "out");
        assert_eq!(settings.reference_table, Some(dir.path().join("ref.json")));
    }

    #[tokio::test]
    async fn test_load_settings_missing_explicit_path() {
        let dir = tempdir().unwrap();
        assert!(load_settings(Some(&dir.path().join("missing.toml")))
            .await
            .is_err());
    }

    #[test]
    fn test_query_template_from_settings() {
        let settings = Settings {
            api_url: "http://127.0.0.1:1/select/".to_string(),
            establishment_means: "HI".to_string(),
            ..Default::default()
        };
        let template = settings.query_template().unwrap();
        let query = template.region_query(&crate::query::FormInput::new("15001", "g"));
        assert!(query.url.starts_with("http://127.0.0.1:1/select/?"));
        assert!(query.url.contains("establishmentMeans%3AHI"));
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_overrides_replace_settings() {
        let mut settings = Settings::default();
        settings.apply_overrides(lookup(&[
            ("NONNATIVE_API_URL", "http://localhost:8983/solr/select/"),
            ("NONNATIVE_TIMEOUT", "12"),
            ("NONNATIVE_USER_AGENT", "survey-bot/2.0"),
        ]));
        assert_eq!(settings.api_url, "http://localhost:8983/solr/select/");
        assert_eq!(settings.request_timeout, 12);
        assert_eq!(settings.user_agent.as_deref(), Some("survey-bot/2.0"));
    }

    #[test]
    fn test_empty_overrides_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_overrides(lookup(&[
            ("NONNATIVE_API_URL", ""),
            ("NONNATIVE_TIMEOUT", "  "),
            ("NONNATIVE_USER_AGENT", ""),
        ]));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_timeout_override_is_ignored() {
        for bad in ["soon", "-5", "0"] {
            let mut settings = Settings::default();
            settings.apply_overrides(lookup(&[("NONNATIVE_TIMEOUT", bad)]));
            assert_eq!(settings.request_timeout, DEFAULT_REQUEST_TIMEOUT, "{bad}");
        }
    }

    #[test]
    fn test_zero_timeout_never_reaches_the_client() {
        let config = Config::parse("request_timeout = 0\n", "toml").unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/tmp"));
        assert_eq!(settings.request_timeout, DEFAULT_REQUEST_TIMEOUT);

        settings.request_timeout = 0;
        assert_eq!(settings.timeout(), Duration::from_secs(DEFAULT_REQUEST_TIMEOUT));
    }
}
