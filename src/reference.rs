//! Species reference table (name to description).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ReportError, Result};

/// Read-only mapping from scientific name to a descriptive string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceTable(HashMap<String, String>);

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from a JSON, TOML or YAML file, chosen by extension.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ReportError::ReferenceTable(format!("failed to read {}: {}", path.display(), e))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let table = Self::parse(&contents, ext)?;
        info!(
            "Loaded {} reference entries from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse table contents in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self> {
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| ReportError::ReferenceTable(format!("invalid TOML: {}", e))),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| ReportError::ReferenceTable(format!("invalid YAML: {}", e))),
            _ => serde_json::from_str(contents)
                .map_err(|e| ReportError::ReferenceTable(format!("invalid JSON: {}", e))),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.0.insert(name.into(), description.into());
    }

    /// Description for a species, if the table has one.
    pub fn describe(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for ReferenceTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
