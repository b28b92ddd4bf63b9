//! Occurrence API payloads and species records.

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Default Solr facet field holding scientific names.
pub const DEFAULT_FACET_FIELD: &str = "ITISscientificName";

/// One facet row from the occurrence API.
///
/// Rows arrive as `[name]` or, with `json.nl=arrarr`, as `[name, count]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesRecord {
    /// Scientific name.
    pub name: String,
    /// Occurrence count when the API reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<u64>,
}

impl SpeciesRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            occurrences: None,
        }
    }

    fn from_row(index: usize, row: &serde_json::Value) -> Result<Self> {
        let cells = row.as_array().ok_or_else(|| {
            ReportError::MalformedResponse(format!("facet row {} is not an array", index))
        })?;
        let name = cells.first().and_then(|v| v.as_str()).ok_or_else(|| {
            ReportError::MalformedResponse(format!("facet row {} has no name", index))
        })?;
        Ok(Self {
            name: name.to_string(),
            occurrences: cells.get(1).and_then(|v| v.as_u64()),
        })
    }
}

/// Parsed JSON body of an occurrence query.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetPayload(serde_json::Value);

impl FacetPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Parse a bare JSON body.
    pub fn parse(body: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(body)?))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Extract the ordered species list under `facet_counts.facet_fields.<field>`.
    pub fn species(&self, facet_field: &str) -> Result<Vec<SpeciesRecord>> {
        let rows = extract_path(&self.0, &["facet_counts", "facet_fields", facet_field]);
        let rows = rows.as_array().ok_or_else(|| {
            ReportError::MalformedResponse(format!(
                "no facet_counts.facet_fields.{} array in payload",
                facet_field
            ))
        })?;

        rows.iter()
            .enumerate()
            .map(|(i, row)| SpeciesRecord::from_row(i, row))
            .collect()
    }
}

/// Walk nested JSON objects, yielding `Null` when any segment is missing.
fn extract_path<'a>(data: &'a serde_json::Value, path: &[&str]) -> &'a serde_json::Value {
    let mut current = data;
    for key in path {
        current = match current {
            serde_json::Value::Object(map) => map.get(*key).unwrap_or(&serde_json::Value::Null),
            _ => &serde_json::Value::Null,
        };
    }
    current
}
