//! Query construction for the occurrence API.
//!
//! An input code such as `06037` splits into a state code (`06`, the first two
//! characters) and a region code (`037`, everything after). Each is combined
//! with the group identifier into a Solr facet query.

use serde::Serialize;
use url::Url;

use crate::error::{ReportError, Result};
use crate::models::DEFAULT_FACET_FIELD;

/// Default occurrence API endpoint.
pub const DEFAULT_API_URL: &str = "https://data.usgs.gov/solr/occurrences/select/";

/// Default `establishmentMeans` filter.
pub const DEFAULT_ESTABLISHMENT_MEANS: &str = "L48";

/// JSONP callback names for each phase.
pub const DEFAULT_REGION_CALLBACK: &str = "buffer";
pub const DEFAULT_STATE_CALLBACK: &str = "BNList";

/// User-supplied input, as read from the trigger form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInput {
    pub code: String,
    pub group: String,
}

impl FormInput {
    pub fn new(code: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            group: group.into(),
        }
    }

    /// Reject blank fields. Code length is deliberately not checked.
    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(ReportError::EmptyInput { field: "code" });
        }
        if self.group.trim().is_empty() {
            return Err(ReportError::EmptyInput { field: "group" });
        }
        Ok(())
    }

    /// Characters from index 2 onward.
    pub fn region_code(&self) -> String {
        self.code.chars().skip(2).collect()
    }

    /// The first two characters.
    pub fn state_code(&self) -> String {
        self.code.chars().take(2).collect()
    }
}

/// Which half of the comparison a query fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryScope {
    Region,
    State,
}

/// A fully built occurrence query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccurrenceQuery {
    pub scope: QueryScope,
    /// Value placed into `computedStateFips`, group included.
    pub fips: String,
    pub callback: String,
    pub url: String,
}

/// Fixed URL template the two queries are built from.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    endpoint: Url,
    establishment_means: String,
    facet_field: String,
    region_callback: String,
    state_callback: String,
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            establishment_means: DEFAULT_ESTABLISHMENT_MEANS.to_string(),
            facet_field: DEFAULT_FACET_FIELD.to_string(),
            region_callback: DEFAULT_REGION_CALLBACK.to_string(),
            state_callback: DEFAULT_STATE_CALLBACK.to_string(),
        }
    }
}

impl QueryTemplate {
    /// Create a template for a custom endpoint.
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            ..Default::default()
        })
    }

    pub fn with_establishment_means(mut self, means: impl Into<String>) -> Self {
        self.establishment_means = means.into();
        self
    }

    pub fn with_facet_field(mut self, field: impl Into<String>) -> Self {
        self.facet_field = field.into();
        self
    }

    pub fn with_callbacks(mut self, region: impl Into<String>, state: impl Into<String>) -> Self {
        self.region_callback = region.into();
        self.state_callback = state.into();
        self
    }

    pub fn facet_field(&self) -> &str {
        &self.facet_field
    }

    /// Build the region query (code suffix).
    pub fn region_query(&self, input: &FormInput) -> OccurrenceQuery {
        self.build(
            QueryScope::Region,
            format!("{}{}", input.region_code(), input.group),
            &self.region_callback,
        )
    }

    /// Build the state query (code prefix).
    pub fn state_query(&self, input: &FormInput) -> OccurrenceQuery {
        self.build(
            QueryScope::State,
            format!("{}{}", input.state_code(), input.group),
            &self.state_callback,
        )
    }

    fn build(&self, scope: QueryScope, fips: String, callback: &str) -> OccurrenceQuery {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(
                "q",
                &format!(
                    "establishmentMeans:{} AND computedStateFips:{}",
                    self.establishment_means, fips
                ),
            )
            .append_pair("facet", "true")
            .append_pair("facet.field", &self.facet_field)
            .append_pair("rows", "0")
            .append_pair("facet.limit", "-1")
            .append_pair("facet.mincount", "1")
            .append_pair("wt", "json")
            .append_pair("json.nl", "arrarr")
            .append_pair("json.wrf", callback);

        OccurrenceQuery {
            scope,
            fips,
            callback: callback.to_string(),
            url: url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn params(query: &OccurrenceQuery) -> HashMap<String, String> {
        Url::parse(&query.url)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect()
    }

    #[test]
    fn test_code_split() {
        let input = FormInput::new("06037", "X");
        assert_eq!(input.region_code(), "037");
        assert_eq!(input.state_code(), "06");
    }

    #[test]
    fn test_short_code_is_not_corrected() {
        let input = FormInput::new("6", "X");
        assert_eq!(input.region_code(), "");
        assert_eq!(input.state_code(), "6");
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_multibyte_code_does_not_panic() {
        let input = FormInput::new("é0ü12", "X");
        assert_eq!(input.state_code(), "é0");
        assert_eq!(input.region_code(), "ü12");
    }

    #[test]
    fn test_blank_fields_rejected() {
        let err = FormInput::new("  ", "X").validate().unwrap_err();
        assert!(matches!(err, ReportError::EmptyInput { field: "code" }));
        let err = FormInput::new("06037", "").validate().unwrap_err();
        assert!(matches!(err, ReportError::EmptyInput { field: "group" }));
    }

    #[test]
    fn test_region_query_url() {
        let template = QueryTemplate::default();
        let query = template.region_query(&FormInput::new("06037", "X"));
        assert_eq!(query.scope, QueryScope::Region);
        assert_eq!(query.fips, "037X");

        let p = params(&query);
        assert_eq!(p["q"], "establishmentMeans:L48 AND computedStateFips:037X");
        assert_eq!(p["facet.field"], "ITISscientificName");
        assert_eq!(p["rows"], "0");
        assert_eq!(p["facet.limit"], "-1");
        assert_eq!(p["json.nl"], "arrarr");
        assert_eq!(p["json.wrf"], "buffer");
        assert!(query.url.starts_with(DEFAULT_API_URL));
    }

    #[test]
    fn test_state_query_url() {
        let template = QueryTemplate::default();
        let query = template.state_query(&FormInput::new("06037", "X"));
        assert_eq!(query.fips, "06X");
        let p = params(&query);
        assert_eq!(p["q"], "establishmentMeans:L48 AND computedStateFips:06X");
        assert_eq!(p["json.wrf"], "BNList");
    }

    #[test]
    fn test_custom_template() {
        let template = QueryTemplate::new("http://127.0.0.1:9/select/")
            .unwrap()
            .with_establishment_means("AK")
            .with_facet_field("scientificName")
            .with_callbacks("cbRegion", "cbState");
        let query = template.state_query(&FormInput::new("02100", "g"));
        let p = params(&query);
        assert_eq!(p["q"], "establishmentMeans:AK AND computedStateFips:02g");
        assert_eq!(p["facet.field"], "scientificName");
        assert_eq!(p["json.wrf"], "cbState");
        assert!(query.url.starts_with("http://127.0.0.1:9/select/?"));
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            QueryTemplate::new("not a url"),
            Err(ReportError::InvalidEndpoint(_))
        ));
    }
}
