//! nonnative - non-native species missing from a state.
//!
//! Queries the species occurrence API for the region surrounding a state and
//! for the state itself, and reports the species documented in the former but
//! not the latter as an HTML list.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod reconcile;
pub mod reference;
pub mod render;

pub use config::{load_settings, Config, Settings};
pub use error::{ReportError, Result};
pub use fetcher::{HttpFetcher, OccurrenceSource};
pub use models::{FacetPayload, SpeciesRecord};
pub use pipeline::{Pipeline, Report, RunHandle, RunPolicy, Trigger};
pub use query::{FormInput, OccurrenceQuery, QueryScope, QueryTemplate};
pub use reconcile::{MarkedRecord, Reconciliation, RegionCapture};
pub use reference::ReferenceTable;
pub use render::{render, OutputSink, RenderOptions, RenderedList};
