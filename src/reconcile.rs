//! Region minus state reconciliation.
//!
//! The region list is captured first; reconciling it against the state list
//! consumes the capture, so a diff can only exist once both lists are in hand.
//! Entries are never removed from the region list. Matches are flagged
//! `excluded` and filtered when iterating survivors.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::models::{FacetPayload, SpeciesRecord};

/// Region list waiting for its state counterpart.
#[derive(Debug, Clone, Default)]
pub struct RegionCapture {
    region: Vec<SpeciesRecord>,
}

impl RegionCapture {
    /// Phase 1: hold the region list extracted from a payload.
    pub fn capture_region(payload: &FacetPayload, facet_field: &str) -> Result<Self> {
        Ok(Self::from_records(payload.species(facet_field)?))
    }

    pub fn from_records(region: Vec<SpeciesRecord>) -> Self {
        Self { region }
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Phase 2: extract the state list and mark every matching region entry.
    pub fn reconcile(self, payload: &FacetPayload, facet_field: &str) -> Result<Reconciliation> {
        let state = payload.species(facet_field)?;
        Ok(self.reconcile_records(&state))
    }

    /// Mark region entries whose name equals any state name. All occurrences
    /// of a duplicated region name are marked.
    pub fn reconcile_records(self, state: &[SpeciesRecord]) -> Reconciliation {
        let state_names: HashSet<&str> = state.iter().map(|r| r.name.as_str()).collect();

        let entries: Vec<MarkedRecord> = self
            .region
            .into_iter()
            .map(|record| {
                let excluded = state_names.contains(record.name.as_str());
                MarkedRecord { record, excluded }
            })
            .collect();

        let reconciliation = Reconciliation {
            entries,
            state_len: state.len(),
        };
        debug!(
            "Reconciled {} region entries against {} state entries: {} survive",
            reconciliation.region_len(),
            reconciliation.state_len,
            reconciliation.survivor_count()
        );
        reconciliation
    }
}

/// A region record with its exclusion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkedRecord {
    #[serde(flatten)]
    pub record: SpeciesRecord,
    pub excluded: bool,
}

/// Region list after comparison with the state list.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    entries: Vec<MarkedRecord>,
    state_len: usize,
}

impl Reconciliation {
    /// All region entries in API order, excluded ones included.
    pub fn entries(&self) -> &[MarkedRecord] {
        &self.entries
    }

    /// Region entries not present in the state list, in API order.
    pub fn survivors(&self) -> impl Iterator<Item = &SpeciesRecord> {
        self.entries
            .iter()
            .filter(|e| !e.excluded)
            .map(|e| &e.record)
    }

    pub fn survivor_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.excluded).count()
    }

    pub fn excluded_count(&self) -> usize {
        self.entries.len() - self.survivor_count()
    }

    pub fn region_len(&self) -> usize {
        self.entries.len()
    }

    pub fn state_len(&self) -> usize {
        self.state_len
    }
}
