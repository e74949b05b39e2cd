//! Cross-host consistency detection.
//!
//! For every sample index and tracked field, hosts that sampled the field
//! are compared by exact text. More than one distinct text is a
//! disagreement; `Overflow` against a finite value counts.

use crate::error::IntegrityError;
use crate::models::{
    DisagreementRecord, HostCatalog, HostId, SampleRecord, TrackedField, UnifiedDataset,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Detection switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorOptions {
    /// Compare elapsed-time fields as well as values.
    pub include_elapsed: bool,
}

/// One point of a field's inconsistency series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesPoint {
    pub i: u64,
    pub disagrees: bool,
    /// Hosts that sampled the field at this index.
    #[allow(dead_code)] // The Markdown summary only uses the index range
    pub hosts: Vec<HostId>,
}

/// Find every (index, field) where hosts disagree.
///
/// Output is ordered by ascending index, then by the function set's field
/// order. Hosts that did not sample a field are left out of its comparison.
pub fn detect(
    dataset: &UnifiedDataset,
    catalog: &HostCatalog,
    options: DetectorOptions,
) -> Result<Vec<DisagreementRecord>, IntegrityError> {
    dataset.verify_hosts(catalog)?;

    let fields = dataset.function_set().fields(options.include_elapsed);
    let mut records = Vec::new();

    for (i, hosts) in dataset.iter() {
        if hosts.len() < 2 {
            continue;
        }

        for field in &fields {
            let values = sampled_values(hosts, field);
            if !disagrees(&values) {
                continue;
            }

            let system_info = values
                .keys()
                .filter_map(|id| catalog.get(id).map(|meta| (id.clone(), meta.clone())))
                .collect();

            records.push(DisagreementRecord {
                i,
                function: field.to_string(),
                values,
                system_info,
            });
        }
    }

    debug!(
        "Compared {} fields over {} indices: {} disagreements",
        fields.len(),
        dataset.index_count(),
        records.len()
    );

    Ok(records)
}

/// Per-index agreement for one field, ascending by index.
///
/// Indices where no host sampled the field are omitted.
pub fn inconsistency_series(dataset: &UnifiedDataset, field: &TrackedField) -> Vec<SeriesPoint> {
    dataset
        .iter()
        .filter_map(|(i, hosts)| {
            let values = sampled_values(hosts, field);
            if values.is_empty() {
                return None;
            }
            Some(SeriesPoint {
                i,
                disagrees: disagrees(&values),
                hosts: values.into_keys().collect(),
            })
        })
        .collect()
}

/// Text recorded for `field` by every host that sampled it.
fn sampled_values(
    hosts: &BTreeMap<HostId, SampleRecord>,
    field: &TrackedField,
) -> BTreeMap<HostId, String> {
    hosts
        .iter()
        .filter_map(|(id, record)| record.text(field).map(|t| (id.clone(), t.to_string())))
        .collect()
}

fn disagrees(values: &BTreeMap<HostId, String>) -> bool {
    if values.len() < 2 {
        return false;
    }
    let distinct: BTreeSet<&str> = values.values().map(String::as_str).collect();
    distinct.len() > 1
}
