//! Data models for the fingerprint analyzer.
//!
//! This module contains the core data structures shared by the reader,
//! aggregator, detector and report emitter: host metadata, per-host
//! sample records, the unified dataset and disagreement records.

use crate::error::IntegrityError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Unique token identifying one sampled host (a UUID in practice).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the identifier embedded in a result file name.
    ///
    /// The identifier is the token after the last `_` and before the
    /// extension, e.g. `fingerprint_results_<id>.csv`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = match name.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => name,
        };
        let (_, token) = stem.rsplit_once('_')?;
        let token = token.trim();
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self::new(token))
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Self-description of one host, parsed from its `system_info_<id>.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMetadata {
    pub os_type: String,
    pub os_type_user: String,
    pub running_on_vm: String,
    pub cpu_info: String,
    pub cpu_info_user: String,
    pub cpu_generation_user: String,
    pub script_hash: String,
    pub host_id: HostId,
}

impl HostMetadata {
    /// Short human label, preferring what the user typed over detection.
    pub fn cpu_label(&self) -> &str {
        if self.cpu_info_user.is_empty() {
            &self.cpu_info
        } else {
            &self.cpu_info_user
        }
    }
}

/// Versioned, ordered list of tracked functions.
///
/// `V1` is the four-function sweep of early samplers; `V2` adds `cosh` and `tan`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FunctionSet {
    V1,
    #[default]
    V2,
}

impl FunctionSet {
    pub fn functions(&self) -> &'static [&'static str] {
        match self {
            FunctionSet::V1 => &["sin", "cos", "e", "log"],
            FunctionSet::V2 => &["sin", "cos", "e", "log", "cosh", "tan"],
        }
    }

    /// Fields compared by the detector, in report order: every value field,
    /// then (optionally) every elapsed field.
    pub fn fields(&self, include_elapsed: bool) -> Vec<TrackedField> {
        let mut fields: Vec<TrackedField> = self
            .functions()
            .iter()
            .map(|f| TrackedField::new(f, Measure::Value))
            .collect();

        if include_elapsed {
            fields.extend(
                self.functions()
                    .iter()
                    .map(|f| TrackedField::new(f, Measure::Elapsed)),
            );
        }

        fields
    }
}

impl fmt::Display for FunctionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionSet::V1 => write!(f, "v1"),
            FunctionSet::V2 => write!(f, "v2"),
        }
    }
}

/// Which half of a function's reading a field refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    Value,
    Elapsed,
}

impl Measure {
    pub fn suffix(&self) -> &'static str {
        match self {
            Measure::Value => "value",
            Measure::Elapsed => "elapsed",
        }
    }
}

/// One comparable column, e.g. `log_value` or `sin_elapsed`.
///
/// Its `Display` form is both the CSV column name and the report field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackedField {
    pub function: &'static str,
    pub measure: Measure,
}

impl TrackedField {
    pub fn new(function: &'static str, measure: Measure) -> Self {
        Self { function, measure }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.function, self.measure.suffix())
    }
}

/// What a host recorded for one function at one index.
///
/// Text is kept verbatim: sentinels such as `Overflow` and `N/A` are
/// legitimate values and comparison is exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reading {
    Sampled { value: String, elapsed: String },
    /// The host's source had no columns for this function.
    NotSampled,
}

impl Reading {
    pub fn sampled(value: impl Into<String>, elapsed: impl Into<String>) -> Self {
        Reading::Sampled {
            value: value.into(),
            elapsed: elapsed.into(),
        }
    }

    pub fn text(&self, measure: Measure) -> Option<&str> {
        match self {
            Reading::Sampled { value, elapsed } => Some(match measure {
                Measure::Value => value,
                Measure::Elapsed => elapsed,
            }),
            Reading::NotSampled => None,
        }
    }
}

/// One host's readings at one sample index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub host_id: HostId,
    pub index: u64,
    /// Keyed by function name; covers every function of the dataset's set.
    pub readings: BTreeMap<String, Reading>,
}

impl SampleRecord {
    /// Recorded text for a field, or `None` when the function was not sampled.
    pub fn text(&self, field: &TrackedField) -> Option<&str> {
        self.readings
            .get(field.function)
            .and_then(|r| r.text(field.measure))
    }
}

/// Everything the reader produces for a single host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostData {
    pub metadata: HostMetadata,
    /// Ascending by index.
    pub samples: Vec<SampleRecord>,
}

impl HostData {
    pub fn host_id(&self) -> &HostId {
        &self.metadata.host_id
    }
}

/// Metadata for every aggregated host, keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostCatalog(BTreeMap<HostId, HostMetadata>);

impl HostCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &HostId) -> Option<&HostMetadata> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &HostId) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HostId, &HostMetadata)> {
        self.0.iter()
    }

    pub(crate) fn insert(&mut self, metadata: HostMetadata) {
        self.0.insert(metadata.host_id.clone(), metadata);
    }
}

/// All hosts' samples, grouped by sample index.
///
/// Grouping is by index first and host second, so the content is
/// independent of the order in which hosts were added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedDataset {
    function_set: FunctionSet,
    by_index: BTreeMap<u64, BTreeMap<HostId, SampleRecord>>,
}

impl UnifiedDataset {
    pub fn new(function_set: FunctionSet) -> Self {
        Self {
            function_set,
            by_index: BTreeMap::new(),
        }
    }

    pub fn function_set(&self) -> FunctionSet {
        self.function_set
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Number of distinct sample indices.
    pub fn index_count(&self) -> usize {
        self.by_index.len()
    }

    /// Number of (index, host) records.
    pub fn record_count(&self) -> usize {
        self.by_index.values().map(BTreeMap::len).sum()
    }

    /// Records at each index, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &BTreeMap<HostId, SampleRecord>)> {
        self.by_index.iter().map(|(i, hosts)| (*i, hosts))
    }

    #[cfg(test)]
    pub fn at(&self, index: u64) -> Option<&BTreeMap<HostId, SampleRecord>> {
        self.by_index.get(&index)
    }

    pub fn host_ids(&self) -> BTreeSet<&HostId> {
        self.by_index.values().flat_map(|hosts| hosts.keys()).collect()
    }

    pub fn contains_host(&self, id: &HostId) -> bool {
        self.by_index.values().any(|hosts| hosts.contains_key(id))
    }

    /// One host's full sample sequence, ascending by index.
    pub fn host_samples(&self, id: &HostId) -> Vec<&SampleRecord> {
        self.by_index
            .values()
            .filter_map(|hosts| hosts.get(id))
            .collect()
    }

    /// Insert a record, returning any record it replaced.
    pub(crate) fn insert(&mut self, record: SampleRecord) -> Option<SampleRecord> {
        self.by_index
            .entry(record.index)
            .or_default()
            .insert(record.host_id.clone(), record)
    }

    /// Check that every record's host has metadata in `catalog`.
    pub fn verify_hosts(&self, catalog: &HostCatalog) -> Result<(), IntegrityError> {
        for (index, hosts) in &self.by_index {
            for host_id in hosts.keys() {
                if !catalog.contains(host_id) {
                    return Err(IntegrityError::DanglingHost {
                        host_id: host_id.to_string(),
                        index: *index,
                    });
                }
            }
        }
        Ok(())
    }
}

/// A (sample index, field) where hosts recorded different text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisagreementRecord {
    /// Sample index.
    pub i: u64,
    /// Field name, e.g. `log_value`.
    pub function: String,
    /// Recorded text from every host that sampled this field here.
    pub values: BTreeMap<HostId, String>,
    /// Metadata of every host in `values`.
    pub system_info: BTreeMap<HostId, HostMetadata>,
}

impl DisagreementRecord {
    /// Hosts grouped by the text they recorded.
    pub fn value_groups(&self) -> BTreeMap<&str, Vec<&HostId>> {
        let mut groups: BTreeMap<&str, Vec<&HostId>> = BTreeMap::new();

        for (host, value) in &self.values {
            groups.entry(value.as_str()).or_default().push(host);
        }

        groups
    }
}

/// Summary statistics over a detection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisagreementSummary {
    /// Total number of disagreement records.
    pub total: usize,
    /// Number of distinct sample indices with at least one disagreement.
    pub indices_affected: usize,
    /// Records per field name.
    pub by_field: BTreeMap<String, usize>,
    /// Records each host took part in.
    pub by_host: BTreeMap<HostId, usize>,
}

impl DisagreementSummary {
    pub fn from_records(records: &[DisagreementRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };

        let indices: BTreeSet<u64> = records.iter().map(|r| r.i).collect();
        summary.indices_affected = indices.len();

        for record in records {
            *summary.by_field.entry(record.function.clone()).or_insert(0) += 1;

            for host in record.values.keys() {
                *summary.by_host.entry(host.clone()).or_insert(0) += 1;
            }
        }

        summary
    }
}

/// A host whose files could not be ingested, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedHost {
    pub source: String,
    pub reason: String,
}
