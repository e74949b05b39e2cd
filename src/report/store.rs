//! Durable JSON documents.
//!
//! Three documents are written per run:
//!
//! - the unified dataset: every host's ordered sample sequence,
//! - the host collection: metadata keyed by host identifier,
//! - the disagreement report.
//!
//! Each carries a `schema_version` and can be read back losslessly. The
//! reader/writer pairs work on any `io::Read` / `io::Write`; the `save_*`
//! and `load_*` wrappers attach file paths to failures.

use crate::error::{IntegrityError, LoadError, StorageError};
use crate::models::{
    DisagreementRecord, DisagreementSummary, FunctionSet, HostCatalog, HostId, Reading,
    SampleRecord, UnifiedDataset,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Version written into, and required from, every document.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct DatasetDocument {
    schema_version: u32,
    function_set: FunctionSet,
    hosts: Vec<HostSamples>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HostSamples {
    host_id: HostId,
    samples: Vec<StoredSample>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSample {
    i: u64,
    readings: BTreeMap<String, Reading>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HostsDocument {
    schema_version: u32,
    hosts: HostCatalog,
}

/// The disagreement report document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisagreementReport {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub function_set: FunctionSet,
    pub include_elapsed: bool,
    pub summary: DisagreementSummary,
    pub disagreements: Vec<DisagreementRecord>,
}

impl DisagreementReport {
    pub fn new(
        function_set: FunctionSet,
        include_elapsed: bool,
        disagreements: Vec<DisagreementRecord>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            function_set,
            include_elapsed,
            summary: DisagreementSummary::from_records(&disagreements),
            disagreements,
        }
    }
}

impl From<&UnifiedDataset> for DatasetDocument {
    fn from(dataset: &UnifiedDataset) -> Self {
        let hosts = dataset
            .host_ids()
            .into_iter()
            .map(|id| HostSamples {
                host_id: id.clone(),
                samples: dataset
                    .host_samples(id)
                    .into_iter()
                    .map(|s| StoredSample {
                        i: s.index,
                        readings: s.readings.clone(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            schema_version: SCHEMA_VERSION,
            function_set: dataset.function_set(),
            hosts,
        }
    }
}

impl DatasetDocument {
    fn into_dataset(self) -> Result<UnifiedDataset, IntegrityError> {
        check_version("dataset", self.schema_version)?;

        let mut dataset = UnifiedDataset::new(self.function_set);
        let mut hosts_seen = HashSet::with_capacity(self.hosts.len());
        for host in self.hosts {
            if !hosts_seen.insert(host.host_id.clone()) {
                return Err(IntegrityError::HostCollision {
                    host_id: host.host_id.to_string(),
                });
            }

            let mut seen = HashSet::with_capacity(host.samples.len());
            for sample in host.samples {
                if !seen.insert(sample.i) {
                    return Err(IntegrityError::DuplicateSample {
                        host_id: host.host_id.to_string(),
                        index: sample.i,
                    });
                }
                dataset.insert(SampleRecord {
                    host_id: host.host_id.clone(),
                    index: sample.i,
                    readings: sample.readings,
                });
            }
        }

        Ok(dataset)
    }
}

fn check_version(document: &'static str, found: u32) -> Result<(), IntegrityError> {
    if found != SCHEMA_VERSION {
        return Err(IntegrityError::SchemaVersion {
            document,
            found,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(())
}

/// Serialize the unified dataset.
pub fn write_dataset<W: Write>(writer: W, dataset: &UnifiedDataset) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, &DatasetDocument::from(dataset))
}

/// Deserialize a unified dataset.
pub fn read_dataset<R: Read>(reader: R) -> Result<UnifiedDataset, LoadError> {
    let document: DatasetDocument = serde_json::from_reader(reader)?;
    Ok(document.into_dataset()?)
}

/// Serialize the host collection.
pub fn write_hosts<W: Write>(writer: W, catalog: &HostCatalog) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(
        writer,
        &HostsDocument {
            schema_version: SCHEMA_VERSION,
            hosts: catalog.clone(),
        },
    )
}

/// Deserialize a host collection.
pub fn read_hosts<R: Read>(reader: R) -> Result<HostCatalog, LoadError> {
    let document: HostsDocument = serde_json::from_reader(reader)?;
    check_version("host collection", document.schema_version)?;

    for (key, meta) in document.hosts.iter() {
        if key != &meta.host_id {
            return Err(IntegrityError::MetadataKeyMismatch {
                key: key.to_string(),
                host_id: meta.host_id.to_string(),
            }
            .into());
        }
    }

    Ok(document.hosts)
}

/// Serialize a disagreement report.
pub fn write_report<W: Write>(writer: W, report: &DisagreementReport) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, report)
}

/// Deserialize a disagreement report.
#[allow(dead_code)] // The CLI only writes reports
pub fn read_report<R: Read>(reader: R) -> Result<DisagreementReport, LoadError> {
    let report: DisagreementReport = serde_json::from_reader(reader)?;
    check_version("disagreement report", report.schema_version)?;
    Ok(report)
}

pub fn save_dataset(path: &Path, dataset: &UnifiedDataset) -> Result<(), StorageError> {
    save_with(path, |buf| write_dataset(buf, dataset))?;
    info!(
        "Wrote dataset ({} indices, {} records) to {}",
        dataset.index_count(),
        dataset.record_count(),
        path.display()
    );
    Ok(())
}

pub fn load_dataset(path: &Path) -> Result<UnifiedDataset, LoadError> {
    load_with(path, |bytes| read_dataset(bytes))
}

pub fn save_hosts(path: &Path, catalog: &HostCatalog) -> Result<(), StorageError> {
    save_with(path, |buf| write_hosts(buf, catalog))?;
    info!("Wrote {} hosts to {}", catalog.len(), path.display());
    Ok(())
}

pub fn load_hosts(path: &Path) -> Result<HostCatalog, LoadError> {
    load_with(path, |bytes| read_hosts(bytes))
}

pub fn save_report(path: &Path, report: &DisagreementReport) -> Result<(), StorageError> {
    save_with(path, |buf| write_report(buf, report))?;
    info!(
        "Wrote {} disagreements to {}",
        report.disagreements.len(),
        path.display()
    );
    Ok(())
}

#[allow(dead_code)] // The CLI only writes reports
pub fn load_report(path: &Path) -> Result<DisagreementReport, LoadError> {
    load_with(path, |bytes| read_report(bytes))
}

/// Write a text document (e.g. the Markdown summary).
pub fn save_text(path: &Path, content: &str) -> Result<(), StorageError> {
    ensure_parent(path)?;
    fs::write(path, content).map_err(|e| StorageError::io(path, e))
}

fn save_with<F>(path: &Path, write: F) -> Result<(), StorageError>
where
    F: FnOnce(&mut Vec<u8>) -> serde_json::Result<()>,
{
    let mut buf = Vec::new();
    write(&mut buf).map_err(|e| StorageError::serde(path, e))?;
    buf.push(b'\n');
    ensure_parent(path)?;
    fs::write(path, buf).map_err(|e| StorageError::io(path, e))
}

fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn load_with<T, F>(path: &Path, read: F) -> Result<T, LoadError>
where
    F: FnOnce(&[u8]) -> Result<T, LoadError>,
{
    let bytes = fs::read(path).map_err(|e| StorageError::io(path, e))?;
    read(&bytes).map_err(|e| match e {
        LoadError::Decode(source) => StorageError::serde(path, source).into(),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{detect, Aggregator, DetectorOptions};
    use crate::models::fixtures::{host, record};
    use crate::models::HostData;
    use proptest::prelude::*;

    fn sample_aggregation() -> (UnifiedDataset, HostCatalog) {
        let mut z = record("z", 1, &[("sin", "0.5")]);
        z.readings.insert("cosh".to_string(), Reading::NotSampled);

        let mut aggregator = Aggregator::new(FunctionSet::V2);
        for h in [
            host(
                "x",
                vec![
                    record("x", 0, &[("sin", "0.0"), ("cosh", "1.0")]),
                    record("x", 1, &[("sin", "0.5"), ("cosh", "1.5430806348152437")]),
                ],
            ),
            host("y", vec![record("y", 1, &[("sin", "Overflow")])]),
            host("z", vec![z]),
        ] {
            aggregator.add_host(h).unwrap();
        }
        aggregator.finish()
    }

    #[test]
    fn test_dataset_round_trip() {
        let (dataset, _) = sample_aggregation();

        let mut buf = Vec::new();
        write_dataset(&mut buf, &dataset).unwrap();
        let restored = read_dataset(buf.as_slice()).unwrap();

        assert_eq!(restored, dataset);
    }

    #[test]
    fn test_dataset_document_shape() {
        let (dataset, _) = sample_aggregation();

        let mut buf = Vec::new();
        write_dataset(&mut buf, &dataset).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();

        assert_eq!(json["schema_version"], 1);
        assert_eq!(json["function_set"], "v2");
        let hosts = json["hosts"].as_array().unwrap();
        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts[0]["host_id"], "x");
        assert_eq!(hosts[0]["samples"][1]["i"], 1);
        assert_eq!(hosts[2]["samples"][0]["readings"]["cosh"]["status"], "not_sampled");
    }

    #[test]
    fn test_hosts_round_trip() {
        let (_, catalog) = sample_aggregation();

        let mut buf = Vec::new();
        write_hosts(&mut buf, &catalog).unwrap();
        assert_eq!(read_hosts(buf.as_slice()).unwrap(), catalog);
    }

    #[test]
    fn test_hosts_key_mismatch_rejected() {
        let json = r#"{"schema_version":1,"hosts":{"a":{"os_type":"","os_type_user":"",
            "running_on_vm":"","cpu_info":"","cpu_info_user":"","cpu_generation_user":"",
            "script_hash":"","host_id":"b"}}}"#;
        let err = read_hosts(json.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Integrity(IntegrityError::MetadataKeyMismatch { .. })
        ));
    }

    #[test]
    fn test_report_round_trip() {
        let (dataset, catalog) = sample_aggregation();
        let records = detect(&dataset, &catalog, DetectorOptions::default()).unwrap();
        assert_eq!(records.len(), 1);

        let report = DisagreementReport::new(FunctionSet::V2, false, records);
        assert_eq!(report.summary.total, 1);

        let mut buf = Vec::new();
        write_report(&mut buf, &report).unwrap();
        assert_eq!(read_report(buf.as_slice()).unwrap(), report);
    }

    #[test]
    fn test_report_document_shape() {
        let (dataset, catalog) = sample_aggregation();
        let records = detect(&dataset, &catalog, DetectorOptions::default()).unwrap();
        let report = DisagreementReport::new(FunctionSet::V2, false, records);

        let mut buf = Vec::new();
        write_report(&mut buf, &report).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();

        let first = &json["disagreements"][0];
        assert_eq!(first["i"], 1);
        assert_eq!(first["function"], "sin_value");
        assert_eq!(first["values"]["y"], "Overflow");
        assert_eq!(first["system_info"]["x"]["host_id"], "x");
    }

    #[test]
    fn test_schema_version_rejected() {
        let json = r#"{"schema_version":2,"function_set":"v1","hosts":[]}"#;
        let err = read_dataset(json.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Integrity(IntegrityError::SchemaVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_duplicate_index_in_document_rejected() {
        let json = r#"{"schema_version":1,"function_set":"v1","hosts":[
            {"host_id":"a","samples":[{"i":1,"readings":{}},{"i":1,"readings":{}}]}]}"#;
        assert!(matches!(
            read_dataset(json.as_bytes()),
            Err(LoadError::Integrity(IntegrityError::DuplicateSample { index: 1, .. }))
        ));
    }

    #[test]
    fn test_host_listed_twice_rejected() {
        let json = r#"{"schema_version":1,"function_set":"v1","hosts":[
            {"host_id":"a","samples":[{"i":1,"readings":{}}]},
            {"host_id":"a","samples":[{"i":2,"readings":{}}]}]}"#;
        assert!(matches!(
            read_dataset(json.as_bytes()),
            Err(LoadError::Integrity(IntegrityError::HostCollision { .. }))
        ));
    }

    #[test]
    fn test_save_and_load_paths() {
        let dir = tempfile::tempdir().unwrap();
        let (dataset, catalog) = sample_aggregation();

        let dataset_path = dir.path().join("out/aggregate_fingerprint_data.json");
        let hosts_path = dir.path().join("out/aggregate_system_data.json");
        save_dataset(&dataset_path, &dataset).unwrap();
        save_hosts(&hosts_path, &catalog).unwrap();

        assert_eq!(load_dataset(&dataset_path).unwrap(), dataset);
        assert_eq!(load_hosts(&hosts_path).unwrap(), catalog);
    }

    #[test]
    fn test_load_errors_carry_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = load_dataset(&missing).unwrap_err();
        assert!(matches!(err, LoadError::Storage(StorageError::Io { .. })));
        assert!(err.to_string().contains("missing.json"));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "not json").unwrap();
        let err = load_hosts(&garbage).unwrap_err();
        assert!(matches!(err, LoadError::Storage(StorageError::Serde { .. })));
        assert!(err.to_string().contains("garbage.json"));
    }

    fn arb_host(id: String) -> impl Strategy<Value = HostData> {
        let values = prop::sample::select(vec!["0.0", "-0.0", "1e-16", "Overflow", "N/A", "3.14"]);
        prop::collection::btree_map(0u64..40, (values.clone(), values), 1..15).prop_map(
            move |samples| {
                host(
                    &id,
                    samples
                        .into_iter()
                        .map(|(i, (sin, tan))| record(&id, i, &[("sin", sin), ("tan", tan)]))
                        .collect(),
                )
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(40))]

        #[test]
        fn prop_dataset_round_trip(
            a in arb_host("a".to_string()),
            b in arb_host("b".to_string()),
        ) {
            let mut aggregator = Aggregator::new(FunctionSet::V2);
            aggregator.add_host(a).unwrap();
            aggregator.add_host(b).unwrap();
            let (dataset, catalog) = aggregator.finish();

            let mut buf = Vec::new();
            write_dataset(&mut buf, &dataset).unwrap();
            prop_assert_eq!(read_dataset(buf.as_slice()).unwrap(), dataset);

            let mut buf = Vec::new();
            write_hosts(&mut buf, &catalog).unwrap();
            prop_assert_eq!(read_hosts(buf.as_slice()).unwrap(), catalog);
        }
    }
}
