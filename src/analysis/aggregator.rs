//! Merging of per-host records into a unified dataset.
//!
//! The aggregator owns the dataset and the host catalog while hosts are
//! being added. Hosts can be added one at a time, including on top of a
//! dataset reloaded from a previous run.

use crate::error::IntegrityError;
use crate::models::{FunctionSet, HostCatalog, HostData, UnifiedDataset};
use std::collections::HashSet;
use tracing::{debug, info};

/// What happened to a host handed to [`Aggregator::add_host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The host's samples were merged in.
    Added { samples: usize },
    /// The same host with identical content was already aggregated.
    Duplicate,
}

/// Incremental builder of a [`UnifiedDataset`] and its [`HostCatalog`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    dataset: UnifiedDataset,
    catalog: HostCatalog,
}

impl Aggregator {
    /// Start an empty aggregation.
    pub fn new(function_set: FunctionSet) -> Self {
        Self {
            dataset: UnifiedDataset::new(function_set),
            catalog: HostCatalog::new(),
        }
    }

    /// Continue from a previously persisted aggregation.
    ///
    /// The dataset must reference only catalogued hosts and must have been
    /// built with `function_set`.
    pub fn resume(
        dataset: UnifiedDataset,
        catalog: HostCatalog,
        function_set: FunctionSet,
    ) -> Result<Self, IntegrityError> {
        if dataset.function_set() != function_set {
            return Err(IntegrityError::FunctionSetMismatch {
                dataset: dataset.function_set().to_string(),
                configured: function_set.to_string(),
            });
        }
        dataset.verify_hosts(&catalog)?;

        info!(
            "Resuming aggregation with {} hosts over {} sample indices",
            catalog.len(),
            dataset.index_count()
        );

        Ok(Self { dataset, catalog })
    }

    #[cfg(test)]
    pub fn dataset(&self) -> &UnifiedDataset {
        &self.dataset
    }

    #[cfg(test)]
    pub fn catalog(&self) -> &HostCatalog {
        &self.catalog
    }

    /// Merge one host.
    ///
    /// Re-adding a host with identical metadata and samples is a no-op
    /// reported as [`Admission::Duplicate`]. Re-using a host identifier with
    /// different content is an [`IntegrityError::HostCollision`].
    pub fn add_host(&mut self, host: HostData) -> Result<Admission, IntegrityError> {
        let host_id = host.host_id().clone();

        let mut seen = HashSet::with_capacity(host.samples.len());
        for sample in &host.samples {
            if sample.host_id != host_id {
                return Err(IntegrityError::ForeignSample {
                    expected: host_id.to_string(),
                    found: sample.host_id.to_string(),
                    index: sample.index,
                });
            }
            if !seen.insert(sample.index) {
                return Err(IntegrityError::DuplicateSample {
                    host_id: host_id.to_string(),
                    index: sample.index,
                });
            }
        }

        if let Some(existing) = self.catalog.get(&host_id) {
            let mut incoming: Vec<_> = host.samples.iter().collect();
            incoming.sort_by_key(|s| s.index);

            if *existing == host.metadata && self.dataset.host_samples(&host_id) == incoming {
                info!("Host {} already aggregated, skipping duplicate", host_id);
                return Ok(Admission::Duplicate);
            }

            return Err(IntegrityError::HostCollision {
                host_id: host_id.to_string(),
            });
        }

        // Records for an uncatalogued host would be dangling.
        if self.dataset.contains_host(&host_id) {
            return Err(IntegrityError::HostCollision {
                host_id: host_id.to_string(),
            });
        }

        let count = host.samples.len();
        self.catalog.insert(host.metadata);
        for sample in host.samples {
            self.dataset.insert(sample);
        }

        debug!("Aggregated {} samples for host {}", count, host_id);
        Ok(Admission::Added { samples: count })
    }

    /// Finish aggregation, yielding the dataset and its host catalog.
    pub fn finish(self) -> (UnifiedDataset, HostCatalog) {
        (self.dataset, self.catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{host, metadata, record};
    use crate::models::{HostId, Reading};
    use proptest::prelude::*;

    fn host_with(id: &str, indices: &[u64]) -> HostData {
        host(
            id,
            indices
                .iter()
                .map(|i| {
                    let value = format!("{}.0", i);
                    record(id, *i, &[("sin", value.as_str())])
                })
                .collect(),
        )
    }

    fn aggregate(hosts: Vec<HostData>) -> (UnifiedDataset, HostCatalog) {
        let mut aggregator = Aggregator::new(FunctionSet::V1);
        for h in hosts {
            aggregator.add_host(h).unwrap();
        }
        aggregator.finish()
    }

    #[test]
    fn test_merge_by_index() {
        let (dataset, catalog) = aggregate(vec![
            host_with("x", &[0, 1, 2]),
            host_with("y", &[1, 2, 3]),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(dataset.index_count(), 4);
        assert_eq!(dataset.record_count(), 6);
        assert_eq!(dataset.at(0).map(|h| h.len()), Some(1));
        assert_eq!(dataset.at(2).map(|h| h.len()), Some(2));
        assert!(dataset.at(3).unwrap().contains_key(&HostId::new("y")));
    }

    #[test]
    fn test_duplicate_host_is_rejected_without_change() {
        let mut aggregator = Aggregator::new(FunctionSet::V1);
        let h = host_with("x", &[0, 1]);

        assert_eq!(
            aggregator.add_host(h.clone()).unwrap(),
            Admission::Added { samples: 2 }
        );
        let before = aggregator.dataset().clone();

        assert_eq!(aggregator.add_host(h).unwrap(), Admission::Duplicate);
        assert_eq!(aggregator.dataset(), &before);
        assert_eq!(aggregator.dataset().record_count(), 2);
    }

    #[test]
    fn test_duplicate_detection_ignores_sample_order() {
        let mut aggregator = Aggregator::new(FunctionSet::V1);
        let h = host_with("x", &[0, 1, 2]);
        let mut shuffled = h.clone();
        shuffled.samples.reverse();

        aggregator.add_host(h).unwrap();
        assert_eq!(aggregator.add_host(shuffled).unwrap(), Admission::Duplicate);
    }

    #[test]
    fn test_collision_with_different_samples() {
        let mut aggregator = Aggregator::new(FunctionSet::V1);
        aggregator.add_host(host_with("x", &[0, 1])).unwrap();

        let err = aggregator.add_host(host_with("x", &[0, 1, 2])).unwrap_err();
        assert_eq!(
            err,
            IntegrityError::HostCollision {
                host_id: "x".to_string()
            }
        );
    }

    #[test]
    fn test_collision_with_different_metadata() {
        let mut aggregator = Aggregator::new(FunctionSet::V1);
        aggregator.add_host(host_with("x", &[0])).unwrap();

        let mut other = host_with("x", &[0]);
        other.metadata.cpu_info_user = "someone else".to_string();
        assert!(matches!(
            aggregator.add_host(other),
            Err(IntegrityError::HostCollision { .. })
        ));
    }

    #[test]
    fn test_foreign_sample_rejected() {
        let mut aggregator = Aggregator::new(FunctionSet::V1);
        let mut h = host_with("x", &[0]);
        h.samples.push(record("y", 1, &[("sin", "0.0")]));

        let err = aggregator.add_host(h).unwrap_err();
        assert!(matches!(err, IntegrityError::ForeignSample { index: 1, .. }));
        assert!(aggregator.dataset().is_empty());
        assert!(aggregator.catalog().is_empty());
    }

    #[test]
    fn test_duplicate_index_within_host_rejected() {
        let mut aggregator = Aggregator::new(FunctionSet::V1);
        let h = host_with("x", &[3, 3]);
        assert_eq!(
            aggregator.add_host(h).unwrap_err(),
            IntegrityError::DuplicateSample {
                host_id: "x".to_string(),
                index: 3
            }
        );
    }

    #[test]
    fn test_not_sampled_functions_are_kept_explicit() {
        let mut old = record("z", 0, &[("sin", "0.0")]);
        old.readings.insert("cosh".to_string(), Reading::NotSampled);

        let (dataset, _) = {
            let mut aggregator = Aggregator::new(FunctionSet::V2);
            aggregator.add_host(host("z", vec![old])).unwrap();
            aggregator.finish()
        };

        let stored = &dataset.at(0).unwrap()[&HostId::new("z")];
        assert_eq!(stored.readings["cosh"], Reading::NotSampled);
    }

    #[test]
    fn test_incremental_matches_batch() {
        let hosts = vec![
            host_with("a", &[0, 1, 2]),
            host_with("b", &[1, 2]),
            host_with("c", &[2, 5]),
            host_with("d", &[0, 9]),
        ];

        let all_at_once = aggregate(hosts.clone());

        let (partial, catalog) = aggregate(hosts[..3].to_vec());
        let mut resumed = Aggregator::resume(partial, catalog, FunctionSet::V1).unwrap();
        resumed.add_host(hosts[3].clone()).unwrap();

        assert_eq!(resumed.finish(), all_at_once);
    }

    #[test]
    fn test_resume_rejects_function_set_mismatch() {
        let (dataset, catalog) = aggregate(vec![host_with("a", &[0])]);
        let err = Aggregator::resume(dataset, catalog, FunctionSet::V2).unwrap_err();
        assert_eq!(
            err,
            IntegrityError::FunctionSetMismatch {
                dataset: "v1".to_string(),
                configured: "v2".to_string()
            }
        );
    }

    #[test]
    fn test_resume_rejects_dangling_hosts() {
        let (dataset, _) = aggregate(vec![host_with("a", &[0])]);
        let mut catalog = HostCatalog::new();
        catalog.insert(metadata("b"));

        assert!(matches!(
            Aggregator::resume(dataset, catalog, FunctionSet::V1),
            Err(IntegrityError::DanglingHost { .. })
        ));
    }

    fn arb_hosts() -> impl Strategy<Value = Vec<HostData>> {
        prop::collection::btree_map(
            "[a-f0-9]{4}",
            prop::collection::btree_set(0u64..50, 1..20),
            1..6,
        )
        .prop_map(|hosts| {
            hosts
                .into_iter()
                .map(|(id, indices)| {
                    let indices: Vec<u64> = indices.into_iter().collect();
                    host_with(&id, &indices)
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_aggregating_twice_is_idempotent(hosts in arb_hosts()) {
            let once = aggregate(hosts.clone());

            let mut aggregator = Aggregator::new(FunctionSet::V1);
            for h in hosts.iter().chain(hosts.iter()) {
                aggregator.add_host(h.clone()).unwrap();
            }

            prop_assert_eq!(aggregator.finish(), once);
        }

        #[test]
        fn prop_arrival_order_does_not_matter(hosts in arb_hosts()) {
            let forward = aggregate(hosts.clone());
            let mut reversed = hosts;
            reversed.reverse();

            prop_assert_eq!(aggregate(reversed), forward);
        }
    }
}
