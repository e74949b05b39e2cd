//! Discovery of per-host result files.
//!
//! Each host contributes a `fingerprint_results_<id>.csv` and a
//! `system_info_<id>.txt` in the same directory. The scanner pairs them
//! by the embedded identifier and reports anything it could not pair.

use crate::error::{FormatError, FormatErrorKind, StorageError};
use crate::models::HostId;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

const SAMPLES_PREFIX: &str = "fingerprint_results_";
const SAMPLES_EXTENSION: &str = "csv";
const METADATA_PREFIX: &str = "system_info_";
const METADATA_EXTENSION: &str = "txt";

/// Configuration for file scanning.
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Descend into subdirectories.
    pub recursive: bool,
}

impl From<&crate::config::InputConfig> for ScanConfig {
    fn from(config: &crate::config::InputConfig) -> Self {
        Self {
            recursive: config.recursive,
        }
    }
}

/// The pair of files describing one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFiles {
    /// Identifier embedded in the file names.
    pub host_id: HostId,
    pub samples: PathBuf,
    pub metadata: PathBuf,
}

/// A result file that could not be paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    pub path: PathBuf,
    pub kind: FormatErrorKind,
}

impl Orphan {
    pub fn into_error(self) -> FormatError {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string());
        FormatError::new(name, self.kind)
    }
}

/// Result of a scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Paired hosts, sorted by identifier then directory.
    pub hosts: Vec<HostFiles>,
    pub orphans: Vec<Orphan>,
}

#[derive(Default)]
struct Slot {
    samples: Option<PathBuf>,
    metadata: Option<PathBuf>,
}

/// File scanner for discovering host result files.
pub struct FileScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl FileScanner {
    /// Create a new file scanner.
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// Walk the input directory and pair host files.
    pub fn scan(&self) -> Result<ScanOutcome, StorageError> {
        let max_depth = if self.config.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        // Keyed by (directory, host) so files only pair with their neighbours.
        let mut slots: BTreeMap<(HostId, PathBuf), Slot> = BTreeMap::new();
        let mut orphans = Vec::new();

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
                StorageError::io(path, source)
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some((host_id, is_samples)) = classify(path) else {
                debug!("Ignoring {}", path.display());
                continue;
            };

            let dir = path.parent().unwrap_or(&self.root).to_path_buf();
            let slot = slots.entry((host_id.clone(), dir)).or_default();
            let target = if is_samples {
                &mut slot.samples
            } else {
                &mut slot.metadata
            };

            if target.is_some() {
                orphans.push(Orphan {
                    path: path.to_path_buf(),
                    kind: FormatErrorKind::DuplicateHostFile(host_id.to_string()),
                });
            } else {
                *target = Some(path.to_path_buf());
            }
        }

        let mut hosts = Vec::new();
        for ((host_id, _dir), slot) in slots {
            match (slot.samples, slot.metadata) {
                (Some(samples), Some(metadata)) => hosts.push(HostFiles {
                    host_id,
                    samples,
                    metadata,
                }),
                (Some(samples), None) => orphans.push(Orphan {
                    path: samples,
                    kind: FormatErrorKind::MissingCompanion("metadata"),
                }),
                (None, Some(metadata)) => orphans.push(Orphan {
                    path: metadata,
                    kind: FormatErrorKind::MissingCompanion("sample"),
                }),
                (None, None) => {}
            }
        }

        debug!(
            "Scanned {}: {} hosts, {} orphans",
            self.root.display(),
            hosts.len(),
            orphans.len()
        );

        Ok(ScanOutcome { hosts, orphans })
    }
}

/// Identify a host result file: its host identifier and whether it holds
/// samples (`true`) or metadata (`false`).
fn classify(path: &Path) -> Option<(HostId, bool)> {
    let name = path.file_name()?.to_str()?;
    let extension = path.extension()?.to_str()?;

    let is_samples = if name.starts_with(SAMPLES_PREFIX) && extension == SAMPLES_EXTENSION {
        true
    } else if name.starts_with(METADATA_PREFIX) && extension == METADATA_EXTENSION {
        false
    } else {
        return None;
    };

    HostId::from_file_name(name).map(|id| (id, is_samples))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
