//! Per-host record reader.
//!
//! Turns one host's sample CSV and metadata text into a [`HostData`].
//! A host is read completely or not at all.

mod metadata;
mod samples;

pub use metadata::parse_metadata;
pub use samples::parse_samples;

use crate::error::{FormatError, FormatErrorKind};
use crate::models::{FunctionSet, HostData, HostId};
use crate::scanner::HostFiles;
use std::fs;
use std::path::Path;
use tracing::debug;

/// In-memory sources for one host.
#[derive(Debug, Clone, Copy)]
pub struct HostInput<'a> {
    /// Sample file name; carries the host identifier.
    pub samples_name: &'a str,
    pub samples: &'a str,
    pub metadata_name: &'a str,
    pub metadata: &'a str,
}

/// Parse one host from in-memory sources.
pub fn parse_host(input: &HostInput<'_>, function_set: FunctionSet) -> Result<HostData, FormatError> {
    let from_name = HostId::from_file_name(input.samples_name)
        .ok_or_else(|| FormatError::new(input.samples_name, FormatErrorKind::NoHostIdInName))?;

    let metadata = parse_metadata(input.metadata_name, input.metadata)?;

    if metadata.host_id != from_name {
        return Err(FormatError::new(
            input.samples_name,
            FormatErrorKind::HostIdMismatch {
                from_name: from_name.to_string(),
                from_metadata: metadata.host_id.to_string(),
            },
        ));
    }

    let samples = parse_samples(input.samples_name, input.samples, &from_name, function_set)?;
    debug!("Parsed {} samples for host {}", samples.len(), from_name);

    Ok(HostData { metadata, samples })
}

/// Read and parse one host's files from disk.
pub fn read_host(files: &HostFiles, function_set: FunctionSet) -> Result<HostData, FormatError> {
    let samples = read_source(&files.samples)?;
    let metadata = read_source(&files.metadata)?;
    let samples_name = file_name(&files.samples);
    let metadata_name = file_name(&files.metadata);

    let input = HostInput {
        samples_name: &samples_name,
        samples: &samples,
        metadata_name: &metadata_name,
        metadata: &metadata,
    };
    parse_host(&input, function_set)
}

fn read_source(path: &Path) -> Result<String, FormatError> {
    fs::read_to_string(path).map_err(|e| {
        FormatError::new(file_name(path), FormatErrorKind::Unreadable(e.to_string()))
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Reading;
    use std::path::PathBuf;

    fn metadata_text(id: &str) -> String {
        format!(
            "OS Type: Darwin\nOS Type (User Input): macOS\nRunning on VM: no\nCPU Info: arm\n\
             CPU Info (User Input): Apple M2\nCPU Generation (User Input): IDK\n\
             Script Hash: abcd\nResults UUID: {}\n",
            id
        )
    }

    const SAMPLES: &str = "i,sin_value,sin_elapsed\n0,0.0,1e-06\n1,1.2e-16,1e-06\n";

    #[test]
    fn test_parse_host() {
        let meta = metadata_text("h1");
        let host = parse_host(
            &HostInput {
                samples_name: "fingerprint_results_h1.csv",
                samples: SAMPLES,
                metadata_name: "system_info_h1.txt",
                metadata: &meta,
            },
            FunctionSet::V1,
        )
        .unwrap();

        assert_eq!(host.host_id(), &HostId::new("h1"));
        assert_eq!(host.metadata.cpu_info_user, "Apple M2");
        assert_eq!(host.samples.len(), 2);
        assert_eq!(host.samples[1].readings["sin"], Reading::sampled("1.2e-16", "1e-06"));
    }

    #[test]
    fn test_host_id_mismatch() {
        let meta = metadata_text("other");
        let err = parse_host(
            &HostInput {
                samples_name: "fingerprint_results_h1.csv",
                samples: SAMPLES,
                metadata_name: "system_info_h1.txt",
                metadata: &meta,
            },
            FunctionSet::V1,
        )
        .unwrap_err();

        assert_eq!(err.file, "fingerprint_results_h1.csv");
        assert_eq!(
            err.kind,
            FormatErrorKind::HostIdMismatch {
                from_name: "h1".to_string(),
                from_metadata: "other".to_string()
            }
        );
    }

    #[test]
    fn test_no_host_id_in_name() {
        let meta = metadata_text("h1");
        let err = parse_host(
            &HostInput {
                samples_name: "results.csv",
                samples: SAMPLES,
                metadata_name: "info.txt",
                metadata: &meta,
            },
            FunctionSet::V1,
        )
        .unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::NoHostIdInName);
    }

    #[test]
    fn test_read_host_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let samples = dir.path().join("fingerprint_results_h9.csv");
        let metadata = dir.path().join("system_info_h9.txt");
        fs::write(&samples, SAMPLES).unwrap();
        fs::write(&metadata, metadata_text("h9")).unwrap();

        let host = read_host(
            &HostFiles {
                host_id: HostId::new("h9"),
                samples,
                metadata,
            },
            FunctionSet::V2,
        )
        .unwrap();

        assert_eq!(host.samples.len(), 2);
        assert_eq!(host.samples[0].readings["tan"], Reading::NotSampled);
    }

    #[test]
    fn test_read_host_unreadable() {
        let err = read_host(
            &HostFiles {
                host_id: HostId::new("h9"),
                samples: PathBuf::from("/definitely/not/here/fingerprint_results_h9.csv"),
                metadata: PathBuf::from("/definitely/not/here/system_info_h9.txt"),
            },
            FunctionSet::V1,
        )
        .unwrap_err();

        assert_eq!(err.file, "fingerprint_results_h9.csv");
        assert!(matches!(err.kind, FormatErrorKind::Unreadable(_)));
    }
}
