//! Parsing of `system_info_<id>.txt` host metadata.

use crate::error::{FormatError, FormatErrorKind};
use crate::models::{HostId, HostMetadata};

/// Labels of the metadata lines, in the order the sampler writes them.
pub const METADATA_LABELS: [&str; 8] = [
    "OS Type",
    "OS Type (User Input)",
    "Running on VM",
    "CPU Info",
    "CPU Info (User Input)",
    "CPU Generation (User Input)",
    "Script Hash",
    "Results UUID",
];

/// Parse the eight `label: value` lines of a host metadata source.
///
/// Blank lines are ignored. Every other line must carry the expected label
/// for its position; values are trimmed.
pub fn parse_metadata(name: &str, content: &str) -> Result<HostMetadata, FormatError> {
    let fail = |kind| FormatError::new(name, kind);

    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(fail(FormatErrorKind::Empty));
    }
    if lines.len() != METADATA_LABELS.len() {
        return Err(fail(FormatErrorKind::FieldCount {
            expected: METADATA_LABELS.len(),
            found: lines.len(),
        }));
    }

    let mut values: Vec<String> = Vec::with_capacity(METADATA_LABELS.len());

    for ((line_no, line), expected) in lines.into_iter().zip(METADATA_LABELS) {
        let (label, value) = line.split_once(':').ok_or_else(|| {
            fail(FormatErrorKind::MissingSeparator {
                line: line_no,
                expected,
            })
        })?;

        let label = label.trim();
        if label != expected {
            return Err(fail(FormatErrorKind::UnexpectedField {
                line: line_no,
                expected,
                found: label.to_string(),
            }));
        }

        values.push(value.trim().to_string());
    }

    let host_id = values.pop().unwrap_or_default();
    if host_id.is_empty() {
        return Err(fail(FormatErrorKind::EmptyField(METADATA_LABELS[7])));
    }

    let mut fields = values.into_iter();
    let mut next = || fields.next().unwrap_or_default();

    Ok(HostMetadata {
        os_type: next(),
        os_type_user: next(),
        running_on_vm: next(),
        cpu_info: next(),
        cpu_info_user: next(),
        cpu_generation_user: next(),
        script_hash: next(),
        host_id: HostId::new(host_id),
    })
}
