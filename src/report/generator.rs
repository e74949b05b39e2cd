//! Markdown summary generation.
//!
//! Renders a human-readable overview of one run: what was aggregated, which
//! hosts were skipped and where hosts disagree.

use super::store::DisagreementReport;
use crate::analysis::inconsistency_series;
use crate::models::{DisagreementRecord, HostCatalog, HostId, SkippedHost, UnifiedDataset};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Facts about the run that are not part of the dataset itself.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub input: PathBuf,
    pub started_at: DateTime<Utc>,
    pub hosts_added: usize,
    pub duplicates: usize,
    pub duration_seconds: f64,
}

/// Everything the summary is rendered from.
pub struct SummaryInput<'a> {
    pub run: &'a RunMetadata,
    pub dataset: &'a UnifiedDataset,
    pub catalog: &'a HostCatalog,
    pub report: &'a DisagreementReport,
    pub skipped: &'a [SkippedHost],
    /// Maximum number of disagreements listed in detail.
    pub limit: usize,
}

/// Generate the complete Markdown summary.
pub fn generate_markdown_summary(input: &SummaryInput<'_>) -> String {
    let mut output = String::new();

    output.push_str("# Fingerprint Consistency Report\n\n");
    output.push_str(&generate_metadata_section(input));
    output.push_str(&generate_hosts_section(input.dataset, input.catalog));
    output.push_str(&generate_fields_section(input.dataset, input.report));
    output.push_str(&generate_implicated_section(input.report, input.catalog, 10));
    output.push_str(&generate_skipped_section(input.skipped));
    output.push_str(&generate_disagreements_section(
        &input.report.disagreements,
        input.limit,
    ));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(input: &SummaryInput<'_>) -> String {
    let mut section = String::new();
    let run = input.run;
    let report = input.report;

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Input:** `{}`\n", run.input.display()));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Function Set:** `{}`\n", report.function_set));
    section.push_str(&format!(
        "- **Elapsed Times Compared:** {}\n",
        if report.include_elapsed { "yes" } else { "no" }
    ));
    section.push_str(&format!("- **Hosts Aggregated:** {}\n", input.catalog.len()));
    if run.hosts_added != input.catalog.len() {
        section.push_str(&format!("- **Hosts Added This Run:** {}\n", run.hosts_added));
    }
    if run.duplicates > 0 {
        section.push_str(&format!("- **Duplicate Hosts Ignored:** {}\n", run.duplicates));
    }
    if !input.skipped.is_empty() {
        section.push_str(&format!("- **Hosts Skipped:** {}\n", input.skipped.len()));
    }
    section.push_str(&format!(
        "- **Sample Indices:** {}\n",
        input.dataset.index_count()
    ));
    section.push_str(&format!(
        "- **Disagreements:** {} across {} indices\n",
        report.summary.total, report.summary.indices_affected
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        run.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_hosts_section(dataset: &UnifiedDataset, catalog: &HostCatalog) -> String {
    let mut section = String::new();

    section.push_str("## Hosts\n\n");
    if catalog.is_empty() {
        section.push_str("No hosts were aggregated.\n\n");
        return section;
    }

    section.push_str("| Host | OS | CPU | VM | Samples |\n");
    section.push_str("|:---|:---|:---|:---:|---:|\n");
    for (id, meta) in catalog.iter() {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} |\n",
            id,
            escape_cell(&meta.os_type),
            escape_cell(meta.cpu_label()),
            escape_cell(&meta.running_on_vm),
            dataset.host_samples(id).len()
        ));
    }
    section.push('\n');

    section
}

fn generate_fields_section(dataset: &UnifiedDataset, report: &DisagreementReport) -> String {
    let mut section = String::new();

    section.push_str("## Disagreements by Field\n\n");
    if report.disagreements.is_empty() {
        section.push_str("All hosts agree on every compared field. 🎉\n\n");
        return section;
    }

    section.push_str("| Field | Disagreements | First Index | Last Index |\n");
    section.push_str("|:---|---:|---:|---:|\n");

    for field in report.function_set.fields(report.include_elapsed) {
        let name = field.to_string();
        let count = report.summary.by_field.get(&name).copied().unwrap_or(0);
        if count == 0 {
            continue;
        }

        let series = inconsistency_series(dataset, &field);
        let mut disagreeing = series.iter().filter(|p| p.disagrees).map(|p| p.i);
        let first = disagreeing.next();
        let last = disagreeing.last().or(first);

        section.push_str(&format!(
            "| `{}` | {} | {} | {} |\n",
            name,
            count,
            format_index(first),
            format_index(last)
        ));
    }
    section.push('\n');

    section
}

fn generate_implicated_section(
    report: &DisagreementReport,
    catalog: &HostCatalog,
    limit: usize,
) -> String {
    if report.summary.by_host.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Most Implicated Hosts\n\n");
    section.push_str("| Host | CPU | Disagreements |\n");
    section.push_str("|:---|:---|---:|\n");

    let mut hosts: Vec<(&HostId, &usize)> = report.summary.by_host.iter().collect();
    hosts.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

    for (id, count) in hosts.into_iter().take(limit) {
        let cpu = catalog.get(id).map(|m| m.cpu_label()).unwrap_or("?");
        section.push_str(&format!("| `{}` | {} | {} |\n", id, escape_cell(cpu), count));
    }
    section.push('\n');

    section
}

fn generate_skipped_section(skipped: &[SkippedHost]) -> String {
    if skipped.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Skipped Hosts\n\n");
    for host in skipped {
        section.push_str(&format!("- `{}`: {}\n", host.source, host.reason));
    }
    section.push('\n');

    section
}

fn generate_disagreements_section(records: &[DisagreementRecord], limit: usize) -> String {
    if records.is_empty() || limit == 0 {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Disagreements\n\n");
    if records.len() > limit {
        section.push_str(&format!(
            "*Showing the first {} of {} disagreements.*\n\n",
            limit,
            records.len()
        ));
    }

    for record in records.iter().take(limit) {
        section.push_str(&generate_disagreement_block(record));
    }

    section
}

fn generate_disagreement_block(record: &DisagreementRecord) -> String {
    let mut block = String::new();

    block.push_str(&format!("### i = {} · `{}`\n\n", record.i, record.function));

    for (value, hosts) in record.value_groups() {
        let hosts: Vec<String> = hosts.iter().map(|h| format!("`{}`", h)).collect();
        block.push_str(&format!("- `{}`: {}\n", value, hosts.join(", ")));
    }
    block.push('\n');

    block
}

fn generate_footer() -> String {
    "---\n\n*Report generated by fpanalyzer*\n".to_string()
}

fn format_index(i: Option<u64>) -> String {
    i.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string())
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
