//! Report output.
//!
//! JSON documents for the dataset, hosts and disagreements, plus an
//! optional Markdown summary.

pub mod generator;
pub mod store;

pub use generator::{generate_markdown_summary, RunMetadata, SummaryInput};
pub use store::{
    load_dataset, load_hosts, save_dataset, save_hosts, save_report, save_text,
    DisagreementReport,
};
