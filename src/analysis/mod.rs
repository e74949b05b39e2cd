//! Analysis modules.
//!
//! Aggregation of per-host records and cross-host consistency detection.

pub mod aggregator;
pub mod detector;

pub use aggregator::{Admission, Aggregator};
pub use detector::{detect, inconsistency_series, DetectorOptions};
