//! Persistence for benchmark reports.
//!
//! Reports are written once a run finishes (or is cancelled) so they can be
//! listed and inspected later from the CLI. [`ReportStore`] is the seam;
//! [`FileReportStore`] keeps one pretty-printed JSON document per report.

pub mod reports;

pub use reports::{FileReportStore, ReportStore};
