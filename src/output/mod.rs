//! Output module for run summaries and collection reports
//!
//! This module handles:
//! - The end-of-run summary printed after every run
//! - Collection statistics computed from the output file

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, CollectionStatistics};
pub use summary::{format_summary, print_summary};
