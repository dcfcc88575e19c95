//! End-of-run summary: restarts, jobs, errors, versions and config lint.

pub mod model;
pub mod aggregate;
pub mod lint;
pub mod version;

pub use aggregate::SummaryAggregator;
