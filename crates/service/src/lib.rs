// Storage, single-flight and CLI plumbing around the analytics engine.

// Core infrastructure
pub mod conf;
pub mod error;
pub mod metrics;
pub mod runtime;

// Domain modules
pub mod analysis;
pub mod companion;
pub mod flight;
pub mod sink;
pub mod state;
pub mod store;

pub use analysis::AnalysisReport;
pub use error::{ServiceError, ServiceResult};
pub use state::AppState;
