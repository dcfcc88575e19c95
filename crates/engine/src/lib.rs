// Domain-driven module structure for the Klipper log analytics engine.

// Core infrastructure
pub mod config;
pub mod context;
pub mod error;
pub mod traits;

// Domain modules
pub mod telemetry;
pub mod classify;
pub mod summary;

pub use classify::event::Event;
pub use classify::machine::{analyze, Classifier, RunOutcome};
pub use config::CapacityModel;
pub use error::{EngineError, EngineResult};
pub use summary::model::RunSummary;
pub use traits::{BuildConfigFormatter, EventSink, PassthroughFormatter};
