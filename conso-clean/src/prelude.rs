//! Prelude for commonly used types and traits in conso-clean.

pub use crate::config::{ConsumptionBounds, EngineConfig, StageConfig};
pub use crate::context::CleaningContext;
pub use crate::error::{CleanError, Result};
pub use crate::logging::{FileMode, LoggingConfig};
pub use crate::report::CleaningReport;
pub use crate::resources::{ResourceProbe, ResourceSnapshot};
pub use crate::stage::run_cleaning_stage;
