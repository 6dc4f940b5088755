//! PV and battery sizing: representative days, LP/MILP construction, solving
//! under a time limit, and financial extraction with progress reporting.

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod model_builder;
pub mod plot;
pub mod progress;
pub mod representative_days;
pub mod solver;
pub mod task;

pub use capability::Capabilities;
pub use config::{OptimizationMode, RepresentativeDays, SizingConfig, SolverChoice, TimeoutPolicy};
pub use engine::run;
pub use error::{ErrorKind, Result, SizingError};
pub use extractor::Solution;
pub use progress::{ProgressSink, ProgressSlot, ProgressSnapshot, TaskState};
pub use task::{CancellationToken, TaskContext};
