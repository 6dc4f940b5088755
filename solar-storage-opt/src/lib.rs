pub mod general;
pub mod sizing;

// Re-export commonly used items for convenience
pub use general::time_series::{HourlyProfiles, LengthPolicy, load_profiles};
pub use sizing::{SizingConfig, Solution, TaskContext, run};
