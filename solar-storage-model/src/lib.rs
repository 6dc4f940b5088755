pub mod report;
pub mod scenario;

pub use report::progress::{ProgressPayload, TaskStatus};
pub use report::result::{MonthlyRevenue, OptimizationResult};
pub use scenario::ScenarioParameters;
