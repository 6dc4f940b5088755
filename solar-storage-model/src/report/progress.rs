use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Externally visible task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./progress.ts")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Progress record polled by clients while a task runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./progress.ts")]
pub struct ProgressPayload {
    pub status: TaskStatus,
    /// Percent complete, 0 to 100.
    pub progress: u8,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_lowercase_on_the_wire() {
        let payload = ProgressPayload {
            status: TaskStatus::Processing,
            progress: 42,
            message: "Solving".to_string(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["status"], "processing");
        assert_eq!(value["progress"], 42);
    }
}
