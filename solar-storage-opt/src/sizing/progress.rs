//! Task state machine and progress publication.
//!
//! `Pending -> Processing(BuildingModel -> Solving -> ExtractingFinancials)
//! -> Completed | Failed`. Percent never decreases and every published
//! snapshot carries the whole state, percent and message triple.

use std::fmt;
use std::sync::{Arc, RwLock};

use solar_storage_model::{OptimizationResult, ProgressPayload, TaskStatus};
use tracing::debug;

use crate::sizing::error::{Result, SizingError};

/// Processing phase with its percent band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Representative day selection and model construction, 0 to 10%.
    BuildingModel,
    /// 10 to 70%.
    Solving,
    /// 70 to 100%.
    ExtractingFinancials,
}

impl Phase {
    pub fn band(self) -> (u8, u8) {
        match self {
            Phase::BuildingModel => (0, 10),
            Phase::Solving => (10, 70),
            Phase::ExtractingFinancials => (70, 100),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Phase::BuildingModel => "building model",
            Phase::Solving => "solving",
            Phase::ExtractingFinancials => "extracting financials",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Processing(Phase),
    Completed,
    Failed,
}

impl TaskState {
    pub fn status(self) -> TaskStatus {
        match self {
            TaskState::Pending => TaskStatus::Pending,
            TaskState::Processing(_) => TaskStatus::Processing,
            TaskState::Completed => TaskStatus::Completed,
            TaskState::Failed => TaskStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Processing(phase) => write!(f, "processing ({})", phase.label()),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub state: TaskState,
    /// 0 to 100.
    pub percent: u8,
    pub message: String,
}

impl ProgressSnapshot {
    pub fn to_payload(&self) -> ProgressPayload {
        ProgressPayload {
            status: self.state.status(),
            progress: self.percent,
            message: self.message.clone(),
        }
    }
}

/// Receiver of progress snapshots, e.g. a task-store slot polled by clients.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, snapshot: &ProgressSnapshot);

    /// Called once with the result after the task completed.
    fn finish(&self, _result: &OptimizationResult) {}
}

/// In-process sink holding the latest snapshot and the final result.
#[derive(Debug)]
pub struct ProgressSlot {
    snapshot: RwLock<ProgressSnapshot>,
    result: RwLock<Option<OptimizationResult>>,
}

impl ProgressSlot {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(ProgressSnapshot {
                state: TaskState::Pending,
                percent: 0,
                message: "Queued".to_string(),
            }),
            result: RwLock::new(None),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn payload(&self) -> ProgressPayload {
        self.snapshot().to_payload()
    }

    pub fn result(&self) -> Option<OptimizationResult> {
        match self.result.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for ProgressSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressSlot {
    fn publish(&self, snapshot: &ProgressSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot.clone(),
            Err(poisoned) => *poisoned.into_inner() = snapshot.clone(),
        }
    }

    fn finish(&self, result: &OptimizationResult) {
        match self.result.write() {
            Ok(mut guard) => *guard = Some(result.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(result.clone()),
        }
    }
}

/// Drives the state machine of one task and forwards each change to a sink.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    current: ProgressSnapshot,
}

impl ProgressReporter {
    /// Starts in `Pending` at 0% and publishes that state.
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        let current = ProgressSnapshot {
            state: TaskState::Pending,
            percent: 0,
            message: "Queued".to_string(),
        };
        sink.publish(&current);
        Self { sink, current }
    }

    pub fn current(&self) -> &ProgressSnapshot {
        &self.current
    }

    fn transition_error(&self, to: impl fmt::Display) -> SizingError {
        SizingError::InvalidTransition {
            from: self.current.state.to_string(),
            to: to.to_string(),
        }
    }

    fn publish(&mut self, state: TaskState, percent: u8, message: impl Into<String>) {
        self.current = ProgressSnapshot {
            state,
            percent: percent.max(self.current.percent),
            message: message.into(),
        };
        debug!(
            state = %self.current.state,
            percent = self.current.percent,
            message = %self.current.message,
            "progress"
        );
        self.sink.publish(&self.current);
    }

    /// Enters the next phase; phases cannot be skipped or repeated.
    pub fn enter(&mut self, phase: Phase, message: impl Into<String>) -> Result<()> {
        let allowed = match self.current.state {
            TaskState::Pending => phase == Phase::BuildingModel,
            TaskState::Processing(Phase::BuildingModel) => phase == Phase::Solving,
            TaskState::Processing(Phase::Solving) => phase == Phase::ExtractingFinancials,
            _ => false,
        };
        if !allowed {
            return Err(self.transition_error(TaskState::Processing(phase)));
        }
        self.publish(TaskState::Processing(phase), phase.band().0, message);
        Ok(())
    }

    /// Moves within the current phase band; `fraction` is clamped to 0..=1.
    pub fn advance(&mut self, fraction: f64, message: impl Into<String>) -> Result<()> {
        let TaskState::Processing(phase) = self.current.state else {
            return Err(self.transition_error("progress update"));
        };
        let (low, high) = phase.band();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let percent = low + (fraction * f64::from(high - low)).round() as u8;
        self.publish(self.current.state, percent, message);
        Ok(())
    }

    /// Final success transition, only valid after financial extraction began.
    ///
    /// The result reaches the sink before the `Completed` snapshot does.
    pub fn complete(&mut self, result: &OptimizationResult) -> Result<()> {
        if self.current.state != TaskState::Processing(Phase::ExtractingFinancials) {
            return Err(self.transition_error(TaskState::Completed));
        }
        self.sink.finish(result);
        self.publish(TaskState::Completed, 100, "Optimization complete");
        Ok(())
    }

    /// Terminal failure; keeps the percent reached so far.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        if self.current.state.is_terminal() {
            return Err(self.transition_error(TaskState::Failed));
        }
        self.publish(TaskState::Failed, self.current.percent, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressSnapshot>>);

    impl ProgressSink for Recorder {
        fn publish(&self, snapshot: &ProgressSnapshot) {
            self.0.lock().unwrap().push(snapshot.clone());
        }
    }

    fn sample_result() -> OptimizationResult {
        OptimizationResult {
            optimal_pv_size_mw: 0.0,
            optimal_bess_size_mwh: 0.0,
            npv: 0.0,
            irr: None,
            capex_total: 0.0,
            monthly_revenues: Vec::new(),
            total_revenue_over_horizon: 0.0,
            representative_days_used: None,
            scale_factor: None,
        }
    }

    #[test]
    fn full_lifecycle_is_monotone() {
        let recorder = Arc::new(Recorder::default());
        let mut reporter = ProgressReporter::new(recorder.clone());
        reporter.enter(Phase::BuildingModel, "Building").unwrap();
        reporter.advance(0.5, "Selected days").unwrap();
        reporter.enter(Phase::Solving, "Solving").unwrap();
        reporter.advance(0.5, "Solving").unwrap();
        reporter.advance(0.2, "Solving").unwrap();
        reporter.enter(Phase::ExtractingFinancials, "Financials").unwrap();
        reporter.complete(&sample_result()).unwrap();

        let snapshots = recorder.0.lock().unwrap();
        let percents: Vec<u8> = snapshots.iter().map(|s| s.percent).collect();
        assert_eq!(percents, vec![0, 0, 5, 10, 40, 40, 70, 100]);
        assert_eq!(snapshots.last().unwrap().state, TaskState::Completed);
        assert_eq!(snapshots[0].state, TaskState::Pending);
    }

    #[test]
    fn phases_cannot_be_skipped() {
        let mut reporter = ProgressReporter::new(Arc::new(ProgressSlot::new()));
        let err = reporter.enter(Phase::Solving, "Solving").unwrap_err();
        assert!(matches!(err, SizingError::InvalidTransition { .. }));
        assert!(reporter.advance(0.5, "early").is_err());
        assert!(reporter.complete(&sample_result()).is_err());

        reporter.enter(Phase::BuildingModel, "Building").unwrap();
        assert!(reporter.enter(Phase::BuildingModel, "again").is_err());
        assert!(reporter.enter(Phase::ExtractingFinancials, "skip").is_err());
    }

    #[test]
    fn failure_is_terminal_and_keeps_percent() {
        let slot = Arc::new(ProgressSlot::new());
        let mut reporter = ProgressReporter::new(slot.clone());
        reporter.enter(Phase::BuildingModel, "Building").unwrap();
        reporter.enter(Phase::Solving, "Solving").unwrap();
        reporter.advance(0.5, "Solving").unwrap();
        reporter.fail("optimization problem is infeasible").unwrap();

        let payload = slot.payload();
        assert_eq!(payload.status, TaskStatus::Failed);
        assert_eq!(payload.progress, 40);
        assert_eq!(payload.message, "optimization problem is infeasible");
        assert!(reporter.fail("twice").is_err());
        assert!(reporter.enter(Phase::ExtractingFinancials, "late").is_err());
    }

    /// Forwards to a slot and records whether the result was readable when
    /// `Completed` was published.
    #[derive(Default)]
    struct PollingClient {
        slot: ProgressSlot,
        result_seen_on_completion: Mutex<Option<bool>>,
    }

    impl ProgressSink for PollingClient {
        fn publish(&self, snapshot: &ProgressSnapshot) {
            self.slot.publish(snapshot);
            if snapshot.state == TaskState::Completed {
                *self.result_seen_on_completion.lock().unwrap() =
                    Some(self.slot.result().is_some());
            }
        }

        fn finish(&self, result: &OptimizationResult) {
            self.slot.finish(result);
        }
    }

    #[test]
    fn completed_status_is_never_visible_without_result() {
        let client = Arc::new(PollingClient::default());
        let mut reporter = ProgressReporter::new(client.clone());
        reporter.enter(Phase::BuildingModel, "Building").unwrap();
        reporter.enter(Phase::Solving, "Solving").unwrap();
        reporter.enter(Phase::ExtractingFinancials, "Financials").unwrap();
        reporter.complete(&sample_result()).unwrap();

        assert_eq!(*client.result_seen_on_completion.lock().unwrap(), Some(true));
        assert_eq!(client.slot.payload().status, TaskStatus::Completed);
    }

    #[test]
    fn slot_stores_result_on_completion() {
        let slot = Arc::new(ProgressSlot::new());
        assert_eq!(slot.payload().status, TaskStatus::Pending);
        let mut reporter = ProgressReporter::new(slot.clone());
        reporter.enter(Phase::BuildingModel, "Building").unwrap();
        reporter.enter(Phase::Solving, "Solving").unwrap();
        reporter.enter(Phase::ExtractingFinancials, "Financials").unwrap();
        assert!(slot.result().is_none());
        reporter.complete(&sample_result()).unwrap();
        assert_eq!(slot.result(), Some(sample_result()));
        assert_eq!(slot.payload().progress, 100);
    }
}
