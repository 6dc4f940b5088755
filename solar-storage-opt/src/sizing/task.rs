use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::sizing::error::{Result, SizingError};
use crate::sizing::progress::{ProgressSink, ProgressSlot};

/// Cooperative cancellation flag, checked by the engine between phases.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) was called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SizingError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything the engine needs from the surrounding task runner.
#[derive(Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub sink: Arc<dyn ProgressSink>,
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(task_id: impl Into<String>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            task_id: task_id.into(),
            sink,
            cancel: CancellationToken::new(),
        }
    }

    /// Context backed by a fresh [`ProgressSlot`], returned alongside.
    pub fn with_slot(task_id: impl Into<String>) -> (Self, Arc<ProgressSlot>) {
        let slot = Arc::new(ProgressSlot::new());
        (Self::new(task_id, slot.clone()), slot)
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(SizingError::Cancelled));
    }
}
