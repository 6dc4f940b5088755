//! Backend-agnostic solving with a wall-clock budget.
//!
//! Shipped backends stop themselves at the time limit and return their
//! incumbent, if any. The backend runs on a worker thread while the adapter
//! waits on a channel, so even a backend that overruns its limit never blocks
//! the caller past the budget plus a short grace. A result arriving after that
//! is dropped with the worker.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use good_lp::{
    Constraint, Expression, ResolutionError, Solution, SolutionStatus, SolverModel, Variable,
    WithTimeLimit,
};
use tracing::{debug, info, warn};

use crate::sizing::config::{OptimizationMode, SolverChoice};
use crate::sizing::model_builder::LinearProblem;

/// Why a solve produced no usable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverErrorReason {
    /// The time limit expired before the backend returned.
    Timeout,
    /// The backend cannot handle this problem, e.g. integers on an LP-only solver.
    Unsupported(String),
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    /// A feasible incumbent returned when the backend hit its own time limit.
    FeasibleSuboptimal,
    Infeasible,
    Unbounded,
    SolverError(SolverErrorReason),
}

impl SolveStatus {
    pub fn has_values(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::FeasibleSuboptimal)
    }
}

/// Outcome of [`SolverAdapter::solve`].
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    pub status: SolveStatus,
    /// Column values in [`LinearProblem`] order, empty without a solution.
    pub values: Vec<f64>,
    pub objective_value: Option<f64>,
    pub elapsed: Duration,
    pub backend: &'static str,
}

/// Values returned by a backend.
#[derive(Debug, Clone)]
pub struct BackendSolution {
    pub values: Vec<f64>,
    pub objective_value: f64,
    /// The backend stopped on its own time limit with a feasible incumbent.
    pub reached_time_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendFailure {
    Infeasible,
    Unbounded,
    /// The native time limit expired before a feasible solution was found.
    TimeLimit,
    Other(String),
}

impl From<ResolutionError> for BackendFailure {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::Infeasible => BackendFailure::Infeasible,
            ResolutionError::Unbounded => BackendFailure::Unbounded,
            other => BackendFailure::Other(other.to_string()),
        }
    }
}

/// A concrete LP/MILP solver.
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports_integer_variables(&self) -> bool;

    /// True if the backend stops by itself at `time_limit`.
    fn supports_time_limit(&self) -> bool {
        false
    }

    /// Maximizes the problem objective.
    fn solve(
        &self,
        problem: LinearProblem,
        time_limit: Duration,
    ) -> Result<BackendSolution, BackendFailure>;
}

/// Native limit in seconds, `None` when the budget is effectively unlimited.
fn native_limit_secs(time_limit: Duration) -> Option<f64> {
    let secs = time_limit.as_secs_f64();
    (secs < 1e9).then_some(secs)
}

/// Adds the constraints, solves and reads every column back.
fn solve_model<M>(
    mut model: M,
    constraints: Vec<Constraint>,
    columns: &[Variable],
    objective: &Expression,
) -> Result<BackendSolution, BackendFailure>
where
    M: SolverModel<Error = ResolutionError>,
{
    for c in constraints {
        model = model.with(c);
    }
    let solution = model.solve().map_err(|err| match err {
        ResolutionError::Other(msg) if msg.starts_with("Time limit") => BackendFailure::TimeLimit,
        other => BackendFailure::from(other),
    })?;
    Ok(BackendSolution {
        values: columns.iter().map(|&var| solution.value(var)).collect(),
        objective_value: objective.eval_with(&solution),
        reached_time_limit: matches!(solution.status(), SolutionStatus::TimeLimit),
    })
}

/// Clarabel interior-point solver, continuous problems only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClarabelBackend;

impl SolverBackend for ClarabelBackend {
    fn name(&self) -> &'static str {
        "clarabel"
    }

    fn supports_integer_variables(&self) -> bool {
        false
    }

    fn supports_time_limit(&self) -> bool {
        true
    }

    fn solve(
        &self,
        problem: LinearProblem,
        time_limit: Duration,
    ) -> Result<BackendSolution, BackendFailure> {
        let LinearProblem {
            variables,
            objective,
            constraints,
            columns,
            ..
        } = problem;
        let mut model = variables.maximise(objective.clone()).using(good_lp::clarabel);
        if let Some(secs) = native_limit_secs(time_limit) {
            model.settings().time_limit(secs);
        }
        solve_model(model, constraints, &columns, &objective)
    }
}

/// MicroLP simplex with branch and bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLpBackend;

impl SolverBackend for MicroLpBackend {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn supports_integer_variables(&self) -> bool {
        true
    }

    fn supports_time_limit(&self) -> bool {
        true
    }

    fn solve(
        &self,
        problem: LinearProblem,
        time_limit: Duration,
    ) -> Result<BackendSolution, BackendFailure> {
        let LinearProblem {
            variables,
            objective,
            constraints,
            columns,
            ..
        } = problem;
        let mut model = variables.maximise(objective.clone()).using(good_lp::microlp);
        if let Some(secs) = native_limit_secs(time_limit) {
            model = model.with_time_limit(secs);
        }
        solve_model(model, constraints, &columns, &objective)
    }
}

/// HiGHS with its native time limit.
#[cfg(feature = "solver-highs")]
#[derive(Debug, Clone, Copy, Default)]
pub struct HighsBackend;

#[cfg(feature = "solver-highs")]
impl SolverBackend for HighsBackend {
    fn name(&self) -> &'static str {
        "highs"
    }

    fn supports_integer_variables(&self) -> bool {
        true
    }

    fn supports_time_limit(&self) -> bool {
        true
    }

    fn solve(
        &self,
        problem: LinearProblem,
        time_limit: Duration,
    ) -> Result<BackendSolution, BackendFailure> {
        let LinearProblem {
            variables,
            objective,
            constraints,
            columns,
            ..
        } = problem;
        let mut model = variables.maximise(objective.clone()).using(good_lp::highs);
        if let Some(secs) = native_limit_secs(time_limit) {
            model = model.with_time_limit(secs);
        }
        solve_model(model, constraints, &columns, &objective)
    }
}

/// Runs a [`SolverBackend`] under a time limit.
#[derive(Clone)]
pub struct SolverAdapter {
    backend: Arc<dyn SolverBackend>,
    tick: Duration,
    grace: Duration,
}

impl std::fmt::Debug for SolverAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverAdapter")
            .field("backend", &self.backend.name())
            .field("tick", &self.tick)
            .finish()
    }
}

impl SolverAdapter {
    pub fn new(backend: Arc<dyn SolverBackend>) -> Self {
        Self {
            backend,
            tick: Duration::from_millis(250),
            grace: Duration::from_secs(2),
        }
    }

    /// Adapter for a configured backend choice; `Auto` depends on `mode`.
    pub fn for_choice(choice: SolverChoice, mode: OptimizationMode) -> Self {
        let backend: Arc<dyn SolverBackend> = match (choice, mode) {
            (SolverChoice::Auto, OptimizationMode::LpRelaxed) | (SolverChoice::Clarabel, _) => {
                Arc::new(ClarabelBackend)
            }
            (SolverChoice::Auto, OptimizationMode::MilpStrict) | (SolverChoice::MicroLp, _) => {
                Arc::new(MicroLpBackend)
            }
            #[cfg(feature = "solver-highs")]
            (SolverChoice::Highs, _) => Arc::new(HighsBackend),
        };
        Self::new(backend)
    }

    /// Interval at which progress callbacks fire while waiting.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn supports_integer_variables(&self) -> bool {
        self.backend.supports_integer_variables()
    }

    pub fn solve(&self, problem: LinearProblem, time_limit: Duration) -> SolverOutcome {
        self.solve_with_progress(problem, time_limit, |_| {})
    }

    /// Like [`solve`](Self::solve), calling `on_tick` with the elapsed share of
    /// the budget (0 to 1) while the backend works.
    pub fn solve_with_progress(
        &self,
        problem: LinearProblem,
        time_limit: Duration,
        mut on_tick: impl FnMut(f64),
    ) -> SolverOutcome {
        let backend_name = self.backend.name();
        let started = Instant::now();
        let outcome = |status: SolveStatus, solution: Option<BackendSolution>| {
            let (values, objective_value) = match solution {
                Some(s) => (s.values, Some(s.objective_value)),
                None => (Vec::new(), None),
            };
            SolverOutcome {
                status,
                values,
                objective_value,
                elapsed: started.elapsed(),
                backend: backend_name,
            }
        };

        if problem.has_integer_columns() && !self.backend.supports_integer_variables() {
            return outcome(
                SolveStatus::SolverError(SolverErrorReason::Unsupported(format!(
                    "{backend_name} does not support integer variables"
                ))),
                None,
            );
        }

        info!(
            backend = backend_name,
            columns = problem.column_count(),
            constraints = problem.constraint_count(),
            time_limit_secs = time_limit.as_secs_f64(),
            "starting solve"
        );

        let (tx, rx) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        let spawned = std::thread::Builder::new()
            .name(format!("{backend_name}-solver"))
            .spawn(move || {
                let result = backend.solve(problem, time_limit);
                // the receiver is gone after a timeout
                let _ = tx.send(result);
            });
        if let Err(err) = spawned {
            return outcome(
                SolveStatus::SolverError(SolverErrorReason::Backend(format!(
                    "failed to start solver thread: {err}"
                ))),
                None,
            );
        }

        let budget = if self.backend.supports_time_limit() {
            time_limit.saturating_add(self.grace)
        } else {
            time_limit
        };
        // no deadline if the budget overflows Instant
        let deadline = started.checked_add(budget);

        loop {
            let now = Instant::now();
            let remaining = deadline.map_or(self.tick, |d| d.saturating_duration_since(now));
            if remaining.is_zero() {
                warn!(
                    backend = backend_name,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "solver time limit exceeded"
                );
                return outcome(SolveStatus::SolverError(SolverErrorReason::Timeout), None);
            }
            match rx.recv_timeout(self.tick.min(remaining)) {
                Ok(Ok(solution)) => {
                    let status = if solution.reached_time_limit {
                        SolveStatus::FeasibleSuboptimal
                    } else {
                        SolveStatus::Optimal
                    };
                    let result = outcome(status, Some(solution));
                    info!(
                        backend = backend_name,
                        status = ?result.status,
                        objective = result.objective_value,
                        elapsed_ms = result.elapsed.as_millis() as u64,
                        "solve finished"
                    );
                    return result;
                }
                Ok(Err(failure)) => {
                    debug!(backend = backend_name, ?failure, "solve failed");
                    let status = match failure {
                        BackendFailure::Infeasible => SolveStatus::Infeasible,
                        BackendFailure::Unbounded => SolveStatus::Unbounded,
                        BackendFailure::TimeLimit => {
                            warn!(
                                backend = backend_name,
                                elapsed_secs = started.elapsed().as_secs_f64(),
                                "solver stopped at its time limit without a solution"
                            );
                            SolveStatus::SolverError(SolverErrorReason::Timeout)
                        }
                        BackendFailure::Other(msg) => {
                            SolveStatus::SolverError(SolverErrorReason::Backend(msg))
                        }
                    };
                    return outcome(status, None);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let fraction =
                        started.elapsed().as_secs_f64() / time_limit.as_secs_f64().max(1e-9);
                    on_tick(fraction.min(1.0));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return outcome(
                        SolveStatus::SolverError(SolverErrorReason::Backend(
                            "solver thread terminated without a result".to_string(),
                        )),
                        None,
                    );
                }
            }
        }
    }
}
