//! Blocking entry point: selection, build, solve and extraction with progress.

use solar_storage_model::ScenarioParameters;
use tracing::{error, info, instrument, warn};

use crate::general::time_series::HourlyProfiles;
use crate::sizing::capability::Capabilities;
use crate::sizing::config::{
    OptimizationMode, RepresentativeDays, SizingConfig, TimeoutPolicy, validate_scenario,
};
use crate::sizing::error::{Result, SizingError};
use crate::sizing::extractor::{ExtractOptions, Solution, extract_solution};
use crate::sizing::model_builder::{BuildOptions, build_model};
use crate::sizing::progress::{Phase, ProgressReporter};
use crate::sizing::representative_days::{scale_factor, select_representative_days};
use crate::sizing::solver::{SolveStatus, SolverAdapter, SolverErrorReason, SolverOutcome};
use crate::sizing::task::TaskContext;

/// Runs one sizing task with the backend chosen by `config.solver`.
///
/// Progress goes to `ctx.sink`; on failure the task ends in `Failed` with the
/// error message and no partial solution is returned.
///
/// ```no_run
/// use solar_storage_model::ScenarioParameters;
/// use solar_storage_opt::general::time_series::{LengthPolicy, load_profiles};
/// use solar_storage_opt::sizing::{SizingConfig, TaskContext, engine};
///
/// let profiles = load_profiles("production.csv", "price.csv", LengthPolicy::Calendar)?;
/// let scenario: ScenarioParameters =
///     serde_json::from_str(&std::fs::read_to_string("scenario.json")?)?;
/// let (ctx, slot) = TaskContext::with_slot("task-1");
/// let solution = engine::run(&ctx, &profiles, &scenario, &SizingConfig::default())?;
/// println!("NPV {:.0}, progress {:?}", solution.npv, slot.payload());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn run(
    ctx: &TaskContext,
    profiles: &HourlyProfiles,
    scenario: &ScenarioParameters,
    config: &SizingConfig,
) -> Result<Solution> {
    let adapter = SolverAdapter::for_choice(config.solver, config.mode);
    run_with_adapter(ctx, profiles, scenario, config, &adapter)
}

/// Like [`run`] with an explicit solver adapter.
#[instrument(
    skip_all,
    name = "sizing_run",
    fields(task_id = %ctx.task_id, backend = adapter.backend_name())
)]
pub fn run_with_adapter(
    ctx: &TaskContext,
    profiles: &HourlyProfiles,
    scenario: &ScenarioParameters,
    config: &SizingConfig,
    adapter: &SolverAdapter,
) -> Result<Solution> {
    let mut reporter = ProgressReporter::new(ctx.sink.clone());

    match run_phases(ctx, &mut reporter, profiles, scenario, config, adapter) {
        Ok(solution) => {
            reporter.complete(&solution.to_result())?;
            info!(
                npv = solution.npv,
                pv_size_mw = solution.pv_size_mw,
                bess_size_mwh = solution.bess_size_mwh,
                "sizing task completed"
            );
            Ok(solution)
        }
        Err(err) => {
            error!(error = %err, kind = ?err.kind(), "sizing task failed");
            reporter.fail(err.to_string())?;
            Err(err)
        }
    }
}

fn run_phases(
    ctx: &TaskContext,
    reporter: &mut ProgressReporter,
    profiles: &HourlyProfiles,
    scenario: &ScenarioParameters,
    config: &SizingConfig,
    adapter: &SolverAdapter,
) -> Result<Solution> {
    ctx.cancel.check()?;
    reporter.enter(Phase::BuildingModel, "Selecting representative days")?;
    validate_scenario(scenario)?;

    if config.mode == OptimizationMode::MilpStrict && !adapter.supports_integer_variables() {
        return Err(SizingError::InvalidConfiguration(format!(
            "solver backend {} cannot run MilpStrict mode",
            adapter.backend_name()
        )));
    }

    let count = match config.representative_days {
        RepresentativeDays::FullYear => profiles.days(),
        RepresentativeDays::Count(count) => count,
    };
    let days = select_representative_days(profiles, count, config.distance_metric)?;
    info!(
        representative_days = days.len(),
        scale_factor = scale_factor(profiles.days(), days.len()),
        "representative days selected"
    );
    reporter.advance(0.3, "Building optimization model")?;

    let capabilities = Capabilities::from_config(config);
    let model = build_model(
        profiles,
        scenario,
        &capabilities,
        &days,
        &BuildOptions::from(config),
    )?;
    reporter.advance(1.0, "Optimization model built")?;

    ctx.cancel.check()?;
    reporter.enter(Phase::Solving, format!("Solving with {}", adapter.backend_name()))?;
    let outcome = adapter.solve_with_progress(model.problem, config.time_limit, |fraction| {
        // only fails outside Processing, which cannot happen here
        let _ = reporter.advance(fraction, "Solving");
    });
    check_status(&outcome, config.timeout_policy)?;

    ctx.cancel.check()?;
    reporter.enter(Phase::ExtractingFinancials, "Computing cash flows")?;
    extract_solution(
        &model.layout,
        &outcome,
        profiles,
        scenario,
        &capabilities,
        &ExtractOptions::from(config),
    )
}

/// Maps a non-optimal solve status onto the error taxonomy.
fn check_status(outcome: &SolverOutcome, policy: TimeoutPolicy) -> Result<()> {
    let elapsed_secs = outcome.elapsed.as_secs_f64();
    match &outcome.status {
        SolveStatus::Optimal => Ok(()),
        SolveStatus::FeasibleSuboptimal => match policy {
            TimeoutPolicy::AcceptIncumbent => {
                warn!(elapsed_secs, "time limit reached, using suboptimal incumbent");
                Ok(())
            }
            TimeoutPolicy::Fail => Err(SizingError::SolverTimeout {
                elapsed_secs,
                incumbent: true,
            }),
        },
        SolveStatus::Infeasible => Err(SizingError::SolverInfeasible),
        SolveStatus::Unbounded => Err(SizingError::SolverUnbounded),
        SolveStatus::SolverError(SolverErrorReason::Timeout) => Err(SizingError::SolverTimeout {
            elapsed_secs,
            incumbent: false,
        }),
        SolveStatus::SolverError(SolverErrorReason::Unsupported(msg)) => {
            Err(SizingError::InvalidConfiguration(msg.clone()))
        }
        SolveStatus::SolverError(SolverErrorReason::Backend(msg)) => {
            Err(SizingError::SolverFailed(msg.clone()))
        }
    }
}
