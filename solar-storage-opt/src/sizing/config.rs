use std::time::Duration;

use solar_storage_model::ScenarioParameters;

use crate::sizing::error::{Result, SizingError};
use crate::sizing::representative_days::DistanceMetric;

/// Whether battery charge/discharge exclusivity is enforced with binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationMode {
    /// Pure LP. Simultaneous charge and discharge is allowed.
    #[default]
    LpRelaxed,
    /// MILP with one binary battery mode per modeled hour.
    MilpStrict,
}

/// How many representative days stand in for the modeled year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepresentativeDays {
    /// Every day of the year represents itself.
    FullYear,
    Count(usize),
}

impl Default for RepresentativeDays {
    fn default() -> Self {
        RepresentativeDays::Count(12)
    }
}

/// State-of-charge continuity across representative days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocBoundary {
    /// Each representative day opens empty.
    #[default]
    DailyReset,
    /// SOC carries from one representative day to the next and across years.
    /// Requires equal day weights.
    Chained,
}

/// Backend used by the solver adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverChoice {
    /// Clarabel for LP, MicroLP for MILP.
    #[default]
    Auto,
    Clarabel,
    MicroLp,
    #[cfg(feature = "solver-highs")]
    Highs,
}

/// What to do when the time limit is hit while a feasible incumbent exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Return the incumbent flagged as suboptimal.
    #[default]
    AcceptIncumbent,
    /// Fail with a timeout error.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryKind {
    #[default]
    Idealized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PvKind {
    #[default]
    Idealized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinancialKind {
    #[default]
    Idealized,
}

/// Configuration of one sizing run
#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub mode: OptimizationMode,
    pub representative_days: RepresentativeDays,
    pub distance_metric: DistanceMetric,
    pub soc_boundary: SocBoundary,

    // Solver
    pub solver: SolverChoice,
    pub time_limit: Duration,
    pub timeout_policy: TimeoutPolicy,

    // Post-solve checks
    pub consistency_abs_tol: f64, // absolute NPV/objective tolerance
    pub consistency_rel_tol: f64, // relative to the objective magnitude
    pub simultaneous_flow_tol: f64, // MWh, below this a flow counts as zero

    // Capability models
    pub battery: BatteryKind,
    pub pv: PvKind,
    pub financial: FinancialKind,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            mode: OptimizationMode::LpRelaxed,
            representative_days: RepresentativeDays::Count(12),
            distance_metric: DistanceMetric::Standardized,
            soc_boundary: SocBoundary::DailyReset,

            solver: SolverChoice::Auto,
            time_limit: Duration::from_secs(300), // 5 minutes
            timeout_policy: TimeoutPolicy::AcceptIncumbent,

            consistency_abs_tol: 1e-6,
            consistency_rel_tol: 1e-6,
            simultaneous_flow_tol: 1e-6,

            battery: BatteryKind::Idealized,
            pv: PvKind::Idealized,
            financial: FinancialKind::Idealized,
        }
    }
}

fn finite_non_negative(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(SizingError::scenario(field, "must be finite"));
    }
    if value < 0.0 {
        return Err(SizingError::scenario(field, format!("must be >= 0, got {value}")));
    }
    Ok(())
}

/// Checks every scenario parameter against its domain.
pub fn validate_scenario(scenario: &ScenarioParameters) -> Result<()> {
    finite_non_negative("pv_capex_per_mw", scenario.pv_capex_per_mw)?;
    finite_non_negative("bess_capex_per_mwh", scenario.bess_capex_per_mwh)?;
    finite_non_negative("discount_rate", scenario.discount_rate)?;
    if scenario.discount_rate >= 1.0 {
        return Err(SizingError::scenario(
            "discount_rate",
            format!("must be below 1, got {}", scenario.discount_rate),
        ));
    }
    finite_non_negative("yoy_price_escalation_rate", scenario.yoy_price_escalation_rate)?;
    finite_non_negative(
        "interconnection_capacity_mw",
        scenario.interconnection_capacity_mw,
    )?;
    finite_non_negative("onsite_load_max_mw", scenario.onsite_load_max_mw)?;
    if !scenario.onsite_load_price_per_mwh.is_finite() {
        return Err(SizingError::scenario(
            "onsite_load_price_per_mwh",
            "must be finite",
        ));
    }
    for (field, ceiling) in [
        ("pv_max_size_mw", scenario.pv_max_size_mw),
        ("bess_max_size_mwh", scenario.bess_max_size_mwh),
    ] {
        if let Some(value) = ceiling {
            if !value.is_finite() || value <= 0.0 {
                return Err(SizingError::scenario(
                    field,
                    format!("must be finite and > 0 when given, got {value}"),
                ));
            }
        }
    }
    if scenario.project_horizon_years == 0 {
        return Err(SizingError::scenario(
            "project_horizon_years",
            "must be at least 1",
        ));
    }
    Ok(())
}
