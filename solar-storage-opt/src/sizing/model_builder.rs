//! Construction of the PV + battery sizing and dispatch program.
//!
//! Modeled hours are laid out year-major, then by representative day, then by
//! hour of day. Each modeled hour carries six non-negative energy flows and an
//! end-of-hour state of charge; `MilpStrict` adds one binary battery mode.

use good_lp::{Constraint, Expression, ProblemVariables, Variable, constraint, variable};
use solar_storage_model::ScenarioParameters;
use tracing::{info, instrument, warn};

use crate::general::calendar::HOURS_PER_DAY;
use crate::general::time_series::HourlyProfiles;
use crate::sizing::capability::Capabilities;
use crate::sizing::config::{OptimizationMode, SizingConfig, SocBoundary, validate_scenario};
use crate::sizing::error::{Result, SizingError};
use crate::sizing::representative_days::RepresentativeDay;

/// Index of a decision variable in [`LinearProblem`] column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column(pub(crate) usize);

impl Column {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Solver-agnostic program: variables, objective (maximized) and constraints.
pub struct LinearProblem {
    pub(crate) variables: ProblemVariables,
    pub(crate) objective: Expression,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) columns: Vec<Variable>,
    pub(crate) integer_columns: usize,
}

impl LinearProblem {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn integer_column_count(&self) -> usize {
        self.integer_columns
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn has_integer_columns(&self) -> bool {
        self.integer_columns > 0
    }
}

impl std::fmt::Debug for LinearProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearProblem")
            .field("columns", &self.column_count())
            .field("integer_columns", &self.integer_columns)
            .field("constraints", &self.constraint_count())
            .finish()
    }
}

/// Columns of one modeled hour.
#[derive(Debug, Clone, Copy)]
pub struct HourColumns {
    pub pv_to_grid: Column,
    pub pv_to_onsite: Column,
    pub pv_to_battery: Column,
    pub battery_to_grid: Column,
    pub battery_to_onsite: Column,
    pub grid_to_battery: Column,
    pub soc: Column,
    pub battery_mode: Option<Column>,
}

/// One representative hour in one project year, with the coefficients used
/// for it in the objective.
#[derive(Debug, Clone)]
pub struct ModeledHour {
    /// Project year, starting at 1.
    pub year: u32,
    /// Position in the representative day list.
    pub day_index: usize,
    pub hour_of_day: usize,
    /// Real days represented.
    pub weight: f64,
    /// Escalated grid price.
    pub grid_price: f64,
    /// Escalated on-site price.
    pub onsite_price: f64,
    /// Production per installed MW after the PV capability factor.
    pub production_per_mw: f64,
    pub columns: HourColumns,
}

/// Maps columns back to physical quantities.
#[derive(Debug, Clone)]
pub struct ModelLayout {
    pub pv_size: Column,
    pub bess_size: Column,
    pub hours: Vec<ModeledHour>,
    pub representative_days: Vec<RepresentativeDay>,
    pub horizon_years: u32,
    pub mode: OptimizationMode,
    pub soc_boundary: SocBoundary,
    /// Gate constant of the exclusivity constraints, `None` in LP mode.
    pub big_m: Option<f64>,
}

/// Program plus layout, ready for the solver adapter.
#[derive(Debug)]
pub struct DispatchModel {
    pub problem: LinearProblem,
    pub layout: ModelLayout,
}

/// Options of [`build_model`] taken from the run configuration.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub mode: OptimizationMode,
    pub soc_boundary: SocBoundary,
}

impl From<&SizingConfig> for BuildOptions {
    fn from(config: &SizingConfig) -> Self {
        Self {
            mode: config.mode,
            soc_boundary: config.soc_boundary,
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from(&SizingConfig::default())
    }
}

/// Discount factor of project year `year` (end-of-year convention).
pub fn discount_factor(discount_rate: f64, year: u32) -> f64 {
    (1.0 + discount_rate).powi(-(year as i32))
}

/// Price escalation factor of project year `year`; year 1 is unescalated.
pub fn escalation_factor(escalation_rate: f64, year: u32) -> f64 {
    (1.0 + escalation_rate).powi(year as i32 - 1)
}

struct ColumnAllocator {
    variables: ProblemVariables,
    columns: Vec<Variable>,
    integer_columns: usize,
}

impl ColumnAllocator {
    fn new() -> Self {
        Self {
            variables: ProblemVariables::new(),
            columns: Vec::new(),
            integer_columns: 0,
        }
    }

    fn non_negative(&mut self) -> Column {
        let var = self.variables.add(variable().min(0.0));
        self.columns.push(var);
        Column(self.columns.len() - 1)
    }

    fn binary(&mut self) -> Column {
        let var = self.variables.add(variable().binary());
        self.columns.push(var);
        self.integer_columns += 1;
        Column(self.columns.len() - 1)
    }

    fn var(&self, column: Column) -> Variable {
        self.columns[column.0]
    }
}

/// Gate constant `M` of the exclusivity constraints.
///
/// Discharge per hour never exceeds the export plus on-site caps. Charge is
/// bounded by the battery ceiling when one is given, and by the energy that
/// can still be delivered before the SOC chain ends (one day under
/// `DailyReset`), since with non-negative prices charging more only adds cost.
fn exclusivity_bound(
    scenario: &ScenarioParameters,
    capabilities: &Capabilities,
    horizon_years: u32,
    chain_hours: usize,
    min_price: f64,
) -> Result<f64> {
    let battery = &capabilities.battery;
    let discharge_bound = scenario.interconnection_capacity_mw + scenario.onsite_load_max_mw;

    let ceiling_bound = scenario.bess_max_size_mwh.map(|bess_max| {
        let max_capacity_factor = (1..=horizon_years)
            .map(|year| battery.capacity_factor(year))
            .fold(0.0_f64, f64::max);
        bess_max * max_capacity_factor / battery.charge_efficiency()
    });

    let round_trip = battery.charge_efficiency()
        * battery.discharge_efficiency()
        * battery
            .hourly_retention()
            .powi(i32::try_from(chain_hours).unwrap_or(i32::MAX));
    let flow = chain_hours as f64 * discharge_bound / round_trip;
    let flow_bound = flow.is_finite().then_some(flow);

    let charge_bound = match (ceiling_bound, flow_bound) {
        (Some(ceiling), Some(flow)) => ceiling.min(flow),
        (Some(ceiling), None) => ceiling,
        (None, Some(flow)) => {
            if min_price < 0.0 {
                warn!(
                    min_price,
                    big_m = flow,
                    "negative grid prices without a battery ceiling, exclusivity bound assumes charging has a cost"
                );
            }
            flow
        }
        (None, None) => {
            return Err(SizingError::InvalidConfiguration(
                "no finite exclusivity bound: set a battery size ceiling".to_string(),
            ));
        }
    };
    Ok(charge_bound.max(discharge_bound).max(1.0))
}

/// Builds the sizing program over `representative_days` and every project year.
///
/// Fails with `InvalidScenario` for out-of-domain parameters and with
/// `InvalidConfiguration` for an empty or out-of-range day selection, or for
/// chained SOC over days of unequal weight.
#[instrument(skip_all, name = "build_model", fields(mode = ?options.mode))]
pub fn build_model(
    profiles: &HourlyProfiles,
    scenario: &ScenarioParameters,
    capabilities: &Capabilities,
    representative_days: &[RepresentativeDay],
    options: &BuildOptions,
) -> Result<DispatchModel> {
    validate_scenario(scenario)?;

    if representative_days.is_empty() {
        return Err(SizingError::InvalidConfiguration(
            "at least one representative day is required".to_string(),
        ));
    }
    if let Some(day) = representative_days
        .iter()
        .find(|d| d.day_of_year >= profiles.days())
    {
        return Err(SizingError::InvalidConfiguration(format!(
            "representative day {} is outside the {}-day year",
            day.day_of_year,
            profiles.days()
        )));
    }
    if options.soc_boundary == SocBoundary::Chained {
        let first = representative_days[0].weight;
        if representative_days.iter().any(|d| d.weight != first) {
            return Err(SizingError::InvalidConfiguration(
                "chained SOC requires representative days of equal weight".to_string(),
            ));
        }
    }

    let horizon_years = scenario.project_horizon_years;
    let battery = &capabilities.battery;
    let retention = battery.hourly_retention();
    let eta_charge = battery.charge_efficiency();
    let eta_discharge_inv = 1.0 / battery.discharge_efficiency();
    let milp = options.mode == OptimizationMode::MilpStrict;
    let big_m = if milp {
        let chain_hours = match options.soc_boundary {
            SocBoundary::DailyReset => HOURS_PER_DAY,
            SocBoundary::Chained => {
                representative_days.len() * HOURS_PER_DAY * horizon_years as usize
            }
        };
        let min_price = profiles.price().iter().copied().fold(f64::INFINITY, f64::min);
        Some(exclusivity_bound(
            scenario,
            capabilities,
            horizon_years,
            chain_hours,
            min_price,
        )?)
    } else {
        None
    };

    let mut alloc = ColumnAllocator::new();
    let pv_size = alloc.non_negative();
    let bess_size = alloc.non_negative();
    let pv_var = alloc.var(pv_size);
    let bess_var = alloc.var(bess_size);

    let modeled_hours = representative_days.len() * HOURS_PER_DAY * horizon_years as usize;
    let mut hours: Vec<ModeledHour> = Vec::with_capacity(modeled_hours);
    let mut constraints: Vec<Constraint> = Vec::with_capacity(modeled_hours * 7 + 2);

    // Investment and fixed O&M
    let mut objective = Expression::default();
    objective -= scenario.pv_capex_per_mw * pv_var;
    objective -= scenario.bess_capex_per_mwh * bess_var;

    let mut previous_soc: Option<Variable> = None;

    for year in 1..=horizon_years {
        let discount = discount_factor(scenario.discount_rate, year);
        let escalation = escalation_factor(scenario.yoy_price_escalation_rate, year);
        let pv_factor = capabilities.pv.production_factor(year);
        let capacity_factor = battery.capacity_factor(year);

        objective -= discount * capabilities.financial.om_cost_per_mw_year(year) * pv_var;
        objective -= discount * capabilities.financial.om_cost_per_mwh_year(year) * bess_var;

        for (day_index, day) in representative_days.iter().enumerate() {
            if options.soc_boundary == SocBoundary::DailyReset {
                previous_soc = None;
            }
            let weight = f64::from(day.weight);

            for hour_of_day in 0..HOURS_PER_DAY {
                let source_hour = day.start_hour() + hour_of_day;
                let grid_price = profiles.price()[source_hour] * escalation;
                let onsite_price = scenario.onsite_load_price_per_mwh * escalation;
                let production_per_mw = profiles.production()[source_hour] * pv_factor;

                let columns = HourColumns {
                    pv_to_grid: alloc.non_negative(),
                    pv_to_onsite: alloc.non_negative(),
                    pv_to_battery: alloc.non_negative(),
                    battery_to_grid: alloc.non_negative(),
                    battery_to_onsite: alloc.non_negative(),
                    grid_to_battery: alloc.non_negative(),
                    soc: alloc.non_negative(),
                    battery_mode: if milp { Some(alloc.binary()) } else { None },
                };
                let pv_to_grid = alloc.var(columns.pv_to_grid);
                let pv_to_onsite = alloc.var(columns.pv_to_onsite);
                let pv_to_battery = alloc.var(columns.pv_to_battery);
                let battery_to_grid = alloc.var(columns.battery_to_grid);
                let battery_to_onsite = alloc.var(columns.battery_to_onsite);
                let grid_to_battery = alloc.var(columns.grid_to_battery);
                let soc = alloc.var(columns.soc);

                // PV balance
                constraints.push(constraint!(
                    production_per_mw * pv_var == pv_to_grid + pv_to_onsite + pv_to_battery
                ));
                // Export and on-site caps
                constraints.push(constraint!(
                    pv_to_grid + battery_to_grid <= scenario.interconnection_capacity_mw
                ));
                constraints.push(constraint!(
                    pv_to_onsite + battery_to_onsite <= scenario.onsite_load_max_mw
                ));

                // Battery balance, opening SOC is zero when there is no predecessor
                let charge = Expression::from(pv_to_battery) + grid_to_battery;
                let discharge = Expression::from(battery_to_grid) + battery_to_onsite;
                let mut stored = eta_charge * charge.clone() - eta_discharge_inv * discharge.clone();
                if let Some(prev) = previous_soc {
                    stored += retention * prev;
                }
                constraints.push(constraint!(soc == stored));
                constraints.push(constraint!(soc <= capacity_factor * bess_var));

                if let Some(c_rate) = battery.c_rate_limit() {
                    constraints.push(constraint!(charge.clone() <= c_rate * bess_var));
                    constraints.push(constraint!(discharge.clone() <= c_rate * bess_var));
                }

                if let (Some(mode_column), Some(m)) = (columns.battery_mode, big_m) {
                    let mode = alloc.var(mode_column);
                    constraints.push(constraint!(charge <= m * mode));
                    constraints.push(constraint!(discharge + m * mode <= m));
                }

                let scale = discount * weight;
                objective += scale * grid_price * pv_to_grid;
                objective += scale * grid_price * battery_to_grid;
                objective += scale * onsite_price * pv_to_onsite;
                objective += scale * onsite_price * battery_to_onsite;
                objective -= scale * grid_price * grid_to_battery;

                previous_soc = Some(soc);
                hours.push(ModeledHour {
                    year,
                    day_index,
                    hour_of_day,
                    weight,
                    grid_price,
                    onsite_price,
                    production_per_mw,
                    columns,
                });
            }
        }
    }

    if let Some(pv_max) = scenario.pv_max_size_mw {
        constraints.push(constraint!(pv_var <= pv_max));
    }
    if let Some(bess_max) = scenario.bess_max_size_mwh {
        constraints.push(constraint!(bess_var <= bess_max));
    }

    let problem = LinearProblem {
        variables: alloc.variables,
        objective,
        constraints,
        columns: alloc.columns,
        integer_columns: alloc.integer_columns,
    };
    info!(
        columns = problem.column_count(),
        integer_columns = problem.integer_column_count(),
        constraints = problem.constraint_count(),
        representative_days = representative_days.len(),
        horizon_years,
        "built dispatch model"
    );

    Ok(DispatchModel {
        problem,
        layout: ModelLayout {
            pv_size,
            bess_size,
            hours,
            representative_days: representative_days.to_vec(),
            horizon_years,
            mode: options.mode,
            soc_boundary: options.soc_boundary,
            big_m,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::general::time_series::LengthPolicy;
    use crate::sizing::error::ErrorKind;

    fn profiles(days: usize) -> HourlyProfiles {
        HourlyProfiles::new(
            vec![0.5; days * 24],
            vec![50.0; days * 24],
            LengthPolicy::Development,
        )
        .unwrap()
    }

    fn scenario(horizon: u32) -> ScenarioParameters {
        ScenarioParameters {
            pv_capex_per_mw: 1000.0,
            bess_capex_per_mwh: 500.0,
            discount_rate: 0.08,
            interconnection_capacity_mw: 100.0,
            onsite_load_price_per_mwh: 40.0,
            onsite_load_max_mw: 5.0,
            yoy_price_escalation_rate: 0.02,
            pv_max_size_mw: Some(500.0),
            bess_max_size_mwh: Some(1000.0),
            project_horizon_years: horizon,
        }
    }

    fn days(weights: &[u32]) -> Vec<RepresentativeDay> {
        let mut start = 0;
        weights
            .iter()
            .map(|&w| {
                let day = RepresentativeDay {
                    day_of_year: start,
                    weight: w,
                    represents: start..start + w as usize,
                };
                start += w as usize;
                day
            })
            .collect()
    }

    #[test]
    fn lp_dimensions_scale_with_days_and_years() {
        let model = build_model(
            &profiles(2),
            &scenario(3),
            &Capabilities::default(),
            &days(&[1, 1]),
            &BuildOptions::default(),
        )
        .unwrap();
        let hours = 2 * 24 * 3;
        assert_eq!(model.layout.hours.len(), hours);
        assert_eq!(model.problem.column_count(), 2 + 7 * hours);
        assert_eq!(model.problem.integer_column_count(), 0);
        // five balances and caps, two C-rate limits per hour, two ceilings
        assert_eq!(model.problem.constraint_count(), 7 * hours + 2);
        assert_eq!(model.layout.big_m, None);
    }

    #[test]
    fn milp_adds_one_binary_and_two_gates_per_hour() {
        let options = BuildOptions {
            mode: OptimizationMode::MilpStrict,
            ..BuildOptions::default()
        };
        let model = build_model(
            &profiles(1),
            &scenario(2),
            &Capabilities::default(),
            &days(&[1]),
            &options,
        )
        .unwrap();
        let hours = 24 * 2;
        assert_eq!(model.problem.integer_column_count(), hours);
        assert_eq!(model.problem.constraint_count(), 9 * hours + 2);
        // 1000 MWh ceiling beats the 105 MW discharge bound
        assert_eq!(model.layout.big_m, Some(1000.0));
        assert!(model.layout.hours.iter().all(|h| h.columns.battery_mode.is_some()));
    }

    #[test]
    fn big_m_without_ceiling_covers_a_full_chain_of_discharge() {
        let mut scenario = scenario(1);
        scenario.bess_max_size_mwh = None;
        let options = BuildOptions {
            mode: OptimizationMode::MilpStrict,
            ..BuildOptions::default()
        };
        let model = build_model(
            &profiles(2),
            &scenario,
            &Capabilities::default(),
            &days(&[1, 1]),
            &options,
        )
        .unwrap();
        // one day of 100 MW export plus 5 MW on-site
        assert_eq!(model.layout.big_m, Some(24.0 * 105.0));

        let chained = BuildOptions {
            soc_boundary: SocBoundary::Chained,
            ..options
        };
        let model = build_model(
            &profiles(2),
            &scenario,
            &Capabilities::default(),
            &days(&[1, 1]),
            &chained,
        )
        .unwrap();
        assert_eq!(model.layout.big_m, Some(48.0 * 105.0));
    }

    #[test]
    fn big_m_takes_the_tighter_of_ceiling_and_flow_bounds() {
        let mut scenario = scenario(1);
        scenario.bess_max_size_mwh = Some(5_000.0);
        let options = BuildOptions {
            mode: OptimizationMode::MilpStrict,
            ..BuildOptions::default()
        };
        let model = build_model(
            &profiles(1),
            &scenario,
            &Capabilities::default(),
            &days(&[1]),
            &options,
        )
        .unwrap();
        assert_eq!(model.layout.big_m, Some(24.0 * 105.0));
    }

    #[test]
    fn hour_coefficients_follow_escalation() {
        let model = build_model(
            &profiles(1),
            &scenario(3),
            &Capabilities::default(),
            &days(&[1]),
            &BuildOptions::default(),
        )
        .unwrap();
        let year_three = model.layout.hours.iter().find(|h| h.year == 3).unwrap();
        assert!((year_three.grid_price - 50.0 * 1.02_f64.powi(2)).abs() < 1e-9);
        assert!((year_three.onsite_price - 40.0 * 1.02_f64.powi(2)).abs() < 1e-9);
        assert_eq!(year_three.production_per_mw, 0.5);
    }

    #[test]
    fn chained_soc_requires_equal_weights() {
        let options = BuildOptions {
            soc_boundary: SocBoundary::Chained,
            ..BuildOptions::default()
        };
        let err = build_model(
            &profiles(3),
            &scenario(1),
            &Capabilities::default(),
            &days(&[1, 2]),
            &options,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

        assert!(
            build_model(
                &profiles(2),
                &scenario(1),
                &Capabilities::default(),
                &days(&[1, 1]),
                &options,
            )
            .is_ok()
        );
    }

    #[test]
    fn rejects_empty_selection_and_bad_scenario() {
        let err = build_model(
            &profiles(1),
            &scenario(1),
            &Capabilities::default(),
            &[],
            &BuildOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

        let mut bad = scenario(1);
        bad.discount_rate = f64::NAN;
        let err = build_model(
            &profiles(1),
            &bad,
            &Capabilities::default(),
            &days(&[1]),
            &BuildOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SizingError::InvalidScenario { .. }));
    }

    #[test]
    fn discount_and_escalation_factors() {
        assert!((discount_factor(0.1, 1) - 1.0 / 1.1).abs() < 1e-12);
        assert_eq!(discount_factor(0.0, 10), 1.0);
        assert_eq!(escalation_factor(0.05, 1), 1.0);
        assert!((escalation_factor(0.05, 3) - 1.1025).abs() < 1e-12);
    }
}
