//! Turns solver values into sizes, dispatch, cash flows, NPV and IRR.

use std::time::Duration;

use indexmap::IndexMap;
use solar_storage_model::{MonthlyRevenue, OptimizationResult, ScenarioParameters};
use tracing::{info, warn};

use crate::general::calendar::month_of_day;
use crate::general::finance::{irr, npv, payback_period};
use crate::general::time_series::HourlyProfiles;
use crate::sizing::capability::Capabilities;
use crate::sizing::config::{OptimizationMode, SizingConfig};
use crate::sizing::error::{Result, SizingError};
use crate::sizing::model_builder::{Column, ModelLayout};
use crate::sizing::representative_days::{RepresentativeDay, scale_factor};
use crate::sizing::solver::{SolveStatus, SolverOutcome};

/// Sizes below this (MW or MWh) count as no investment.
const SIZE_EPSILON: f64 = 1e-6;

/// Energy flows of one representative hour in one project year.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyDispatch {
    pub year: u32,
    pub day_of_year: usize,
    pub hour_of_day: usize,
    pub weight: f64,
    /// Available PV energy, `pv_size * production`.
    pub pv_production: f64,
    pub pv_to_grid: f64,
    pub pv_to_onsite: f64,
    pub pv_to_battery: f64,
    pub battery_to_grid: f64,
    pub battery_to_onsite: f64,
    pub grid_to_battery: f64,
    /// End-of-hour state of charge.
    pub soc: f64,
    /// Net revenue of this hour on one represented day.
    pub revenue: f64,
}

impl HourlyDispatch {
    pub fn charge(&self) -> f64 {
        self.pv_to_battery + self.grid_to_battery
    }

    pub fn discharge(&self) -> f64 {
        self.battery_to_grid + self.battery_to_onsite
    }
}

/// Optimal configuration with its dispatch and financials.
#[derive(Debug, Clone)]
pub struct Solution {
    pub pv_size_mw: f64,
    pub bess_size_mwh: f64,
    pub objective_value: f64,
    /// Year 0 is the investment, years 1..=horizon the operating cash flows.
    pub cash_flows: Vec<f64>,
    pub npv: f64,
    pub irr: Option<f64>,
    pub payback_years: Option<f64>,
    pub capex_total: f64,
    pub total_revenue_over_horizon: f64,
    pub monthly_revenues: Vec<MonthlyRevenue>,
    pub dispatch: Vec<HourlyDispatch>,
    pub representative_days: Vec<RepresentativeDay>,
    pub days_in_year: usize,
    pub mode: OptimizationMode,
    pub status: SolveStatus,
    pub backend: &'static str,
    pub solve_duration: Duration,
    /// Modeled hours charging and discharging at once above tolerance.
    pub simultaneous_flow_hours: usize,
}

impl Solution {
    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    pub fn scale_factor(&self) -> f64 {
        scale_factor(self.days_in_year, self.representative_days.len())
    }

    pub fn to_result(&self) -> OptimizationResult {
        OptimizationResult {
            optimal_pv_size_mw: self.pv_size_mw,
            optimal_bess_size_mwh: self.bess_size_mwh,
            npv: self.npv,
            irr: self.irr,
            capex_total: self.capex_total,
            monthly_revenues: self.monthly_revenues.clone(),
            total_revenue_over_horizon: self.total_revenue_over_horizon,
            representative_days_used: Some(self.representative_days.len() as u32),
            scale_factor: Some(self.scale_factor()),
        }
    }
}

/// Tolerances used by [`extract_solution`].
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub consistency_abs_tol: f64,
    pub consistency_rel_tol: f64,
    pub simultaneous_flow_tol: f64,
}

impl From<&SizingConfig> for ExtractOptions {
    fn from(config: &SizingConfig) -> Self {
        Self {
            consistency_abs_tol: config.consistency_abs_tol,
            consistency_rel_tol: config.consistency_rel_tol,
            simultaneous_flow_tol: config.simultaneous_flow_tol,
        }
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from(&SizingConfig::default())
    }
}

/// Days of each representative bucket falling into each month.
fn month_day_counts(days: &[RepresentativeDay], leap: bool) -> Vec<[u32; 12]> {
    days.iter()
        .map(|day| {
            let mut counts = [0; 12];
            for d in day.represents.clone() {
                counts[month_of_day(d, leap) as usize - 1] += 1;
            }
            counts
        })
        .collect()
}

/// Maps a solver outcome with values onto a [`Solution`].
///
/// Fails with `InternalConsistency` when the NPV of the recomputed cash flows
/// differs from the solver objective beyond tolerance.
pub fn extract_solution(
    layout: &ModelLayout,
    outcome: &SolverOutcome,
    profiles: &HourlyProfiles,
    scenario: &ScenarioParameters,
    capabilities: &Capabilities,
    options: &ExtractOptions,
) -> Result<Solution> {
    let objective_value = match outcome.objective_value {
        Some(value) if outcome.status.has_values() => value,
        _ => {
            return Err(SizingError::SolverFailed(format!(
                "no solution values to extract (status {:?})",
                outcome.status
            )));
        }
    };
    let expected_columns = 2 + layout.hours.len() * 7;
    if outcome.values.len() < expected_columns {
        return Err(SizingError::SolverFailed(format!(
            "solver returned {} values for at least {} columns",
            outcome.values.len(),
            expected_columns
        )));
    }
    let value = |column: Column| outcome.values[column.index()];

    let pv_size_mw = value(layout.pv_size);
    let bess_size_mwh = value(layout.bess_size);
    let capex_total =
        pv_size_mw * scenario.pv_capex_per_mw + bess_size_mwh * scenario.bess_capex_per_mwh;

    let horizon = layout.horizon_years as usize;
    let mut cash_flows = vec![0.0; horizon + 1];
    cash_flows[0] = -capex_total;

    let mut dispatch = Vec::with_capacity(layout.hours.len());
    // revenue of one represented day, per (year, representative day)
    let mut daily_revenue = vec![vec![0.0; layout.representative_days.len()]; horizon];
    let mut simultaneous_flow_hours = 0;

    for hour in &layout.hours {
        let c = &hour.columns;
        let record = HourlyDispatch {
            year: hour.year,
            day_of_year: layout.representative_days[hour.day_index].day_of_year,
            hour_of_day: hour.hour_of_day,
            weight: hour.weight,
            pv_production: pv_size_mw * hour.production_per_mw,
            pv_to_grid: value(c.pv_to_grid),
            pv_to_onsite: value(c.pv_to_onsite),
            pv_to_battery: value(c.pv_to_battery),
            battery_to_grid: value(c.battery_to_grid),
            battery_to_onsite: value(c.battery_to_onsite),
            grid_to_battery: value(c.grid_to_battery),
            soc: value(c.soc),
            revenue: 0.0,
        };
        let revenue = hour.grid_price * (record.pv_to_grid + record.battery_to_grid)
            + hour.onsite_price * (record.pv_to_onsite + record.battery_to_onsite)
            - hour.grid_price * record.grid_to_battery;

        if record.charge().min(record.discharge()) > options.simultaneous_flow_tol {
            simultaneous_flow_hours += 1;
        }

        let year = hour.year as usize;
        cash_flows[year] += hour.weight * revenue;
        daily_revenue[year - 1][hour.day_index] += revenue;
        dispatch.push(HourlyDispatch { revenue, ..record });
    }

    for year in 1..=layout.horizon_years {
        cash_flows[year as usize] -= capabilities.om_cost(year, pv_size_mw, bess_size_mwh);
    }

    let npv_value = npv(&cash_flows, scenario.discount_rate);
    let scale = objective_value.abs().max(npv_value.abs()).max(capex_total.abs());
    let tolerance = options.consistency_abs_tol + options.consistency_rel_tol * scale;
    if (npv_value - objective_value).abs() > tolerance {
        return Err(SizingError::InternalConsistency {
            objective: objective_value,
            recomputed: npv_value,
        });
    }

    if simultaneous_flow_hours > 0 {
        warn!(
            hours = simultaneous_flow_hours,
            mode = ?layout.mode,
            tolerance = options.simultaneous_flow_tol,
            "battery charges and discharges in the same hour"
        );
    }

    let no_investment = pv_size_mw.abs() < SIZE_EPSILON && bess_size_mwh.abs() < SIZE_EPSILON;
    let irr_value = if no_investment {
        None
    } else {
        irr(&cash_flows, scenario.discount_rate).ok()
    };

    let counts = month_day_counts(&layout.representative_days, profiles.is_leap_year());
    let mut monthly: IndexMap<(u32, u32), f64> = IndexMap::new();
    for (year_index, per_day) in daily_revenue.iter().enumerate() {
        for (day_index, revenue) in per_day.iter().enumerate() {
            for (month_index, &days) in counts[day_index].iter().enumerate() {
                if days > 0 {
                    *monthly
                        .entry((year_index as u32 + 1, month_index as u32 + 1))
                        .or_insert(0.0) += revenue * f64::from(days);
                }
            }
        }
    }
    monthly.sort_keys();
    let monthly_revenues = monthly
        .into_iter()
        .map(|((year, month), revenue)| MonthlyRevenue {
            year,
            month,
            revenue,
        })
        .collect();

    let total_revenue_over_horizon: f64 = cash_flows[1..].iter().sum();
    info!(
        pv_size_mw,
        bess_size_mwh,
        npv = npv_value,
        irr = irr_value,
        total_revenue_over_horizon,
        "extracted solution"
    );

    Ok(Solution {
        pv_size_mw,
        bess_size_mwh,
        objective_value,
        payback_years: payback_period(&cash_flows),
        cash_flows,
        npv: npv_value,
        irr: irr_value,
        capex_total,
        total_revenue_over_horizon,
        monthly_revenues,
        dispatch,
        representative_days: layout.representative_days.clone(),
        days_in_year: profiles.days(),
        mode: layout.mode,
        status: outcome.status.clone(),
        backend: outcome.backend,
        solve_duration: outcome.elapsed,
        simultaneous_flow_hours,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::general::time_series::LengthPolicy;
    use crate::sizing::model_builder::{BuildOptions, DispatchModel, build_model};

    fn scenario() -> ScenarioParameters {
        ScenarioParameters {
            pv_capex_per_mw: 1000.0,
            bess_capex_per_mwh: 500.0,
            discount_rate: 0.1,
            interconnection_capacity_mw: 100.0,
            onsite_load_price_per_mwh: 40.0,
            onsite_load_max_mw: 5.0,
            yoy_price_escalation_rate: 0.0,
            pv_max_size_mw: None,
            bess_max_size_mwh: None,
            project_horizon_years: 2,
        }
    }

    fn one_day() -> (HourlyProfiles, Vec<RepresentativeDay>) {
        let profiles =
            HourlyProfiles::new(vec![0.5; 24], vec![50.0; 24], LengthPolicy::Development)
                .unwrap();
        let days = vec![RepresentativeDay {
            day_of_year: 0,
            weight: 1,
            represents: 0..1,
        }];
        (profiles, days)
    }

    fn model(profiles: &HourlyProfiles, days: &[RepresentativeDay]) -> DispatchModel {
        build_model(
            profiles,
            &scenario(),
            &Capabilities::default(),
            days,
            &BuildOptions::default(),
        )
        .unwrap()
    }

    /// pv = 10 MW exporting 1 MWh every hour
    fn exporting_values(model: &DispatchModel) -> Vec<f64> {
        let mut values = vec![0.0; model.problem.column_count()];
        values[model.layout.pv_size.index()] = 10.0;
        for hour in &model.layout.hours {
            values[hour.columns.pv_to_grid.index()] = 1.0;
        }
        values
    }

    fn outcome(values: Vec<f64>, objective: f64) -> SolverOutcome {
        SolverOutcome {
            status: SolveStatus::Optimal,
            values,
            objective_value: Some(objective),
            elapsed: Duration::from_millis(5),
            backend: "test",
        }
    }

    #[test]
    fn cash_flows_npv_and_months() {
        let (profiles, days) = one_day();
        let model = model(&profiles, &days);
        let values = exporting_values(&model);
        let expected_npv = -10_000.0 + 1200.0 / 1.1 + 1200.0 / 1.21;

        let solution = extract_solution(
            &model.layout,
            &outcome(values, expected_npv),
            &profiles,
            &scenario(),
            &Capabilities::default(),
            &ExtractOptions::default(),
        )
        .unwrap();

        assert_eq!(solution.cash_flows, vec![-10_000.0, 1200.0, 1200.0]);
        assert!((solution.npv - expected_npv).abs() < 1e-9);
        assert_eq!(solution.capex_total, 10_000.0);
        assert_eq!(solution.total_revenue_over_horizon, 2400.0);
        assert_eq!(solution.simultaneous_flow_hours, 0);
        // the project never pays back, the IRR is strongly negative
        assert!(solution.irr.unwrap() < 0.0);
        assert_eq!(solution.payback_years, None);
        assert_eq!(
            solution.monthly_revenues,
            vec![
                MonthlyRevenue {
                    year: 1,
                    month: 1,
                    revenue: 1200.0
                },
                MonthlyRevenue {
                    year: 2,
                    month: 1,
                    revenue: 1200.0
                },
            ]
        );
        assert_eq!(solution.dispatch.len(), 48);
        assert_eq!(solution.dispatch[0].pv_production, 5.0);

        let result = solution.to_result();
        assert_eq!(result.representative_days_used, Some(1));
        assert_eq!(result.scale_factor, Some(1.0));

        // the payload serializes through the model crate's derives alone
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&result).unwrap()).unwrap();
        assert_eq!(json["capex_total"], 10_000.0);
        assert_eq!(json["monthly_revenues"][1]["year"], 2);
        assert_eq!(json["representative_days_used"], 1);
    }

    #[test]
    fn objective_mismatch_is_an_internal_error() {
        let (profiles, days) = one_day();
        let model = model(&profiles, &days);
        let values = exporting_values(&model);
        let npv_value = -10_000.0 + 1200.0 / 1.1 + 1200.0 / 1.21;

        let err = extract_solution(
            &model.layout,
            &outcome(values, npv_value + 1.0),
            &profiles,
            &scenario(),
            &Capabilities::default(),
            &ExtractOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SizingError::InternalConsistency { .. }));
    }

    #[test]
    fn counts_simultaneous_charge_and_discharge() {
        let (profiles, days) = one_day();
        let model = model(&profiles, &days);
        let mut values = exporting_values(&model);
        for hour in model.layout.hours.iter().filter(|h| h.hour_of_day == 0) {
            values[hour.columns.pv_to_battery.index()] = 1.0;
            values[hour.columns.battery_to_grid.index()] = 1.0;
        }
        let cash_flows = [-10_000.0, 1250.0, 1250.0];

        let solution = extract_solution(
            &model.layout,
            &outcome(values, npv(&cash_flows, 0.1)),
            &profiles,
            &scenario(),
            &Capabilities::default(),
            &ExtractOptions::default(),
        )
        .unwrap();
        assert_eq!(solution.simultaneous_flow_hours, 2);
        assert_eq!(solution.cash_flows, cash_flows.to_vec());
    }

    #[test]
    fn no_investment_has_no_irr() {
        let (profiles, days) = one_day();
        let model = model(&profiles, &days);
        let values = vec![0.0; model.problem.column_count()];

        let solution = extract_solution(
            &model.layout,
            &outcome(values, 0.0),
            &profiles,
            &scenario(),
            &Capabilities::default(),
            &ExtractOptions::default(),
        )
        .unwrap();
        assert_eq!(solution.irr, None);
        assert_eq!(solution.npv, 0.0);
    }

    #[test]
    fn monthly_revenue_expands_buckets_over_months() {
        // one weekly bucket spanning January 29 to February 4
        let days = vec![RepresentativeDay {
            day_of_year: 30,
            weight: 7,
            represents: 28..35,
        }];
        let counts = month_day_counts(&days, false);
        assert_eq!(counts[0][0], 3);
        assert_eq!(counts[0][1], 4);
        assert_eq!(counts[0].iter().sum::<u32>(), 7);
    }

    #[test]
    fn missing_values_are_rejected() {
        let (profiles, days) = one_day();
        let model = model(&profiles, &days);
        let failed = SolverOutcome {
            status: SolveStatus::Infeasible,
            values: Vec::new(),
            objective_value: None,
            elapsed: Duration::ZERO,
            backend: "test",
        };
        assert!(
            extract_solution(
                &model.layout,
                &failed,
                &profiles,
                &scenario(),
                &Capabilities::default(),
                &ExtractOptions::default(),
            )
            .is_err()
        );
    }
}
