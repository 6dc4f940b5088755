use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

fn default_horizon_years() -> u32 {
    25
}

/// Economic and physical parameters of one sizing scenario.
///
/// All money values are in the same currency, energy in MWh and power in MW.
/// Domain checks happen in the optimizer before a model is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./scenario.ts")]
pub struct ScenarioParameters {
    /// Investment cost per MW of installed PV.
    pub pv_capex_per_mw: f64,
    /// Investment cost per MWh of usable battery capacity.
    pub bess_capex_per_mwh: f64,
    /// Annual discount rate, e.g. 0.08 for 8%.
    pub discount_rate: f64,
    /// Maximum export to the grid in any hour.
    pub interconnection_capacity_mw: f64,
    /// Price paid by the on-site load.
    pub onsite_load_price_per_mwh: f64,
    /// Maximum on-site consumption in any hour.
    pub onsite_load_max_mw: f64,
    /// Yearly escalation applied to grid and on-site prices.
    pub yoy_price_escalation_rate: f64,
    /// Optional ceiling on the PV size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pv_max_size_mw: Option<f64>,
    /// Optional ceiling on the battery size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bess_max_size_mwh: Option<f64>,
    /// Number of operating years after the investment year.
    #[serde(default = "default_horizon_years")]
    pub project_horizon_years: u32,
}
