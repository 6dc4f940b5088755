//! Pluggable physical and financial behavior injected into the model builder.
//!
//! Only idealized variants exist. Richer models implement the same traits.

use std::sync::Arc;

use crate::sizing::config::{BatteryKind, FinancialKind, PvKind, SizingConfig};

/// Battery behavior seen by the dispatch model.
pub trait BatteryModel: Send + Sync {
    /// Fraction of charged energy that reaches the cells.
    fn charge_efficiency(&self) -> f64;
    /// Fraction of withdrawn cell energy delivered at the terminals.
    fn discharge_efficiency(&self) -> f64;
    /// Fraction of stored energy retained from one hour to the next.
    fn hourly_retention(&self) -> f64;
    /// Usable share of nameplate capacity in project year `year` (1-based).
    fn capacity_factor(&self, year: u32) -> f64;
    /// Maximum charge or discharge per hour as a fraction of capacity.
    fn c_rate_limit(&self) -> Option<f64>;
}

/// PV output behavior seen by the dispatch model.
pub trait PvModel: Send + Sync {
    /// Multiplier on the input production profile in project year `year`.
    fn production_factor(&self, year: u32) -> f64;
}

/// Recurring costs linear in the installed sizes.
pub trait FinancialModel: Send + Sync {
    fn om_cost_per_mw_year(&self, year: u32) -> f64;
    fn om_cost_per_mwh_year(&self, year: u32) -> f64;
}

/// Lossless battery without degradation, limited to one full charge or
/// discharge per hour (1C).
#[derive(Debug, Clone, Copy, Default)]
pub struct IdealizedBattery;

impl BatteryModel for IdealizedBattery {
    fn charge_efficiency(&self) -> f64 {
        1.0
    }

    fn discharge_efficiency(&self) -> f64 {
        1.0
    }

    fn hourly_retention(&self) -> f64 {
        1.0
    }

    fn capacity_factor(&self, _year: u32) -> f64 {
        1.0
    }

    fn c_rate_limit(&self) -> Option<f64> {
        Some(1.0)
    }
}

/// PV array that never degrades.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdealizedPv;

impl PvModel for IdealizedPv {
    fn production_factor(&self, _year: u32) -> f64 {
        1.0
    }
}

/// No operating costs.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdealizedFinancials;

impl FinancialModel for IdealizedFinancials {
    fn om_cost_per_mw_year(&self, _year: u32) -> f64 {
        0.0
    }

    fn om_cost_per_mwh_year(&self, _year: u32) -> f64 {
        0.0
    }
}

/// The three capability models used by one run.
#[derive(Clone)]
pub struct Capabilities {
    pub battery: Arc<dyn BatteryModel>,
    pub pv: Arc<dyn PvModel>,
    pub financial: Arc<dyn FinancialModel>,
}

impl Capabilities {
    pub fn from_config(config: &SizingConfig) -> Self {
        let battery: Arc<dyn BatteryModel> = match config.battery {
            BatteryKind::Idealized => Arc::new(IdealizedBattery),
        };
        let pv: Arc<dyn PvModel> = match config.pv {
            PvKind::Idealized => Arc::new(IdealizedPv),
        };
        let financial: Arc<dyn FinancialModel> = match config.financial {
            FinancialKind::Idealized => Arc::new(IdealizedFinancials),
        };
        Self {
            battery,
            pv,
            financial,
        }
    }

    /// Yearly O&M cost of the given sizes.
    pub fn om_cost(&self, year: u32, pv_size_mw: f64, bess_size_mwh: f64) -> f64 {
        self.financial.om_cost_per_mw_year(year) * pv_size_mw
            + self.financial.om_cost_per_mwh_year(year) * bess_size_mwh
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::from_config(&SizingConfig::default())
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("charge_efficiency", &self.battery.charge_efficiency())
            .field("discharge_efficiency", &self.battery.discharge_efficiency())
            .field("c_rate_limit", &self.battery.c_rate_limit())
            .finish_non_exhaustive()
    }
}
