use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Revenue earned in one calendar month of one project year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./result.ts")]
pub struct MonthlyRevenue {
    /// Project year, starting at 1.
    pub year: u32,
    /// Calendar month, 1 to 12.
    pub month: u32,
    /// Undiscounted net revenue (sales minus grid charging cost).
    pub revenue: f64,
}

/// Result payload of a completed sizing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./result.ts")]
pub struct OptimizationResult {
    pub optimal_pv_size_mw: f64,
    pub optimal_bess_size_mwh: f64,
    /// Net present value of the optimal configuration.
    pub npv: f64,
    /// Internal rate of return; `null` when it is undefined.
    pub irr: Option<f64>,
    pub capex_total: f64,
    pub monthly_revenues: Vec<MonthlyRevenue>,
    /// Sum of the undiscounted yearly cash flows after the investment year.
    pub total_revenue_over_horizon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representative_days_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OptimizationResult {
        OptimizationResult {
            optimal_pv_size_mw: 12.5,
            optimal_bess_size_mwh: 0.0,
            npv: 1250.0,
            irr: None,
            capex_total: 100.0,
            monthly_revenues: vec![MonthlyRevenue {
                year: 1,
                month: 1,
                revenue: 10.0,
            }],
            total_revenue_over_horizon: 250.0,
            representative_days_used: Some(12),
            scale_factor: None,
        }
    }

    #[test]
    fn undefined_irr_serializes_as_null() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value["irr"].is_null());
        assert_eq!(value["representative_days_used"], 12);
        assert!(value.get("scale_factor").is_none());
        assert_eq!(value["monthly_revenues"][0]["month"], 1);
    }

    #[test]
    fn payload_reads_back() {
        let json = serde_json::to_string(&sample()).unwrap();
        let back: OptimizationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
