use thiserror::Error;

/// Lower end of the IRR search interval.
pub const IRR_LOWER_BOUND: f64 = -0.99;
/// Upper end of the IRR search interval.
pub const IRR_UPPER_BOUND: f64 = 10.0;

const TOLERANCE: f64 = 1e-10;
const MAX_ITERATIONS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IrrError {
    /// No rate in the search interval zeroes the NPV.
    #[error("IRR did not converge")]
    NoConvergence,
}

/// Net present value, `cash_flows[0]` undiscounted at year 0.
pub fn npv(cash_flows: &[f64], rate: f64) -> f64 {
    cash_flows
        .iter()
        .enumerate()
        .map(|(year, cf)| cf / (1.0 + rate).powi(year as i32))
        .sum()
}

/// d NPV / d rate
fn npv_derivative(cash_flows: &[f64], rate: f64) -> f64 {
    cash_flows
        .iter()
        .enumerate()
        .skip(1)
        .map(|(year, cf)| -(year as f64) * cf / (1.0 + rate).powi(year as i32 + 1))
        .sum()
}

/// Internal rate of return: the rate at which the NPV of `cash_flows` is zero.
///
/// Newton's method starts at `seed` (usually the discount rate). If the
/// derivative vanishes, an iterate leaves `[IRR_LOWER_BOUND, IRR_UPPER_BOUND]`
/// or Newton does not converge, bisection over that interval takes over.
///
/// Fails with [`IrrError::NoConvergence`] when the cash flows never change
/// sign or no bracket exists in the interval.
///
/// ```
/// use solar_storage_opt::general::finance::irr;
///
/// let rate = irr(&[-100.0, 110.0], 0.05).unwrap();
/// assert!((rate - 0.1).abs() < 1e-9);
/// ```
pub fn irr(cash_flows: &[f64], seed: f64) -> Result<f64, IrrError> {
    let has_positive = cash_flows.iter().any(|&cf| cf > 0.0);
    let has_negative = cash_flows.iter().any(|&cf| cf < 0.0);
    if !has_positive || !has_negative {
        return Err(IrrError::NoConvergence);
    }

    if let Some(rate) = newton_method_root_finding(cash_flows, seed) {
        return Ok(rate);
    }
    bisection_root_finding(cash_flows)
}

fn newton_method_root_finding(cash_flows: &[f64], initial_guess: f64) -> Option<f64> {
    let scale = cash_flows.iter().fold(0.0_f64, |acc, cf| acc.max(cf.abs()));
    let mut x = initial_guess.clamp(IRR_LOWER_BOUND, IRR_UPPER_BOUND);

    for _ in 0..MAX_ITERATIONS {
        let fx = npv(cash_flows, x);
        if fx.abs() <= TOLERANCE * scale {
            return Some(x);
        }
        let derivative = npv_derivative(cash_flows, x);
        if derivative.abs() < 1e-12 {
            return None;
        }
        let next = x - fx / derivative;
        if !next.is_finite() || !(IRR_LOWER_BOUND..=IRR_UPPER_BOUND).contains(&next) {
            return None;
        }
        if (next - x).abs() < TOLERANCE {
            return Some(next);
        }
        x = next;
    }
    None
}

fn bisection_root_finding(cash_flows: &[f64]) -> Result<f64, IrrError> {
    let mut low = IRR_LOWER_BOUND;
    let mut high = IRR_UPPER_BOUND;
    let mut f_low = npv(cash_flows, low);
    let f_high = npv(cash_flows, high);

    if f_low == 0.0 {
        return Ok(low);
    }
    if f_high == 0.0 {
        return Ok(high);
    }
    if f_low.signum() == f_high.signum() {
        return Err(IrrError::NoConvergence);
    }

    for _ in 0..MAX_ITERATIONS {
        let mid = 0.5 * (low + high);
        let f_mid = npv(cash_flows, mid);
        if f_mid == 0.0 || (high - low) < TOLERANCE {
            return Ok(mid);
        }
        if f_low.signum() == f_mid.signum() {
            low = mid;
            f_low = f_mid;
        } else {
            high = mid;
        }
    }
    Ok(0.5 * (low + high))
}

/// Fractional number of years until the cumulative cash flow turns non-negative.
///
/// `None` when the investment is never paid back within the horizon.
pub fn payback_period(cash_flows: &[f64]) -> Option<f64> {
    let mut cumulative = 0.0;
    for (year, &cf) in cash_flows.iter().enumerate() {
        let previous = cumulative;
        cumulative += cf;
        if cumulative >= 0.0 && previous < 0.0 {
            // linear interpolation inside the payback year
            return Some(year as f64 - 1.0 + (-previous) / cf);
        }
    }
    if cash_flows.first().is_some_and(|&cf| cf >= 0.0) {
        return Some(0.0);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npv_discounts_per_year() {
        let value = npv(&[-100.0, 110.0], 0.1);
        assert!(value.abs() < 1e-12);
        let value = npv(&[0.0, 100.0, 100.0], 0.0);
        assert!((value - 200.0).abs() < 1e-12);
    }

    #[test]
    fn irr_of_single_period_project() {
        let rate = irr(&[-100.0, 110.0], 0.08).unwrap();
        assert!((rate - 0.1).abs() < 1e-9);
    }

    #[test]
    fn irr_of_two_period_project() {
        let rate = irr(&[-100.0, 60.0, 60.0], 0.08).unwrap();
        assert!((rate - 0.130_662_386).abs() < 1e-6);
        assert!(npv(&[-100.0, 60.0, 60.0], rate).abs() < 1e-6);
    }

    #[test]
    fn irr_undefined_without_sign_change() {
        assert_eq!(irr(&[100.0, 10.0, 10.0], 0.08), Err(IrrError::NoConvergence));
        assert_eq!(irr(&[-100.0, -10.0], 0.08), Err(IrrError::NoConvergence));
        assert_eq!(irr(&[0.0, 0.0, 0.0], 0.08), Err(IrrError::NoConvergence));
        assert_eq!(irr(&[], 0.08), Err(IrrError::NoConvergence));
    }

    #[test]
    fn irr_falls_back_to_bisection_for_far_seed() {
        // Newton from 9.9 leaves the interval, bisection recovers the root
        let flows = [-100.0, 0.0, 0.0, 0.0, 0.0, 300.0];
        let rate = irr(&flows, 9.9).unwrap();
        assert!(npv(&flows, rate).abs() < 1e-6);
    }

    #[test]
    fn irr_needs_a_bracket_in_the_interval() {
        // NPV is positive over the whole search interval
        let flows = [-1.0, 1000.0, 1000.0];
        assert!(npv(&flows, IRR_UPPER_BOUND) > 0.0);
        assert_eq!(irr(&flows, 0.08), Err(IrrError::NoConvergence));
    }

    #[test]
    fn payback_interpolates_within_year() {
        assert_eq!(payback_period(&[-100.0, 50.0, 100.0]), Some(1.5));
        assert_eq!(payback_period(&[-100.0, 10.0, 10.0]), None);
        assert_eq!(payback_period(&[0.0, 10.0]), Some(0.0));
    }
}
