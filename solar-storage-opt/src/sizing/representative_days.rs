//! Selection of weighted exemplar days that stand in for the full year.

use std::ops::Range;

use tracing::debug;

use crate::general::calendar::{HOURS_PER_DAY, month_day_ranges};
use crate::general::time_series::HourlyProfiles;
use crate::sizing::error::{Result, SizingError};

/// Distance used to pick the day closest to its bucket mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// Plain Euclidean distance over the 48 production and price values.
    Euclidean,
    /// Each channel scaled by its full-year standard deviation first.
    #[default]
    Standardized,
}

/// One exemplar day and the block of real days it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepresentativeDay {
    /// Zero-based day of the modeled year.
    pub day_of_year: usize,
    /// Number of real days represented, `represents.len()`.
    pub weight: u32,
    /// Zero-based days of the bucket this day was picked from.
    pub represents: Range<usize>,
}

impl RepresentativeDay {
    pub fn start_hour(&self) -> usize {
        self.day_of_year * HOURS_PER_DAY
    }
}

/// Days of the modeled year per representative day.
pub fn scale_factor(days_in_year: usize, selected: usize) -> f64 {
    days_in_year as f64 / selected as f64
}

fn buckets(days: usize, count: usize, calendar_year: bool, leap: bool) -> Vec<Range<usize>> {
    if count == 12 && calendar_year {
        return month_day_ranges(leap).to_vec();
    }
    (0..count)
        .map(|b| b * days / count..(b + 1) * days / count)
        .collect()
}

fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Picks `count` representative days from `profiles`.
///
/// Twelve days on a calendar year are chosen per month; other counts split the
/// year into contiguous buckets whose sizes differ by at most one day. Within a
/// bucket the day nearest the bucket's mean production and price profile wins,
/// the earliest day on ties. Weights sum to the number of days in the year.
pub fn select_representative_days(
    profiles: &HourlyProfiles,
    count: usize,
    metric: DistanceMetric,
) -> Result<Vec<RepresentativeDay>> {
    let days = profiles.days();
    if count == 0 || count > days {
        return Err(SizingError::InvalidConfiguration(format!(
            "representative day count must be between 1 and {days}, got {count}"
        )));
    }

    if count == days {
        return Ok((0..days)
            .map(|day| RepresentativeDay {
                day_of_year: day,
                weight: 1,
                represents: day..day + 1,
            })
            .collect());
    }

    let (production_scale, price_scale) = match metric {
        DistanceMetric::Euclidean => (1.0, 1.0),
        DistanceMetric::Standardized => {
            let production_std = std_dev(profiles.production());
            let price_std = std_dev(profiles.price());
            (
                if production_std > 0.0 { production_std } else { 1.0 },
                if price_std > 0.0 { price_std } else { 1.0 },
            )
        }
    };

    let selected: Vec<RepresentativeDay> =
        buckets(days, count, profiles.is_calendar_year(), profiles.is_leap_year())
            .into_iter()
            .map(|bucket| {
                let len = bucket.len() as f64;
                let mut mean_production = [0.0; HOURS_PER_DAY];
                let mut mean_price = [0.0; HOURS_PER_DAY];
                for day in bucket.clone() {
                    for h in 0..HOURS_PER_DAY {
                        mean_production[h] += profiles.day_production(day)[h] / len;
                        mean_price[h] += profiles.day_price(day)[h] / len;
                    }
                }

                let mut best_day = bucket.start;
                let mut best_distance = f64::INFINITY;
                for day in bucket.clone() {
                    let production = profiles.day_production(day);
                    let price = profiles.day_price(day);
                    let distance: f64 = (0..HOURS_PER_DAY)
                        .map(|h| {
                            ((production[h] - mean_production[h]) / production_scale).powi(2)
                                + ((price[h] - mean_price[h]) / price_scale).powi(2)
                        })
                        .sum();
                    if distance < best_distance {
                        best_distance = distance;
                        best_day = day;
                    }
                }

                RepresentativeDay {
                    day_of_year: best_day,
                    weight: bucket.len() as u32,
                    represents: bucket,
                }
            })
            .collect();

    debug!(
        count = selected.len(),
        days,
        scale_factor = scale_factor(days, selected.len()),
        "selected representative days"
    );
    Ok(selected)
}
