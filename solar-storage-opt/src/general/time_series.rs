use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, bail};

use crate::general::calendar::HOURS_PER_DAY;
use crate::sizing::error::{Result, SizingError};

/// Accepted series lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthPolicy {
    /// A full year: 8760 hours, or 8784 in a leap year.
    #[default]
    Calendar,
    /// Any positive number of whole days, for tests and development runs.
    Development,
}

/// Validated hourly PV production (MWh per installed MW) and grid price ($/MWh).
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyProfiles {
    production: Vec<f64>,
    price: Vec<f64>,
}

impl HourlyProfiles {
    pub fn new(production: Vec<f64>, price: Vec<f64>, policy: LengthPolicy) -> Result<Self> {
        if production.len() != price.len() {
            return Err(SizingError::InvalidInput(format!(
                "production has {} hours but price has {}",
                production.len(),
                price.len()
            )));
        }
        let hours = production.len();
        match policy {
            LengthPolicy::Calendar => {
                if hours != 8760 && hours != 8784 {
                    return Err(SizingError::InvalidInput(format!(
                        "expected 8760 or 8784 hourly values, got {hours}"
                    )));
                }
            }
            LengthPolicy::Development => {
                if hours == 0 || hours % HOURS_PER_DAY != 0 {
                    return Err(SizingError::InvalidInput(format!(
                        "expected a positive multiple of {HOURS_PER_DAY} hourly values, got {hours}"
                    )));
                }
            }
        }
        if let Some(hour) = production.iter().position(|v| !v.is_finite() || *v < 0.0) {
            return Err(SizingError::InvalidInput(format!(
                "production at hour {} must be finite and non-negative, got {}",
                hour + 1,
                production[hour]
            )));
        }
        if let Some(hour) = price.iter().position(|v| !v.is_finite()) {
            return Err(SizingError::InvalidInput(format!(
                "price at hour {} must be finite, got {}",
                hour + 1,
                price[hour]
            )));
        }
        Ok(Self { production, price })
    }

    pub fn production(&self) -> &[f64] {
        &self.production
    }

    pub fn price(&self) -> &[f64] {
        &self.price
    }

    pub fn hours(&self) -> usize {
        self.production.len()
    }

    /// Number of days in the modeled year.
    pub fn days(&self) -> usize {
        self.production.len() / HOURS_PER_DAY
    }

    /// True when the series spans a real calendar year.
    pub fn is_calendar_year(&self) -> bool {
        matches!(self.days(), 365 | 366)
    }

    pub fn is_leap_year(&self) -> bool {
        self.days() == 366
    }

    pub(crate) fn day_production(&self, day: usize) -> &[f64] {
        &self.production[day * HOURS_PER_DAY..(day + 1) * HOURS_PER_DAY]
    }

    pub(crate) fn day_price(&self, day: usize) -> &[f64] {
        &self.price[day * HOURS_PER_DAY..(day + 1) * HOURS_PER_DAY]
    }
}

/// Value column of a PV production file.
pub const PRODUCTION_COLUMN: &str = "Production_MWh_per_MW";
/// Value column of a grid price file.
pub const PRICE_COLUMN: &str = "Price_per_MWh";

/// Loads one `Hour,<value_column>` CSV file.
///
/// The first line must be exactly that header. Hours must start at 1 and be
/// contiguous.
pub fn load_profile_csv(
    file_path: impl AsRef<Path>,
    value_column: &str,
) -> anyhow::Result<Vec<f64>> {
    let file_path = file_path.as_ref();
    let file = File::open(file_path)
        .with_context(|| format!("Failed to open file: {}", file_path.display()))?;
    let reader = BufReader::new(file);

    let mut values = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;
        let trimmed = line.trim();

        if line_num == 0 {
            let header: Vec<&str> = trimmed.split(',').map(str::trim).collect();
            if header != ["Hour", value_column] {
                bail!(
                    "Expected header 'Hour,{}', got '{}'",
                    value_column,
                    trimmed
                );
            }
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }

        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if parts.len() != 2 {
            bail!(
                "Line {} has {} columns, expected 2: '{}'",
                line_num + 1,
                parts.len(),
                trimmed
            );
        }
        let hour: usize = parts[0].parse().with_context(|| {
            format!("Failed to parse hour on line {}: '{}'", line_num + 1, parts[0])
        })?;
        if hour != values.len() + 1 {
            bail!(
                "Line {}: expected hour {}, got {}",
                line_num + 1,
                values.len() + 1,
                hour
            );
        }
        let value: f64 = parts[1].parse().with_context(|| {
            format!("Failed to parse value on line {}: '{}'", line_num + 1, parts[1])
        })?;
        values.push(value);
    }

    Ok(values)
}

/// Loads and validates a production file and a price file.
pub fn load_profiles(
    production_path: impl AsRef<Path>,
    price_path: impl AsRef<Path>,
    policy: LengthPolicy,
) -> anyhow::Result<HourlyProfiles> {
    let production =
        load_profile_csv(production_path, PRODUCTION_COLUMN).context("Loading PV production")?;
    let price = load_profile_csv(price_path, PRICE_COLUMN).context("Loading grid prices")?;
    Ok(HourlyProfiles::new(production, price, policy)?)
}
