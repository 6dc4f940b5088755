pub mod calendar;
pub mod finance;
pub mod time_series;

pub use finance::{IrrError, irr, npv, payback_period};
pub use time_series::{
    HourlyProfiles, LengthPolicy, PRICE_COLUMN, PRODUCTION_COLUMN, load_profile_csv, load_profiles,
};
