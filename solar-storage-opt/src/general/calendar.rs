//! Day-of-year helpers for a non-leap or leap calendar year.

pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub const HOURS_PER_DAY: usize = 24;

/// Days in each month, February depending on `leap`.
pub fn days_in_month(leap: bool) -> [usize; 12] {
    let february = if leap { 29 } else { 28 };
    [31, february, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
}

/// Zero-based day ranges `[start, end)` of the twelve months.
pub fn month_day_ranges(leap: bool) -> [std::ops::Range<usize>; 12] {
    let lengths = days_in_month(leap);
    let mut start = 0;
    std::array::from_fn(|month| {
        let range = start..start + lengths[month];
        start = range.end;
        range
    })
}

/// Zero-based month and day of month of a zero-based day of year.
///
/// Days past the end of the year wrap around, so development series longer
/// than a year still map onto a month.
pub fn month_and_day(day: usize, leap: bool) -> (usize, usize) {
    let year_len = if leap { 366 } else { 365 };
    let mut remaining_days = day % year_len;
    for (month, &days) in days_in_month(leap).iter().enumerate() {
        if remaining_days < days {
            return (month, remaining_days);
        }
        remaining_days -= days;
    }
    (11, remaining_days)
}

/// Month (1 to 12) of a zero-based day of year.
pub fn month_of_day(day: usize, leap: bool) -> u32 {
    month_and_day(day, leap).0 as u32 + 1
}

/// Readable date string of a zero-based day, e.g. `"Mar 1"`.
pub fn get_date_string(day: usize, leap: bool) -> String {
    let (month, day_of_month) = month_and_day(day, leap);
    format!("{} {}", MONTH_NAMES[month], day_of_month + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_ranges_cover_the_year() {
        let ranges = month_day_ranges(false);
        assert_eq!(ranges[0], 0..31);
        assert_eq!(ranges[1], 31..59);
        assert_eq!(ranges[11].end, 365);
        assert_eq!(month_day_ranges(true)[11].end, 366);
    }

    #[test]
    fn month_of_day_boundaries() {
        assert_eq!(month_of_day(0, false), 1);
        assert_eq!(month_of_day(58, false), 2);
        assert_eq!(month_of_day(59, false), 3);
        assert_eq!(month_of_day(59, true), 2);
        assert_eq!(month_of_day(364, false), 12);
        assert_eq!(month_of_day(365, false), 1);
    }

    #[test]
    fn month_and_day_wraps_past_year_end() {
        assert_eq!(month_and_day(0, false), (0, 0));
        assert_eq!(month_and_day(31, false), (1, 0));
        assert_eq!(month_and_day(365 + 40, false), month_and_day(40, false));
        assert_eq!(MONTH_NAMES[month_and_day(200, true).0], "Jul");
    }

    #[test]
    fn date_strings() {
        assert_eq!(get_date_string(0, false), "Jan 1");
        assert_eq!(get_date_string(59, false), "Mar 1");
        assert_eq!(get_date_string(59, true), "Feb 29");
        assert_eq!(get_date_string(364, false), "Dec 31");
    }
}
