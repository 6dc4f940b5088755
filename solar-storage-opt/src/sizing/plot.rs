use plotters::prelude::*;
use tracing::info;

use crate::general::calendar::{MONTH_NAMES, get_date_string};
use crate::sizing::extractor::Solution;

/// Bar chart of the net revenue per calendar month of one project year.
pub fn plot_monthly_revenues(
    solution: &Solution,
    year: u32,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut revenues = [0.0_f64; 12];
    for entry in solution.monthly_revenues.iter().filter(|m| m.year == year) {
        revenues[entry.month as usize - 1] += entry.revenue;
    }
    let y_min = revenues.iter().fold(0.0_f64, |a, &b| a.min(b));
    let y_max = revenues.iter().fold(0.0_f64, |a, &b| a.max(b)).max(y_min + 1.0);

    let root = BitMapBackend::new(filename, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Monthly Net Revenue - Year {}", year),
            ("sans-serif", 30),
        )
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..12f64, y_min..y_max * 1.05)?;

    chart
        .configure_mesh()
        .x_labels(12)
        .x_label_formatter(&|x| {
            let month = x.floor() as usize;
            MONTH_NAMES.get(month).map(|m| m.to_string()).unwrap_or_default()
        })
        .y_desc("Revenue")
        .draw()?;

    chart
        .draw_series(revenues.iter().enumerate().map(|(i, &revenue)| {
            Rectangle::new(
                [(i as f64 + 0.1, 0.0), (i as f64 + 0.9, revenue)],
                BLUE.filled(),
            )
        }))?
        .label("Net revenue")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], &BLUE));

    chart.configure_series_labels().draw()?;
    root.present()?;
    info!(filename, "plot saved");
    Ok(())
}

/// Hourly dispatch of one representative day in one project year.
pub fn plot_representative_day(
    solution: &Solution,
    day_index: usize,
    year: u32,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(day) = solution.representative_days.get(day_index) else {
        return Err(format!("representative day {} does not exist", day_index).into());
    };
    let hours: Vec<_> = solution
        .dispatch
        .iter()
        .filter(|h| h.year == year && h.day_of_year == day.day_of_year)
        .collect();
    if hours.is_empty() {
        return Err(format!("no dispatch for year {}", year).into());
    }

    let series: [(&str, RGBColor, Vec<f64>); 5] = [
        (
            "PV production",
            RGBColor(255, 165, 0),
            hours.iter().map(|h| h.pv_production).collect(),
        ),
        (
            "Export",
            BLUE,
            hours
                .iter()
                .map(|h| h.pv_to_grid + h.battery_to_grid)
                .collect(),
        ),
        ("Battery charge", GREEN, hours.iter().map(|h| h.charge()).collect()),
        (
            "Battery discharge",
            RED,
            hours.iter().map(|h| h.discharge()).collect(),
        ),
        ("State of charge", MAGENTA, hours.iter().map(|h| h.soc).collect()),
    ];
    let y_max = series
        .iter()
        .flat_map(|(_, _, values)| values.iter())
        .fold(0.0_f64, |a, &b| a.max(b))
        .max(1.0);

    let root = BitMapBackend::new(filename, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let leap = solution.days_in_year == 366;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "Dispatch on {} (weight {}) - Year {}",
                get_date_string(day.day_of_year, leap),
                day.weight,
                year
            ),
            ("sans-serif", 30),
        )
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..23f64, 0f64..y_max * 1.1)?;

    chart
        .configure_mesh()
        .x_desc("Hour of Day")
        .y_desc("Energy (MWh)")
        .draw()?;

    for (label, color, values) in series.iter() {
        let color = *color;
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, &y)| (i as f64, y)),
                color.stroke_width(2),
            ))?
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    info!(filename, "plot saved");
    Ok(())
}
