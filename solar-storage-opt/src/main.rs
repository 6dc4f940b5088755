use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use solar_storage_model::ScenarioParameters;
use solar_storage_opt::general::time_series::{LengthPolicy, load_profiles};
use solar_storage_opt::sizing::plot::{plot_monthly_revenues, plot_representative_day};
use solar_storage_opt::sizing::{
    OptimizationMode, RepresentativeDays, SizingConfig, TaskContext, engine,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: solar-storage-opt <production.csv> <price.csv> [scenario.json] \
[--days N] [--full-year] [--milp] [--dev] [--plot DIR] [--time-limit SECS]";

struct Args {
    production: PathBuf,
    price: PathBuf,
    scenario: Option<PathBuf>,
    config: SizingConfig,
    policy: LengthPolicy,
    plot_dir: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut config = SizingConfig::default();
    let mut policy = LengthPolicy::Calendar;
    let mut plot_dir = None;
    let mut days_given = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--days" => {
                let value = args.next().context("--days needs a value")?;
                let count = value
                    .parse()
                    .with_context(|| format!("Invalid day count: {}", value))?;
                config.representative_days = RepresentativeDays::Count(count);
                days_given = true;
            }
            "--full-year" => {
                config.representative_days = RepresentativeDays::FullYear;
                days_given = true;
            }
            "--milp" => config.mode = OptimizationMode::MilpStrict,
            "--dev" => policy = LengthPolicy::Development,
            "--plot" => {
                plot_dir = Some(PathBuf::from(args.next().context("--plot needs a directory")?));
            }
            "--time-limit" => {
                let value = args.next().context("--time-limit needs a value")?;
                let secs: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid time limit: {}", value))?;
                config.time_limit = Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("Invalid time limit: {}", value))?;
            }
            flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    // development profiles are usually a few days long
    if policy == LengthPolicy::Development && !days_given {
        config.representative_days = RepresentativeDays::FullYear;
    }

    let mut positional = positional.into_iter();
    let (Some(production), Some(price)) = (positional.next(), positional.next()) else {
        bail!(USAGE);
    };
    let scenario = positional.next();
    if positional.next().is_some() {
        bail!(USAGE);
    }

    Ok(Args {
        production,
        price,
        scenario,
        config,
        policy,
        plot_dir,
    })
}

/// Reference economics used when no scenario file is given.
fn default_scenario() -> ScenarioParameters {
    ScenarioParameters {
        pv_capex_per_mw: 1_000_000.0,
        bess_capex_per_mwh: 300_000.0,
        discount_rate: 0.08,
        interconnection_capacity_mw: 50.0,
        onsite_load_price_per_mwh: 50.0,
        onsite_load_max_mw: 10.0,
        yoy_price_escalation_rate: 0.02,
        pv_max_size_mw: Some(100.0),
        bess_max_size_mwh: Some(200.0),
        project_horizon_years: 25,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = parse_args()?;
    let profiles = load_profiles(&args.production, &args.price, args.policy)?;
    let scenario = match &args.scenario {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse scenario {}", path.display()))?
        }
        None => default_scenario(),
    };

    let (ctx, slot) = TaskContext::with_slot("cli");
    let solution = engine::run(&ctx, &profiles, &scenario, &args.config)?;
    info!(
        pv_mw = solution.pv_size_mw,
        bess_mwh = solution.bess_size_mwh,
        npv = solution.npv,
        progress = slot.payload().progress,
        "sizing finished"
    );

    println!("{}", serde_json::to_string_pretty(&solution.to_result())?);

    if let Some(dir) = args.plot_dir {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join("monthly_revenues.png");
        plot_monthly_revenues(&solution, 1, &path.to_string_lossy())
            .map_err(|e| anyhow::anyhow!("Failed to plot monthly revenues: {}", e))?;
        for index in 0..solution.representative_days.len() {
            let path = dir.join(format!("day_{:02}.png", index));
            plot_representative_day(&solution, index, 1, &path.to_string_lossy())
                .map_err(|e| anyhow::anyhow!("Failed to plot day {}: {}", index, e))?;
        }
    }

    Ok(())
}
