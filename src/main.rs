//! Energy schedule optimizer entry point: CLI wiring and config-driven solving.

use std::process;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ems_sim::cli::{CliOptions, parse_args};
use ems_sim::config::ScenarioConfig;
use ems_sim::io::export::{export_profile_csv, export_schedules_csv};
use ems_sim::scenario::Scenario;
use ems_sim::sim::kpi::ProfileKpis;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> (CliOptions, ScenarioConfig) {
    let cli = parse_args().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        ems_sim::cli::print_usage();
        process::exit(1);
    });

    // --scenario takes priority; the parser fills in the household preset otherwise
    let loaded = match (&cli.scenario, &cli.preset) {
        (Some(path), _) => ScenarioConfig::from_toml_file(path),
        (None, Some(name)) => ScenarioConfig::from_preset(name),
        (None, None) => Ok(ScenarioConfig::household()),
    };
    let mut cfg = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });
    if let Some(seed) = cli.seed {
        cfg = cfg.with_seed(seed);
    }
    (cli, cfg)
}

fn main() {
    init_tracing();
    let (cli, cfg) = load_config();

    let scenario = Scenario::build(&cfg).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });
    let names = scenario.names.clone();
    let signals = scenario.signals.clone();

    let result = match scenario.solve() {
        Ok(Some(result)) => result,
        Ok(None) => {
            eprintln!("error: no solution was found");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    info!(fitness = result.fitness, ticks = result.load_profile.len(), "optimization finished");
    for schedule in &result.schedules {
        let name = names.get(&schedule.device_id).map_or("?", String::as_str);
        println!(
            "{name:<12} {:<15} cervisia {:.4}",
            schedule.device_kind, schedule.cervisia
        );
    }
    println!("\nFitness:               {:.4}", result.fitness);
    println!("{}", ProfileKpis::from_profile(&result.load_profile, &signals.prices));

    if let Some(path) = &cli.profile_out {
        if let Err(e) = export_profile_csv(&result.load_profile, path) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Load profile written to {}", path.display());
    }
    if let Some(path) = &cli.schedules_out {
        if let Err(e) = export_schedules_csv(&result.schedules, &names, path) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Schedules written to {}", path.display());
    }
}
