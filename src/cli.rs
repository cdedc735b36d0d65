use std::env;
use std::path::PathBuf;

use crate::config::ScenarioConfig;

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub scenario: Option<PathBuf>,
    pub preset: Option<String>,
    pub seed: Option<u64>,
    pub profile_out: Option<PathBuf>,
    pub schedules_out: Option<PathBuf>,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

pub fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.len() == 1 && (args[0] == "--help" || args[0] == "-h") {
        print_usage();
        std::process::exit(0);
    }
    parse_options(&args)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut scenario = None;
    let mut preset = None;
    let mut seed = None;
    let mut profile_out = None;
    let mut schedules_out = None;

    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => {
                i += 1;
                let path =
                    args.next_or_err(i, "missing value for --scenario (expected a TOML file path)")?;
                if scenario.replace(PathBuf::from(path)).is_some() {
                    return Err("--scenario provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name = args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--seed" => {
                i += 1;
                let value = args.next_or_err(i, "missing value for --seed (expected a u64)")?;
                let parsed = value
                    .parse::<u64>()
                    .map_err(|_| format!("--seed value \"{value}\" is not a valid u64"))?;
                if seed.replace(parsed).is_some() {
                    return Err("--seed provided more than once".to_string());
                }
            }
            "--profile-out" => {
                i += 1;
                let path =
                    args.next_or_err(i, "missing value for --profile-out (expected a file path)")?;
                if profile_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--profile-out provided more than once".to_string());
                }
            }
            "--schedules-out" => {
                i += 1;
                let path =
                    args.next_or_err(i, "missing value for --schedules-out (expected a file path)")?;
                if schedules_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--schedules-out provided more than once".to_string());
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if scenario.is_some() && preset.is_some() {
        return Err(
            "arguments `--scenario` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }

    if scenario.is_none() && preset.is_none() {
        preset = Some("household".to_string());
    }

    Ok(CliOptions {
        scenario,
        preset,
        seed,
        profile_out,
        schedules_out,
    })
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("ems-sim: household energy schedule optimizer");
    eprintln!();
    eprintln!("Usage: ems-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!("  --preset <name>          Use a built-in preset ({})", ScenarioConfig::PRESETS.join(", "));
    eprintln!("  --seed <u64>             Override the random seed");
    eprintln!("  --profile-out <path>     Export the optimized load profile to CSV");
    eprintln!("  --schedules-out <path>   Export per-device schedules to CSV");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the household preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}
