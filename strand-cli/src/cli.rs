//! Application definition.

extern crate simplelog;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use strand_net::{Encoding, LaunchConfig};

use crate::demo;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("strand")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(VERSION)
        .author(AUTHORS)
        .about("Run work-stealing task clusters from the command line.")
        .arg(Arg::with_name("verbosity")
            .long("verbosity")
            .short("v")
            .takes_value(true)
            .default_value("info")
            .value_name("verb")
            .global(true)
            .help("Set the verbosity of the log output"))
        // run subcommand
        .subcommand(SubCommand::with_name("run")
            .display_order(10)
            .about("Launch a local cluster and sum Euler's totient over a range")
            .arg(Arg::with_name("workers")
                .long("workers")
                .short("w")
                .takes_value(true)
                .value_name("count")
                .help("Number of workers, each on its own thread (default: 1)"))
            .arg(Arg::with_name("n")
                .long("n")
                .short("n")
                .takes_value(true)
                .default_value("2000")
                .help("Upper end of the summed range"))
            .arg(Arg::with_name("grain")
                .long("grain")
                .short("g")
                .takes_value(true)
                .default_value("100")
                .help("Size of range below which a task stops splitting"))
            .arg(Arg::with_name("encoding")
                .long("encoding")
                .short("e")
                .takes_value(true)
                .possible_values(&["bincode", "msgpack", "json"])
                .help("Force all messages through the selected encoding"))
            .arg(Arg::with_name("config")
                .long("config")
                .short("c")
                .takes_value(true)
                .value_name("path")
                .help("Path to cluster configuration file (toml)")))
}

pub fn app_matches<'a>() -> ArgMatches<'a> {
    app().get_matches()
}

pub fn start(matches: ArgMatches) -> Result<()> {
    setup_log_verbosity(&matches);
    match matches.subcommand() {
        ("run", Some(m)) => start_run(m),
        _ => Ok(()),
    }
}

/// Reads the launch config from file if provided, applying overrides from
/// the command line on top.
fn launch_config(matches: &ArgMatches) -> Result<LaunchConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => read_config(Path::new(path))?,
        None => LaunchConfig::default(),
    };
    if let Some(workers) = matches.value_of("workers") {
        config.workers = workers
            .parse()
            .with_context(|| format!("invalid worker count: {}", workers))?;
    }
    if let Some(encoding) = matches.value_of("encoding") {
        config.encoding = Some(encoding.parse::<Encoding>()?);
    }
    Ok(config)
}

pub fn read_config(path: &Path) -> Result<LaunchConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed reading config file: {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("failed parsing config file: {}", path.display()))?;
    Ok(config)
}

fn start_run(matches: &ArgMatches) -> Result<()> {
    let config = launch_config(matches)?;
    let n: u64 = matches
        .value_of("n")
        .unwrap_or("2000")
        .parse()
        .context("invalid range end")?;
    let grain: u64 = matches
        .value_of("grain")
        .unwrap_or("100")
        .parse()
        .context("invalid grain")?;
    info!(
        "summing totients up to {} on {} workers (grain: {})",
        n, config.workers, grain
    );

    let (sum, stats) = demo::run(config, n, grain)?;
    println!("sum of totients for 1..={}: {}", n, sum.to_string().green());
    for (id, s) in stats.iter().enumerate() {
        println!(
            "{} tasks: {:>6}, steals: {:>4}/{:<4}, victimized: {:>4}",
            format!("w{}", id).yellow(),
            s.n_tasks_run,
            s.n_successful_steals,
            s.n_attempted_steals,
            s.n_victimized
        );
    }
    Ok(())
}

fn setup_log_verbosity(matches: &ArgMatches) {
    use self::simplelog::{LevelFilter, TermLogger};
    let level_filter = match matches.value_of("verbosity") {
        Some(s) => match s {
            "0" | "none" => LevelFilter::Off,
            "1" | "err" | "error" | "min" => LevelFilter::Error,
            "2" | "warn" | "warning" | "default" => LevelFilter::Warn,
            "3" | "info" => LevelFilter::Info,
            "4" | "debug" => LevelFilter::Debug,
            "5" | "trace" | "max" | "all" => LevelFilter::Trace,
            _ => LevelFilter::Warn,
        },
        _ => LevelFilter::Warn,
    };
    let mut config_builder = simplelog::ConfigBuilder::new();
    let logger_conf = config_builder
        .set_time_level(LevelFilter::Error)
        .set_target_level(LevelFilter::Debug)
        .set_location_level(LevelFilter::Error)
        .set_time_format_str("%H:%M:%S%.6f")
        .build();
    let _ = TermLogger::init(level_filter, logger_conf, simplelog::TerminalMode::Mixed);
}
