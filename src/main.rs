use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use speedpick::config::Config;
use speedpick::session::{Operation, Outcome};
use speedpick::throughput::report;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

#[derive(Parser, Debug)]
#[command(
    name = "speedpick",
    about = "Pick a nearby speed test server and measure download/upload throughput",
    version,
    long_about = None
)]
struct Cli {
    /// Locate, pick the best server, then run download and upload tests
    #[arg(short = 'a', long, action = ArgAction::Append, num_args = 0, default_missing_value = "true")]
    auto: Vec<bool>,

    /// Run an upload test against the server with this id
    #[arg(short = 'u', long, value_name = "ID")]
    upload: Vec<String>,

    /// Run a download test against the server with this id
    #[arg(short = 'd', long, value_name = "ID")]
    download: Vec<String>,

    /// Print the location reported by the geo-IP service
    #[arg(short = 'l', long, action = ArgAction::Append, num_args = 0, default_missing_value = "true")]
    locate: Vec<bool>,

    /// Print the best server for this location
    #[arg(short = 'f', long, action = ArgAction::Append, num_args = 0, default_missing_value = "true")]
    find_best: Vec<bool>,

    /// Config file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Server catalog (JSON), overrides the config
    #[arg(long, value_name = "PATH")]
    catalog: Option<PathBuf>,

    /// JSON output for machine parsing
    #[arg(long)]
    json: bool,
}

const KNOWN_LONG: &[&str] = &[
    "--auto",
    "--upload",
    "--download",
    "--locate",
    "--find-best",
    "--config",
    "--catalog",
    "--json",
    "--help",
    "--version",
];
const KNOWN_SHORT: &[char] = &['a', 'u', 'd', 'l', 'f', 'h', 'V'];
const SHORT_WITH_VALUE: &[char] = &['u', 'd'];
const LONG_WITH_VALUE: &[&str] = &["--upload", "--download", "--config", "--catalog"];

/// Split argv into what clap should see and what it would reject.
///
/// Unknown options, stray positionals and options missing their value are
/// returned separately so they can be reported without aborting the rest of
/// the command line.
fn split_unknown_args(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut kept = Vec::with_capacity(args.len());
    let mut rejected = Vec::new();
    let mut iter = args.into_iter();

    if let Some(bin) = iter.next() {
        kept.push(bin);
    }

    let mut expecting_value = false;
    for arg in iter {
        if expecting_value {
            expecting_value = false;
            if !(arg.starts_with('-') && arg.len() > 1) {
                kept.push(arg);
                continue;
            }
            reject_valueless(&mut kept, &mut rejected);
        }

        if let Some(long) = arg.strip_prefix("--") {
            let name = format!("--{}", long.split('=').next().unwrap_or(""));
            if KNOWN_LONG.contains(&name.as_str()) {
                expecting_value = LONG_WITH_VALUE.contains(&name.as_str()) && !long.contains('=');
                kept.push(arg);
            } else {
                rejected.push(arg);
            }
            continue;
        }

        if let Some(shorts) = arg.strip_prefix('-').filter(|s| !s.is_empty()) {
            let mut known = true;
            let mut needs_value = false;
            for (i, c) in shorts.char_indices() {
                if !KNOWN_SHORT.contains(&c) {
                    known = false;
                    break;
                }
                if SHORT_WITH_VALUE.contains(&c) {
                    needs_value = i + c.len_utf8() == shorts.len();
                    break;
                }
            }
            if known {
                expecting_value = needs_value;
                kept.push(arg);
            } else {
                rejected.push(arg);
            }
            continue;
        }

        rejected.push(arg);
    }

    if expecting_value {
        reject_valueless(&mut kept, &mut rejected);
    }

    (kept, rejected)
}

/// Move the last kept option, which is missing its value, to `rejected`.
/// Flags clustered in front of it (`-lu`) stay.
fn reject_valueless(kept: &mut Vec<String>, rejected: &mut Vec<String>) {
    let Some(option) = kept.pop() else {
        return;
    };
    match option.strip_prefix('-').filter(|s| !s.starts_with('-')) {
        Some(shorts) if shorts.chars().count() > 1 => {
            let split = shorts.len() - shorts.chars().last().map_or(0, char::len_utf8);
            kept.push(format!("-{}", &shorts[..split]));
            rejected.push(format!("-{}", &shorts[split..]));
        }
        _ => rejected.push(option),
    }
}

/// Requested operations in the order they appeared on the command line.
fn ordered_operations(matches: &ArgMatches) -> Vec<Operation> {
    let mut ops: Vec<(usize, Operation)> = Vec::new();

    for (id, op) in [
        ("auto", Operation::Auto),
        ("locate", Operation::Locate),
        ("find_best", Operation::FindBest),
    ] {
        if let Some(indices) = matches.indices_of(id) {
            ops.extend(indices.map(|index| (index, op.clone())));
        }
    }

    for (id, make) in [
        ("upload", Operation::Upload as fn(String) -> Operation),
        ("download", Operation::Download as fn(String) -> Operation),
    ] {
        if let (Some(values), Some(indices)) =
            (matches.get_many::<String>(id), matches.indices_of(id))
        {
            for (index, value) in indices.zip(values) {
                ops.push((index, make(value.clone())));
            }
        }
    }

    ops.sort_by_key(|(index, _)| *index);
    ops.into_iter().map(|(_, op)| op).collect()
}

fn print_outcome(outcome: &Outcome, json: bool) {
    if json {
        match serde_json::to_string(outcome) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "failed to serialize outcome"),
        }
        return;
    }

    match outcome {
        Outcome::Located(location) => println!("{}", report::format_location(location)),
        Outcome::Selected(server) => println!("Best {}", report::format_server(server)),
        Outcome::Measured(result) => println!("{}", report::format_measurement(result)),
    }
}

type LogFilter = reload::Handle<EnvFilter, Registry>;

/// Install the stderr subscriber at `info` (or `RUST_LOG`) so config loading
/// is logged; [`apply_log_level`] narrows it once the config is known.
fn init_tracing() -> LogFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    handle
}

fn apply_log_level(handle: &LogFilter, level: &str) {
    if EnvFilter::try_from_default_env().is_ok() {
        return;
    }
    if let Err(e) = handle.reload(EnvFilter::new(level)) {
        tracing::warn!(error = %e, level, "could not apply configured log level");
    }
}

async fn run() -> Result<ExitCode> {
    let log_filter = init_tracing();

    let (args, rejected) = split_unknown_args(std::env::args().collect());
    for arg in &rejected {
        eprintln!("Ignoring invalid option: {}", arg);
    }

    let matches = match Cli::command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            e.print()?;
            return Ok(ExitCode::from(2));
        }
    };
    let cli = Cli::from_arg_matches(&matches)?;
    let ops = ordered_operations(&matches);

    let config = Config::resolve(cli.config.as_deref())?;
    apply_log_level(&log_filter, &config.logging.level);

    if ops.is_empty() {
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::from(2));
    }

    let mut session = speedpick::open_session(config, cli.catalog.as_deref())?;

    let json = cli.json;
    let summary = session
        .run(&ops, &mut |outcome: Outcome| print_outcome(&outcome, json))
        .await;

    if summary.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
