// src/main.rs

mod cli;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{CommandFactory, Parser};
use color_eyre::eyre::{Result, WrapErr, bail, eyre};
use crossterm::tty::IsTty;
use tracing::{info, warn};

use cli::{Cli, Command, ConfigAction, ScanArgs};
use netgaze::config::{Config, config_path};
use netgaze::core::Collector;
use netgaze::core::deadline::ProbeCeilings;
use netgaze::core::models::{MAX_TIMEOUT, MIN_TIMEOUT, Options, PortClassification, TraceHop};
use netgaze::core::scanner::traceroute_scanner::{compare_hops, run_traceroute};
use netgaze::core::scanner::{NetworkProbes, dns_scanner};
use netgaze::core::target::Target;
use netgaze::logging;
use netgaze::output::render;

const DEFAULT_NEW_TRACE_FILE: &str = "traceroute-new.json";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    if let Err(e) = logging::initialize_logging() {
        eprintln!("warning: file logging disabled: {e}");
    }
    let config = Config::load().wrap_err("failed to load configuration")?;

    match cli.command {
        Some(Command::Config { action }) => run_config(action.unwrap_or(ConfigAction::Show), &config),
        Some(Command::Trace { target, out, timeout }) => {
            run_trace(&target, out, trace_timeout(timeout)).await.map(|_| ())
        }
        Some(Command::TraceDiff { target, base, new, diff, timeout }) => {
            run_trace_diff(&target, base, new, diff, trace_timeout(timeout)).await
        }
        None => run_scan(cli.scan, &config).await,
    }
}

// --- Scan ---

async fn run_scan(args: ScanArgs, config: &Config) -> Result<()> {
    let Some(input) = args.target else {
        Cli::command().print_help()?;
        return Ok(());
    };
    let target = Target::parse(&input)?;

    let requested = args.timeout.map(Duration::from_secs).unwrap_or_else(|| config.timeout());
    let policy = if args.separate_filtered {
        PortClassification::SeparateFiltered
    } else {
        PortClassification::Coarse
    };
    let options =
        Options::new(args.ports || config.enable_ports, clamp_timeout(requested)).with_port_classification(policy);

    info!(target = %target, output = %args.output, "Running collection from the command line.");
    let report = Collector::network()
        .collect(&target, &options)
        .await
        .wrap_err("collection failed")?;

    let stdout = io::stdout();
    let styled = !args.no_style && stdout.is_tty();
    let mut out = stdout.lock();
    render(&report, args.output, styled, &mut out)?;
    out.flush()?;
    Ok(())
}

fn clamp_timeout(requested: Duration) -> Duration {
    let clamped = requested.clamp(MIN_TIMEOUT, MAX_TIMEOUT);
    if clamped != requested {
        warn!(requested_s = requested.as_secs(), clamped_s = clamped.as_secs(), "Timeout out of range, clamped.");
        eprintln!("warning: timeout clamped to {}s", clamped.as_secs());
    }
    clamped
}

// --- Config ---

fn run_config(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("netgaze configuration:");
            println!("  Default Timeout: {}s", config.timeout().as_secs());
            println!("  Enable Port Scan: {}", config.enable_ports);
            if let Some(path) = config_path() {
                println!("  File: {}", path.display());
            }
        }
        ConfigAction::Clear => {
            if Config::clear()? {
                println!("Configuration cleared");
            } else {
                println!("No configuration file found");
            }
        }
        ConfigAction::Set { timeout, ports } => {
            let mut updated = config.clone();
            if let Some(secs) = timeout {
                let requested = Duration::from_secs(secs);
                if requested < MIN_TIMEOUT || requested > MAX_TIMEOUT {
                    bail!("timeout must be between {}s and {}s", MIN_TIMEOUT.as_secs(), MAX_TIMEOUT.as_secs());
                }
                updated.default_timeout_secs = Some(secs);
            }
            if let Some(enable) = ports {
                updated.enable_ports = enable;
            }
            let path = updated.save()?;
            println!("Configuration saved to {}", path.display());
        }
    }
    Ok(())
}

// --- Traceroute files ---

fn trace_timeout(flag: Option<u64>) -> Duration {
    flag.map(Duration::from_secs)
        .map(clamp_timeout)
        .unwrap_or(ProbeCeilings::default().traceroute)
}

async fn trace(target: &Target, budget: Duration) -> Result<Vec<TraceHop>> {
    let probes = NetworkProbes::new();
    let run = async {
        let host = dns_scanner::resolve_host(probes.resolver(), target).await.map_err(|e| eyre!(e))?;
        run_traceroute(probes.resolver(), &host)
            .await
            .map_err(|failure| eyre!(failure.reason))
    };
    tokio::time::timeout(budget, run)
        .await
        .map_err(|_| eyre!("traceroute timed out after {}s", budget.as_secs()))?
}

async fn run_trace(input: &str, out: Option<PathBuf>, budget: Duration) -> Result<PathBuf> {
    let target = Target::parse(input)?;
    let hops = trace(&target, budget).await?;

    let path = out.unwrap_or_else(|| default_trace_file(&target, Utc::now()));
    write_hops(&path, &hops)?;
    println!("Traceroute saved to {}", path.display());
    Ok(path)
}

async fn run_trace_diff(
    input: &str,
    base: Option<PathBuf>,
    new: Option<PathBuf>,
    diff: Option<PathBuf>,
    budget: Duration,
) -> Result<()> {
    let target = Target::parse(input)?;

    let base_path = match base {
        Some(path) => path,
        None => match find_baseline(Path::new("."), &target)? {
            Some(path) => path,
            None => {
                println!("No baseline traceroute found; running initial traceroute...");
                run_trace(input, None, budget).await?
            }
        },
    };
    let base_hops = read_hops(&base_path)?;

    let new_hops = trace(&target, budget).await?;
    let new_path = new.unwrap_or_else(|| PathBuf::from(DEFAULT_NEW_TRACE_FILE));
    write_hops(&new_path, &new_hops)?;

    let changes = compare_hops(&base_hops, &new_hops);
    let mut summary = String::from("Traceroute comparison:\n");
    if changes.is_empty() {
        summary.push_str("No changes\n");
    }
    for change in &changes {
        summary.push_str(&format!("{change}\n"));
    }
    print!("{summary}");

    if let Some(path) = diff {
        fs::write(&path, &summary).wrap_err_with(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

const TRACE_STAMP: &str = "%Y%m%d-%H%M%S";

/// The target as it appears in trace file names. IPv6 colons become `_`.
fn trace_file_stem(target: &Target) -> String {
    format!("traceroute-{}-", target.as_str().replace(':', "_"))
}

fn default_trace_file(target: &Target, now: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!("{}{}.json", trace_file_stem(target), now.format(TRACE_STAMP)))
}

/// The newest `traceroute-<target>-<timestamp>.json` in `dir`. Timestamped
/// names sort chronologically.
fn find_baseline(dir: &Path, target: &Target) -> Result<Option<PathBuf>> {
    let stem = trace_file_stem(target);
    let mut newest: Option<String> = None;
    for entry in fs::read_dir(dir).wrap_err_with(|| format!("failed to list {}", dir.display()))? {
        let Ok(name) = entry?.file_name().into_string() else {
            continue;
        };
        let Some(stamp) = name.strip_prefix(&stem).and_then(|rest| rest.strip_suffix(".json")) else {
            continue;
        };
        if NaiveDateTime::parse_from_str(stamp, TRACE_STAMP).is_err() {
            continue;
        }
        if newest.as_ref().is_none_or(|current| name > *current) {
            newest = Some(name);
        }
    }
    Ok(newest.map(|name| dir.join(name)))
}

fn read_hops(path: &Path) -> Result<Vec<TraceHop>> {
    let data = fs::read_to_string(path).wrap_err_with(|| format!("failed to read baseline file {}", path.display()))?;
    serde_json::from_str(&data).wrap_err_with(|| format!("failed to parse baseline file {}", path.display()))
}

fn write_hops(path: &Path, hops: &[TraceHop]) -> Result<()> {
    let data = serde_json::to_string_pretty(hops)?;
    fs::write(path, data).wrap_err_with(|| format!("failed to write traceroute file {}", path.display()))
}
