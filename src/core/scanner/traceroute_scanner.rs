// src/core/scanner/traceroute_scanner.rs

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::TokioAsyncResolver;
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::models::TraceHop;
use crate::core::probe::ProbeResult;
use crate::core::target::ResolvedHost;

pub const MAX_HOPS: u8 = 15;
const HOP_WAIT_SECS: u8 = 3;
const HOP_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs the system `traceroute` against the preferred address and parses its
/// output into hops, filling in host names with reverse lookups.
pub async fn run_traceroute(resolver: &TokioAsyncResolver, host: &ResolvedHost) -> ProbeResult<Vec<TraceHop>> {
    let ip = host.preferred().to_string();
    info!(%ip, max_hops = MAX_HOPS, "Starting traceroute.");

    let output = run_system_traceroute(&ip).await.map_err(|e| {
        warn!(%ip, error = %e, "Traceroute failed.");
        format!("Traceroute failed: {e}")
    })?;

    let mut hops = parse_traceroute_output(&output);
    if hops.is_empty() {
        return Err("Traceroute failed: no hops in output".into());
    }
    resolve_hop_names(resolver, &mut hops).await;

    info!(hops = hops.len(), "Traceroute finished.");
    Ok(hops)
}

async fn run_system_traceroute(ip: &str) -> Result<String, String> {
    let max_hops = MAX_HOPS.to_string();
    let wait = HOP_WAIT_SECS.to_string();
    let numeric = Command::new("traceroute")
        .args(["-n", "-m", max_hops.as_str(), "-w", wait.as_str(), ip])
        .output()
        .await;

    match numeric {
        Ok(out) if out.status.success() => return Ok(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(out) => debug!(status = %out.status, "Numeric traceroute failed, retrying with defaults."),
        Err(e) => debug!(error = %e, "Numeric traceroute could not start, retrying with defaults."),
    }

    // Some implementations reject the flags above.
    let out = Command::new("traceroute")
        .arg(ip)
        .output()
        .await
        .map_err(|e| format!("traceroute command failed: {e}"))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let stderr = stderr.trim();
        return Err(if stderr.is_empty() {
            format!("traceroute command failed: {}", out.status)
        } else {
            format!("traceroute command failed: {stderr}")
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Parses `traceroute` output, one hop per numbered line.
///
/// Handles both numeric (`1  10.0.0.1  1.234 ms ...`) and named
/// (`1  gw.local (10.0.0.1)  1.234 ms ...`) lines. Lines made only of `*`
/// become hops flagged as timed out. Only the first answer per hop is kept.
pub fn parse_traceroute_output(output: &str) -> Vec<TraceHop> {
    let mut hops = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("traceroute") {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        let Ok(number) = fields[0].parse::<u32>() else {
            continue;
        };

        let mut hop = TraceHop { hop: number, ..Default::default() };
        for (idx, field) in fields.iter().enumerate().skip(1) {
            let bare = field.trim_start_matches('(').trim_end_matches(')');
            if hop.ip.is_empty() && bare.parse::<IpAddr>().is_ok() {
                hop.ip = bare.to_string();
                if field.starts_with('(') {
                    let name = fields[idx - 1];
                    if idx > 1 && name != "*" && name.parse::<IpAddr>().is_err() {
                        hop.host = name.to_string();
                    }
                }
            } else if hop.rtt.is_empty() {
                if let Some(ms) = parse_rtt(field, fields.get(idx + 1).copied()) {
                    hop.rtt = format!("{ms:.1}ms");
                }
            }
            if !hop.ip.is_empty() && !hop.rtt.is_empty() {
                break;
            }
        }

        if hop.ip.is_empty() && hop.rtt.is_empty() {
            hop.timeout = true;
            hop.rtt = "*".to_string();
        }
        hops.push(hop);
    }
    hops.sort_by_key(|hop| hop.hop);
    hops
}

/// Accepts `1.234 ms` (two tokens) and `1.234ms`.
fn parse_rtt(field: &str, next: Option<&str>) -> Option<f64> {
    if let Some(number) = field.strip_suffix("ms") {
        if !number.is_empty() {
            return number.parse().ok();
        }
    }
    if next == Some("ms") {
        return field.parse().ok();
    }
    None
}

async fn resolve_hop_names(resolver: &TokioAsyncResolver, hops: &mut [TraceHop]) {
    let mut lookups = JoinSet::new();
    for (index, hop) in hops.iter().enumerate() {
        if !hop.host.is_empty() {
            continue;
        }
        let Ok(ip) = hop.ip.parse::<IpAddr>() else {
            continue;
        };
        let resolver = resolver.clone();
        lookups.spawn(async move {
            let name = timeout(HOP_LOOKUP_TIMEOUT, resolver.reverse_lookup(ip))
                .await
                .ok()
                .and_then(Result::ok)
                .and_then(|names| names.iter().next().map(|n| n.to_string().trim_end_matches('.').to_string()));
            (index, name)
        });
    }

    while let Some(joined) = lookups.join_next().await {
        if let Ok((index, Some(name))) = joined {
            hops[index].host = name;
        }
    }
}

/// A difference between two traceroutes of the same target, by hop number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopChange {
    Changed { hop: u32, from: String, to: String },
    Removed { hop: u32, ip: String },
    Added { hop: u32, ip: String },
}

impl fmt::Display for HopChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HopChange::Changed { hop, from, to } => write!(f, "Hop {hop} changed: {from} -> {to}"),
            HopChange::Removed { hop, ip } => write!(f, "Hop {hop}: removed (was {ip})"),
            HopChange::Added { hop, ip } => write!(f, "Hop {hop}: new ({ip})"),
        }
    }
}

/// Compares two hop lists position by position.
///
/// A silent hop compares as `*`, so a router that stops answering shows up
/// as a change.
pub fn compare_hops(base: &[TraceHop], new: &[TraceHop]) -> Vec<HopChange> {
    fn label(hop: &TraceHop) -> String {
        if hop.ip.is_empty() { "*".to_string() } else { hop.ip.clone() }
    }

    let mut changes = Vec::new();
    for i in 0..base.len().max(new.len()) {
        match (base.get(i), new.get(i)) {
            (Some(old), Some(current)) => {
                let (from, to) = (label(old), label(current));
                if from != to {
                    changes.push(HopChange::Changed { hop: current.hop, from, to });
                }
            }
            (Some(old), None) => changes.push(HopChange::Removed { hop: old.hop, ip: label(old) }),
            (None, Some(current)) => changes.push(HopChange::Added { hop: current.hop, ip: label(current) }),
            (None, None) => {}
        }
    }
    changes
}
