// src/core/scanner/ping_scanner.rs

use std::time::Duration;

use surge_ping::SurgeError;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::core::models::PingStats;
use crate::core::probe::ProbeResult;
use crate::core::target::ResolvedHost;

pub const PING_COUNT: u32 = 5;
const PING_INTERVAL: Duration = Duration::from_millis(200);
const REPLY_TIMEOUT: Duration = Duration::from_millis(800);
const PAYLOAD: [u8; 56] = [0; 56];

/// Sends [`PING_COUNT`] ICMP echo requests to the preferred address.
///
/// Lost replies only count against the loss percentage. The probe fails
/// outright when the socket cannot be used at all (typically missing
/// privileges for raw ICMP).
pub async fn run_ping_scan(host: &ResolvedHost) -> ProbeResult<PingStats> {
    let ip = host.preferred();
    info!(%ip, count = PING_COUNT, "Starting ping.");

    let mut rtts = Vec::with_capacity(PING_COUNT as usize);
    let mut sent = 0;
    for seq in 0..PING_COUNT {
        if seq > 0 {
            sleep(PING_INTERVAL).await;
        }
        sent += 1;
        match timeout(REPLY_TIMEOUT, surge_ping::ping(ip, &PAYLOAD)).await {
            Ok(Ok((_, rtt))) => {
                debug!(seq, rtt_ms = rtt.as_secs_f64() * 1000.0, "Echo reply received.");
                rtts.push(rtt);
            }
            Ok(Err(SurgeError::Timeout { .. })) | Err(_) => debug!(seq, "No echo reply."),
            Ok(Err(e)) => {
                warn!(%ip, error = %e, "Ping failed.");
                return Err(format!("Ping failed: {e}").into());
            }
        }
    }

    let stats = summarize(sent, &rtts);
    info!(received = stats.packets_received, loss = stats.packet_loss_pct, "Ping finished.");
    Ok(stats)
}

/// Builds the statistics block from the round trips that came back.
pub fn summarize(sent: u32, rtts: &[Duration]) -> PingStats {
    let received = rtts.len() as u32;
    let packet_loss_pct = if sent == 0 {
        0.0
    } else {
        f64::from(sent - received) / f64::from(sent) * 100.0
    };

    let mut stats = PingStats {
        packets_sent: sent,
        packets_received: received,
        packet_loss_pct,
        success: received > 0,
        ..Default::default()
    };
    if rtts.is_empty() {
        return stats;
    }

    let min = rtts.iter().min().copied().unwrap_or_default();
    let max = rtts.iter().max().copied().unwrap_or_default();
    let total: Duration = rtts.iter().sum();
    let avg = total / received;

    let mean = avg.as_secs_f64();
    let variance = rtts
        .iter()
        .map(|rtt| {
            let delta = rtt.as_secs_f64() - mean;
            delta * delta
        })
        .sum::<f64>()
        / f64::from(received);

    stats.min_rtt = format_rtt(min);
    stats.avg_rtt = format_rtt(avg);
    stats.max_rtt = format_rtt(max);
    stats.stddev_rtt = format!("{:.2}ms", variance.sqrt() * 1000.0);
    stats
}

/// `12.4ms` above a millisecond, `0.35ms` below.
pub fn format_rtt(rtt: Duration) -> String {
    let ms = rtt.as_secs_f64() * 1000.0;
    if ms < 1.0 { format!("{ms:.2}ms") } else { format!("{ms:.1}ms") }
}
