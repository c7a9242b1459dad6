// src/core/scanner/port_scanner.rs

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::models::{PortClassification, PortScanResult};
use crate::core::probe::ProbeResult;
use crate::core::target::ResolvedHost;

/// Ports probed by the scan, in probe order.
pub const COMMON_PORTS: [u16; 20] = [
    22, 53, 80, 110, 135, 139, 143, 443, 993, 995, 1723, 3306, 3389, 445, 5900, 8080, 8443, 992, 10000, 1433,
];

pub const PORT_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn run_port_scan(
    host: &ResolvedHost,
    policy: PortClassification,
    cancel: CancellationToken,
) -> ProbeResult<PortScanResult> {
    scan_ports(host.preferred(), &COMMON_PORTS, PORT_TIMEOUT, policy, &cancel).await
}

/// TCP-connects to each port in turn.
///
/// A completed connect is `open` and is closed right away. A refused connect
/// is `closed`. A connect that times out is `closed` under
/// [`PortClassification::Coarse`] and `filtered` otherwise. The scan stops
/// between ports once `cancel` fires.
pub async fn scan_ports(
    ip: IpAddr,
    ports: &[u16],
    per_port: Duration,
    policy: PortClassification,
    cancel: &CancellationToken,
) -> ProbeResult<PortScanResult> {
    info!(%ip, ports = ports.len(), ?policy, "Starting port scan.");
    let mut result = PortScanResult { scanned: ports.to_vec(), ..Default::default() };

    for &port in ports {
        if cancel.is_cancelled() {
            debug!(port, "Port scan cancelled.");
            return Err("Port scan cancelled".into());
        }
        let addr = SocketAddr::new(ip, port);
        match timeout(per_port, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                debug!(port, "Port open.");
                result.open.push(port);
            }
            Ok(Err(e)) => {
                debug!(port, error = %e, "Port closed.");
                result.closed.push(port);
            }
            Err(_) => match policy {
                PortClassification::Coarse => result.closed.push(port),
                PortClassification::SeparateFiltered => {
                    debug!(port, "Port filtered.");
                    result.filtered.push(port);
                }
            },
        }
    }

    info!(open = ?result.open, "Port scan finished.");
    Ok(result)
}
