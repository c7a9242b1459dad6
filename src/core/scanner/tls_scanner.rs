// src/core/scanner/tls_scanner.rs

use tracing::{debug, error, info};

use crate::core::models::TlsInfo;
use crate::core::probe::{ProbeFailure, ProbeResult};
use crate::core::target::ResolvedHost;
use chrono::{DateTime, SecondsFormat, Utc};
use native_tls::TlsConnector;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tokio::task::spawn_blocking;
use x509_parser::prelude::*;

pub const TLS_PORT: u16 = 443;

/// Bounds the blocking connect and every read/write of the handshake.
const IO_TIMEOUT: Duration = Duration::from_secs(4);

/// Reads the leaf certificate presented on port 443 of the resolved address.
///
/// Verification is disabled on purpose: the goal is to report what the
/// server presents, including expired or self-signed certificates.
pub async fn run_tls_scan(host: &ResolvedHost) -> ProbeResult<TlsInfo> {
    info!(target = %host.target(), "Starting TLS certificate inspection.");
    let addr = SocketAddr::new(host.preferred(), TLS_PORT);
    let server_name = host.server_name();

    debug!("Spawning blocking task for TLS connection.");
    let scan_result = spawn_blocking(move || perform_tls_scan(addr, &server_name))
        .await
        .unwrap_or_else(|e| {
            error!(panic = %e, "Blocking TLS task panicked!");
            Err(format!("Task panicked: {e}"))
        });

    if let Ok(tls) = &scan_result {
        info!(cn = %tls.common_name, expired = tls.expired, self_signed = tls.self_signed, "TLS inspection finished.");
    }
    scan_result.map_err(ProbeFailure::from)
}

fn perform_tls_scan(addr: SocketAddr, server_name: &str) -> Result<TlsInfo, String> {
    debug!(%addr, server_name, "Performing TLS connection and handshake.");

    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| {
            error!(error = %e, "Failed to create TlsConnector");
            format!("TlsConnector Error: {e}")
        })?;

    let stream = TcpStream::connect_timeout(&addr, IO_TIMEOUT).map_err(|e| {
        error!(error = %e, "TCP connection failed");
        format!("TCP Connection Error: {e}")
    })?;
    stream
        .set_read_timeout(Some(IO_TIMEOUT))
        .and_then(|()| stream.set_write_timeout(Some(IO_TIMEOUT)))
        .map_err(|e| format!("TCP Connection Error: {e}"))?;

    let stream = connector.connect(server_name, stream).map_err(|e| {
        error!(error = %e, "TLS handshake failed");
        format!("TLS Handshake Error: {e}")
    })?;

    let cert = match stream.peer_certificate() {
        Ok(Some(c)) => c,
        Ok(None) => return Err("no TLS certificates presented".to_string()),
        Err(e) => {
            error!(error = %e, "Failed to retrieve peer certificate from stream");
            return Err(format!("Could not get peer certificate: {e}"));
        }
    };

    let cert_der = cert.to_der().map_err(|e| {
        error!(error = %e, "Failed to convert certificate to DER format");
        format!("Could not convert certificate to DER: {e}")
    })?;

    certificate_facts(&cert_der, Utc::now())
}

/// Extracts the reported facts from a DER-encoded certificate as seen at `now`.
pub fn certificate_facts(der: &[u8], now: DateTime<Utc>) -> Result<TlsInfo, String> {
    let (_, x509) = parse_x509_certificate(der).map_err(|e| {
        error!(error = %e, "Failed to parse X.509 certificate");
        format!("X.509 Parse Error: {e}")
    })?;

    debug!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");

    let common_name = x509
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    let alt_names = match x509.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let validity = x509.validity();
    let not_before = asn1_time_to_chrono_utc(&validity.not_before);
    let not_after = asn1_time_to_chrono_utc(&validity.not_after);

    Ok(TlsInfo {
        subject: x509.subject().to_string(),
        issuer: x509.issuer().to_string(),
        common_name,
        alt_names,
        not_before: not_before.to_rfc3339_opts(SecondsFormat::Secs, true),
        not_after: not_after.to_rfc3339_opts(SecondsFormat::Secs, true),
        expired: now > not_after,
        self_signed: x509.subject().as_raw() == x509.issuer().as_raw(),
    })
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::Target;

    #[test]
    fn rejects_garbage_certificates() {
        let err = certificate_facts(&[0x30, 0x03, 0x01, 0x02, 0x03], Utc::now()).unwrap_err();
        assert!(err.starts_with("X.509 Parse Error"));
    }

    #[tokio::test]
    async fn reports_handshake_failure_as_soft_error() {
        // Nothing listens on 443 at the loopback address in the test environment.
        let target = Target::parse("127.0.0.1").unwrap();
        let host = ResolvedHost::new(target, vec!["127.0.0.1".parse().unwrap()]).unwrap();
        let failure = run_tls_scan(&host).await.unwrap_err();
        assert!(failure.partial.is_none());
        assert!(!failure.reason.is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn reads_a_public_certificate() {
        let target = Target::parse("google.com").unwrap();
        let host = ResolvedHost::new(target, vec!["142.250.80.46".parse().unwrap()]).unwrap();
        let tls = run_tls_scan(&host).await.unwrap();
        assert!(!tls.alt_names.is_empty());
        assert!(!tls.expired);
    }
}
