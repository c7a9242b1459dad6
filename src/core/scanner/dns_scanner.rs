// src/core/scanner/dns_scanner.rs

use std::future::Future;
use std::net::IpAddr;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::core::models::{DnsRecords, DnsScan, ProbeKind};
use crate::core::target::{ResolvedHost, Target};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::{RData, RecordType};
use std::time::Duration;

/// Per-query timeout handed to the resolver.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds the resolver shared by every DNS-backed probe.
///
/// Uses the host's resolver configuration when it can be read and falls back
/// to the library defaults otherwise.
pub fn build_resolver() -> TokioAsyncResolver {
    let (config, opts) = match hickory_resolver::system_conf::read_system_conf() {
        Ok(conf) => conf,
        Err(e) => {
            warn!(error = %e, "Could not read system resolver configuration, using defaults.");
            (ResolverConfig::default(), ResolverOpts::default())
        }
    };
    resolver_from(config, opts)
}

/// A resolver over `config` with the per-query timeout and single attempt
/// every probe expects.
pub fn resolver_from(config: ResolverConfig, mut opts: ResolverOpts) -> TokioAsyncResolver {
    opts.timeout = LOOKUP_TIMEOUT;
    opts.attempts = 1;
    TokioAsyncResolver::tokio(config, opts)
}

/// Secondary lookups in the order they are reported, keyed like their errors.
pub const RECORD_LOOKUPS: [(ProbeKind, &str); 5] = [
    (ProbeKind::DnsPtr, "PTR"),
    (ProbeKind::DnsCname, "CNAME"),
    (ProbeKind::DnsMx, "MX"),
    (ProbeKind::DnsNs, "NS"),
    (ProbeKind::DnsTxt, "TXT"),
];

/// The secondary lookups that apply to `target`. IP literals only get PTR.
pub fn record_lookups(target: &Target) -> &'static [(ProbeKind, &'static str)] {
    if target.is_ip() { &RECORD_LOOKUPS[..1] } else { &RECORD_LOOKUPS }
}

/// Resolves a target into a [`ResolvedHost`]. This is the only DNS step
/// whose failure ends a run.
pub async fn resolve_host(resolver: &TokioAsyncResolver, target: &Target) -> Result<ResolvedHost, String> {
    info!(target = %target, "Resolving target.");
    let addresses = resolve_addresses(resolver, target).await.map_err(|e| {
        warn!(target = %target, error = %e, "Address resolution failed.");
        format!("IP resolution failed: {e}")
    })?;
    ResolvedHost::new(target.clone(), addresses).ok_or_else(|| format!("no IP addresses found for {target}"))
}

/// Runs the PTR, CNAME, MX, NS and TXT lookups for an already resolved host.
///
/// Every lookup is cut off at `deadline`. Failures and expiries come back as
/// soft errors under their own keys, so this never fails as a whole. The
/// address fields of the returned records are left empty.
pub async fn run_dns_records(resolver: &TokioAsyncResolver, host: &ResolvedHost, deadline: Instant) -> DnsScan {
    let target = host.target();
    let mut scan = DnsScan::default();

    // Reverse lookup of the preferred address only.
    let ptr = bounded(deadline, lookup_ptr(resolver, host.preferred()));
    if target.is_ip() {
        record(&mut scan, ProbeKind::DnsPtr, "PTR", ptr.await, |r, v| r.ptr = v);
        info!(target = %target, soft_errors = scan.lookup_errors.len(), "DNS records finished.");
        return scan;
    }

    let name = target.as_str();
    let (ptr, cname, mx, ns, txt) = tokio::join!(
        ptr,
        bounded(deadline, lookup_cname(resolver, name)),
        bounded(deadline, lookup_mx(resolver, name)),
        bounded(deadline, lookup_ns(resolver, name)),
        bounded(deadline, lookup_txt(resolver, name))
    );

    record(&mut scan, ProbeKind::DnsPtr, "PTR", ptr, |r, v| r.ptr = v);
    record(&mut scan, ProbeKind::DnsCname, "CNAME", cname, |r, v| r.cname = v);
    record(&mut scan, ProbeKind::DnsMx, "MX", mx, |r, v| r.mx = v);
    record(&mut scan, ProbeKind::DnsNs, "NS", ns, |r, v| r.ns = v);
    record(&mut scan, ProbeKind::DnsTxt, "TXT", txt, |r, v| r.txt = v);

    info!(target = %target, soft_errors = scan.lookup_errors.len(), "DNS records finished.");
    scan
}

async fn bounded<F>(deadline: Instant, lookup: F) -> Result<Vec<String>, String>
where
    F: Future<Output = Result<Vec<String>, ResolveError>>,
{
    match timeout_at(deadline, lookup).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err("timed out".to_string()),
    }
}

fn record(
    scan: &mut DnsScan,
    kind: ProbeKind,
    label: &str,
    result: Result<Vec<String>, String>,
    write: impl FnOnce(&mut DnsRecords, Vec<String>),
) {
    match result {
        Ok(values) => write(&mut scan.records, values),
        Err(e) => {
            warn!(record = label, error = %e, "DNS lookup failed.");
            scan.lookup_errors.push((kind, format!("{label} lookup failed: {e}")));
        }
    }
}

async fn resolve_addresses(resolver: &TokioAsyncResolver, target: &Target) -> Result<Vec<IpAddr>, String> {
    if let Some(ip) = target.ip() {
        debug!(%ip, "Target is an IP literal, skipping A/AAAA lookup.");
        return Ok(vec![ip]);
    }

    let lookup = resolver.lookup_ip(target.as_str()).await.map_err(|e| e.to_string())?;
    let addresses: Vec<IpAddr> = lookup.iter().collect();
    if addresses.is_empty() {
        return Err(format!("no IP addresses found for {target}"));
    }
    debug!(count = addresses.len(), "Resolved target addresses.");
    Ok(addresses)
}

async fn lookup_ptr(resolver: &TokioAsyncResolver, ip: IpAddr) -> Result<Vec<String>, ResolveError> {
    debug!(%ip, "Looking up PTR records.");
    let names = resolver
        .reverse_lookup(ip)
        .await
        .map(|lookup| lookup.iter().map(|name| trim_dot(&name.to_string())).collect());
    absent_is_empty(names)
}

async fn lookup_cname(resolver: &TokioAsyncResolver, name: &str) -> Result<Vec<String>, ResolveError> {
    debug!(name, "Looking up CNAME records.");
    let cnames = resolver.lookup(name, RecordType::CNAME).await.map(|lookup| {
        lookup
            .iter()
            .filter_map(|rdata| match rdata {
                RData::CNAME(cname) => Some(trim_dot(&cname.to_string())),
                _ => None,
            })
            // A name that is its own canonical name has no CNAME.
            .filter(|cname| !cname.eq_ignore_ascii_case(name))
            .collect()
    });
    absent_is_empty(cnames)
}

async fn lookup_mx(resolver: &TokioAsyncResolver, name: &str) -> Result<Vec<String>, ResolveError> {
    debug!(name, "Looking up MX records.");
    let records = resolver.mx_lookup(name).await.map(|lookup| {
        lookup
            .iter()
            .map(|mx| format!("{} {}", mx.preference(), trim_dot(&mx.exchange().to_string())))
            .collect()
    });
    absent_is_empty(records)
}

async fn lookup_ns(resolver: &TokioAsyncResolver, name: &str) -> Result<Vec<String>, ResolveError> {
    debug!(name, "Looking up NS records.");
    let records = resolver
        .ns_lookup(name)
        .await
        .map(|lookup| lookup.iter().map(|ns| trim_dot(&ns.to_string())).collect());
    absent_is_empty(records)
}

async fn lookup_txt(resolver: &TokioAsyncResolver, name: &str) -> Result<Vec<String>, ResolveError> {
    debug!(name, "Looking up TXT records.");
    let records = resolver
        .txt_lookup(name)
        .await
        .map(|lookup| lookup.iter().map(|txt| txt.to_string()).collect());
    absent_is_empty(records)
}

/// A name with no records of the requested type is an empty answer, not a failure.
fn absent_is_empty(result: Result<Vec<String>, ResolveError>) -> Result<Vec<String>, ResolveError> {
    match result {
        Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(Vec::new()),
        other => other,
    }
}

fn trim_dot(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

/// A loopback DNS server that answers A queries with a fixed address and
/// never answers anything else, plus a resolver pointed at it.
#[cfg(test)]
pub(crate) mod testing {
    use std::net::{Ipv4Addr, SocketAddr};

    use hickory_resolver::TokioAsyncResolver;
    use hickory_resolver::config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts};
    use tokio::net::UdpSocket;

    pub(crate) async fn a_only_resolver(answer: Ipv4Addr) -> TokioAsyncResolver {
        let server = spawn_a_only_server(answer).await;
        let servers = NameServerConfigGroup::from(vec![NameServerConfig::new(server, Protocol::Udp)]);
        super::resolver_from(ResolverConfig::from_parts(None, vec![], servers), ResolverOpts::default())
    }

    async fn spawn_a_only_server(answer: Ipv4Addr) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                if let Some(reply) = a_record_reply(&buf[..len], answer) {
                    let _ = socket.send_to(&reply, peer).await;
                }
            }
        });
        addr
    }

    fn a_record_reply(query: &[u8], answer: Ipv4Addr) -> Option<Vec<u8>> {
        // The question name starts right after the 12-byte header.
        let mut end = 12;
        while *query.get(end)? != 0 {
            end += usize::from(query[end]) + 1;
        }
        let qtype = u16::from_be_bytes([*query.get(end + 1)?, *query.get(end + 2)?]);
        let question_end = end + 5;
        if qtype != 1 || query.len() < question_end {
            return None;
        }

        let mut reply = Vec::with_capacity(question_end + 16);
        reply.extend_from_slice(&query[..2]);
        // QR, RD, RA; one question, one answer.
        reply.extend_from_slice(&[0x81, 0x80, 0, 1, 0, 1, 0, 0, 0, 0]);
        reply.extend_from_slice(&query[12..question_end]);
        // Name pointer to the question, type A, class IN, TTL 60, 4 bytes.
        reply.extend_from_slice(&[0xc0, 0x0c, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4]);
        reply.extend_from_slice(&answer.octets());
        Some(reply)
    }
}
