// src/core/scanner/asn_scanner.rs

use std::net::IpAddr;

use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, info, warn};

use crate::core::models::AsnInfo;
use crate::core::probe::{ProbeFailure, ProbeResult};
use crate::core::target::ResolvedHost;

const ORIGIN_ZONE: &str = "origin.asn.cymru.com";
const ORIGIN6_ZONE: &str = "origin6.asn.cymru.com";
const AS_ZONE: &str = "asn.cymru.com";

/// Maps the preferred address to its origin AS through Team Cymru's DNS
/// interface.
///
/// Two TXT queries are made: the origin record (ASN, prefix, country,
/// registry, allocation date) and then the AS record for the AS name. When
/// only the second one fails, the origin data is returned as a partial result.
pub async fn run_asn_scan(resolver: &TokioAsyncResolver, host: &ResolvedHost) -> ProbeResult<AsnInfo> {
    let ip = host.preferred();
    let query = origin_query(ip);
    info!(%ip, query, "Starting ASN lookup.");

    let record = first_txt(resolver, &query).await.map_err(|e| {
        warn!(%ip, error = %e, "ASN origin lookup failed.");
        format!("ASN DNS lookup failed: {e}")
    })?;
    let mut info = parse_origin_record(&record).ok_or_else(|| format!("malformed ASN record: {record:?}"))?;
    info.ip = ip.to_string();
    debug!(asn = %info.asn, prefix = %info.prefix, "Origin record parsed.");

    let name_query = format!("AS{}.{AS_ZONE}", info.asn);
    match first_txt(resolver, &name_query).await {
        Ok(record) => match parse_as_name(&record) {
            Some(name) => info.as_name = name,
            None => {
                return Err(ProbeFailure::with_partial(format!("malformed AS name record: {record:?}"), info));
            }
        },
        Err(e) => {
            warn!(asn = %info.asn, error = %e, "AS name lookup failed.");
            return Err(ProbeFailure::with_partial(format!("AS name lookup failed: {e}"), info));
        }
    }

    info!(asn = %info.asn, as_name = %info.as_name, "ASN lookup finished.");
    Ok(info)
}

async fn first_txt(resolver: &TokioAsyncResolver, name: &str) -> Result<String, String> {
    let lookup = resolver.txt_lookup(name).await.map_err(|e| e.to_string())?;
    lookup
        .iter()
        .next()
        .map(|txt| txt.to_string().trim_matches('"').to_string())
        .ok_or_else(|| "no TXT records found".to_string())
}

/// `8.8.4.4` becomes `4.4.8.8.origin.asn.cymru.com`; IPv6 addresses are
/// reversed nibble by nibble under `origin6`.
pub fn origin_query(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{d}.{c}.{b}.{a}.{ORIGIN_ZONE}")
        }
        IpAddr::V6(v6) => {
            let nibbles: Vec<String> = v6
                .octets()
                .iter()
                .rev()
                .flat_map(|byte| [byte & 0x0f, byte >> 4])
                .map(|nibble| format!("{nibble:x}"))
                .collect();
            format!("{}.{ORIGIN6_ZONE}", nibbles.join("."))
        }
    }
}

/// Parses `ASN | prefix | CC | registry | allocated`.
///
/// When a prefix is announced by several ASes the first one is kept.
pub fn parse_origin_record(record: &str) -> Option<AsnInfo> {
    let fields: Vec<&str> = record.split('|').map(str::trim).collect();
    if fields.len() < 3 {
        return None;
    }
    let asn = fields[0].split_whitespace().next()?;
    if !asn.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(AsnInfo {
        asn: asn.to_string(),
        prefix: fields[1].to_string(),
        country_code: fields[2].to_string(),
        registry: fields.get(3).map(|s| s.to_string()).unwrap_or_default(),
        allocated: fields.get(4).map(|s| s.to_string()).unwrap_or_default(),
        ..Default::default()
    })
}

/// Parses `ASN | CC | registry | allocated | AS name`.
pub fn parse_as_name(record: &str) -> Option<String> {
    let name = record.split('|').nth(4)?.trim();
    (!name.is_empty()).then(|| name.to_string())
}
