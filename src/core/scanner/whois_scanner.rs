// src/core/scanner/whois_scanner.rs

use std::collections::HashSet;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::models::{WhoisData, WhoisInfo};
use crate::core::probe::ProbeResult;
use crate::core::target::ResolvedHost;

const IANA_SERVER: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
const MAX_REFERRALS: usize = 2;
const MAX_RESPONSE_BYTES: u64 = 1 << 20;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!(r"(?i){p}:[ \t]*(\S.*)")).unwrap())
        .collect()
}

// Label patterns per field, tried in order; the first hit wins.
static DOMAIN: Lazy<Vec<Regex>> = Lazy::new(|| compile(&["domain name", "domain"]));
static REGISTRAR: Lazy<Vec<Regex>> = Lazy::new(|| compile(&["registrar", "registrar name", "sponsoring registrar"]));
static CREATED: Lazy<Vec<Regex>> =
    Lazy::new(|| compile(&["creation date", "created", "registered", "registration time"]));
static EXPIRES: Lazy<Vec<Regex>> = Lazy::new(|| compile(&["expiration date", "expires", "expiry date", "paid-till"]));
static REGISTRANT: Lazy<Vec<Regex>> =
    Lazy::new(|| compile(&["registrant name", "registrant organization", "registrant"]));
static NET_RANGE: Lazy<Vec<Regex>> = Lazy::new(|| compile(&["inetnum", "netrange", "cidr", "route"]));
static NET_NAME: Lazy<Vec<Regex>> = Lazy::new(|| compile(&["netname", "network name"]));
static ORG_NAME: Lazy<Vec<Regex>> = Lazy::new(|| compile(&["organization", "org", "descr"]));
static COUNTRY: Lazy<Vec<Regex>> = Lazy::new(|| compile(&["country", "registrant country"]));

const EMAIL: &str = r"([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})";
static EMAILS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["abuse.*?", "admin.*?", "technical.*?", ""]
        .iter()
        .map(|prefix| Regex::new(&format!("(?i){prefix}{EMAIL}")).unwrap())
        .collect()
});

static REFERRAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:refer|whois|registrar whois server|referralserver):[ \t]*(\S+)").unwrap()
});

/// Queries WHOIS for the target (the domain, or the address for IP targets)
/// and extracts the common registration fields.
pub async fn run_whois_scan(host: &ResolvedHost) -> ProbeResult<WhoisData> {
    let query = host.target().as_str();
    info!(query, "Starting WHOIS lookup.");

    let raw = lookup(query).await.map_err(|e| {
        warn!(query, error = %e, "WHOIS lookup failed.");
        format!("WHOIS failed: {e}")
    })?;
    let info = parse_whois(&raw);

    info!(registrar = %info.registrar, net_name = %info.net_name, "WHOIS lookup finished.");
    Ok(WhoisData { raw, info })
}

/// Starts at IANA and follows at most [`MAX_REFERRALS`] referrals.
///
/// The deepest answer that could be fetched is returned; a referral that
/// fails leaves the previous answer in place.
pub async fn lookup(query: &str) -> Result<String, String> {
    let mut server = IANA_SERVER.to_string();
    let mut response = query_server(&server, query).await?;

    for _ in 0..MAX_REFERRALS {
        let Some(next) = find_referral(&response) else {
            break;
        };
        if next.eq_ignore_ascii_case(&server) {
            break;
        }
        debug!(from = %server, to = %next, "Following WHOIS referral.");
        match query_server(&next, query).await {
            Ok(answer) if !answer.trim().is_empty() => {
                server = next;
                response = answer;
            }
            Ok(_) => break,
            Err(e) => {
                warn!(server = %next, error = %e, "WHOIS referral failed, keeping previous answer.");
                break;
            }
        }
    }
    Ok(response)
}

async fn query_server(server: &str, query: &str) -> Result<String, String> {
    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((server, WHOIS_PORT)))
        .await
        .map_err(|_| format!("connection to {server} timed out"))?
        .map_err(|e| format!("connection to {server} failed: {e}"))?;

    stream
        .write_all(format!("{query}\r\n").as_bytes())
        .await
        .map_err(|e| format!("write to {server} failed: {e}"))?;

    let mut buf = Vec::new();
    stream
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut buf)
        .await
        .map_err(|e| format!("read from {server} failed: {e}"))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// The next server to ask, if the answer points to one.
pub fn find_referral(response: &str) -> Option<String> {
    REFERRAL
        .captures_iter(response)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|server| !server.starts_with("rwhois://"))
        .map(|server| server.trim_start_matches("whois://").trim_end_matches('/'))
        .map(|server| server.split(':').next().unwrap_or(server).to_string())
        .find(|server| !server.is_empty())
}

pub fn parse_whois(data: &str) -> WhoisInfo {
    WhoisInfo {
        domain: extract_field(data, &DOMAIN),
        registrar: extract_field(data, &REGISTRAR),
        created: extract_field(data, &CREATED),
        expires: extract_field(data, &EXPIRES),
        registrant: extract_field(data, &REGISTRANT),
        net_range: extract_field(data, &NET_RANGE),
        net_name: extract_field(data, &NET_NAME),
        org_name: extract_field(data, &ORG_NAME),
        country: extract_field(data, &COUNTRY),
        abuse_emails: extract_emails(data),
    }
}

fn extract_field(data: &str, patterns: &[Regex]) -> String {
    patterns
        .iter()
        .find_map(|re| re.captures(data).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Contact addresses, abuse contacts first, lowercased and deduplicated.
fn extract_emails(data: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut emails = Vec::new();
    for re in EMAILS.iter() {
        for caps in re.captures_iter(data) {
            let Some(m) = caps.get(1) else { continue };
            let email = m.as_str().trim().to_lowercase();
            if seen.insert(email.clone()) {
                emails.push(email);
            }
        }
    }
    emails
}
