// src/core/models.rs

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::core::target::Target;

// --- Probe Keys ---

/// Key under which a probe records its soft failure in [`Report::errors`].
///
/// The string forms (`dns`, `dns_ptr`, ..., `tls`) are part of the report's
/// serialized shape and must stay stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, AsRefStr, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum ProbeKind {
    Dns,
    DnsPtr,
    DnsCname,
    DnsMx,
    DnsNs,
    DnsTxt,
    Ping,
    Traceroute,
    Whois,
    Asn,
    Geo,
    Ports,
    Tls,
}

// --- Run Options ---

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How the port scanner files a port whose connect attempt did not succeed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortClassification {
    /// Refused and timed-out connects are both `closed`; `filtered` stays empty.
    #[default]
    Coarse,
    /// Timed-out connects are reported as `filtered` instead of `closed`.
    SeparateFiltered,
}

/// Configuration for one collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub enable_ports: bool,
    pub timeout: Duration,
    pub port_classification: PortClassification,
}

impl Options {
    /// Builds options with the overall timeout clamped to `[MIN_TIMEOUT, MAX_TIMEOUT]`.
    pub fn new(enable_ports: bool, timeout: Duration) -> Self {
        Self {
            enable_ports,
            timeout: timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT),
            port_classification: PortClassification::default(),
        }
    }

    pub fn with_port_classification(mut self, policy: PortClassification) -> Self {
        self.port_classification = policy;
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new(false, DEFAULT_TIMEOUT)
    }
}

// --- DNS ---

/// Records gathered by the mandatory DNS phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsRecords {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ipv4: Vec<Ipv4Addr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ipv6: Vec<Ipv6Addr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ptr: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cname: Vec<String>,
    /// `"<preference> <exchange>"` entries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mx: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub txt: Vec<String>,
}

impl DnsRecords {
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty()
            && self.ipv6.is_empty()
            && self.ptr.is_empty()
            && self.cname.is_empty()
            && self.mx.is_empty()
            && self.ns.is_empty()
            && self.txt.is_empty()
    }

    /// Records holding only `addresses`, split by family.
    pub fn from_addresses(addresses: &[IpAddr]) -> Self {
        let mut records = Self::default();
        for ip in addresses {
            match ip {
                IpAddr::V4(v4) => records.ipv4.push(*v4),
                IpAddr::V6(v6) => records.ipv6.push(*v6),
            }
        }
        records
    }

    /// All resolved addresses, IPv4 first.
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.ipv4
            .iter()
            .copied()
            .map(IpAddr::V4)
            .chain(self.ipv6.iter().copied().map(IpAddr::V6))
            .collect()
    }
}

/// What the DNS record lookups hand back to the orchestrator: PTR, CNAME, MX,
/// NS and TXT records plus their soft failures (`dns_ptr`, `dns_mx`, ...).
#[derive(Debug, Clone, Default)]
pub struct DnsScan {
    pub records: DnsRecords,
    pub lookup_errors: Vec<(ProbeKind, String)>,
}

// --- Geolocation & ASN ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub city: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub region_code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country_code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub org: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub isp: String,
    /// The provider's own "AS" string, e.g. `AS15169 Google LLC`.
    #[serde(rename = "as", skip_serializing_if = "String::is_empty")]
    pub as_field: String,
    #[serde(rename = "lat", skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(rename = "lon", skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timezone: String,
}

impl GeoInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsnInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub asn: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country_code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub registry: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub allocated: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub as_name: String,
}

impl AsnInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// --- WHOIS ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhoisInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub registrar: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub expires: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub registrant: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub net_range: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub net_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub org_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub abuse_emails: Vec<String>,
}

impl WhoisInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Raw WHOIS answer together with the fields extracted from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhoisData {
    pub raw: String,
    pub info: WhoisInfo,
}

// --- Ping ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingStats {
    #[serde(rename = "sent")]
    pub packets_sent: u32,
    #[serde(rename = "received")]
    pub packets_received: u32,
    #[serde(rename = "loss_percent")]
    pub packet_loss_pct: f64,
    /// Formatted like `12.4ms`.
    pub min_rtt: String,
    pub avg_rtt: String,
    pub max_rtt: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stddev_rtt: String,
    pub success: bool,
}

impl PingStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// --- Traceroute ---

/// One line of a traceroute. Silent hops are kept with `timeout` set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceHop {
    pub hop: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host: String,
    /// `12.4ms`, or `*` when the hop never answered.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rtt: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub timeout: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceInfo {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hops: Vec<TraceHop>,
    pub success: bool,
}

impl TraceInfo {
    pub fn from_hops(hops: Vec<TraceHop>) -> Self {
        let success = !hops.is_empty();
        Self { hops, success }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// --- Port Scan ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortScanResult {
    #[serde(rename = "scanned_ports", skip_serializing_if = "Vec::is_empty")]
    pub scanned: Vec<u16>,
    #[serde(rename = "open_ports", skip_serializing_if = "Vec::is_empty")]
    pub open: Vec<u16>,
    #[serde(rename = "closed_ports", skip_serializing_if = "Vec::is_empty")]
    pub closed: Vec<u16>,
    #[serde(rename = "filtered_ports", skip_serializing_if = "Vec::is_empty")]
    pub filtered: Vec<u16>,
}

impl PortScanResult {
    pub fn is_open(&self, port: u16) -> bool {
        self.open.contains(&port)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// --- TLS ---

/// Facts about the leaf certificate presented on port 443.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subject: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub issuer: String,
    #[serde(rename = "cn", skip_serializing_if = "String::is_empty")]
    pub common_name: String,
    #[serde(rename = "sans", skip_serializing_if = "Vec::is_empty")]
    pub alt_names: Vec<String>,
    #[serde(rename = "valid_from", skip_serializing_if = "String::is_empty")]
    pub not_before: String,
    #[serde(rename = "valid_until", skip_serializing_if = "String::is_empty")]
    pub not_after: String,
    pub expired: bool,
    pub self_signed: bool,
}

impl TlsInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// --- Main Report ---

/// The aggregate of one collection run.
///
/// Every field group is independently optional: a report whose groups are all
/// empty and whose `errors` map explains why is still a valid report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Report {
    pub target: String,
    /// UTC time at which collection finished.
    pub resolved_at: DateTime<Utc>,
    pub duration_ms: u64,

    pub dns: DnsRecords,
    pub geo: GeoInfo,
    pub asn: AsnInfo,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub whois_raw: String,
    pub whois: WhoisInfo,

    pub ping: PingStats,
    pub trace: TraceInfo,
    pub ports: PortScanResult,
    pub tls: TlsInfo,

    /// Soft failures keyed by [`ProbeKind`] name.
    #[serde(rename = "collector_errors", skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            target: String::new(),
            resolved_at: DateTime::<Utc>::UNIX_EPOCH,
            duration_ms: 0,
            dns: DnsRecords::default(),
            geo: GeoInfo::default(),
            asn: AsnInfo::default(),
            whois_raw: String::new(),
            whois: WhoisInfo::default(),
            ping: PingStats::default(),
            trace: TraceInfo::default(),
            ports: PortScanResult::default(),
            tls: TlsInfo::default(),
            errors: BTreeMap::new(),
        }
    }
}

impl Report {
    pub fn new(target: &Target) -> Self {
        Self {
            target: target.to_string(),
            resolved_at: Utc::now(),
            ..Default::default()
        }
    }

    pub fn set_error(&mut self, kind: ProbeKind, message: impl Into<String>) {
        self.errors.insert(kind.to_string(), message.into());
    }

    pub fn error(&self, kind: ProbeKind) -> Option<&str> {
        self.errors.get(kind.as_ref()).map(String::as_str)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}
