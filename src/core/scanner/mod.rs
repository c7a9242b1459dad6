// src/core/scanner/mod.rs

// Public interface of the `scanner` module: one sub-module per probe, plus
// the `Probes` trait through which the collector drives them.
pub mod asn_scanner;
pub mod dns_scanner;
pub mod geo_scanner;
pub mod ping_scanner;
pub mod port_scanner;
pub mod tls_scanner;
pub mod traceroute_scanner;
pub mod whois_scanner;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::models::{
    AsnInfo, DnsScan, GeoInfo, PingStats, PortClassification, PortScanResult, TlsInfo, TraceHop, WhoisData,
};
use crate::core::probe::ProbeResult;
use crate::core::target::{ResolvedHost, Target};

/// The set of probes a collection run can invoke.
///
/// Each method is one probe body. Implementations report soft failures
/// through [`ProbeResult`]; deadlines, concurrency and error bookkeeping are
/// the collector's job, so a probe never needs to track the overall budget.
/// The DNS record lookups are the exception: they run inside the DNS phase
/// and must stop by the `deadline` they are given.
#[async_trait]
pub trait Probes: Send + Sync + 'static {
    /// Address resolution. Its failure is the only one that ends a run.
    async fn resolve(&self, target: &Target) -> ProbeResult<ResolvedHost>;
    async fn dns_records(&self, host: &ResolvedHost, deadline: Instant) -> DnsScan;
    async fn ping(&self, host: &ResolvedHost) -> ProbeResult<PingStats>;
    async fn traceroute(&self, host: &ResolvedHost) -> ProbeResult<Vec<TraceHop>>;
    async fn whois(&self, host: &ResolvedHost) -> ProbeResult<WhoisData>;
    async fn asn(&self, host: &ResolvedHost) -> ProbeResult<AsnInfo>;
    async fn geo(&self, host: &ResolvedHost) -> ProbeResult<GeoInfo>;
    async fn ports(
        &self,
        host: &ResolvedHost,
        policy: PortClassification,
        cancel: CancellationToken,
    ) -> ProbeResult<PortScanResult>;
    async fn tls(&self, host: &ResolvedHost) -> ProbeResult<TlsInfo>;
}

/// Probes that talk to the network, sharing one DNS resolver.
#[derive(Clone)]
pub struct NetworkProbes {
    resolver: TokioAsyncResolver,
}

impl NetworkProbes {
    pub fn new() -> Self {
        Self::with_resolver(dns_scanner::build_resolver())
    }

    pub fn with_resolver(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TokioAsyncResolver {
        &self.resolver
    }
}

impl Default for NetworkProbes {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probes for NetworkProbes {
    async fn resolve(&self, target: &Target) -> ProbeResult<ResolvedHost> {
        Ok(dns_scanner::resolve_host(&self.resolver, target).await?)
    }

    async fn dns_records(&self, host: &ResolvedHost, deadline: Instant) -> DnsScan {
        dns_scanner::run_dns_records(&self.resolver, host, deadline).await
    }

    async fn ping(&self, host: &ResolvedHost) -> ProbeResult<PingStats> {
        ping_scanner::run_ping_scan(host).await
    }

    async fn traceroute(&self, host: &ResolvedHost) -> ProbeResult<Vec<TraceHop>> {
        traceroute_scanner::run_traceroute(&self.resolver, host).await
    }

    async fn whois(&self, host: &ResolvedHost) -> ProbeResult<WhoisData> {
        whois_scanner::run_whois_scan(host).await
    }

    async fn asn(&self, host: &ResolvedHost) -> ProbeResult<AsnInfo> {
        asn_scanner::run_asn_scan(&self.resolver, host).await
    }

    async fn geo(&self, host: &ResolvedHost) -> ProbeResult<GeoInfo> {
        geo_scanner::run_geo_scan(host).await
    }

    async fn ports(
        &self,
        host: &ResolvedHost,
        policy: PortClassification,
        cancel: CancellationToken,
    ) -> ProbeResult<PortScanResult> {
        port_scanner::run_port_scan(host, policy, cancel).await
    }

    async fn tls(&self, host: &ResolvedHost) -> ProbeResult<TlsInfo> {
        tls_scanner::run_tls_scan(host).await
    }
}
