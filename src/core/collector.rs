// src/core/collector.rs

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::deadline::{DeadlineComposer, ProbeCeilings};
use crate::core::error::CollectError;
use crate::core::models::{
    AsnInfo, DnsRecords, DnsScan, GeoInfo, Options, PingStats, PortScanResult, ProbeKind, Report, TraceHop, TraceInfo,
    WhoisData,
};
use crate::core::probe::{ProbeOutcome, ProbePool, ProbeResult, invoke, timeout_message};
use crate::core::scanner::dns_scanner::record_lookups;
use crate::core::scanner::tls_scanner::TLS_PORT;
use crate::core::scanner::{NetworkProbes, Probes};
use crate::core::target::{ResolvedHost, Target};

/// Recorded under `tls` when ports were scanned and 443 was not open.
pub const TLS_SKIPPED: &str = "skipped, port 443 not open";

/// Slack given to the record lookups past the DNS deadline they enforce
/// themselves, before the collector stops waiting for them.
const DNS_RECORDS_GRACE: Duration = Duration::from_millis(250);

/// Drives one collection run: DNS first, then the independent probes
/// concurrently, then TLS if port 443 turned out to be open.
///
/// Every probe goes through [`invoke`], so each one gets its own budget and
/// can be abandoned without stopping the run.
pub struct Collector<P: Probes> {
    probes: Arc<P>,
    pool: ProbePool,
    ceilings: ProbeCeilings,
}

impl Collector<NetworkProbes> {
    pub fn network() -> Self {
        Self::new(NetworkProbes::new())
    }
}

impl<P: Probes> Collector<P> {
    pub fn new(probes: P) -> Self {
        Self {
            probes: Arc::new(probes),
            pool: ProbePool::default(),
            ceilings: ProbeCeilings::default(),
        }
    }

    pub fn with_ceilings(mut self, ceilings: ProbeCeilings) -> Self {
        self.ceilings = ceilings;
        self
    }

    pub fn with_pool(mut self, pool: ProbePool) -> Self {
        self.pool = pool;
        self
    }

    /// Collects a report for `target`.
    ///
    /// Only a failed or timed-out DNS phase is an error. Everything after it
    /// degrades into entries in [`Report::errors`], and the call returns
    /// within `options.timeout` even when probes hang.
    pub async fn collect(&self, target: &Target, options: &Options) -> Result<Report, CollectError> {
        let clock = DeadlineComposer::start(options.timeout);
        info!(
            target = %target,
            ports = options.enable_ports,
            timeout_ms = options.timeout.as_millis() as u64,
            "Starting collection."
        );

        // --- Phase 1: DNS ---
        let dns_deadline = Instant::now() + clock.sub_deadline(self.ceilings.dns);
        let host = self.resolve(target, &clock).await?;
        let mut report = Report::new(target);
        report.dns = DnsRecords::from_addresses(host.addresses());
        self.run_dns_records(&host, dns_deadline, &clock, &mut report).await;

        // --- Phase 2: independent probes ---
        self.run_independent(&host, options, &clock, &mut report).await;

        // --- Phase 3: TLS, gated on the port scan ---
        if options.enable_ports {
            self.run_tls(&host, &clock, &mut report).await;
        }

        report.duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        report.resolved_at = Utc::now();
        info!(
            target = %target,
            duration_ms = report.duration_ms,
            errors = report.errors.len(),
            "Collection finished."
        );
        Ok(report)
    }

    async fn resolve(&self, target: &Target, clock: &DeadlineComposer) -> Result<Arc<ResolvedHost>, CollectError> {
        let budget = clock.sub_deadline(self.ceilings.dns);
        if budget.is_zero() {
            return Err(CollectError::DnsTimeout(budget));
        }

        let probes = Arc::clone(&self.probes);
        let query = target.clone();
        let outcome = invoke(&self.pool, ProbeKind::Dns, budget, async move { probes.resolve(&query).await }).await;

        match outcome {
            ProbeOutcome::Value(host) => {
                debug!(preferred = %host.preferred(), addresses = host.addresses().len(), "Target resolved.");
                Ok(Arc::new(host))
            }
            ProbeOutcome::Failed { reason, .. } => {
                error!(target = %target, reason = %reason, "DNS phase failed.");
                Err(CollectError::Dns(reason))
            }
            ProbeOutcome::TimedOut(budget) => {
                error!(target = %target, budget_ms = budget.as_millis() as u64, "DNS phase timed out.");
                Err(CollectError::DnsTimeout(budget))
            }
        }
    }

    /// PTR, CNAME, MX, NS and TXT within what is left of the DNS phase. These
    /// only ever produce soft errors.
    async fn run_dns_records(
        &self,
        host: &Arc<ResolvedHost>,
        deadline: Instant,
        clock: &DeadlineComposer,
        report: &mut Report,
    ) {
        let budget = clock.sub_deadline(deadline.saturating_duration_since(Instant::now()) + DNS_RECORDS_GRACE);
        let (p, h) = (Arc::clone(&self.probes), Arc::clone(host));
        let outcome = invoke(&self.pool, ProbeKind::Dns, budget, async move { Ok(p.dns_records(&h, deadline).await) }).await;

        let scan = match outcome {
            ProbeOutcome::Value(scan) => scan,
            ProbeOutcome::Failed { reason, .. } => {
                warn!(reason = %reason, "DNS record lookups failed.");
                lookups_abandoned(host.target(), &reason)
            }
            ProbeOutcome::TimedOut(_) => {
                warn!("DNS record lookups overran the DNS phase.");
                lookups_abandoned(host.target(), "timed out")
            }
        };

        let DnsRecords { ptr, cname, mx, ns, txt, .. } = scan.records;
        report.dns = DnsRecords { ptr, cname, mx, ns, txt, ..std::mem::take(&mut report.dns) };
        for (kind, message) in scan.lookup_errors {
            report.set_error(kind, message);
        }
    }

    async fn run_independent(
        &self,
        host: &Arc<ResolvedHost>,
        options: &Options,
        clock: &DeadlineComposer,
        report: &mut Report,
    ) {
        let cancel = CancellationToken::new();
        let _cancel_on_exit = cancel.clone().drop_guard();
        let mut tasks: JoinSet<Slot> = JoinSet::new();

        let (p, h) = (Arc::clone(&self.probes), Arc::clone(host));
        self.spawn_probe(&mut tasks, ProbeKind::Ping, clock, Slot::Ping, async move { p.ping(&h).await });

        let (p, h) = (Arc::clone(&self.probes), Arc::clone(host));
        self.spawn_probe(&mut tasks, ProbeKind::Traceroute, clock, Slot::Traceroute, async move {
            p.traceroute(&h).await
        });

        let (p, h) = (Arc::clone(&self.probes), Arc::clone(host));
        self.spawn_probe(&mut tasks, ProbeKind::Whois, clock, Slot::Whois, async move { p.whois(&h).await });

        let (p, h) = (Arc::clone(&self.probes), Arc::clone(host));
        self.spawn_probe(&mut tasks, ProbeKind::Asn, clock, Slot::Asn, async move { p.asn(&h).await });

        let (p, h) = (Arc::clone(&self.probes), Arc::clone(host));
        self.spawn_probe(&mut tasks, ProbeKind::Geo, clock, Slot::Geo, async move { p.geo(&h).await });

        if options.enable_ports {
            let (p, h) = (Arc::clone(&self.probes), Arc::clone(host));
            let (policy, token) = (options.port_classification, cancel.child_token());
            self.spawn_probe(&mut tasks, ProbeKind::Ports, clock, Slot::Ports, async move {
                p.ports(&h, policy, token).await
            });
        }

        let deadline = clock.deadline();
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(slot))) => {
                    debug!(probe = %slot.kind(), "Merging probe result.");
                    slot.merge_into(report);
                }
                Ok(Some(Err(join_error))) => {
                    error!(error = %join_error, "Probe wrapper task failed!");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(pending = tasks.len(), "Overall deadline reached, abandoning pending probes.");
                    tasks.detach_all();
                    break;
                }
            }
        }
    }

    fn spawn_probe<T, F>(
        &self,
        tasks: &mut JoinSet<Slot>,
        kind: ProbeKind,
        clock: &DeadlineComposer,
        wrap: fn(ProbeOutcome<T>) -> Slot,
        probe: F,
    ) where
        T: Send + 'static,
        F: Future<Output = ProbeResult<T>> + Send + 'static,
    {
        let budget = clock.sub_deadline(self.ceilings.for_probe(kind));
        let pool = self.pool.clone();
        tasks.spawn(async move { wrap(invoke(&pool, kind, budget, probe).await) });
    }

    async fn run_tls(&self, host: &Arc<ResolvedHost>, clock: &DeadlineComposer, report: &mut Report) {
        if !report.ports.is_open(TLS_PORT) {
            info!("Port 443 not open, skipping TLS inspection.");
            report.set_error(ProbeKind::Tls, TLS_SKIPPED);
            return;
        }

        let budget = clock.sub_deadline(self.ceilings.tls);
        if budget.is_zero() {
            warn!("No time left for TLS inspection.");
            report.set_error(ProbeKind::Tls, timeout_message(ProbeKind::Tls, budget));
            return;
        }
        let (p, h) = (Arc::clone(&self.probes), Arc::clone(host));
        let outcome = invoke(&self.pool, ProbeKind::Tls, budget, async move { p.tls(&h).await }).await;
        store(report, ProbeKind::Tls, outcome, |r, tls| r.tls = tls);
    }
}

/// Every applicable record lookup marked as failed with `reason`.
fn lookups_abandoned(target: &Target, reason: &str) -> DnsScan {
    let lookup_errors = record_lookups(target)
        .iter()
        .map(|(kind, label)| (*kind, format!("{label} lookup failed: {reason}")))
        .collect();
    DnsScan { lookup_errors, ..Default::default() }
}

/// A finished phase-two probe, carrying only what that probe may write.
enum Slot {
    Ping(ProbeOutcome<PingStats>),
    Traceroute(ProbeOutcome<Vec<TraceHop>>),
    Whois(ProbeOutcome<WhoisData>),
    Asn(ProbeOutcome<AsnInfo>),
    Geo(ProbeOutcome<GeoInfo>),
    Ports(ProbeOutcome<PortScanResult>),
}

impl Slot {
    fn kind(&self) -> ProbeKind {
        match self {
            Slot::Ping(_) => ProbeKind::Ping,
            Slot::Traceroute(_) => ProbeKind::Traceroute,
            Slot::Whois(_) => ProbeKind::Whois,
            Slot::Asn(_) => ProbeKind::Asn,
            Slot::Geo(_) => ProbeKind::Geo,
            Slot::Ports(_) => ProbeKind::Ports,
        }
    }

    /// Writes the probe's own field group and its own error key, nothing else.
    fn merge_into(self, report: &mut Report) {
        let kind = self.kind();
        match self {
            Slot::Ping(outcome) => store(report, kind, outcome, |r, ping| r.ping = ping),
            Slot::Traceroute(outcome) => store(report, kind, outcome, |r, hops| r.trace = TraceInfo::from_hops(hops)),
            Slot::Whois(outcome) => store(report, kind, outcome, |r, whois| {
                r.whois_raw = whois.raw;
                r.whois = whois.info;
            }),
            Slot::Asn(outcome) => store(report, kind, outcome, |r, asn| r.asn = asn),
            Slot::Geo(outcome) => store(report, kind, outcome, |r, geo| r.geo = geo),
            Slot::Ports(outcome) => store(report, kind, outcome, |r, ports| r.ports = ports),
        }
    }
}

fn store<T>(report: &mut Report, kind: ProbeKind, outcome: ProbeOutcome<T>, write: impl FnOnce(&mut Report, T)) {
    let (value, error) = outcome.into_parts(kind);
    if let Some(value) = value {
        write(report, value);
    }
    if let Some(message) = error {
        report.set_error(kind, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{DnsRecords, PortClassification, TlsInfo, WhoisInfo};
    use crate::core::probe::ProbeFailure;
    use async_trait::async_trait;
    use crate::core::scanner::dns_scanner::testing::a_only_resolver;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;
    use tokio::time::{Duration, sleep};

    #[derive(Clone)]
    enum Behavior<T> {
        Succeed(T),
        Fail(&'static str),
        Partial(T, &'static str),
        Hang,
    }

    impl<T: Clone> Behavior<T> {
        async fn run(&self) -> ProbeResult<T> {
            match self {
                Behavior::Succeed(value) => Ok(value.clone()),
                Behavior::Fail(reason) => Err(ProbeFailure::new(*reason)),
                Behavior::Partial(value, reason) => Err(ProbeFailure::with_partial(*reason, value.clone())),
                Behavior::Hang => {
                    sleep(Duration::from_secs(3600)).await;
                    Err(ProbeFailure::new("woke up"))
                }
            }
        }
    }

    struct FakeProbes {
        resolve: Behavior<Vec<IpAddr>>,
        records: Behavior<DnsScan>,
        ping: Behavior<PingStats>,
        traceroute: Behavior<Vec<TraceHop>>,
        whois: Behavior<WhoisData>,
        asn: Behavior<AsnInfo>,
        geo: Behavior<GeoInfo>,
        ports: Behavior<PortScanResult>,
        tls: Behavior<TlsInfo>,
        calls: Mutex<Vec<ProbeKind>>,
    }

    impl FakeProbes {
        fn healthy() -> Self {
            Self {
                resolve: Behavior::Succeed(vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))]),
                records: Behavior::Succeed(DnsScan {
                    records: DnsRecords { ns: vec!["a.iana-servers.net".into()], ..Default::default() },
                    lookup_errors: Vec::new(),
                }),
                ping: Behavior::Succeed(PingStats {
                    packets_sent: 5,
                    packets_received: 5,
                    min_rtt: "10.0ms".into(),
                    avg_rtt: "11.0ms".into(),
                    max_rtt: "12.0ms".into(),
                    success: true,
                    ..Default::default()
                }),
                traceroute: Behavior::Succeed(vec![
                    TraceHop { hop: 1, ip: "192.168.1.1".into(), rtt: "1.0ms".into(), ..Default::default() },
                    TraceHop { hop: 2, ip: "93.184.216.34".into(), rtt: "9.0ms".into(), ..Default::default() },
                ]),
                whois: Behavior::Succeed(WhoisData {
                    raw: "Domain Name: EXAMPLE.COM".into(),
                    info: WhoisInfo { domain: "EXAMPLE.COM".into(), ..Default::default() },
                }),
                asn: Behavior::Succeed(AsnInfo {
                    asn: "15133".into(),
                    country_code: "US".into(),
                    as_name: "EDGECAST, US".into(),
                    ..Default::default()
                }),
                geo: Behavior::Succeed(GeoInfo {
                    ip: "93.184.216.34".into(),
                    country_code: "US".into(),
                    ..Default::default()
                }),
                ports: Behavior::Succeed(PortScanResult {
                    scanned: vec![22, 80, 443],
                    open: vec![80, 443],
                    closed: vec![22],
                    filtered: vec![],
                }),
                tls: Behavior::Succeed(TlsInfo { common_name: "example.com".into(), ..Default::default() }),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, kind: ProbeKind) {
            self.calls.lock().unwrap().push(kind);
        }
    }

    #[async_trait]
    impl Probes for FakeProbes {
        async fn resolve(&self, target: &Target) -> ProbeResult<ResolvedHost> {
            self.record(ProbeKind::Dns);
            match self.resolve.run().await {
                Ok(addresses) => ResolvedHost::new(target.clone(), addresses)
                    .ok_or_else(|| ProbeFailure::new(format!("no IP addresses found for {target}"))),
                Err(failure) => Err(ProbeFailure::new(failure.reason)),
            }
        }
        async fn dns_records(&self, _: &ResolvedHost, _: Instant) -> DnsScan {
            self.records.run().await.unwrap_or_default()
        }
        async fn ping(&self, _: &ResolvedHost) -> ProbeResult<PingStats> {
            self.record(ProbeKind::Ping);
            self.ping.run().await
        }
        async fn traceroute(&self, _: &ResolvedHost) -> ProbeResult<Vec<TraceHop>> {
            self.record(ProbeKind::Traceroute);
            self.traceroute.run().await
        }
        async fn whois(&self, _: &ResolvedHost) -> ProbeResult<WhoisData> {
            self.record(ProbeKind::Whois);
            self.whois.run().await
        }
        async fn asn(&self, _: &ResolvedHost) -> ProbeResult<AsnInfo> {
            self.record(ProbeKind::Asn);
            self.asn.run().await
        }
        async fn geo(&self, _: &ResolvedHost) -> ProbeResult<GeoInfo> {
            self.record(ProbeKind::Geo);
            self.geo.run().await
        }
        async fn ports(&self, _: &ResolvedHost, _: PortClassification, _: CancellationToken) -> ProbeResult<PortScanResult> {
            self.record(ProbeKind::Ports);
            self.ports.run().await
        }
        async fn tls(&self, _: &ResolvedHost) -> ProbeResult<TlsInfo> {
            self.record(ProbeKind::Tls);
            self.tls.run().await
        }
    }

    fn calls(collector: &Collector<FakeProbes>) -> Vec<ProbeKind> {
        let mut calls = collector.probes.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    fn target() -> Target {
        Target::parse("example.com").unwrap()
    }

    fn with_ports() -> Options {
        Options::new(true, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn collects_every_group_without_ports() {
        let collector = Collector::new(FakeProbes::healthy());
        let report = collector.collect(&target(), &Options::default()).await.unwrap();

        assert_eq!(report.target, "example.com");
        assert_eq!(report.dns.ipv4, vec![Ipv4Addr::new(93, 184, 216, 34)]);
        assert!(report.ping.success);
        assert_eq!(report.trace.hops.len(), 2);
        assert!(report.trace.success);
        assert_eq!(report.whois_raw, "Domain Name: EXAMPLE.COM");
        assert_eq!(report.whois.domain, "EXAMPLE.COM");
        assert_eq!(report.asn.asn, "15133");
        assert_eq!(report.geo.country_code, "US");
        assert!(report.ports.is_empty());
        assert!(report.tls.is_empty());
        assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);

        assert!(!calls(&collector).contains(&ProbeKind::Ports));
        assert!(!calls(&collector).contains(&ProbeKind::Tls));
    }

    #[tokio::test(start_paused = true)]
    async fn dns_failure_aborts_the_run() {
        let mut probes = FakeProbes::healthy();
        probes.resolve = Behavior::Fail("IP resolution failed: NXDOMAIN");
        let collector = Collector::new(probes);

        let err = collector.collect(&target(), &with_ports()).await.unwrap_err();
        assert_eq!(err, CollectError::Dns("IP resolution failed: NXDOMAIN".into()));
        assert_eq!(calls(&collector), vec![ProbeKind::Dns]);
    }

    #[tokio::test(start_paused = true)]
    async fn dns_without_addresses_aborts_the_run() {
        let mut probes = FakeProbes::healthy();
        probes.resolve = Behavior::Succeed(Vec::new());
        let collector = Collector::new(probes);

        let err = collector.collect(&target(), &Options::default()).await.unwrap_err();
        assert!(matches!(err, CollectError::Dns(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn dns_timeout_aborts_the_run() {
        let mut probes = FakeProbes::healthy();
        probes.resolve = Behavior::Hang;
        let collector = Collector::new(probes);

        let err = collector.collect(&target(), &Options::default()).await.unwrap_err();
        assert_eq!(err, CollectError::DnsTimeout(Duration::from_secs(3)));
        assert_eq!(calls(&collector), vec![ProbeKind::Dns]);
    }

    #[tokio::test(start_paused = true)]
    async fn dns_sub_lookup_errors_are_soft() {
        let mut probes = FakeProbes::healthy();
        probes.records = Behavior::Succeed(DnsScan {
            records: DnsRecords { txt: vec!["v=spf1 -all".into()], ..Default::default() },
            lookup_errors: vec![(ProbeKind::DnsMx, "MX lookup failed: SERVFAIL".into())],
        });
        let collector = Collector::new(probes);

        let report = collector.collect(&target(), &Options::default()).await.unwrap();
        assert_eq!(report.error(ProbeKind::DnsMx), Some("MX lookup failed: SERVFAIL"));
        assert_eq!(report.dns.ipv4, vec![Ipv4Addr::new(93, 184, 216, 34)]);
        assert_eq!(report.dns.txt, vec!["v=spf1 -all".to_string()]);
        assert!(report.ping.success);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_record_lookups_do_not_fail_the_run() {
        let mut probes = FakeProbes::healthy();
        probes.records = Behavior::Hang;
        let collector = Collector::new(probes);

        let report = collector.collect(&target(), &Options::default()).await.unwrap();
        assert_eq!(report.dns.ipv4, vec![Ipv4Addr::new(93, 184, 216, 34)]);
        for (kind, label) in [
            (ProbeKind::DnsPtr, "PTR"),
            (ProbeKind::DnsCname, "CNAME"),
            (ProbeKind::DnsMx, "MX"),
            (ProbeKind::DnsNs, "NS"),
            (ProbeKind::DnsTxt, "TXT"),
        ] {
            assert_eq!(report.error(kind), Some(format!("{label} lookup failed: timed out").as_str()));
        }
        // The rest of the run still gets most of its budget.
        assert!(report.ping.success);
        assert_eq!(report.trace.hops.len(), 2);
        assert!(report.duration_ms < 4_000, "took {}ms", report.duration_ms);
    }

    #[tokio::test]
    async fn unanswered_record_queries_stay_soft() {
        let answer = Ipv4Addr::new(192, 0, 2, 7);
        let probes = NetworkProbes::with_resolver(a_only_resolver(answer).await);
        let collector = Collector::new(probes);
        let target = Target::parse("example.test").unwrap();

        let report = collector.collect(&target, &Options::new(false, Duration::from_secs(5))).await.unwrap();
        assert_eq!(report.dns.ipv4, vec![answer]);
        for (kind, label) in [
            (ProbeKind::DnsPtr, "PTR"),
            (ProbeKind::DnsCname, "CNAME"),
            (ProbeKind::DnsMx, "MX"),
            (ProbeKind::DnsNs, "NS"),
            (ProbeKind::DnsTxt, "TXT"),
        ] {
            let message = report.error(kind).unwrap_or_default();
            assert!(message.starts_with(&format!("{label} lookup failed")), "{kind}: {message}");
        }
        assert!(report.error(ProbeKind::Dns).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tls_is_not_started_once_the_deadline_has_passed() {
        let mut probes = FakeProbes::healthy();
        probes.traceroute = Behavior::Hang;
        let collector = Collector::new(probes);
        let options = Options::new(true, Duration::from_secs(5));

        let report = collector.collect(&target(), &options).await.unwrap();
        assert!(report.ports.is_open(443));
        assert_eq!(report.error(ProbeKind::Tls), Some("tls timed out after 0ms"));
        assert!(report.tls.is_empty());
        assert!(!calls(&collector).contains(&ProbeKind::Tls));
    }

    #[tokio::test(start_paused = true)]
    async fn tls_runs_when_443_is_open() {
        let collector = Collector::new(FakeProbes::healthy());
        let report = collector.collect(&target(), &with_ports()).await.unwrap();

        assert_eq!(report.ports.open, vec![80, 443]);
        assert_eq!(report.tls.common_name, "example.com");
        assert_eq!(report.error(ProbeKind::Tls), None);
        assert!(calls(&collector).contains(&ProbeKind::Tls));
    }

    #[tokio::test(start_paused = true)]
    async fn tls_is_skipped_when_443_is_closed() {
        let mut probes = FakeProbes::healthy();
        probes.ports = Behavior::Succeed(PortScanResult {
            scanned: vec![80, 443],
            open: vec![80],
            closed: vec![443],
            filtered: vec![],
        });
        let collector = Collector::new(probes);

        let report = collector.collect(&target(), &with_ports()).await.unwrap();
        assert_eq!(report.error(ProbeKind::Tls), Some(TLS_SKIPPED));
        assert!(report.tls.is_empty());
        assert!(!calls(&collector).contains(&ProbeKind::Tls));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_port_scan_skips_tls() {
        let mut probes = FakeProbes::healthy();
        probes.ports = Behavior::Fail("Port scan cancelled");
        let collector = Collector::new(probes);

        let report = collector.collect(&target(), &with_ports()).await.unwrap();
        assert_eq!(report.error(ProbeKind::Ports), Some("Port scan cancelled"));
        assert_eq!(report.error(ProbeKind::Tls), Some(TLS_SKIPPED));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_probes_do_not_affect_the_others() {
        let mut probes = FakeProbes::healthy();
        probes.ping = Behavior::Fail("Ping failed: permission denied");
        probes.geo = Behavior::Fail("Geolocation lookup failed: HTTP status: 429");
        let collector = Collector::new(probes);

        let report = collector.collect(&target(), &Options::default()).await.unwrap();
        assert_eq!(report.error(ProbeKind::Ping), Some("Ping failed: permission denied"));
        assert_eq!(report.error(ProbeKind::Geo), Some("Geolocation lookup failed: HTTP status: 429"));
        assert!(report.ping.is_empty());
        assert!(report.geo.is_empty());
        assert_eq!(report.asn.asn, "15133");
        assert_eq!(report.whois.domain, "EXAMPLE.COM");
        assert_eq!(report.trace.hops.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_results_are_kept_with_their_error() {
        let mut probes = FakeProbes::healthy();
        probes.asn = Behavior::Partial(
            AsnInfo { asn: "15169".into(), country_code: "US".into(), ..Default::default() },
            "AS name lookup failed: timeout",
        );
        let collector = Collector::new(probes);

        let report = collector.collect(&target(), &Options::default()).await.unwrap();
        assert_eq!(report.asn.asn, "15169");
        assert!(report.asn.as_name.is_empty());
        assert_eq!(report.error(ProbeKind::Asn), Some("AS name lookup failed: timeout"));
        // Geolocation owns its own group.
        assert_eq!(report.geo.ip, "93.184.216.34");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_times_out_on_its_own_budget() {
        let mut probes = FakeProbes::healthy();
        probes.whois = Behavior::Hang;
        let collector = Collector::new(probes);

        let report = collector.collect(&target(), &Options::default()).await.unwrap();
        assert_eq!(report.error(ProbeKind::Whois), Some("whois timed out after 10000ms"));
        assert!(report.whois.is_empty());
        assert!(report.whois_raw.is_empty());
        assert!(report.ping.success);
        assert!(report.duration_ms >= 10_000);
        assert!(report.duration_ms < 15_000);
    }

    #[tokio::test(start_paused = true)]
    async fn overall_deadline_bounds_the_run() {
        let mut probes = FakeProbes::healthy();
        probes.traceroute = Behavior::Hang;
        probes.ports = Behavior::Hang;
        let collector = Collector::new(probes);
        let options = Options::new(true, Duration::from_secs(5));

        let report = collector.collect(&target(), &options).await.unwrap();
        assert!(report.duration_ms <= 5_000, "took {}ms", report.duration_ms);
        assert!(report.trace.is_empty());
        assert!(report.ports.is_empty());
        for kind in [ProbeKind::Traceroute, ProbeKind::Ports] {
            if let Some(message) = report.error(kind) {
                assert!(message.contains("timed out"), "{kind}: {message}");
            }
        }
        assert_eq!(report.error(ProbeKind::Tls), Some(TLS_SKIPPED));
        assert!(report.ping.success);
        assert_eq!(report.asn.asn, "15133");
    }

    #[tokio::test(start_paused = true)]
    async fn ip_targets_are_collected_the_same_way() {
        let collector = Collector::new(FakeProbes::healthy());
        let target = Target::parse("93.184.216.34").unwrap();
        let report = collector.collect(&target, &Options::default()).await.unwrap();
        assert_eq!(report.target, "93.184.216.34");
        assert!(report.errors.is_empty());
    }

    #[test]
    fn slots_only_write_their_own_group() {
        let mut report = Report::default();
        report.asn.asn = "15169".into();

        Slot::Geo(ProbeOutcome::Value(GeoInfo { city: "Ashburn".into(), ..Default::default() })).merge_into(&mut report);
        Slot::Ping(ProbeOutcome::TimedOut(Duration::from_secs(5))).merge_into(&mut report);

        assert_eq!(report.asn.asn, "15169");
        assert_eq!(report.geo.city, "Ashburn");
        assert!(report.ping.is_empty());
        assert_eq!(report.error(ProbeKind::Ping), Some("ping timed out after 5000ms"));
        assert_eq!(report.errors.len(), 1);
    }
}
