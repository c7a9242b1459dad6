// src/core/deadline.rs

use tokio::time::{Duration, Instant};

use crate::core::models::ProbeKind;

/// Derives per-probe budgets from the overall run deadline.
///
/// Built on `tokio::time::Instant` so the whole run follows Tokio's clock
/// (and can be driven by a paused clock in tests).
#[derive(Debug, Clone, Copy)]
pub struct DeadlineComposer {
    started: Instant,
    deadline: Instant,
}

impl DeadlineComposer {
    pub fn start(overall: Duration) -> Self {
        let started = Instant::now();
        Self { started, deadline: started + overall }
    }

    /// The instant at which the whole run must be over.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// A budget no larger than `ceiling` and no larger than what is left overall.
    pub fn sub_deadline(&self, ceiling: Duration) -> Duration {
        ceiling.min(self.remaining())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Fixed upper bounds for each probe, applied on top of the overall budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeCeilings {
    pub dns: Duration,
    pub ping: Duration,
    pub traceroute: Duration,
    pub whois: Duration,
    pub asn: Duration,
    pub geo: Duration,
    pub ports: Duration,
    pub tls: Duration,
}

impl Default for ProbeCeilings {
    fn default() -> Self {
        Self {
            dns: Duration::from_secs(3),
            ping: Duration::from_secs(5),
            traceroute: Duration::from_secs(20),
            whois: Duration::from_secs(10),
            asn: Duration::from_secs(8),
            geo: Duration::from_secs(8),
            ports: Duration::from_secs(30),
            tls: Duration::from_secs(4),
        }
    }
}

impl ProbeCeilings {
    pub fn for_probe(&self, kind: ProbeKind) -> Duration {
        match kind {
            ProbeKind::Dns
            | ProbeKind::DnsPtr
            | ProbeKind::DnsCname
            | ProbeKind::DnsMx
            | ProbeKind::DnsNs
            | ProbeKind::DnsTxt => self.dns,
            ProbeKind::Ping => self.ping,
            ProbeKind::Traceroute => self.traceroute,
            ProbeKind::Whois => self.whois,
            ProbeKind::Asn => self.asn,
            ProbeKind::Geo => self.geo,
            ProbeKind::Ports => self.ports,
            ProbeKind::Tls => self.tls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sub_deadline_is_capped_by_remaining_budget() {
        let clock = DeadlineComposer::start(Duration::from_secs(10));
        assert_eq!(clock.sub_deadline(Duration::from_secs(3)), Duration::from_secs(3));
        assert_eq!(clock.sub_deadline(Duration::from_secs(30)), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(clock.sub_deadline(Duration::from_secs(3)), Duration::from_secs(2));
        assert_eq!(clock.elapsed(), Duration::from_secs(8));
        assert!(!clock.is_expired());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(clock.is_expired());
        assert_eq!(clock.sub_deadline(Duration::from_secs(3)), Duration::ZERO);
    }

    #[test]
    fn dns_sub_lookups_share_the_dns_ceiling() {
        let ceilings = ProbeCeilings::default();
        assert_eq!(ceilings.for_probe(ProbeKind::DnsMx), ceilings.dns);
        assert_eq!(ceilings.for_probe(ProbeKind::Ports), Duration::from_secs(30));
        assert_eq!(ceilings.for_probe(ProbeKind::Tls), Duration::from_secs(4));
    }
}
