// src/output.rs

use std::io::{self, Write};

use clap::ValueEnum;
use crossterm::style::Stylize;
use strum::Display;

use crate::core::models::Report;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Markdown summary
    Md,
    /// Indented JSON report
    Json,
    /// Single-line JSON report
    Raw,
}

/// Writes `report` to `out` in the requested format.
///
/// `styled` only affects [`OutputFormat::Text`].
pub fn render<W: Write>(report: &Report, format: OutputFormat, styled: bool, out: &mut W) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            let json = report.to_json().map_err(io::Error::other)?;
            writeln!(out, "{json}")
        }
        OutputFormat::Raw => {
            let json = serde_json::to_string(report).map_err(io::Error::other)?;
            write!(out, "{json}")
        }
        OutputFormat::Md => render_markdown(report, out),
        OutputFormat::Text => render_text(report, &Palette { styled }, out),
    }
}

// --- Markdown ---

fn render_markdown<W: Write>(report: &Report, out: &mut W) -> io::Result<()> {
    writeln!(out, "# {} - Network Intelligence Report\n", report.target)?;

    let ips: Vec<String> = report.dns.addresses().iter().map(ToString::to_string).collect();
    if !ips.is_empty() {
        writeln!(out, "**IPs:** {}\n", ips.join(", "))?;
    }
    if !report.dns.mx.is_empty() {
        writeln!(out, "**MX:** {}\n", report.dns.mx.join(", "))?;
    }
    if !report.dns.ns.is_empty() {
        writeln!(out, "**NS:** {}\n", report.dns.ns.join(", "))?;
    }

    let geo = &report.geo;
    if !geo.country.is_empty() {
        writeln!(out, "**Location:** {}, {}, {}\n", geo.city, geo.region, geo.country)?;
        if !geo.isp.is_empty() {
            writeln!(out, "**ISP:** {}\n", geo.isp)?;
        }
    }
    if !report.asn.asn.is_empty() {
        write!(out, "**ASN:** AS{}", report.asn.asn)?;
        if !report.asn.as_name.is_empty() {
            write!(out, " ({})", report.asn.as_name)?;
        }
        writeln!(out, "\n")?;
    }

    if report.ping.success {
        writeln!(
            out,
            "**Ping:** {}/{} packets, {} avg\n",
            report.ping.packets_received, report.ping.packets_sent, report.ping.avg_rtt
        )?;
    }
    if report.trace.success {
        writeln!(out, "**Traceroute:** {} hops\n", report.trace.hops.len())?;
    }
    if !report.whois.registrar.is_empty() {
        writeln!(out, "**Registrar:** {}\n", report.whois.registrar)?;
    }

    if !report.ports.open.is_empty() {
        let ports: Vec<String> = report.ports.open.iter().map(ToString::to_string).collect();
        writeln!(out, "**Open Ports:** {}\n", ports.join(", "))?;
    }
    if !report.tls.subject.is_empty() {
        writeln!(out, "**TLS:** {} (expires: {})\n", report.tls.common_name, report.tls.not_after)?;
    }

    writeln!(out, "**Duration:** {}ms\n", report.duration_ms)?;

    if !report.errors.is_empty() {
        writeln!(out, "## Errors\n")?;
        for (key, message) in &report.errors {
            writeln!(out, "- `{key}`: {message}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

// --- Text ---

struct Palette {
    styled: bool,
}

impl Palette {
    fn label(&self, text: &str) -> String {
        let padded = format!("{text:<11}");
        if self.styled { padded.bold().yellow().to_string() } else { padded }
    }

    fn good(&self, text: &str) -> String {
        if self.styled { text.green().to_string() } else { text.to_string() }
    }

    fn bad(&self, text: &str) -> String {
        if self.styled { text.red().to_string() } else { text.to_string() }
    }
}

fn row<W: Write>(out: &mut W, palette: &Palette, label: &str, value: &str) -> io::Result<()> {
    writeln!(out, "{} {}", palette.label(label), value)
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn render_text<W: Write>(report: &Report, palette: &Palette, out: &mut W) -> io::Result<()> {
    row(out, palette, "Target", &report.target)?;
    row(out, palette, "Duration", &format!("{}ms", report.duration_ms))?;

    let dns = &report.dns;
    for (label, values) in [
        ("IPv4", join(&dns.ipv4)),
        ("IPv6", join(&dns.ipv6)),
        ("PTR", dns.ptr.join(", ")),
        ("CNAME", dns.cname.join(", ")),
        ("MX", dns.mx.join(", ")),
        ("NS", dns.ns.join(", ")),
    ] {
        if !values.is_empty() {
            row(out, palette, label, &values)?;
        }
    }
    for txt in &dns.txt {
        row(out, palette, "TXT", txt)?;
    }
    writeln!(out)?;

    let ping = &report.ping;
    if ping.packets_sent > 0 {
        let packets = format!("{}/{} packets", ping.packets_received, ping.packets_sent);
        let value = if ping.success {
            format!(
                "{}, {:.1}% loss, min/avg/max {}/{}/{}, stddev {}",
                palette.good(&packets),
                ping.packet_loss_pct,
                ping.min_rtt,
                ping.avg_rtt,
                ping.max_rtt,
                ping.stddev_rtt
            )
        } else {
            format!("{}, {:.1}% loss (failed)", palette.bad(&packets), ping.packet_loss_pct)
        };
        row(out, palette, "Ping", &value)?;
    }

    if report.trace.success {
        row(out, palette, "Traceroute", &format!("{} hops to {}", report.trace.hops.len(), report.target))?;
        for hop in &report.trace.hops {
            let who = match (hop.host.is_empty(), hop.ip.is_empty()) {
                (_, true) => "*".to_string(),
                (true, false) => hop.ip.clone(),
                (false, false) => format!("{} ({})", hop.host, hop.ip),
            };
            writeln!(out, "{:>14} {who}  {}", hop.hop, hop.rtt)?;
        }
    }

    let whois = &report.whois;
    if !whois.domain.is_empty() {
        let mut value = whois.domain.clone();
        if !whois.registrar.is_empty() {
            value.push_str(&format!(" ({})", whois.registrar));
        }
        if !whois.expires.is_empty() {
            value.push_str(&format!(" expires {}", whois.expires));
        }
        row(out, palette, "WHOIS", &value)?;
    } else if !whois.net_name.is_empty() {
        let mut value = whois.net_name.clone();
        if !whois.org_name.is_empty() {
            value.push_str(&format!(" ({})", whois.org_name));
        }
        if !whois.country.is_empty() {
            value.push_str(&format!(" [{}]", whois.country));
        }
        row(out, palette, "WHOIS", &value)?;
    }
    if !whois.abuse_emails.is_empty() {
        row(out, palette, "Abuse", &whois.abuse_emails.join(", "))?;
    }

    let asn = &report.asn;
    if !asn.asn.is_empty() {
        let mut value = format!("AS{}", asn.asn);
        if !asn.as_name.is_empty() {
            value.push_str(&format!(" ({})", asn.as_name));
        }
        if !asn.prefix.is_empty() {
            value.push_str(&format!(" {}", asn.prefix));
        }
        if !asn.country_code.is_empty() {
            value.push_str(&format!(" [{}]", asn.country_code));
        }
        row(out, palette, "ASN", &value)?;
    }

    let geo = &report.geo;
    if !geo.city.is_empty() || !geo.country.is_empty() {
        let place: Vec<&str> = [geo.city.as_str(), geo.region.as_str(), geo.country.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect();
        let mut value = place.join(", ");
        if !geo.isp.is_empty() {
            value.push_str(&format!(" ({})", geo.isp));
        }
        row(out, palette, "Location", &value)?;
    }

    let ports = &report.ports;
    if !ports.scanned.is_empty() {
        let open = format!("{} open", ports.open.len());
        let mut value = if ports.open.is_empty() { open } else { palette.good(&open) };
        value.push_str(&format!(", {} closed", ports.closed.len()));
        if !ports.filtered.is_empty() {
            value.push_str(&format!(", {} filtered", ports.filtered.len()));
        }
        if !ports.open.is_empty() {
            value.push_str(&format!(" [{}]", join(&ports.open)));
        }
        row(out, palette, "Ports", &value)?;
    }

    let tls = &report.tls;
    if !tls.is_empty() {
        let mut value = format!("{} valid until {}", tls.common_name, tls.not_after);
        if tls.expired {
            value.push_str(&format!(" {}", palette.bad("[expired]")));
        }
        if tls.self_signed {
            value.push_str(&format!(" {}", palette.bad("[self-signed]")));
        }
        row(out, palette, "TLS", &value)?;
        if !tls.alt_names.is_empty() {
            row(out, palette, "SANs", &tls.alt_names.join(", "))?;
        }
    }

    if !report.errors.is_empty() {
        writeln!(out)?;
        for (index, (key, message)) in report.errors.iter().enumerate() {
            let label = if index == 0 { "Errors" } else { "" };
            row(out, palette, label, &palette.bad(&format!("{key}: {message}")))?;
        }
    }
    Ok(())
}
