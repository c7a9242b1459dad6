// src/core/target.rs

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use url::Url;

use crate::core::error::CollectError;

/// A normalized probe target: an IP literal or a bare host name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    host: String,
    ip: Option<IpAddr>,
}

impl Target {
    /// Normalizes user input into a target.
    ///
    /// Accepts a bare IP (`8.8.8.8`, `2001:db8::1`, `[2001:db8::1]`), an
    /// `ip:port` socket address, a host name with an optional port, or an
    /// `http(s)://` URL whose host is extracted.
    pub fn parse(input: &str) -> Result<Self, CollectError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CollectError::InvalidTarget("target cannot be empty".to_string()));
        }

        let host = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed)
                .map_err(|e| CollectError::InvalidTarget(format!("invalid URL: {e}")))?;
            url.host_str()
                .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
                .ok_or_else(|| CollectError::InvalidTarget("URL has no host".to_string()))?
        } else {
            trimmed.to_string()
        };

        if let Some(ip) = parse_ip_literal(&host) {
            return Ok(Self::from_ip(ip));
        }

        if host.chars().any(char::is_whitespace) {
            return Err(CollectError::InvalidTarget(
                "must be IP address, domain, or URL".to_string(),
            ));
        }

        // "example.com:8443" -> "example.com"
        let name = match host.rsplit_once(':') {
            Some((name, port)) if !name.contains(':') && port.parse::<u16>().is_ok() => name,
            _ => host.as_str(),
        };
        if name.is_empty() {
            return Err(CollectError::InvalidTarget("target has no host".to_string()));
        }

        Ok(Self { host: name.to_string(), ip: None })
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        Self { host: ip.to_string(), ip: Some(ip) }
    }

    pub fn as_str(&self) -> &str {
        &self.host
    }

    /// The literal address when the target was given as an IP.
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn is_ip(&self) -> bool {
        self.ip.is_some()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .and_then(|h| h.parse::<IpAddr>().ok())
}

/// The DNS-phase answer for a target, computed once and shared with every
/// later probe so none of them resolves the name again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    target: Target,
    addresses: Vec<IpAddr>,
    preferred: IpAddr,
}

impl ResolvedHost {
    /// Returns `None` when `addresses` is empty.
    pub fn new(target: Target, addresses: Vec<IpAddr>) -> Option<Self> {
        let preferred = addresses
            .iter()
            .copied()
            .find(IpAddr::is_ipv4)
            .or_else(|| addresses.first().copied())?;
        Some(Self { target, addresses, preferred })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }

    /// First IPv4 address, falling back to the first address of any family.
    pub fn preferred(&self) -> IpAddr {
        self.preferred
    }

    /// Name to present as TLS SNI: the host name, or the address for IP targets.
    pub fn server_name(&self) -> String {
        match self.target.ip() {
            Some(ip) => ip.to_string(),
            None => self.target.as_str().to_string(),
        }
    }
}
