// src/url_safety.rs
//! SSRF guard for every URL we are about to fetch or resolve.
//!
//! Checks run in order and stop at the first failure: non-empty, length, parse,
//! http(s) scheme, host present, and finally the host must not be (or resolve to) a
//! private, loopback, link-local, reserved or metadata address. DNS failures are allowed
//! through; the fetch itself will fail.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use ipnet::{IpNet, Ipv6Net};
use once_cell::sync::Lazy;
use url::{Host, Url};

pub const MAX_URL_LEN: usize = 2048;
const DNS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlVerdict {
    pub valid: bool,
    pub reason: Option<String>,
}

impl UrlVerdict {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Full validation including DNS resolution of domain hosts.
pub async fn validate_url(url: &str) -> UrlVerdict {
    let parsed = match check_static(url) {
        Ok(p) => p,
        Err(v) => return v,
    };
    let Some(Host::Domain(domain)) = parsed.host() else {
        return UrlVerdict::ok();
    };
    let port = parsed.port_or_known_default().unwrap_or(80);
    let verdict = match tokio::time::timeout(DNS_TIMEOUT, tokio::net::lookup_host((domain, port))).await {
        Ok(lookup) => judge_resolution(domain, lookup),
        Err(_) => {
            tracing::debug!(host = %domain, "dns lookup timed out, allowing");
            UrlVerdict::ok()
        }
    };
    verdict
}

/// Verdict for a finished lookup: any blocked address rejects, a failed lookup is let through.
fn judge_resolution<I>(domain: &str, lookup: io::Result<I>) -> UrlVerdict
where
    I: IntoIterator<Item = SocketAddr>,
{
    match lookup {
        Ok(addrs) => {
            for addr in addrs {
                if let Some(why) = blocked_ip_reason(addr.ip()) {
                    return UrlVerdict::reject(format!("{domain} resolves to {why} address"));
                }
            }
            UrlVerdict::ok()
        }
        Err(e) => {
            tracing::debug!(host = %domain, error = %e, "dns lookup failed, allowing");
            UrlVerdict::ok()
        }
    }
}

/// Checks that need no network: everything except DNS resolution.
pub fn validate_url_offline(url: &str) -> UrlVerdict {
    match check_static(url) {
        Ok(_) => UrlVerdict::ok(),
        Err(v) => v,
    }
}

fn check_static(url: &str) -> Result<Url, UrlVerdict> {
    let url = url.trim();
    if url.is_empty() {
        return Err(UrlVerdict::reject("empty url"));
    }
    if url.len() > MAX_URL_LEN {
        return Err(UrlVerdict::reject(format!(
            "url longer than {MAX_URL_LEN} characters"
        )));
    }
    let parsed = Url::parse(url).map_err(|e| UrlVerdict::reject(format!("invalid url: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(UrlVerdict::reject(format!(
            "scheme {} not allowed",
            parsed.scheme()
        )));
    }
    match parsed.host() {
        None => return Err(UrlVerdict::reject("missing host")),
        Some(Host::Domain(d)) if d.is_empty() => return Err(UrlVerdict::reject("missing host")),
        Some(Host::Domain(d)) => {
            let lower = d.trim_end_matches('.').to_ascii_lowercase();
            if is_internal_hostname(&lower) {
                return Err(UrlVerdict::reject(format!("internal host {lower}")));
            }
        }
        Some(Host::Ipv4(ip)) => {
            if let Some(why) = blocked_ip_reason(IpAddr::V4(ip)) {
                return Err(UrlVerdict::reject(format!("{ip} is a {why} address")));
            }
        }
        Some(Host::Ipv6(ip)) => {
            if let Some(why) = blocked_ip_reason(IpAddr::V6(ip)) {
                return Err(UrlVerdict::reject(format!("{ip} is a {why} address")));
            }
        }
    }
    Ok(parsed)
}

fn is_internal_hostname(host: &str) -> bool {
    host == "localhost"
        || host.ends_with(".localhost")
        || host.ends_with(".local")
        || host.ends_with(".internal")
}

/// Why an address must not be contacted, or `None` when it is public.
///
/// IPv6 forms that carry an IPv4 address (mapped, NAT64, compatible) are judged by that
/// IPv4 address.
pub fn blocked_ip_reason(ip: IpAddr) -> Option<&'static str> {
    let ip = match ip {
        IpAddr::V6(v6) if !v6.is_loopback() => embedded_v4(v6).map_or(ip, IpAddr::V4),
        other => other,
    };
    BLOCKED_RANGES
        .iter()
        .find(|(net, _)| net.contains(&ip))
        .map(|(_, why)| *why)
}

fn embedded_v4(v6: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = v6.to_ipv4_mapped() {
        return Some(v4);
    }
    if NAT64_PREFIX.contains(&v6) || V4_COMPATIBLE.contains(&v6) {
        let o = v6.octets();
        return Some(Ipv4Addr::new(o[12], o[13], o[14], o[15]));
    }
    None
}

fn net(cidr: &str) -> IpNet {
    cidr.parse().unwrap_or_else(|e| panic!("static cidr {cidr:?}: {e}"))
}

fn net6(cidr: &str) -> Ipv6Net {
    cidr.parse().unwrap_or_else(|e| panic!("static cidr {cidr:?}: {e}"))
}

static NAT64_PREFIX: Lazy<Ipv6Net> = Lazy::new(|| net6("64:ff9b::/96"));
static V4_COMPATIBLE: Lazy<Ipv6Net> = Lazy::new(|| net6("::/96"));

/// First match wins, so narrower ranges come before the ranges containing them.
static BLOCKED_RANGES: Lazy<Vec<(IpNet, &'static str)>> = Lazy::new(|| {
    [
        ("169.254.169.254/32", "cloud metadata"),
        ("0.0.0.0/8", "reserved"),
        ("10.0.0.0/8", "private"),
        ("100.64.0.0/10", "private"),
        ("127.0.0.0/8", "loopback"),
        ("169.254.0.0/16", "link-local"),
        ("172.16.0.0/12", "private"),
        ("192.0.0.0/24", "reserved"),
        ("192.0.2.0/24", "reserved"),
        ("192.88.99.0/24", "reserved"),
        ("192.168.0.0/16", "private"),
        ("198.18.0.0/15", "reserved"),
        ("198.51.100.0/24", "reserved"),
        ("203.0.113.0/24", "reserved"),
        ("224.0.0.0/4", "reserved"),
        ("240.0.0.0/4", "reserved"),
        ("::1/128", "loopback"),
        ("::/8", "reserved"),
        ("64:ff9b:1::/48", "reserved"),
        ("100::/64", "reserved"),
        ("2001::/23", "reserved"),
        ("2001:db8::/32", "reserved"),
        ("2002::/16", "reserved"),
        ("fc00::/7", "private"),
        ("fe80::/10", "link-local"),
        ("fec0::/10", "reserved"),
        ("ff00::/8", "reserved"),
    ]
    .into_iter()
    .map(|(cidr, why)| (net(cidr), why))
    .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dangerous_schemes_and_targets_are_rejected() {
        for bad in [
            "javascript:alert(1)",
            "http://169.254.169.254/",
            "http://localhost/",
            "http://127.0.0.1/",
            "file:///etc/passwd",
            "data:text/html,hi",
            "http://10.1.2.3/admin",
            "http://[::1]/",
            "http://[::ffff:192.168.0.1]/",
        ] {
            let v = validate_url(bad).await;
            assert!(!v.valid, "{bad} should be rejected");
            assert!(v.reason.is_some());
        }
    }

    #[tokio::test]
    async fn public_article_is_accepted() {
        let v = validate_url("https://example.com/article").await;
        assert_eq!(v, UrlVerdict::ok());
    }

    #[test]
    fn empty_and_overlong_urls_are_rejected() {
        assert!(!validate_url_offline("   ").valid);
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LEN));
        let v = validate_url_offline(&long);
        assert!(!v.valid);
        assert!(v.reason.unwrap().contains("longer"));
    }

    #[test]
    fn carrier_nat_and_reserved_ranges() {
        assert_eq!(
            blocked_ip_reason("100.64.1.1".parse().unwrap()),
            Some("private")
        );
        assert_eq!(
            blocked_ip_reason("240.0.0.1".parse().unwrap()),
            Some("reserved")
        );
        assert_eq!(blocked_ip_reason("93.184.216.34".parse().unwrap()), None);
    }

    #[test]
    fn embedded_ipv4_forms_are_judged_as_ipv4() {
        for (bad, why) in [
            ("http://[::127.0.0.1]/", "loopback"),
            ("http://[64:ff9b::a9fe:a9fe]/", "cloud metadata"),
            ("http://[64:ff9b::10.0.0.1]/", "private"),
            ("http://[::ffff:169.254.169.254]/", "cloud metadata"),
        ] {
            let v = validate_url_offline(bad);
            assert!(!v.valid, "{bad} should be rejected");
            assert!(v.reason.unwrap().contains(why), "{bad} should be {why}");
        }
        assert_eq!(blocked_ip_reason("::7f00:1".parse().unwrap()), Some("loopback"));
        assert_eq!(blocked_ip_reason("::".parse().unwrap()), Some("reserved"));
        // NAT64 to a public address is fine
        assert_eq!(blocked_ip_reason("64:ff9b::5db8:d822".parse().unwrap()), None);
    }

    #[test]
    fn benchmarking_and_documentation_ranges() {
        for ip in [
            "198.18.0.1",
            "198.19.255.254",
            "192.0.2.10",
            "203.0.113.7",
            "2001:db8::1",
            "2002:a00:1::1",
            "ff02::1",
        ] {
            assert_eq!(
                blocked_ip_reason(ip.parse().unwrap()),
                Some("reserved"),
                "{ip}"
            );
        }
        assert!(!validate_url_offline("http://198.18.0.1/").valid);
        assert!(!validate_url_offline("http://[2001:db8::1]/").valid);
        assert_eq!(blocked_ip_reason("198.20.0.1".parse().unwrap()), None);
        assert_eq!(blocked_ip_reason("2606:4700::1111".parse().unwrap()), None);
    }

    #[test]
    fn private_v6_and_link_local() {
        assert_eq!(blocked_ip_reason("fd12::1".parse().unwrap()), Some("private"));
        assert_eq!(blocked_ip_reason("fe80::1".parse().unwrap()), Some("link-local"));
        assert_eq!(blocked_ip_reason("169.254.1.1".parse().unwrap()), Some("link-local"));
    }

    #[test]
    fn domain_resolving_to_private_address_is_rejected() {
        let addrs: Vec<SocketAddr> = vec![
            "93.184.216.34:443".parse().unwrap(),
            "10.0.0.5:443".parse().unwrap(),
        ];
        let v = judge_resolution("intranet.example.com", Ok(addrs));
        assert!(!v.valid);
        assert_eq!(
            v.reason.as_deref(),
            Some("intranet.example.com resolves to private address")
        );
    }

    #[test]
    fn public_resolution_and_failed_lookup_are_allowed() {
        let public: Vec<SocketAddr> = vec!["93.184.216.34:443".parse().unwrap()];
        assert_eq!(judge_resolution("example.com", Ok(public)), UrlVerdict::ok());

        let failed: io::Result<Vec<SocketAddr>> =
            Err(io::Error::new(io::ErrorKind::NotFound, "no such host"));
        assert_eq!(judge_resolution("nx.example.com", failed), UrlVerdict::ok());
    }
}
