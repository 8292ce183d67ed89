use std::collections::BTreeSet;
use std::net::IpAddr;

use thiserror::Error;
use url::Url;

use crate::schema::{new_id, Target};

/// Fatal-to-scan rejection reasons. Anything here means no report is produced.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("dns resolution failed for {0}")]
    DnsFailed(String),
    #[error("refusing to scan {0}: resolves to a loopback/private/link-local address")]
    SsrfBlocked(String),
}

impl NormalizeError {
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizeError::InvalidInput(_) => "INVALID_INPUT",
            NormalizeError::DnsFailed(_) => "DNS_FAILED",
            NormalizeError::SsrfBlocked(_) => "SSRF_BLOCKED",
        }
    }
}

/// Canonical form: lowercase scheme/host, default port stripped, path
/// defaulted to `/`, fragment dropped. Idempotent.
pub fn canonicalize(input: &str) -> Result<Url, NormalizeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::InvalidInput("empty url".to_string()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|e| NormalizeError::InvalidInput(format!("unparseable url: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(NormalizeError::InvalidInput(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(NormalizeError::InvalidInput("missing host".to_string()));
    }
    url.set_fragment(None);
    Ok(url)
}

pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_link_local()
                || v4.is_private()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                // fe80::/10 link-local
                || (seg[0] & 0xffc0) == 0xfe80
                // fc00::/7 unique-local
                || (seg[0] & 0xfe00) == 0xfc00
        }
    }
}

/// Canonicalize, resolve, and apply the SSRF guard. Fail closed: a single
/// blocked address rejects the whole target.
pub async fn normalize_target(input: &str) -> Result<Target, NormalizeError> {
    let url = canonicalize(input)?;
    let host = url
        .host_str()
        .ok_or_else(|| NormalizeError::InvalidInput("missing host".to_string()))?
        .to_string();
    let port = url
        .port_or_known_default()
        .unwrap_or(if url.scheme() == "https" { 443 } else { 80 });

    // lookup_host runs getaddrinfo on the blocking pool, so the request
    // scheduler is never stalled by resolution.
    let addrs = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| NormalizeError::DnsFailed(format!("{host}: {e}")))?;
    let ips: BTreeSet<IpAddr> = addrs.map(|a| a.ip()).collect();
    if ips.is_empty() {
        return Err(NormalizeError::DnsFailed(format!("{host}: no addresses")));
    }
    for ip in &ips {
        if is_blocked_ip(*ip) {
            return Err(NormalizeError::SsrfBlocked(host));
        }
    }

    Ok(Target {
        target_id: new_id(),
        input: input.to_string(),
        canonical_url: url.to_string(),
        host,
        scheme: url.scheme().to_string(),
        port,
        resolved_ips: ips.iter().map(|ip| ip.to_string()).collect(),
        ports: vec![port],
    })
}
