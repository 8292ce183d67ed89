use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 5,
            Severity::High => 4,
            Severity::Medium => 3,
            Severity::Low => 2,
            Severity::Info => 1,
        }
    }

    /// One step down the ladder, used when the evidence quality is degraded.
    pub fn degraded(&self) -> Severity {
        match self {
            Severity::Critical => Severity::High,
            Severity::High => Severity::Medium,
            Severity::Medium => Severity::Low,
            Severity::Low => Severity::Info,
            Severity::Info => Severity::Info,
        }
    }

    pub fn parse(s: &str) -> Option<Severity> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Wall-clock timings attached to every collector artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingsMs {
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake: Option<u64>,
}

impl TimingsMs {
    pub fn total(ms: u64) -> Self {
        TimingsMs {
            total: ms,
            ..Default::default()
        }
    }
}

/// Canonical scan subject. Immutable once the normalizer has produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub target_id: String,
    pub input: String,
    pub canonical_url: String,
    pub host: String,
    pub scheme: String,
    pub port: u16,
    pub resolved_ips: Vec<String>,
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsArtifact {
    pub dns_id: String,
    pub target_id: String,
    pub domain: String,
    pub a: Vec<String>,
    pub aaaa: Vec<String>,
    pub mx: Vec<String>,
    pub ns: Vec<String>,
    pub txt: Vec<String>,
    pub dmarc: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Domain the SPF/DMARC records were ultimately read from (root host,
    /// or the registrable-domain fallback).
    pub domain_checked_for_email_auth: String,
    pub registrable_domain_method: String,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timings_ms: TimingsMs,
}

impl DnsArtifact {
    pub fn for_target(target: &Target) -> Self {
        DnsArtifact {
            dns_id: super::new_id(),
            target_id: target.target_id.clone(),
            domain: target.host.clone(),
            a: Vec::new(),
            aaaa: Vec::new(),
            mx: Vec::new(),
            ns: Vec::new(),
            txt: Vec::new(),
            dmarc: Vec::new(),
            cname: None,
            domain_checked_for_email_auth: target.host.clone(),
            registrable_domain_method: "naive".to_string(),
            warnings: Vec::new(),
            error: None,
            timings_ms: TimingsMs::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsArtifact {
    pub tls_id: String,
    pub target_id: String,
    pub observed_host: String,
    pub ip: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cn: Option<String>,
    pub san: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_dn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    pub self_signed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
    /// `sha256:<hex>` over the DER-encoded leaf certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timings_ms: TimingsMs,
}

impl TlsArtifact {
    pub fn for_target(target: &Target, ip: String, port: u16) -> Self {
        TlsArtifact {
            tls_id: super::new_id(),
            target_id: target.target_id.clone(),
            observed_host: target.host.clone(),
            ip,
            port,
            protocol: None,
            cipher: None,
            alpn: None,
            cn: None,
            san: Vec::new(),
            issuer_dn: None,
            serial: None,
            self_signed: false,
            not_before: None,
            not_after: None,
            hash: None,
            error: None,
            timings_ms: TimingsMs::default(),
        }
    }
}

/// One HTTP request/response pair. Always constructible, even when the
/// request never left the machine: `error` carries the reason and the
/// remaining fields stay at their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpArtifact {
    pub request_id: String,
    pub target_id: String,
    pub url: String,
    pub effective_url: String,
    pub host: String,
    pub ip: String,
    pub port: u16,
    pub tls: bool,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_analysis_snippet: Option<String>,
    pub response_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timings_ms: TimingsMs,
    pub tags: Vec<String>,
}

impl HttpArtifact {
    pub fn for_request(target: &Target, url: &str, tag: &str) -> Self {
        let parsed = url::Url::parse(url).ok();
        let tls = parsed
            .as_ref()
            .map(|u| u.scheme() == "https")
            .unwrap_or(true);
        let host = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .unwrap_or(&target.host)
            .to_string();
        let port = parsed
            .as_ref()
            .and_then(|u| u.port_or_known_default())
            .unwrap_or(if tls { 443 } else { 80 });
        HttpArtifact {
            request_id: super::new_id(),
            target_id: target.target_id.clone(),
            url: url.to_string(),
            effective_url: url.to_string(),
            host,
            ip: target.resolved_ips.first().cloned().unwrap_or_default(),
            port,
            tls,
            method: "GET".to_string(),
            status_code: None,
            headers: BTreeMap::new(),
            response_analysis_snippet: None,
            response_truncated: false,
            response_hash: None,
            error: None,
            timings_ms: TimingsMs::default(),
            tags: vec![tag.to_string()],
        }
    }

    pub fn failed(target: &Target, url: &str, tag: &str, error: String) -> Self {
        let mut artifact = Self::for_request(target, url, tag);
        artifact.error = Some(error);
        artifact
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    pub fn snippet(&self) -> &str {
        self.response_analysis_snippet.as_deref().unwrap_or("")
    }

    pub fn path(&self) -> String {
        url::Url::parse(&self.effective_url)
            .or_else(|_| url::Url::parse(&self.url))
            .map(|u| u.path().trim_end_matches('/').to_ascii_lowercase())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsArtifact {
    pub cms_id: String,
    pub target_id: String,
    pub detected_cms: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub confidence: Confidence,
    pub evidence: Vec<String>,
    pub timings_ms: TimingsMs,
}

/// Atomic observation derived deterministically from raw artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub source: String,
    pub target_id: String,
    pub value: bool,
    pub signal_confidence: f64,
    pub weight: u32,
    pub evidence_refs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
}

impl Signal {
    pub fn new(id: &str, source: &str, target_id: &str, value: bool) -> Self {
        Signal {
            signal_id: id.to_string(),
            source: source.to_string(),
            target_id: target_id.to_string(),
            value,
            signal_confidence: 1.0,
            weight: 1,
            evidence_refs: Vec::new(),
            artifact_ref: None,
        }
    }

    pub fn confidence(mut self, c: f64) -> Self {
        self.signal_confidence = c;
        self
    }

    pub fn weight(mut self, w: u32) -> Self {
        self.weight = w;
        self
    }

    pub fn artifact(mut self, artifact_id: &str) -> Self {
        self.evidence_refs.push(artifact_id.to_string());
        self.artifact_ref = Some(artifact_id.to_string());
        self
    }
}
