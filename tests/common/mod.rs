//! Shared builders for synthetic scan artifacts.
#![allow(dead_code)]

use sitehound::schema::{
    DnsArtifact, HttpArtifact, ScanContext, Target, TimingsMs, TlsArtifact,
};

pub fn target(host: &str) -> Target {
    Target {
        target_id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
        input: format!("https://{host}"),
        canonical_url: format!("https://{host}/"),
        host: host.to_string(),
        scheme: "https".to_string(),
        port: 443,
        resolved_ips: vec!["203.0.113.10".to_string()],
        ports: vec![443],
    }
}

pub fn context(host: &str) -> ScanContext {
    ScanContext::new(target(host))
}

pub fn baseline(t: &Target, status: u16, headers: &[(&str, &str)]) -> HttpArtifact {
    let mut artifact = HttpArtifact::for_request(t, &t.canonical_url, "baseline");
    artifact.status_code = Some(status);
    for (k, v) in headers {
        artifact
            .headers
            .insert(k.to_ascii_lowercase(), v.to_string());
    }
    artifact.timings_ms = TimingsMs::total(42);
    artifact
}

pub fn probe(t: &Target, path: &str, status: u16, body: &str) -> HttpArtifact {
    let url = format!("{}{}", t.canonical_url.trim_end_matches('/'), path);
    let mut artifact = HttpArtifact::for_request(t, &url, "probe");
    artifact.status_code = Some(status);
    artifact.response_analysis_snippet = Some(body.to_string());
    artifact.timings_ms = TimingsMs::total(21);
    artifact
}

pub fn tls(t: &Target, cn: &str) -> TlsArtifact {
    let mut artifact = TlsArtifact::for_target(t, "203.0.113.10".to_string(), 443);
    artifact.protocol = Some("TLSv1_3".to_string());
    artifact.cipher = Some("TLS13_AES_256_GCM_SHA384".to_string());
    artifact.cn = Some(cn.to_string());
    artifact.san = vec![cn.to_string()];
    artifact.issuer_dn = Some("CN=R3, O=Let's Encrypt, C=US".to_string());
    artifact.not_after = Some("2030-01-01T00:00:00Z".to_string());
    artifact.timings_ms = TimingsMs::total(12);
    artifact
}

pub fn dns(t: &Target, txt: &[&str], dmarc: &[&str]) -> DnsArtifact {
    let mut artifact = DnsArtifact::for_target(t);
    artifact.a = vec!["203.0.113.10".to_string()];
    artifact.txt = txt.iter().map(|s| s.to_string()).collect();
    artifact.dmarc = dmarc.iter().map(|s| s.to_string()).collect();
    artifact
}
