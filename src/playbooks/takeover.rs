//! PB4: dangling CNAME onto a third-party service whose error page admits
//! the resource is unclaimed.

use anyhow::Result;
use serde_json::json;

use crate::schema::{Confidence, EvidenceRef, Finding, HttpArtifact, ScanContext, Severity};

pub const PLAYBOOK_ID: &str = "PB4_SUBDOMAIN_TAKEOVER";

pub struct TakeoverSignature {
    pub service: &'static str,
    pub cname_suffixes: &'static [&'static str],
    pub body_markers: &'static [&'static str],
    pub status_codes: &'static [u16],
}

pub static TAKEOVER_SIGNATURES: &[TakeoverSignature] = &[
    TakeoverSignature {
        service: "Heroku",
        cname_suffixes: &[".herokuapp.com", ".herokudns.com"],
        body_markers: &["no such app", "there is no app configured at that hostname"],
        status_codes: &[404, 502, 503],
    },
    TakeoverSignature {
        service: "GitHub Pages",
        cname_suffixes: &[".github.io"],
        body_markers: &["there isn't a github pages site here"],
        status_codes: &[404],
    },
    // Website endpoints only; plain amazonaws.com hosts ELB/CloudFront/EC2
    // traffic and would false-positive.
    TakeoverSignature {
        service: "AWS S3 (Website)",
        cname_suffixes: &[".s3-website-", ".s3-website."],
        body_markers: &["the specified bucket does not exist", "no such bucket"],
        status_codes: &[404],
    },
    TakeoverSignature {
        service: "Azure (Web App / Front Door)",
        cname_suffixes: &[".azurewebsites.net", ".trafficmanager.net", ".azurefd.net"],
        body_markers: &[
            "404 web site not found",
            "the resource you are looking for has been removed",
        ],
        status_codes: &[404],
    },
    TakeoverSignature {
        service: "Pantheon",
        cname_suffixes: &[".pantheonsite.io"],
        body_markers: &["the gods are wise", "but do not know of the site which you seek"],
        status_codes: &[404],
    },
    TakeoverSignature {
        service: "Tumblr",
        cname_suffixes: &[".tumblr.com"],
        body_markers: &["whatever you were looking for doesn't currently exist at this address"],
        status_codes: &[404],
    },
    TakeoverSignature {
        service: "Shopify",
        cname_suffixes: &[".myshopify.com"],
        body_markers: &["sorry, this shop is currently unavailable"],
        status_codes: &[404],
    },
    TakeoverSignature {
        service: "Zendesk",
        cname_suffixes: &[".zendesk.com"],
        body_markers: &["help center closed"],
        status_codes: &[404],
    },
];

/// Match a CNAME against the signature table. Suffixes ending in `-` or `.`
/// are label prefixes (regional S3 website endpoints); everything else must
/// match on a DNS label boundary.
pub fn match_signature(cname: &str) -> Option<&'static TakeoverSignature> {
    let c = cname.trim().trim_end_matches('.').to_ascii_lowercase();
    if c.is_empty() {
        return None;
    }
    for sig in TAKEOVER_SIGNATURES {
        for suffix in sig.cname_suffixes {
            let s = suffix.to_ascii_lowercase();
            if s.ends_with('-') || s.ends_with('.') {
                if c.contains(&s) {
                    return Some(sig);
                }
            } else {
                let bare = s.trim_start_matches('.');
                if c == bare || c.ends_with(&format!(".{bare}")) {
                    return Some(sig);
                }
            }
        }
    }
    None
}

pub fn body_contains_marker(body: &str, markers: &[&str]) -> bool {
    let b = body.to_ascii_lowercase();
    markers.iter().any(|m| b.contains(&m.to_ascii_lowercase()))
}

fn artifact_for_host<'a>(http: &'a [HttpArtifact], host: &str) -> Option<&'a HttpArtifact> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    http.iter()
        .find(|a| a.host.trim_end_matches('.').eq_ignore_ascii_case(&host))
        .or_else(|| http.first())
}

pub fn evaluate(ctx: &ScanContext) -> Result<Vec<Finding>> {
    let Some(dns) = &ctx.dns else {
        return Ok(Vec::new());
    };
    if dns.error.is_some() {
        return Ok(Vec::new());
    }
    let Some(cname) = dns.cname.as_deref() else {
        return Ok(Vec::new());
    };
    let Some(sig) = match_signature(cname) else {
        return Ok(Vec::new());
    };
    let Some(artifact) = artifact_for_host(&ctx.http, &dns.domain) else {
        return Ok(Vec::new());
    };
    let Some(status) = artifact.status_code else {
        return Ok(Vec::new());
    };
    if !sig.status_codes.contains(&status) {
        return Ok(Vec::new());
    }
    if !body_contains_marker(artifact.snippet(), sig.body_markers) {
        return Ok(Vec::new());
    }

    let finding = Finding::new(
        PLAYBOOK_ID,
        format!("Subdomain Takeover Suspected ({})", sig.service),
        format!(
            "{} points at {} via CNAME {cname}, and the service answers with \
             an unclaimed-resource page.",
            dns.domain, sig.service
        ),
        Severity::Critical,
        Confidence::High,
        9,
        &ctx.target,
        "An attacker who claims the dangling resource serves arbitrary \
         content under this domain.",
        "Claim the resource on the provider side or remove the CNAME.",
    )
    .with_evidence(EvidenceRef::new(
        "dns_cname",
        json!({"dns_id": dns.dns_id, "field": "cname"}),
        format!("CNAME: {cname}"),
    ))
    .with_evidence(EvidenceRef::new(
        "http_body_snippet",
        json!({"request_id": artifact.request_id}),
        format!("HTTP {status} with {} marker", sig.service),
    ));

    Ok(vec![finding])
}
