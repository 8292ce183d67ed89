//! PB5: WordPress-specific exposure checks, gated on the CMS detector.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::find_by_path;
use crate::data_loader::WpCve;
use crate::schema::{
    Confidence, EvidenceRef, Finding, HttpArtifact, ScanContext, Severity,
};

const USERS_ENDPOINT: &str = "/wp-json/wp/v2/users";
const XMLRPC_ENDPOINT: &str = "/xmlrpc.php";
const XMLRPC_MARKER: &str = "XML-RPC server accepts POST requests only";

static README_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Version\s+(\d+\.\d+(?:\.\d+)?)").unwrap());
static GENERATOR_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)content="WordPress\s+(\d+\.\d+(?:\.\d+)?)""#).unwrap());

/// Dotted version padded to three components for comparison. WordPress
/// releases are at most `x.y.z`.
pub fn parse_version(raw: &str) -> Option<[u64; 3]> {
    let mut parts = [0u64; 3];
    let mut count = 0;
    for piece in raw.trim().split('.') {
        if count >= 3 {
            return None;
        }
        parts[count] = piece.parse().ok()?;
        count += 1;
    }
    (count >= 2).then_some(parts)
}

fn version_affected(detected: &str, cve: &WpCve) -> bool {
    let (Some(detected), Some(limit)) = (
        parse_version(detected),
        parse_version(&cve.affected_versions.version),
    ) else {
        return false;
    };
    match cve.affected_versions.operator.as_str() {
        "<" => detected < limit,
        "<=" => detected <= limit,
        "==" | "=" => detected == limit,
        _ => false,
    }
}

struct VersionDisclosure<'a> {
    version: String,
    source: String,
    confidence: Confidence,
    artifact: &'a HttpArtifact,
}

fn extract_version<'a>(http: &'a [HttpArtifact]) -> Option<VersionDisclosure<'a>> {
    if let Some(readme) = find_by_path(http, "/readme.html") {
        if matches!(readme.status_code, Some(200) | Some(301) | Some(302)) {
            if let Some(cap) = README_VERSION_RE.captures(readme.snippet()) {
                return Some(VersionDisclosure {
                    version: cap[1].to_string(),
                    source: "readme.html".to_string(),
                    confidence: Confidence::High,
                    artifact: readme,
                });
            }
        }
    }
    for artifact in http {
        let html = artifact
            .header("content-type")
            .map(|ct| ct.to_ascii_lowercase().contains("html"))
            .unwrap_or(false);
        if !html {
            continue;
        }
        if let Some(cap) = GENERATOR_VERSION_RE.captures(artifact.snippet()) {
            return Some(VersionDisclosure {
                version: cap[1].to_string(),
                source: format!("meta-generator ({})", artifact.path()),
                confidence: Confidence::Medium,
                artifact,
            });
        }
    }
    None
}

pub fn evaluate(ctx: &ScanContext, cves: &[WpCve]) -> Result<Vec<Finding>> {
    let Some(cms) = &ctx.cms else {
        return Ok(Vec::new());
    };
    if cms.detected_cms != "wordpress" || cms.confidence == Confidence::Low {
        return Ok(Vec::new());
    }

    let mut findings = Vec::new();
    let mut user_enum_id: Option<String> = None;
    let mut xmlrpc_id: Option<String> = None;

    // 1. REST user enumeration.
    if let Some(users) = find_by_path(&ctx.http, USERS_ENDPOINT) {
        let body = users.snippet();
        if users.status_code == Some(200) && body.contains("\"id\"") && body.contains("\"slug\"") {
            let finding = Finding::new(
                "PB5_WP_USER_ENUM",
                "WordPress User Enumeration Exposed",
                format!("{USERS_ENDPOINT} returns account objects to anonymous callers."),
                Severity::Medium,
                Confidence::High,
                5,
                &ctx.target,
                "Harvested usernames feed credential-stuffing and password \
                 spraying directly.",
                "Restrict the users endpoint to authenticated requests.",
            )
            .with_evidence(EvidenceRef::new(
                "http_body_snippet",
                json!({"request_id": users.request_id}),
                "REST users endpoint returned id/slug fields",
            ));
            user_enum_id = Some(finding.finding_id.clone());
            findings.push(finding);
        }
    }

    // 2. XML-RPC exposure.
    if let Some(xmlrpc) = find_by_path(&ctx.http, XMLRPC_ENDPOINT) {
        if xmlrpc.status_code == Some(200) && xmlrpc.snippet().contains(XMLRPC_MARKER) {
            let finding = Finding::new(
                "PB5_WP_XMLRPC_EXPOSED",
                "WordPress XML-RPC Interface Exposed",
                format!("{XMLRPC_ENDPOINT} is reachable and accepts POST requests."),
                Severity::Medium,
                Confidence::High,
                5,
                &ctx.target,
                "system.multicall lets one request carry hundreds of login \
                 attempts, and pingbacks can be abused for reflection.",
                "Block xmlrpc.php unless a legacy integration requires it.",
            )
            .with_evidence(EvidenceRef::new(
                "http_body_snippet",
                json!({"request_id": xmlrpc.request_id}),
                "xmlrpc.php answered with the POST-only banner",
            ));
            xmlrpc_id = Some(finding.finding_id.clone());
            findings.push(finding);
        }
    }

    // 3. Version disclosure + applicable CVEs.
    if let Some(disclosure) = extract_version(&ctx.http) {
        let version_evidence = EvidenceRef::new(
            "version_string",
            json!({"request_id": disclosure.artifact.request_id, "source": disclosure.source}),
            format!("Detected version: {}", disclosure.version),
        );
        findings.push(
            Finding::new(
                "PB5_WP_VERSION_DISCLOSURE",
                format!("WordPress Version Disclosed ({})", disclosure.version),
                format!(
                    "Version {} is visible via {}.",
                    disclosure.version, disclosure.source
                ),
                Severity::Low,
                disclosure.confidence,
                2,
                &ctx.target,
                "A precise version lets attackers select working exploits \
                 without any probing.",
                "Remove readme.html and the generator meta tag.",
            )
            .with_evidence(version_evidence.clone()),
        );

        for cve in cves {
            if !version_affected(&disclosure.version, cve) {
                continue;
            }
            let severity = Severity::parse(&cve.severity).unwrap_or(Severity::High);
            findings.push(
                Finding::new(
                    &format!("PB5_WP_CVE_{}", cve.id.replace('-', "_")),
                    format!("{}: {}", cve.id, cve.title),
                    format!(
                        "WordPress {} is affected by {}. {}",
                        disclosure.version, cve.id, cve.description
                    ),
                    severity,
                    Confidence::High,
                    9,
                    &ctx.target,
                    "A published vulnerability with a known affected range \
                     applies to the detected version.",
                    "Upgrade WordPress past the affected range.",
                )
                .with_evidence(version_evidence.clone()),
            );
        }
    }

    // 4. Correlated brute-force surface when both doors are open.
    if let (Some(user_enum), Some(xmlrpc)) = (&user_enum_id, &xmlrpc_id) {
        findings.push(
            Finding::new(
                "PB5_WP_BRUTEFORCE_SURFACE",
                "WordPress Brute-Force Attack Surface",
                "Usernames are enumerable and XML-RPC amplifies login \
                 attempts; together they make password attacks cheap.",
                Severity::High,
                Confidence::High,
                8,
                &ctx.target,
                "The two exposures compose: harvested usernames plus \
                 multicall authentication yields high-volume, low-cost \
                 brute forcing.",
                "Close either side: restrict the users endpoint or disable \
                 xmlrpc.php.",
            )
            .with_evidence(EvidenceRef::new(
                "finding_ref",
                json!({"finding_id": user_enum}),
                "User enumeration finding",
            ))
            .with_evidence(EvidenceRef::new(
                "finding_ref",
                json!({"finding_id": xmlrpc}),
                "XML-RPC exposure finding",
            )),
        );
    }

    Ok(findings)
}
