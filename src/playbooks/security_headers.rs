//! PB2: missing response-hardening headers on the baseline.

use anyhow::Result;
use serde_json::json;

use crate::schema::{Confidence, EvidenceRef, Finding, ScanContext, Severity};

pub const PLAYBOOK_ID: &str = "PB2_MISSING_HEADERS";

const REQUIRED_HEADERS: &[&str] = &[
    "Strict-Transport-Security",
    "Content-Security-Policy",
    "X-Frame-Options",
    "X-Content-Type-Options",
    "Referrer-Policy",
];

pub fn evaluate(ctx: &ScanContext) -> Result<Vec<Finding>> {
    let Some(baseline) = ctx.baseline() else {
        return Ok(Vec::new());
    };
    // A failed baseline has no headers worth judging.
    if baseline.status_code.is_none() {
        return Ok(Vec::new());
    }

    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .filter(|h| baseline.header(h).is_none())
        .copied()
        .collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }

    let mut finding = Finding::new(
        PLAYBOOK_ID,
        format!("Missing Security Headers ({})", missing.len()),
        format!(
            "The baseline response lacks {} of the standard hardening headers.",
            missing.len()
        ),
        Severity::Low,
        Confidence::High,
        missing.len() as i64,
        &ctx.target,
        "Each missing header removes one browser-side defense layer \
         (HTTPS pinning, XSS containment, clickjacking, MIME sniffing, \
         referrer leakage).",
        "Add the missing headers at the edge or application layer.",
    );
    for header in missing {
        finding = finding.with_evidence(EvidenceRef::new(
            "missing_header",
            json!({"header": header, "request_id": baseline.request_id}),
            format!("Missing: {header}"),
        ));
    }

    Ok(vec![finding])
}
