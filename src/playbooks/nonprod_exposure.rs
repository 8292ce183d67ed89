//! PB1: a non-production name in the certificate combined with verbose
//! technology headers on the baseline. Requires one TLS and one HTTP signal
//! so a single noisy source cannot fire it alone.

use anyhow::Result;
use serde_json::json;

use crate::schema::{Confidence, EvidenceRef, Finding, ScanContext, Severity};

pub const PLAYBOOK_ID: &str = "PB1_TLS_WEAKNESS";

pub fn evaluate(ctx: &ScanContext) -> Result<Vec<Finding>> {
    let subject_mismatch = ctx
        .signals
        .iter()
        .find(|s| s.signal_id == "tls.subject_mismatch" && s.value);
    let verbose_headers = ctx
        .signals
        .iter()
        .find(|s| s.signal_id == "http.header.verbose" && s.value);
    let (Some(tls_signal), Some(http_signal)) = (subject_mismatch, verbose_headers) else {
        return Ok(Vec::new());
    };

    let mut finding = Finding::new(
        PLAYBOOK_ID,
        "Non-Production Surface Exposed with Verbose Headers",
        "The certificate names a non-production environment while the server \
         advertises exact software versions, suggesting an internal system \
         reachable from the internet.",
        Severity::Medium,
        Confidence::High,
        5,
        &ctx.target,
        "Non-production systems typically run with weaker hardening and \
         known-vulnerable software versions.",
        "Confirm whether this host is meant to be public; restrict it or \
         strip version headers.",
    )
    .with_signal(tls_signal)
    .with_signal(http_signal);

    if let Some(tls) = &ctx.tls {
        let names = if tls.san.is_empty() {
            tls.cn.clone().unwrap_or_default()
        } else {
            tls.san.join(", ")
        };
        finding = finding.with_evidence(EvidenceRef::new(
            "tls_certificate",
            json!({"tls_id": tls.tls_id}),
            format!("Certificate names: {names}"),
        ));
    }
    if let Some(baseline) = ctx.baseline() {
        let server = baseline.header("server").unwrap_or("-");
        let powered = baseline.header("x-powered-by").unwrap_or("-");
        finding = finding.with_evidence(EvidenceRef::new(
            "http_headers",
            json!({"request_id": baseline.request_id}),
            format!("server: {server}; x-powered-by: {powered}"),
        ));
    }

    Ok(vec![finding])
}
