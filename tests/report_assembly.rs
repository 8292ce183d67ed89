mod common;

use chrono::Utc;
use common::{baseline, context, target, tls};
use sitehound::config::Config;
use sitehound::report::{build_report, stable_fingerprint, target_fingerprint, verdict};
use sitehound::schema::report::RunReport;
use sitehound::schema::{Confidence, Finding, Severity};
use sitehound::signals::extract_signals;

fn finding(ctx: &sitehound::schema::ScanContext, playbook: &str, severity: Severity, score: i64) -> Finding {
    Finding::new(
        playbook,
        format!("{playbook} finding"),
        "summary",
        severity,
        Confidence::High,
        score,
        &ctx.target,
        "why",
        "notes",
    )
}

#[test]
fn findings_sort_by_severity_then_score() {
    let mut ctx = context("example.com");
    ctx.findings.push(finding(&ctx, "PB2", Severity::Low, 3));
    ctx.findings.push(finding(&ctx, "PB4", Severity::Critical, 9));
    ctx.findings.push(finding(&ctx, "PB3", Severity::High, 7));
    ctx.findings.push(finding(&ctx, "PB5", Severity::High, 9));

    let report = build_report(&ctx, &Config::default(), Utc::now());
    let order: Vec<&str> = report.findings.iter().map(|f| f.playbook_id.as_str()).collect();
    assert_eq!(order, vec!["PB4", "PB5", "PB3", "PB2"]);

    assert_eq!(report.summary.finding_counts.critical, 1);
    assert_eq!(report.summary.finding_counts.high, 2);
    assert_eq!(report.summary.finding_counts.low, 1);
    // Titles of high+ findings only.
    assert_eq!(report.summary.top_findings.len(), 3);
    assert_eq!(report.summary.verdict, "Issues Found");
}

#[test]
fn verdict_ladder() {
    assert_eq!(verdict(&[]), "Clean");
    let ctx = context("example.com");
    let low = finding(&ctx, "PB2", Severity::Low, 1);
    assert_eq!(verdict(&[low.clone()]), "Warnings");
    let high = finding(&ctx, "PB3", Severity::High, 7);
    assert_eq!(verdict(&[low, high]), "Issues Found");
}

#[test]
fn clean_scan_shape() {
    let mut ctx = context("example.com");
    ctx.tls = Some(tls(&ctx.target, "example.com"));
    ctx.http.push(baseline(
        &ctx.target,
        200,
        &[
            ("strict-transport-security", "max-age=63072000"),
            ("content-security-policy", "default-src 'self'"),
            ("x-frame-options", "DENY"),
            ("x-content-type-options", "nosniff"),
            ("referrer-policy", "no-referrer"),
        ],
    ));
    ctx.signals = extract_signals(ctx.tls.as_ref(), &ctx.http);

    let report = build_report(&ctx, &Config::default(), Utc::now());
    assert_eq!(report.schema_version, "runreport.v1");
    assert_eq!(report.summary.verdict, "Clean");
    assert!(report.findings.is_empty());
    assert!(report.errors.is_empty());
    assert_eq!(report.summary.snr.requests_total, 1);
    assert_eq!(report.summary.snr.signals_total, ctx.signals.len());
}

#[test]
fn target_fingerprint_is_stable_and_input_sensitive() {
    let a = target_fingerprint(&target("example.com"));
    let b = target_fingerprint(&target("example.com"));
    let c = target_fingerprint(&target("other.com"));
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.starts_with("sha256:"));
}

#[test]
fn stable_fingerprint_ignores_key_insertion_order() {
    let v1: serde_json::Value = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
    let v2: serde_json::Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
    assert_eq!(stable_fingerprint(&v1), stable_fingerprint(&v2));
}

#[test]
fn run_fingerprint_tracks_outcomes_not_ids() {
    let mut ctx1 = context("example.com");
    let mut ctx2 = context("example.com");
    for ctx in [&mut ctx1, &mut ctx2] {
        ctx.http.push(baseline(&ctx.target, 200, &[]));
        ctx.signals = extract_signals(None, &ctx.http);
        let f = finding(ctx, "PB2_MISSING_HEADERS", Severity::Low, 5);
        ctx.findings.push(f);
    }
    let cfg = Config::default();
    let r1 = build_report(&ctx1, &cfg, Utc::now());
    let r2 = build_report(&ctx2, &cfg, Utc::now());
    // Different run ids and finding ids, same fingerprints.
    assert_ne!(r1.run_id, r2.run_id);
    assert_eq!(r1.delta.run_fingerprint, r2.delta.run_fingerprint);
    assert_eq!(
        r1.delta.finding_fingerprints[0].fingerprint,
        r2.delta.finding_fingerprints[0].fingerprint
    );
}

#[test]
fn report_round_trips_through_json() {
    let mut ctx = context("example.com");
    ctx.tls = Some(tls(&ctx.target, "example.com"));
    ctx.http.push(baseline(&ctx.target, 200, &[("server", "nginx/1.2")]));
    ctx.signals = extract_signals(ctx.tls.as_ref(), &ctx.http);
    ctx.findings.push(finding(&ctx, "PB2", Severity::Low, 2));
    ctx.add_error("dns", "DNS_COLLECTION_FAILED", "resolver unreachable");

    let report = build_report(&ctx, &Config::default(), Utc::now());
    let encoded = serde_json::to_string(&report).unwrap();
    let decoded: RunReport = serde_json::from_str(&encoded).unwrap();
    let re_encoded = serde_json::to_string(&decoded).unwrap();
    assert_eq!(encoded, re_encoded);
    assert_eq!(decoded.findings.len(), 1);
    assert_eq!(decoded.errors.len(), 1);
    assert_eq!(decoded.signals.len(), report.signals.len());
}

#[test]
fn finding_evidence_references_resolve_within_context() {
    let mut ctx = context("staging.example.com");
    ctx.tls = Some(tls(&ctx.target, "staging.example.com"));
    ctx.http.push(baseline(&ctx.target, 200, &[("server", "nginx/1.18.0")]));
    ctx.signals = extract_signals(ctx.tls.as_ref(), &ctx.http);
    sitehound::playbooks::run_playbooks(&mut ctx, &[]);

    let report = build_report(&ctx, &Config::default(), Utc::now());
    let known_ids: Vec<String> = report
        .artifacts
        .requests
        .iter()
        .map(|r| r.request_id.clone())
        .chain(report.artifacts.tls.iter().map(|t| t.tls_id.clone()))
        .chain(report.artifacts.dns.iter().map(|d| d.dns_id.clone()))
        .collect();
    for finding in &report.findings {
        for signal_ref in &finding.signals {
            for evidence_ref in &signal_ref.evidence_refs {
                assert!(
                    known_ids.contains(evidence_ref),
                    "dangling evidence ref {evidence_ref}"
                );
            }
        }
    }
}
