use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::schema::report::{
    DeltaInfo, EngineInfo, FindingCounts, FindingFingerprint, OperatorInfo, ReportArtifacts,
    ReportSummary, RunReport, ScopeInfo, Snr, TimeInfo,
};
use crate::schema::{Finding, ScanContext, Severity, Target};

pub const ENGINE_NAME: &str = "sitehound";

/// SHA-256 over stable-serialized JSON. `serde_json` maps are BTree-backed,
/// so object keys serialize sorted and the digest is order-independent.
pub fn stable_fingerprint(value: &Value) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    format!("sha256:{:x}", Sha256::digest(&bytes))
}

pub fn target_fingerprint(target: &Target) -> String {
    stable_fingerprint(&json!({
        "host": target.host.to_ascii_lowercase(),
        "canonical_url": target.canonical_url,
        "ports": target.ports,
    }))
}

fn run_fingerprint(target_fp: &str, ctx: &ScanContext) -> String {
    let mut signal_ids: Vec<&str> = ctx.signals.iter().map(|s| s.signal_id.as_str()).collect();
    signal_ids.sort_unstable();
    let mut playbook_ids: Vec<&str> = ctx.findings.iter().map(|f| f.playbook_id.as_str()).collect();
    playbook_ids.sort_unstable();
    stable_fingerprint(&json!({
        "target_fingerprint": target_fp,
        "signals": signal_ids,
        "playbooks": playbook_ids,
    }))
}

fn finding_fingerprint(finding: &Finding, target: &Target) -> String {
    let mut signal_ids: Vec<&str> = finding.signals.iter().map(|s| s.signal_id.as_str()).collect();
    signal_ids.sort_unstable();
    stable_fingerprint(&json!({
        "playbook_id": finding.playbook_id,
        "canonical_url": target.canonical_url,
        "signals": signal_ids,
    }))
}

fn count_findings(findings: &[Finding]) -> FindingCounts {
    let mut counts = FindingCounts::default();
    for f in findings {
        match f.severity {
            Severity::Critical => counts.critical += 1,
            Severity::High => counts.high += 1,
            Severity::Medium => counts.medium += 1,
            Severity::Low => counts.low += 1,
            Severity::Info => counts.info += 1,
        }
    }
    counts
}

pub fn verdict(findings: &[Finding]) -> &'static str {
    if findings
        .iter()
        .any(|f| matches!(f.severity, Severity::Critical | Severity::High))
    {
        "Issues Found"
    } else if !findings.is_empty() {
        "Warnings"
    } else {
        "Clean"
    }
}

fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Assemble the final report: counts, severity ordering, verdict, and the
/// delta fingerprints downstream consumers diff between runs.
pub fn build_report(ctx: &ScanContext, cfg: &Config, finished_at: DateTime<Utc>) -> RunReport {
    let mut findings = ctx.findings.clone();
    findings.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then(b.score.total.cmp(&a.score.total))
    });

    let top_findings = findings
        .iter()
        .filter(|f| f.severity.rank() >= Severity::High.rank())
        .map(|f| f.title.clone())
        .collect();

    let target_fp = target_fingerprint(&ctx.target);
    let run_fp = run_fingerprint(&target_fp, ctx);
    let finding_fps = findings
        .iter()
        .map(|f| FindingFingerprint {
            finding_id: f.finding_id.clone(),
            fingerprint: finding_fingerprint(f, &ctx.target),
        })
        .collect();

    let duration_ms = (finished_at - ctx.started_at).num_milliseconds().max(0) as u64;

    RunReport {
        schema_version: "runreport.v1".to_string(),
        run_id: ctx.run_id.clone(),
        engine: EngineInfo {
            name: ENGINE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        time: TimeInfo {
            started_at: iso(ctx.started_at),
            finished_at: iso(finished_at),
            duration_ms,
        },
        operator: OperatorInfo {
            kind: "user".to_string(),
            id: "usr_local".to_string(),
        },
        scope: ScopeInfo {
            intent: "recon".to_string(),
            targets: vec![ctx.target.clone()],
            guardrails: json!({
                "max_requests": cfg.max_http_requests_per_scan,
                "response_raw_max_bytes": cfg.response_raw_max_bytes,
                "timeouts_s": {
                    "dns": cfg.dns_timeout,
                    "tls": cfg.tls_timeout,
                    "http_connect": cfg.http_timeout_connect,
                    "http_read": cfg.http_timeout_read,
                },
                "rate_limit_s": cfg.global_rate_limit,
                "ssrf_protection": {
                    "block_private_ranges": true,
                    "block_link_local": true,
                    "block_loopback": true,
                },
            }),
        },
        summary: ReportSummary {
            finding_counts: count_findings(&findings),
            top_findings,
            snr: Snr {
                signals_total: ctx.signals.len(),
                findings_total: findings.len(),
                requests_total: ctx.http.len(),
            },
            verdict: verdict(&findings).to_string(),
        },
        errors: ctx.errors.clone(),
        delta: DeltaInfo {
            delta_ready: true,
            fingerprint_algo: "v1:sha256".to_string(),
            normalization: json!({
                "version": "norm.v1",
                "url_normalization": "lowercase_host, strip_default_ports, default_root_path, drop_fragment",
                "header_normalization": "lowercase_keys, trim_values",
                "id_ordering": "signals_and_playbooks_sorted_before_hashing",
            }),
            target_fingerprint: target_fp,
            run_fingerprint: run_fp,
            finding_fingerprints: finding_fps,
        },
        artifacts: ReportArtifacts {
            requests: ctx.http.clone(),
            tls: ctx.tls.clone().into_iter().collect(),
            dns: ctx.dns.clone(),
            cms: ctx.cms.clone(),
        },
        signals: ctx.signals.clone(),
        findings,
    }
}
