mod common;

use common::{baseline, context, dns, probe, tls};
use sitehound::data_loader::{AffectedVersions, WpCve};
use sitehound::playbooks::{
    email_auth, nonprod_exposure, run_playbooks, security_headers, takeover, wordpress,
};
use sitehound::scanner::cms::{detect_cms, parse_rule};
use sitehound::schema::{Confidence, Severity};
use sitehound::signals::extract_signals;

const ALL_SECURITY_HEADERS: &[(&str, &str)] = &[
    ("strict-transport-security", "max-age=63072000"),
    ("content-security-policy", "default-src 'self'"),
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
];

#[test]
fn exposed_staging_host_with_verbose_headers_fires_pb1() {
    let mut ctx = context("staging.example.com");
    ctx.tls = Some(tls(&ctx.target, "staging.example.com"));
    ctx.http.push(baseline(
        &ctx.target,
        200,
        &[("server", "nginx/1.18.0"), ("x-powered-by", "PHP/7.4.3")],
    ));
    ctx.signals = extract_signals(ctx.tls.as_ref(), &ctx.http);

    let findings = nonprod_exposure::evaluate(&ctx).unwrap();
    assert_eq!(findings.len(), 1);
    let f = &findings[0];
    assert_eq!(f.severity, Severity::Medium);
    assert_eq!(f.confidence, Confidence::High);
    // Heterogeneous evidence: one TLS reference, one HTTP reference.
    let tls_id = ctx.tls.as_ref().unwrap().tls_id.clone();
    let req_id = ctx.http[0].request_id.clone();
    let refs: Vec<String> = f
        .evidence
        .iter()
        .map(|e| e.reference.to_string())
        .collect();
    assert!(refs.iter().any(|r| r.contains(&tls_id)));
    assert!(refs.iter().any(|r| r.contains(&req_id)));
}

#[test]
fn pb1_needs_both_signal_sources() {
    let mut ctx = context("staging.example.com");
    ctx.tls = Some(tls(&ctx.target, "staging.example.com"));
    ctx.http.push(baseline(&ctx.target, 200, &[("server", "nginx")]));
    ctx.signals = extract_signals(ctx.tls.as_ref(), &ctx.http);
    assert!(nonprod_exposure::evaluate(&ctx).unwrap().is_empty());
}

#[test]
fn missing_headers_are_counted_by_pb2() {
    let mut ctx = context("example.com");
    ctx.http.push(baseline(
        &ctx.target,
        200,
        &[("strict-transport-security", "max-age=300")],
    ));
    let findings = security_headers::evaluate(&ctx).unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Low);
    assert_eq!(findings[0].score.total, 4);
    assert_eq!(findings[0].evidence.len(), 4);
}

#[test]
fn fully_hardened_baseline_passes_pb2() {
    let mut ctx = context("example.com");
    ctx.http
        .push(baseline(&ctx.target, 200, ALL_SECURITY_HEADERS));
    assert!(security_headers::evaluate(&ctx).unwrap().is_empty());
}

#[test]
fn spoofable_domain_is_critical() {
    let mut ctx = context("example.com");
    ctx.dns = Some(dns(&ctx.target, &["google-site-verification=x"], &[]));
    let findings = email_auth::evaluate(&ctx).unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Critical);
    assert!(findings[0].title.contains("SPF and DMARC Missing"));
}

#[test]
fn dns_warnings_degrade_pb3_severity() {
    let mut ctx = context("example.com");
    let mut artifact = dns(&ctx.target, &[], &[]);
    artifact.warnings.push("MX@example.com".to_string());
    ctx.dns = Some(artifact);
    let findings = email_auth::evaluate(&ctx).unwrap();
    assert_eq!(findings[0].severity, Severity::High);
}

#[test]
fn registrable_domain_fallback_degrades_pb3_severity() {
    let mut ctx = context("app.example.com");
    let mut artifact = dns(&ctx.target, &[], &[]);
    artifact.domain_checked_for_email_auth = "example.com".to_string();
    ctx.dns = Some(artifact);
    let findings = email_auth::evaluate(&ctx).unwrap();
    assert_eq!(findings[0].severity, Severity::High);
}

#[test]
fn strict_spf_and_dmarc_produce_no_finding() {
    let mut ctx = context("example.com");
    ctx.dns = Some(dns(
        &ctx.target,
        &["v=spf1 include:_spf.example.com -all"],
        &["v=DMARC1; p=reject; rua=mailto:dmarc@example.com"],
    ));
    assert!(email_auth::evaluate(&ctx).unwrap().is_empty());
}

#[test]
fn dangling_heroku_cname_fires_pb4() {
    let mut ctx = context("shop.example.com");
    let mut artifact = dns(&ctx.target, &[], &[]);
    artifact.cname = Some("abandoned.herokudns.com".to_string());
    ctx.dns = Some(artifact);
    let mut b = baseline(&ctx.target, 404, &[]);
    b.response_analysis_snippet = Some("<h1>No such app</h1>".to_string());
    ctx.http.push(b);

    let findings = takeover::evaluate(&ctx).unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Critical);
    assert!(findings[0].title.contains("Heroku"));
}

#[test]
fn takeover_needs_marker_and_status() {
    let mut ctx = context("shop.example.com");
    let mut artifact = dns(&ctx.target, &[], &[]);
    artifact.cname = Some("abandoned.herokudns.com".to_string());
    ctx.dns = Some(artifact);
    // Healthy 200 response: CNAME alone is not enough.
    let mut b = baseline(&ctx.target, 200, &[]);
    b.response_analysis_snippet = Some("welcome".to_string());
    ctx.http.push(b);
    assert!(takeover::evaluate(&ctx).unwrap().is_empty());
}

fn wordpress_context() -> sitehound::schema::ScanContext {
    let mut ctx = context("blog.example.com");
    ctx.http.push(baseline(&ctx.target, 200, &[]));
    ctx.http.push(probe(
        &ctx.target,
        "/wp-login.php",
        200,
        "<form id=\"loginform\">",
    ));
    ctx.http.push(probe(
        &ctx.target,
        "/wp-json/wp/v2/users",
        200,
        r#"[{"id":1,"slug":"admin","name":"Admin"}]"#,
    ));
    ctx.http.push(probe(
        &ctx.target,
        "/xmlrpc.php",
        200,
        "XML-RPC server accepts POST requests only.",
    ));
    ctx.http.push(probe(
        &ctx.target,
        "/readme.html",
        200,
        "<h1>WordPress</h1> <br /> Version 5.4.1",
    ));
    let rules = vec![parse_rule(&serde_json::json!({
        "name": "wordpress",
        "indicators": [
            {"type": "endpoint", "path": "/wp-login.php", "score": 2},
            {"type": "endpoint", "path": "/xmlrpc.php", "score": 1}
        ]
    }))
    .unwrap()];
    ctx.cms = Some(detect_cms(&ctx.target, &ctx.http, &rules));
    ctx
}

fn cve_table() -> Vec<WpCve> {
    vec![WpCve {
        id: "CVE-2021-9999".to_string(),
        title: "Example Core Vulnerability".to_string(),
        description: "Affects older releases.".to_string(),
        severity: "high".to_string(),
        affected_versions: AffectedVersions {
            operator: "<".to_string(),
            version: "5.5.0".to_string(),
        },
    }]
}

#[test]
fn wordpress_brute_force_surface_scenario() {
    let ctx = wordpress_context();
    assert_eq!(ctx.cms.as_ref().unwrap().confidence, Confidence::High);

    let findings = wordpress::evaluate(&ctx, &cve_table()).unwrap();
    let by_id: Vec<(&str, Severity)> = findings
        .iter()
        .map(|f| (f.playbook_id.as_str(), f.severity))
        .collect();
    assert_eq!(findings.len(), 5);
    assert!(by_id.contains(&("PB5_WP_USER_ENUM", Severity::Medium)));
    assert!(by_id.contains(&("PB5_WP_XMLRPC_EXPOSED", Severity::Medium)));
    assert!(by_id.contains(&("PB5_WP_VERSION_DISCLOSURE", Severity::Low)));
    assert!(by_id.contains(&("PB5_WP_CVE_CVE_2021_9999", Severity::High)));
    assert!(by_id.contains(&("PB5_WP_BRUTEFORCE_SURFACE", Severity::High)));

    // The correlated finding links back to the two underlying findings.
    let surface = findings
        .iter()
        .find(|f| f.playbook_id == "PB5_WP_BRUTEFORCE_SURFACE")
        .unwrap();
    let linked: Vec<String> = surface
        .evidence
        .iter()
        .map(|e| e.reference.to_string())
        .collect();
    let user_enum = findings.iter().find(|f| f.playbook_id == "PB5_WP_USER_ENUM").unwrap();
    let xmlrpc = findings
        .iter()
        .find(|f| f.playbook_id == "PB5_WP_XMLRPC_EXPOSED")
        .unwrap();
    assert!(linked.iter().any(|r| r.contains(&user_enum.finding_id)));
    assert!(linked.iter().any(|r| r.contains(&xmlrpc.finding_id)));
}

#[test]
fn wordpress_playbook_is_gated_on_confidence() {
    let mut ctx = wordpress_context();
    ctx.cms.as_mut().unwrap().confidence = Confidence::Low;
    assert!(wordpress::evaluate(&ctx, &cve_table()).unwrap().is_empty());

    let mut ctx = wordpress_context();
    ctx.cms.as_mut().unwrap().detected_cms = "joomla".to_string();
    assert!(wordpress::evaluate(&ctx, &cve_table()).unwrap().is_empty());
}

#[test]
fn playbook_sequence_appends_in_order_and_never_fails() {
    let mut ctx = wordpress_context();
    ctx.dns = Some(dns(&ctx.target, &[], &[]));
    ctx.signals = extract_signals(None, &ctx.http);
    run_playbooks(&mut ctx, &cve_table());
    assert!(ctx.errors.is_empty());
    // PB2 (missing headers) precedes PB3 (email auth), which precedes PB5.
    let order: Vec<&str> = ctx.findings.iter().map(|f| f.playbook_id.as_str()).collect();
    let pb2 = order.iter().position(|p| p.starts_with("PB2")).unwrap();
    let pb3 = order.iter().position(|p| p.starts_with("PB3")).unwrap();
    let pb5 = order.iter().position(|p| p.starts_with("PB5")).unwrap();
    assert!(pb2 < pb3 && pb3 < pb5);
}
