//! PB3: SPF / DMARC posture of the scanned domain.

use anyhow::Result;
use serde_json::json;

use crate::schema::{Confidence, DnsArtifact, EvidenceRef, Finding, ScanContext, Severity};

pub const PLAYBOOK_ID: &str = "PB3_EMAIL_AUTH";

#[derive(Debug, PartialEq)]
pub struct SpfAnalysis {
    pub present: bool,
    pub record: Option<String>,
    pub all_mechanism: Option<String>,
}

#[derive(Debug, PartialEq)]
pub struct DmarcAnalysis {
    pub present: bool,
    pub record: Option<String>,
    pub has_policy_tag: bool,
    pub policy: Option<String>,
}

pub fn analyze_spf(txt: &[String]) -> SpfAnalysis {
    let record = txt
        .iter()
        .map(|r| r.trim())
        .find(|r| r.to_ascii_lowercase().starts_with("v=spf1"))
        .map(String::from);
    let Some(ref rec) = record else {
        return SpfAnalysis {
            present: false,
            record: None,
            all_mechanism: None,
        };
    };
    let all_mechanism = rec
        .to_ascii_lowercase()
        .split_whitespace()
        .find(|tok| matches!(*tok, "+all" | "-all" | "~all" | "?all" | "all"))
        .map(|tok| if tok == "all" { "+all".to_string() } else { tok.to_string() });
    SpfAnalysis {
        present: true,
        record,
        all_mechanism,
    }
}

pub fn analyze_dmarc(dmarc: &[String]) -> DmarcAnalysis {
    let record = dmarc
        .iter()
        .map(|r| r.trim())
        .find(|r| r.to_ascii_lowercase().starts_with("v=dmarc1"))
        .map(String::from);
    let Some(ref rec) = record else {
        return DmarcAnalysis {
            present: false,
            record: None,
            has_policy_tag: false,
            policy: None,
        };
    };
    let policy = rec
        .split(';')
        .filter_map(|part| part.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("p"))
        .map(|(_, v)| v.trim().to_ascii_lowercase());
    DmarcAnalysis {
        present: true,
        record,
        has_policy_tag: policy.is_some(),
        policy,
    }
}

struct Verdict {
    severity: Severity,
    title: &'static str,
    summary: &'static str,
    score: i64,
}

fn classify(spf: &SpfAnalysis, dmarc: &DmarcAnalysis) -> Option<Verdict> {
    let spf_all = spf.all_mechanism.as_deref();
    if !spf.present && !dmarc.present {
        return Some(Verdict {
            severity: Severity::Critical,
            title: "Email Spoofing Risk: SPF and DMARC Missing",
            summary: "The domain publishes neither SPF nor DMARC; anyone can send mail as it.",
            score: 9,
        });
    }
    if !dmarc.present {
        return Some(Verdict {
            severity: Severity::High,
            title: "Email Spoofing Risk: DMARC Missing",
            summary: "No DMARC record; receivers get no policy for failed authentication.",
            score: 7,
        });
    }
    if !dmarc.has_policy_tag {
        return Some(Verdict {
            severity: Severity::High,
            title: "Email Security: DMARC Record Missing Policy Tag",
            summary: "A DMARC record exists but carries no p= policy.",
            score: 6,
        });
    }
    if spf_all == Some("+all") {
        return Some(Verdict {
            severity: Severity::High,
            title: "Email Security: SPF Permissive (+all)",
            summary: "The SPF record authorizes every sender on the internet.",
            score: 7,
        });
    }
    if dmarc.policy.as_deref() == Some("none") {
        return Some(Verdict {
            severity: Severity::Medium,
            title: "Email Security: DMARC Policy is None",
            summary: "DMARC is in monitoring mode and does not reject spoofed mail.",
            score: 5,
        });
    }
    if spf.present && spf_all.is_none() {
        return Some(Verdict {
            severity: Severity::Medium,
            title: "Email Security: SPF Missing All-Mechanism",
            summary: "The SPF record has no terminating all mechanism.",
            score: 4,
        });
    }
    if spf_all == Some("?all") {
        return Some(Verdict {
            severity: Severity::Medium,
            title: "Email Security: SPF Neutral (?all)",
            summary: "The SPF record ends in a neutral qualifier.",
            score: 4,
        });
    }
    None
}

fn degraded_evidence(dns: &DnsArtifact) -> bool {
    dns.domain_checked_for_email_auth != dns.domain || !dns.warnings.is_empty()
}

pub fn evaluate(ctx: &ScanContext) -> Result<Vec<Finding>> {
    let Some(dns) = &ctx.dns else {
        return Ok(Vec::new());
    };
    if dns.error.is_some() {
        return Ok(Vec::new());
    }

    let spf = analyze_spf(&dns.txt);
    let dmarc = analyze_dmarc(&dns.dmarc);
    let Some(verdict) = classify(&spf, &dmarc) else {
        return Ok(Vec::new());
    };

    // Records read through the naive registrable-domain fallback, or with
    // partial lookups behind them, are weaker evidence.
    let severity = if degraded_evidence(dns) {
        verdict.severity.degraded()
    } else {
        verdict.severity
    };

    let finding = Finding::new(
        PLAYBOOK_ID,
        verdict.title,
        verdict.summary,
        severity,
        Confidence::High,
        verdict.score,
        &ctx.target,
        "Without strict SPF and DMARC, the domain can be used for phishing \
         that passes casual inspection.",
        "Publish SPF with -all and a DMARC policy of quarantine or reject.",
    )
    .with_evidence(EvidenceRef::new(
        "dns_txt",
        json!({"dns_id": dns.dns_id, "field": "txt", "domain": dns.domain_checked_for_email_auth}),
        format!("SPF: {}", spf.record.as_deref().unwrap_or("missing")),
    ))
    .with_evidence(EvidenceRef::new(
        "dns_txt",
        json!({"dns_id": dns.dns_id, "field": "dmarc", "domain": dns.domain_checked_for_email_auth}),
        format!("DMARC: {}", dmarc.record.as_deref().unwrap_or("missing")),
    ));

    Ok(vec![finding])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spf_all_mechanism_parsing() {
        let spf = analyze_spf(&["v=spf1 include:_spf.example.com -all".to_string()]);
        assert!(spf.present);
        assert_eq!(spf.all_mechanism.as_deref(), Some("-all"));

        let spf = analyze_spf(&["v=spf1 ip4:1.2.3.0/24".to_string()]);
        assert!(spf.present);
        assert_eq!(spf.all_mechanism, None);

        let spf = analyze_spf(&["google-site-verification=x".to_string()]);
        assert!(!spf.present);
    }

    #[test]
    fn dmarc_policy_parsing() {
        let d = analyze_dmarc(&["v=DMARC1; p=reject; rua=mailto:d@example.com".to_string()]);
        assert!(d.present);
        assert_eq!(d.policy.as_deref(), Some("reject"));

        let d = analyze_dmarc(&["v=DMARC1; rua=mailto:d@example.com".to_string()]);
        assert!(d.present);
        assert!(!d.has_policy_tag);

        let d = analyze_dmarc(&[]);
        assert!(!d.present);
    }

    #[test]
    fn well_formed_records_produce_no_verdict() {
        let spf = analyze_spf(&["v=spf1 include:_spf.example.com -all".to_string()]);
        let dmarc = analyze_dmarc(&["v=DMARC1; p=reject".to_string()]);
        assert!(classify(&spf, &dmarc).is_none());
    }

    #[test]
    fn both_missing_is_critical() {
        let verdict = classify(&analyze_spf(&[]), &analyze_dmarc(&[])).unwrap();
        assert_eq!(verdict.severity, Severity::Critical);
        assert!(verdict.title.contains("SPF and DMARC Missing"));
    }

    #[test]
    fn severity_ladder_order() {
        // DMARC missing beats SPF problems.
        let spf = analyze_spf(&["v=spf1 +all".to_string()]);
        let verdict = classify(&spf, &analyze_dmarc(&[])).unwrap();
        assert_eq!(verdict.severity, Severity::High);
        assert!(verdict.title.contains("DMARC Missing"));

        // +all with DMARC present.
        let dmarc = analyze_dmarc(&["v=DMARC1; p=reject".to_string()]);
        let verdict = classify(&spf, &dmarc).unwrap();
        assert!(verdict.title.contains("+all"));

        // p=none is medium.
        let spf = analyze_spf(&["v=spf1 -all".to_string()]);
        let dmarc = analyze_dmarc(&["v=DMARC1; p=none".to_string()]);
        let verdict = classify(&spf, &dmarc).unwrap();
        assert_eq!(verdict.severity, Severity::Medium);
    }
}
