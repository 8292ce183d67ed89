use std::collections::BTreeMap;
use std::time::Instant;

use regex::Regex;
use serde_json::Value;

use crate::schema::{new_id, CmsArtifact, Confidence, HttpArtifact, Target, TimingsMs};

/// One declarative detection indicator, parsed once at load time. Rule data
/// is user-supplied JSON, so anything malformed is dropped during parsing
/// rather than handled at match time.
#[derive(Debug, Clone)]
pub enum Indicator {
    Body { content: String, score: u32 },
    Header { content: String, score: u32 },
    Endpoint { path: String, status: u16, score: u32 },
    Meta { content: String, score: u32 },
}

impl Indicator {
    pub fn score(&self) -> u32 {
        match self {
            Indicator::Body { score, .. }
            | Indicator::Header { score, .. }
            | Indicator::Endpoint { score, .. }
            | Indicator::Meta { score, .. } => *score,
        }
    }

    fn describe(&self) -> String {
        match self {
            Indicator::Body { content, .. } => format!("body: {content}"),
            Indicator::Header { content, .. } => format!("header: {content}"),
            Indicator::Endpoint { path, status, .. } => format!("endpoint: {path} ({status})"),
            Indicator::Meta { content, .. } => format!("meta: {content}"),
        }
    }

    fn matches(&self, artifact: &HttpArtifact) -> bool {
        let body = artifact.snippet().to_ascii_lowercase();
        match self {
            Indicator::Body { content, .. } => body.contains(content),
            Indicator::Header { content, .. } => artifact
                .headers
                .iter()
                .any(|(k, v)| format!("{k}: {v}").to_ascii_lowercase().contains(content)),
            Indicator::Endpoint { path, status, .. } => {
                artifact.status_code == Some(*status)
                    && artifact.path().ends_with(path.trim_end_matches('/'))
            }
            Indicator::Meta { content, .. } => {
                body.contains("<meta") && body.contains("content=") && body.contains(content)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CmsRule {
    pub name: String,
    pub indicators: Vec<Indicator>,
}

/// Parse a single rule entry. Returns None for anything that is not a
/// `{name, indicators: [...]}` object; bad indicators inside an otherwise
/// valid rule are skipped individually.
pub fn parse_rule(value: &Value) -> Option<CmsRule> {
    let obj = value.as_object()?;
    let name = obj.get("name")?.as_str()?.trim().to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    let indicators: Vec<Indicator> = obj
        .get("indicators")?
        .as_array()?
        .iter()
        .filter_map(parse_indicator)
        .collect();
    if indicators.is_empty() {
        return None;
    }
    Some(CmsRule { name, indicators })
}

fn parse_indicator(value: &Value) -> Option<Indicator> {
    let obj = value.as_object()?;
    let kind = obj.get("type")?.as_str()?;
    let score = obj.get("score").and_then(Value::as_u64).unwrap_or(1) as u32;
    let content = || {
        obj.get("content")
            .and_then(Value::as_str)
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
    };
    match kind {
        "body" => Some(Indicator::Body { content: content()?, score }),
        "header" => Some(Indicator::Header { content: content()?, score }),
        "meta" => Some(Indicator::Meta { content: content()?, score }),
        "endpoint" => {
            let path = obj
                .get("path")
                .and_then(Value::as_str)
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())?;
            let status = obj.get("status").and_then(Value::as_u64).unwrap_or(200) as u16;
            Some(Indicator::Endpoint { path, status, score })
        }
        _ => None,
    }
}

/// Score every rule against every HTTP artifact; the best cumulative score
/// decides the CMS and its confidence.
pub fn detect_cms(target: &Target, http: &[HttpArtifact], rules: &[CmsRule]) -> CmsArtifact {
    let t0 = Instant::now();
    let mut scores: BTreeMap<&str, u32> = BTreeMap::new();
    let mut evidence: Vec<String> = Vec::new();

    for artifact in http {
        for rule in rules {
            for indicator in &rule.indicators {
                if indicator.matches(artifact) {
                    *scores.entry(rule.name.as_str()).or_insert(0) += indicator.score();
                    let desc = indicator.describe();
                    if !evidence.contains(&desc) {
                        evidence.push(desc);
                    }
                }
            }
        }
    }

    let mut artifact = CmsArtifact {
        cms_id: new_id(),
        target_id: target.target_id.clone(),
        detected_cms: "unknown".to_string(),
        version: None,
        confidence: Confidence::Low,
        evidence: Vec::new(),
        timings_ms: TimingsMs::default(),
    };

    if let Some((name, best)) = scores.iter().max_by_key(|(_, s)| **s) {
        if *best >= 3 {
            artifact.detected_cms = name.to_string();
            artifact.confidence = Confidence::High;
        } else if *best >= 1 {
            artifact.detected_cms = name.to_string();
            artifact.confidence = Confidence::Medium;
        }
    }
    if artifact.detected_cms != "unknown" {
        artifact.version = generator_version(&artifact.detected_cms, http);
    }
    evidence.sort();
    artifact.evidence = evidence;
    artifact.timings_ms = TimingsMs::total(t0.elapsed().as_millis() as u64);
    artifact
}

/// Version from a generator meta tag, e.g. `content="WordPress 6.1"`.
fn generator_version(name: &str, http: &[HttpArtifact]) -> Option<String> {
    let re = Regex::new(&format!(
        r#"(?i)content="{}\s+([0-9][0-9.]*)""#,
        regex::escape(name)
    ))
    .ok()?;
    http.iter()
        .find_map(|a| re.captures(a.snippet()).map(|cap| cap[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> Target {
        Target {
            target_id: "t1".to_string(),
            input: "https://example.com".to_string(),
            canonical_url: "https://example.com/".to_string(),
            host: "example.com".to_string(),
            scheme: "https".to_string(),
            port: 443,
            resolved_ips: vec!["93.184.216.34".to_string()],
            ports: vec![443],
        }
    }

    fn artifact(url: &str, status: u16, body: &str) -> HttpArtifact {
        let t = target();
        let mut a = HttpArtifact::for_request(&t, url, "probe");
        a.status_code = Some(status);
        a.response_analysis_snippet = Some(body.to_string());
        a
    }

    fn wordpress_rule() -> CmsRule {
        parse_rule(&json!({
            "name": "WordPress",
            "indicators": [
                {"type": "endpoint", "path": "/wp-login.php", "score": 2},
                {"type": "body", "content": "/wp-content/", "score": 1},
                {"type": "meta", "content": "wordpress", "score": 2}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn malformed_rules_are_skipped() {
        assert!(parse_rule(&json!("not a rule")).is_none());
        assert!(parse_rule(&json!({"indicators": []})).is_none());
        assert!(parse_rule(&json!({"name": "x", "indicators": "nope"})).is_none());
        // bad indicators dropped, good one kept
        let rule = parse_rule(&json!({
            "name": "x",
            "indicators": [null, 42, {"type": "body"}, {"type": "body", "content": "hit"}]
        }))
        .unwrap();
        assert_eq!(rule.indicators.len(), 1);
    }

    #[test]
    fn scores_accumulate_to_high_confidence() {
        let rules = vec![wordpress_rule()];
        let http = vec![
            artifact("https://example.com/", 200, "<html><meta name=\"generator\" content=\"WordPress 6.1\"> <a href=\"/wp-content/x.css\">"),
            artifact("https://example.com/wp-login.php", 200, "login"),
        ];
        let cms = detect_cms(&target(), &http, &rules);
        assert_eq!(cms.detected_cms, "wordpress");
        assert_eq!(cms.confidence, Confidence::High);
        assert_eq!(cms.version.as_deref(), Some("6.1"));
        assert!(!cms.evidence.is_empty());
    }

    #[test]
    fn single_weak_hit_is_medium() {
        let rules = vec![wordpress_rule()];
        let http = vec![artifact("https://example.com/", 200, "see /wp-content/ assets")];
        let cms = detect_cms(&target(), &http, &rules);
        assert_eq!(cms.detected_cms, "wordpress");
        assert_eq!(cms.confidence, Confidence::Medium);
    }

    #[test]
    fn no_hits_means_unknown() {
        let rules = vec![wordpress_rule()];
        let http = vec![artifact("https://example.com/", 200, "plain site")];
        let cms = detect_cms(&target(), &http, &rules);
        assert_eq!(cms.detected_cms, "unknown");
        assert_eq!(cms.confidence, Confidence::Low);
    }

    #[test]
    fn endpoint_requires_matching_status() {
        let rules = vec![wordpress_rule()];
        let http = vec![artifact("https://example.com/wp-login.php", 404, "")];
        let cms = detect_cms(&target(), &http, &rules);
        assert_eq!(cms.detected_cms, "unknown");
    }
}
