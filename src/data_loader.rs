use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::scanner::cms::{parse_rule, CmsRule};

/// Version bound for a WordPress CVE entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AffectedVersions {
    pub operator: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WpCve {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub affected_versions: AffectedVersions,
}

/// Everything the engine loads from disk at startup. Missing files degrade
/// to empty collections; malformed entries are skipped.
#[derive(Debug, Clone, Default)]
pub struct RuleData {
    pub probes: Vec<String>,
    pub cms_rules: Vec<CmsRule>,
    pub wp_cves: Vec<WpCve>,
}

pub const DEFAULT_PROBES: &[&str] = &[
    "/robots.txt",
    "/sitemap.xml",
    "/wp-login.php",
    "/xmlrpc.php",
];

impl RuleData {
    pub fn load(dir: &Path) -> Self {
        let mut data = RuleData {
            probes: load_string_list(&dir.join("probes.json")),
            cms_rules: load_cms_rules(&dir.join("cms_rules.json")),
            wp_cves: load_wp_cves(&dir.join("wp_cves.json")),
        };
        if data.probes.is_empty() {
            data.probes = DEFAULT_PROBES.iter().map(|s| s.to_string()).collect();
        }
        tracing::info!(
            probes = data.probes.len(),
            cms_rules = data.cms_rules.len(),
            wp_cves = data.wp_cves.len(),
            "rule data loaded"
        );
        data
    }
}

fn read_json_array(path: &Path) -> Vec<Value> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        tracing::debug!(path = %path.display(), "data file not found, using defaults");
        return Vec::new();
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            tracing::warn!(path = %path.display(), "expected a JSON array");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "invalid JSON");
            Vec::new()
        }
    }
}

fn load_string_list(path: &Path) -> Vec<String> {
    read_json_array(path)
        .into_iter()
        .filter_map(|v| {
            v.as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .collect()
}

fn load_cms_rules(path: &Path) -> Vec<CmsRule> {
    let items = read_json_array(path);
    let total = items.len();
    let rules: Vec<CmsRule> = items.iter().filter_map(parse_rule).collect();
    if rules.len() < total {
        tracing::debug!(skipped = total - rules.len(), "skipped malformed CMS rule entries");
    }
    rules
}

fn load_wp_cves(path: &Path) -> Vec<WpCve> {
    read_json_array(path)
        .into_iter()
        .filter_map(|v| serde_json::from_value::<WpCve>(v).ok())
        .collect()
}
