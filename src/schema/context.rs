use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::finding::Finding;
use super::types::{CmsArtifact, DnsArtifact, HttpArtifact, Signal, Target, TlsArtifact};

/// Structured per-component failure recorded by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanError {
    pub component: String,
    pub error_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-scan mutable aggregate. Everything a collector or playbook produces
/// ends up here; `signals` and `findings` are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanContext {
    pub run_id: String,
    pub target: Target,
    pub started_at: DateTime<Utc>,
    pub dns: Option<DnsArtifact>,
    pub tls: Option<TlsArtifact>,
    pub http: Vec<HttpArtifact>,
    pub cms: Option<CmsArtifact>,
    pub signals: Vec<Signal>,
    pub findings: Vec<Finding>,
    pub errors: Vec<ScanError>,
    pub metadata: Value,
}

impl ScanContext {
    pub fn new(target: Target) -> Self {
        ScanContext {
            run_id: super::new_id(),
            target,
            started_at: Utc::now(),
            dns: None,
            tls: None,
            http: Vec::new(),
            cms: None,
            signals: Vec::new(),
            findings: Vec::new(),
            errors: Vec::new(),
            metadata: Value::Null,
        }
    }

    pub fn add_error(&mut self, component: &str, error_type: &str, message: impl Into<String>) {
        self.errors.push(ScanError {
            component: component.to_string(),
            error_type: error_type.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// The canonical-root request; always `http[0]` when present.
    pub fn baseline(&self) -> Option<&HttpArtifact> {
        self.http
            .iter()
            .find(|a| a.tags.iter().any(|t| t == "baseline"))
            .or_else(|| self.http.first())
    }
}
