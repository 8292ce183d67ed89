use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::ScanError;
use super::finding::Finding;
use super::types::{CmsArtifact, DnsArtifact, HttpArtifact, Signal, Target, TlsArtifact};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

/// Signal-to-noise summary: how much was observed vs. how much was concluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snr {
    pub signals_total: usize,
    pub findings_total: usize,
    pub requests_total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub finding_counts: FindingCounts,
    pub top_findings: Vec<String>,
    pub snr: Snr,
    pub verdict: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeInfo {
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeInfo {
    pub intent: String,
    pub targets: Vec<Target>,
    pub guardrails: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingFingerprint {
    pub finding_id: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaInfo {
    pub delta_ready: bool,
    pub fingerprint_algo: String,
    pub normalization: Value,
    pub target_fingerprint: String,
    pub run_fingerprint: String,
    pub finding_fingerprints: Vec<FindingFingerprint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportArtifacts {
    pub requests: Vec<HttpArtifact>,
    pub tls: Vec<TlsArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cms: Option<CmsArtifact>,
}

/// The single structured output of a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub run_id: String,
    pub engine: EngineInfo,
    pub time: TimeInfo,
    pub operator: OperatorInfo,
    pub scope: ScopeInfo,
    pub summary: ReportSummary,
    pub errors: Vec<ScanError>,
    pub delta: DeltaInfo,
    pub artifacts: ReportArtifacts,
    pub signals: Vec<Signal>,
    pub findings: Vec<Finding>,
}
