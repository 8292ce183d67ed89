use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{Confidence, Severity, Target};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingScore {
    pub total: i64,
    pub threshold: i64,
    pub model: String,
}

impl FindingScore {
    pub fn points(total: i64) -> Self {
        FindingScore {
            total,
            threshold: 1,
            model: "points.v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingTargetRef {
    pub target_id: String,
    pub input: String,
    pub canonical_url: String,
}

impl From<&Target> for FindingTargetRef {
    fn from(t: &Target) -> Self {
        FindingTargetRef {
            target_id: t.target_id.clone(),
            input: t.input.clone(),
            canonical_url: t.canonical_url.clone(),
        }
    }
}

/// Pointer from a finding into the scan's artifacts, by id rather than by
/// reference, so the report serializes acyclically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub evidence_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub reference: Value,
    pub snippet: String,
}

impl EvidenceRef {
    pub fn new(kind: &str, reference: Value, snippet: impl Into<String>) -> Self {
        EvidenceRef {
            evidence_id: format!("ev_{}", super::new_id()),
            kind: kind.to_string(),
            reference,
            snippet: snippet.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRef {
    pub signal_id: String,
    pub value: bool,
    pub evidence_refs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
}

impl From<&super::types::Signal> for SignalRef {
    fn from(s: &super::types::Signal) -> Self {
        SignalRef {
            signal_id: s.signal_id.clone(),
            value: s.value,
            evidence_refs: s.evidence_refs.clone(),
            artifact_ref: s.artifact_ref.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reasoning {
    pub why_it_matters: String,
    pub analyst_notes: String,
}

/// Analyst-meaningful conclusion emitted by a playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub schema_version: String,
    pub finding_id: String,
    pub playbook_id: String,
    pub title: String,
    pub summary: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub score: FindingScore,
    pub target: FindingTargetRef,
    pub reasoning: Reasoning,
    pub signals: Vec<SignalRef>,
    pub evidence: Vec<EvidenceRef>,
}

impl Finding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        playbook_id: &str,
        title: impl Into<String>,
        summary: impl Into<String>,
        severity: Severity,
        confidence: Confidence,
        score_total: i64,
        target: &Target,
        why_it_matters: &str,
        analyst_notes: &str,
    ) -> Self {
        Finding {
            schema_version: "finding.v1".to_string(),
            finding_id: super::new_id(),
            playbook_id: playbook_id.to_string(),
            title: title.into(),
            summary: summary.into(),
            severity,
            confidence,
            score: FindingScore::points(score_total),
            target: FindingTargetRef::from(target),
            reasoning: Reasoning {
                why_it_matters: why_it_matters.to_string(),
                analyst_notes: analyst_notes.to_string(),
            },
            signals: Vec::new(),
            evidence: Vec::new(),
        }
    }

    pub fn with_signal(mut self, signal: &super::types::Signal) -> Self {
        self.signals.push(SignalRef::from(signal));
        self
    }

    pub fn with_evidence(mut self, evidence: EvidenceRef) -> Self {
        self.evidence.push(evidence);
        self
    }
}
