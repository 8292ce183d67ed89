pub mod context;
pub mod finding;
pub mod report;
pub mod types;

pub use context::{ScanContext, ScanError};
pub use finding::{EvidenceRef, Finding, FindingScore, FindingTargetRef, SignalRef};
pub use report::RunReport;
pub use types::{
    CmsArtifact, Confidence, DnsArtifact, HttpArtifact, Severity, Signal, Target, TimingsMs,
    TlsArtifact,
};

/// Fresh lexicographically sortable, time-ordered identifier.
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}
