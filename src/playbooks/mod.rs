//! Ordered rule modules that correlate signals and artifacts into findings.
//! Each playbook is a pure function over the scan context; a failing
//! playbook is recorded as a scan error and never aborts the run.

pub mod email_auth;
pub mod nonprod_exposure;
pub mod security_headers;
pub mod takeover;
pub mod wordpress;

use crate::data_loader::WpCve;
use crate::schema::{HttpArtifact, ScanContext};

/// Evaluate PB1..PB5 in sequence, appending findings in deterministic order.
pub fn run_playbooks(ctx: &mut ScanContext, cves: &[WpCve]) {
    let results = vec![
        ("pb1_nonprod_exposure", nonprod_exposure::evaluate(ctx)),
        ("pb2_security_headers", security_headers::evaluate(ctx)),
        ("pb3_email_auth", email_auth::evaluate(ctx)),
        ("pb4_takeover", takeover::evaluate(ctx)),
        ("pb5_wordpress", wordpress::evaluate(ctx, cves)),
    ];
    for (component, result) in results {
        match result {
            Ok(findings) => ctx.findings.extend(findings),
            Err(e) => {
                tracing::warn!(component, error = %e, "playbook failed");
                ctx.add_error(component, "PLAYBOOK_FAILED", e.to_string());
            }
        }
    }
}

/// Best artifact whose URL path ends with `suffix`: prefer a 200 response,
/// then one that actually captured a body.
pub(crate) fn find_by_path<'a>(
    http: &'a [HttpArtifact],
    suffix: &str,
) -> Option<&'a HttpArtifact> {
    let suffix = suffix.trim_end_matches('/').to_ascii_lowercase();
    let mut candidates: Vec<&HttpArtifact> = http
        .iter()
        .filter(|a| a.path().ends_with(&suffix))
        .collect();
    candidates.sort_by_key(|a| {
        (
            a.status_code != Some(200),
            a.snippet().is_empty(),
        )
    });
    candidates.first().copied()
}
