use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::data_loader::RuleData;
use crate::playbooks::run_playbooks;
use crate::report::build_report;
use crate::scanner::cms::detect_cms;
use crate::scanner::dns::collect_dns;
use crate::scanner::normalize::{normalize_target, NormalizeError};
use crate::scanner::tls::collect_tls;
use crate::scanner::{HttpProber, StealthScheduler};
use crate::schema::report::RunReport;
use crate::schema::ScanContext;
use crate::signals::extract_signals;

/// Drives the fixed scan DAG. One engine instance serves many scans; the
/// stealth scheduler behind it is shared process-wide.
pub struct ScanEngine {
    config: Arc<Config>,
    data: RuleData,
    scheduler: Arc<StealthScheduler>,
}

impl ScanEngine {
    pub fn new(config: Config) -> Self {
        let data = RuleData::load(&config.data_dir);
        let scheduler = StealthScheduler::global(&config);
        ScanEngine {
            config: Arc::new(config),
            data,
            scheduler,
        }
    }

    pub async fn run(&self, url: &str) -> Result<RunReport, NormalizeError> {
        self.run_with_cancel(url, CancellationToken::new()).await
    }

    /// Normalization failures are fatal and return no report; every other
    /// component failure degrades into the report's `errors` array.
    pub async fn run_with_cancel(
        &self,
        url: &str,
        cancel: CancellationToken,
    ) -> Result<RunReport, NormalizeError> {
        let target = normalize_target(url).await?;
        tracing::info!(host = %target.host, canonical = %target.canonical_url, "scan started");

        let mut ctx = ScanContext::new(target);
        ctx.metadata = json!({
            "limits": {
                "max_requests": self.config.max_http_requests_per_scan,
                "max_bytes": self.config.response_raw_max_bytes,
            }
        });

        // DNS first, isolated: nothing downstream depends on it succeeding.
        match collect_dns(&ctx.target, &self.config).await {
            Ok(artifact) => ctx.dns = Some(artifact),
            Err(e) => ctx.add_error("dns", "DNS_COLLECTION_FAILED", e.to_string()),
        }
        if cancel.is_cancelled() {
            ctx.add_error("dns", "cancelled", "scan cancelled");
            return Ok(self.finish(ctx));
        }

        match HttpProber::new(self.config.clone(), self.scheduler.clone()) {
            Ok(prober) => {
                // TLS and the HTTP baseline are independent; run them together.
                let (tls_artifact, baseline) = tokio::join!(
                    collect_tls(&ctx.target, &self.config),
                    prober.fetch_baseline(&ctx.target, &cancel),
                );
                if let Some(err) = &tls_artifact.error {
                    tracing::debug!(error = %err, "TLS observation failed");
                }
                ctx.tls = Some(tls_artifact);
                let baseline_ok = baseline.error.is_none();
                ctx.http.push(baseline);

                if baseline_ok || !ctx.target.resolved_ips.is_empty() {
                    let budget = self.config.max_http_requests_per_scan.saturating_sub(1);
                    let paths: Vec<String> =
                        self.data.probes.iter().take(budget).cloned().collect();
                    if !paths.is_empty() && !cancel.is_cancelled() {
                        let semaphore =
                            Arc::new(Semaphore::new(self.config.max_concurrent_requests.max(1)));
                        let probed = prober
                            .probe_paths(&ctx.target, &paths, semaphore, &cancel)
                            .await;
                        ctx.http.extend(probed);
                    }
                }
                if cancel.is_cancelled() {
                    ctx.add_error("http", "cancelled", "scan cancelled");
                }
            }
            Err(e) => ctx.add_error("http", "HTTP_BASELINE_FAILED", e.to_string()),
        }

        ctx.cms = Some(detect_cms(&ctx.target, &ctx.http, &self.data.cms_rules));
        ctx.signals = extract_signals(ctx.tls.as_ref(), &ctx.http);
        run_playbooks(&mut ctx, &self.data.wp_cves);

        Ok(self.finish(ctx))
    }

    fn finish(&self, ctx: ScanContext) -> RunReport {
        let finished_at = Utc::now();
        let report = build_report(&ctx, &self.config, finished_at);
        tracing::info!(
            run_id = %report.run_id,
            verdict = %report.summary.verdict,
            findings = report.summary.snr.findings_total,
            requests = report.summary.snr.requests_total,
            errors = report.errors.len(),
            "scan finished"
        );
        report
    }
}
