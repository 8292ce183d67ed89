use std::time::Instant;

use anyhow::Result;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;

use crate::config::Config;
use crate::schema::{DnsArtifact, Target, TimingsMs};

/// Last two labels of a host name. A deliberate simplification of
/// registrable-domain detection; the artifact carries
/// `registrable_domain_method = "naive"` so consumers can degrade confidence.
pub fn naive_registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.trim_end_matches('.').split('.').collect();
    if labels.len() <= 2 {
        return host.trim_end_matches('.').to_string();
    }
    labels[labels.len() - 2..].join(".")
}

fn has_spf(records: &[String]) -> bool {
    records
        .iter()
        .any(|r| r.trim().to_ascii_lowercase().starts_with("v=spf1"))
}

async fn query_txt(
    resolver: &TokioAsyncResolver,
    name: &str,
    warnings: &mut Vec<String>,
) -> Vec<String> {
    match resolver.txt_lookup(name).await {
        Ok(lookup) => lookup.iter().map(|txt| txt.to_string()).collect(),
        Err(e) => {
            tracing::debug!(name, error = %e, "TXT lookup failed");
            warnings.push(format!("TXT@{name}"));
            Vec::new()
        }
    }
}

/// Collect A/AAAA/MX/NS/TXT/CNAME plus `_dmarc` TXT for the target host.
/// Individual query failures become warnings, never a collection failure.
pub async fn collect_dns(target: &Target, cfg: &Config) -> Result<DnsArtifact> {
    let t0 = Instant::now();
    let mut opts = ResolverOpts::default();
    opts.timeout = std::time::Duration::from_secs_f64(cfg.dns_timeout);
    opts.attempts = 1;
    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

    let mut artifact = DnsArtifact::for_target(target);
    let domain = artifact.domain.clone();

    match resolver.ipv4_lookup(domain.as_str()).await {
        Ok(lookup) => artifact.a = lookup.iter().map(|r| r.to_string()).collect(),
        Err(_) => artifact.warnings.push(format!("A@{domain}")),
    }
    match resolver.ipv6_lookup(domain.as_str()).await {
        Ok(lookup) => artifact.aaaa = lookup.iter().map(|r| r.to_string()).collect(),
        Err(_) => artifact.warnings.push(format!("AAAA@{domain}")),
    }
    match resolver.mx_lookup(domain.as_str()).await {
        Ok(lookup) => {
            artifact.mx = lookup
                .iter()
                .map(|mx| {
                    format!(
                        "{} {}",
                        mx.preference(),
                        mx.exchange().to_string().trim_end_matches('.')
                    )
                })
                .collect();
        }
        Err(_) => artifact.warnings.push(format!("MX@{domain}")),
    }
    match resolver.ns_lookup(domain.as_str()).await {
        Ok(lookup) => {
            artifact.ns = lookup
                .iter()
                .map(|ns| ns.to_string().trim_end_matches('.').to_string())
                .collect();
        }
        Err(_) => artifact.warnings.push(format!("NS@{domain}")),
    }
    artifact.txt = query_txt(&resolver, &domain, &mut artifact.warnings).await;
    artifact.dmarc = query_txt(&resolver, &format!("_dmarc.{domain}"), &mut artifact.warnings).await;
    match resolver.lookup(domain.as_str(), RecordType::CNAME).await {
        Ok(lookup) => {
            artifact.cname = lookup.iter().find_map(|rdata| match rdata {
                RData::CNAME(name) => Some(name.to_string().trim_end_matches('.').to_string()),
                _ => None,
            });
        }
        Err(_) => artifact.warnings.push(format!("CNAME@{domain}")),
    }

    // No SPF at the root host: retry SPF/DMARC one level up at the naive
    // registrable domain, in case the scan target is a subdomain.
    let registrable = naive_registrable_domain(&domain);
    if !has_spf(&artifact.txt) && registrable != domain {
        let fallback_txt = query_txt(&resolver, &registrable, &mut artifact.warnings).await;
        let fallback_dmarc =
            query_txt(&resolver, &format!("_dmarc.{registrable}"), &mut artifact.warnings).await;
        let mut used_fallback = false;
        if has_spf(&fallback_txt) {
            artifact.txt.extend(fallback_txt);
            used_fallback = true;
        }
        if artifact.dmarc.is_empty() && !fallback_dmarc.is_empty() {
            artifact.dmarc = fallback_dmarc;
            used_fallback = true;
        }
        if used_fallback {
            artifact.domain_checked_for_email_auth = registrable;
        }
    }

    artifact.timings_ms = TimingsMs::total(t0.elapsed().as_millis() as u64);
    tracing::debug!(
        domain,
        a = artifact.a.len(),
        txt = artifact.txt.len(),
        warnings = artifact.warnings.len(),
        "DNS collection finished"
    );
    Ok(artifact)
}
