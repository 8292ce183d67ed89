use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, ClientBuilder};

use crate::config::Config;

/// Build the shared per-scan HTTP client: connection pooling, compression,
/// bounded redirects, and certificate validation disabled so the scan can
/// observe broken deployments instead of rejecting them.
pub fn build_scan_client(cfg: &Config) -> Result<Client> {
    ClientBuilder::new()
        // Connection pooling - reuse connections across baseline and probes
        .pool_max_idle_per_host(cfg.max_concurrent_requests.max(1))
        .pool_idle_timeout(Some(Duration::from_secs_f64(cfg.http_timeout_pool.max(1.0))))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .tcp_nodelay(true)
        // Timeouts
        .timeout(Duration::from_secs_f64(cfg.http_timeout_read))
        .connect_timeout(Duration::from_secs_f64(cfg.http_timeout_connect))
        // Compression
        .gzip(true)
        .brotli(true)
        // TLS
        .use_rustls_tls()
        .tls_sni(true)
        .https_only(false)
        // Redirects; the effective URL after following is recorded per request
        .redirect(reqwest::redirect::Policy::limited(5))
        // Certificate problems are findings, not transport failures
        .danger_accept_invalid_certs(true)
        .build()
        .context("failed to build scan HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_defaults() {
        let cfg = Config::default();
        assert!(build_scan_client(&cfg).is_ok());
    }
}
