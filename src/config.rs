use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

/// UTF-8 characters kept for body analysis regardless of the raw byte cap.
pub const SNIPPET_MAX_CHARS: usize = 2048;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Hard per-scan budget, baseline included.
    pub max_http_requests_per_scan: usize,
    /// Scan-scoped semaphore capacity for path probes.
    pub max_concurrent_requests: usize,
    /// Byte cap for streamed response capture.
    pub response_raw_max_bytes: usize,
    pub http_timeout_connect: f64,
    pub http_timeout_read: f64,
    pub http_timeout_write: f64,
    pub http_timeout_pool: f64,
    pub dns_timeout: f64,
    pub tls_timeout: f64,
    /// Minimum inter-start spacing (seconds) across all requests in the process.
    pub global_rate_limit: f64,
    pub enable_jitter: bool,
    pub jitter_range: (f64, f64),
    pub max_retries: u32,
    pub backoff_factor: f64,
    /// Overrides the built-in stealth profile pool when non-empty.
    pub user_agent_pool: Vec<String>,
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_http_requests_per_scan: 50,
            max_concurrent_requests: 5,
            response_raw_max_bytes: 262_144,
            http_timeout_connect: 10.0,
            http_timeout_read: 30.0,
            http_timeout_write: 30.0,
            http_timeout_pool: 5.0,
            dns_timeout: 2.0,
            tls_timeout: 5.0,
            global_rate_limit: 0.5,
            enable_jitter: true,
            jitter_range: (0.05, 0.25),
            max_retries: 2,
            backoff_factor: 1.5,
            user_agent_pool: Vec::new(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let d = Config::default();
        Config {
            max_http_requests_per_scan: env_parse("MAX_HTTP_REQUESTS_PER_SCAN", d.max_http_requests_per_scan),
            max_concurrent_requests: env_parse("MAX_CONCURRENT_REQUESTS", d.max_concurrent_requests),
            response_raw_max_bytes: env_parse("RESPONSE_RAW_MAX_BYTES", d.response_raw_max_bytes),
            http_timeout_connect: env_parse("HTTP_TIMEOUT_CONNECT", d.http_timeout_connect),
            http_timeout_read: env_parse("HTTP_TIMEOUT_READ", d.http_timeout_read),
            http_timeout_write: env_parse("HTTP_TIMEOUT_WRITE", d.http_timeout_write),
            http_timeout_pool: env_parse("HTTP_TIMEOUT_POOL", d.http_timeout_pool),
            dns_timeout: env_parse("DNS_TIMEOUT", d.dns_timeout),
            tls_timeout: env_parse("TLS_TIMEOUT", d.tls_timeout),
            global_rate_limit: env_parse("GLOBAL_RATE_LIMIT", d.global_rate_limit),
            enable_jitter: env_parse("ENABLE_JITTER", d.enable_jitter),
            jitter_range: env_jitter_range("JITTER_RANGE", d.jitter_range),
            max_retries: env_parse("MAX_RETRIES", d.max_retries),
            backoff_factor: env_parse("BACKOFF_FACTOR", d.backoff_factor),
            user_agent_pool: env_list("USER_AGENT_POOL"),
            data_dir: std::env::var("DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// `JITTER_RANGE` is "low,high" in seconds.
fn env_jitter_range(key: &str, default: (f64, f64)) -> (f64, f64) {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    let parts: Vec<f64> = raw
        .split(',')
        .filter_map(|p| p.trim().parse().ok())
        .collect();
    match parts.as_slice() {
        [lo, hi] if lo <= hi => (*lo, *hi),
        _ => default,
    }
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let cfg = Config::default();
        assert_eq!(cfg.max_http_requests_per_scan, 50);
        assert_eq!(cfg.max_concurrent_requests, 5);
        assert_eq!(cfg.response_raw_max_bytes, 262_144);
        assert!(cfg.jitter_range.0 <= cfg.jitter_range.1);
    }

    #[test]
    fn jitter_range_parsing() {
        std::env::set_var("JITTER_RANGE_TEST_KEY", "0.1, 0.4");
        assert_eq!(env_jitter_range("JITTER_RANGE_TEST_KEY", (0.0, 0.0)), (0.1, 0.4));
        std::env::set_var("JITTER_RANGE_TEST_KEY", "garbage");
        assert_eq!(env_jitter_range("JITTER_RANGE_TEST_KEY", (0.0, 0.1)), (0.0, 0.1));
    }
}
