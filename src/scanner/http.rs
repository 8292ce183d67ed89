use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use rand::Rng;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SNIPPET_MAX_CHARS};
use crate::http_client::build_scan_client;
use crate::scanner::stealth::{pick_profile, StealthScheduler};
use crate::schema::{HttpArtifact, Target, TimingsMs};

const RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];

pub fn build_url(target: &Target, path: &str) -> String {
    let base = target.canonical_url.trim_end_matches('/');
    if path.is_empty() || path == "/" {
        format!("{base}/")
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Drain a byte stream into a buffer, stopping at `cap` bytes. Returns the
/// captured bytes and whether the body was cut short.
pub async fn read_capped<S, E>(mut stream: S, cap: usize) -> Result<(Vec<u8>, bool), E>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    let mut buf: Vec<u8> = Vec::new();
    let mut truncated = false;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > cap {
            let room = cap - buf.len();
            buf.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, truncated))
}

/// Seconds to sleep before retry attempt `attempt` (1-based). An explicit
/// numeric `Retry-After` wins over exponential backoff.
pub fn retry_delay(attempt: u32, retry_after: Option<u64>, backoff_factor: f64) -> Duration {
    match retry_after {
        Some(secs) => Duration::from_secs(secs),
        None => Duration::from_secs_f64(backoff_factor.powi(attempt as i32)),
    }
}

/// Shared per-scan prober: one reqwest client (connection pool + TLS session
/// cache), one injected stealth-scheduler handle.
#[derive(Clone)]
pub struct HttpProber {
    client: Client,
    scheduler: Arc<StealthScheduler>,
    config: Arc<Config>,
}

impl HttpProber {
    pub fn new(config: Arc<Config>, scheduler: Arc<StealthScheduler>) -> Result<Self> {
        Ok(HttpProber {
            client: build_scan_client(&config)?,
            scheduler,
            config,
        })
    }

    /// Single GET against the canonical root, tagged `baseline`. Not gated
    /// by the probe semaphore.
    pub async fn fetch_baseline(&self, target: &Target, cancel: &CancellationToken) -> HttpArtifact {
        self.fetch_one(target, "/", "baseline", None, cancel).await
    }

    /// One GET per path, bounded by `semaphore`, returned in input order.
    /// Task crashes become synthetic error artifacts instead of propagating.
    pub async fn probe_paths(
        &self,
        target: &Target,
        paths: &[String],
        semaphore: Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> Vec<HttpArtifact> {
        let mut handles = Vec::with_capacity(paths.len());
        for path in paths {
            let prober = self.clone();
            let target = target.clone();
            let path = path.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                prober
                    .fetch_one(&target, &path, "probe", Some(semaphore), &cancel)
                    .await
            }));
        }

        let mut artifacts = Vec::with_capacity(paths.len());
        for (handle, path) in handles.into_iter().zip(paths) {
            match handle.await {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => {
                    let url = build_url(target, path);
                    artifacts.push(HttpArtifact::failed(
                        target,
                        &url,
                        "probe",
                        format!("probe_crash: {e}"),
                    ));
                }
            }
        }
        artifacts
    }

    async fn fetch_one(
        &self,
        target: &Target,
        path: &str,
        tag: &str,
        semaphore: Option<Arc<Semaphore>>,
        cancel: &CancellationToken,
    ) -> HttpArtifact {
        let url = build_url(target, path);
        let t0 = Instant::now();
        let mut artifact = HttpArtifact::for_request(target, &url, tag);

        // Reservation first, then wait for a concurrency slot.
        if self.scheduler.wait_for_slot(cancel).await.is_err() {
            artifact.error = Some("cancelled".to_string());
            artifact.timings_ms = TimingsMs::total(t0.elapsed().as_millis() as u64);
            return artifact;
        }
        let _permit = match semaphore {
            Some(sem) => match sem.acquire_owned().await {
                Ok(p) => Some(p),
                Err(_) => {
                    artifact.error = Some("semaphore_closed".to_string());
                    artifact.timings_ms = TimingsMs::total(t0.elapsed().as_millis() as u64);
                    return artifact;
                }
            },
            None => None,
        };

        let mut attempt: u32 = 0;
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err("cancelled".to_string()),
                r = self.execute(&url, &mut artifact) => r,
            };
            match outcome {
                Ok(retry_after) => {
                    let status = artifact.status_code.unwrap_or(0);
                    let retryable = RETRYABLE_STATUSES.contains(&status);
                    if retryable && attempt < self.config.max_retries {
                        attempt += 1;
                        let delay = retry_delay(attempt, retry_after, self.config.backoff_factor);
                        tracing::debug!(url, status, attempt, delay_s = delay.as_secs_f64(), "retrying");
                        if sleep_cancellable(delay, cancel).await.is_err() {
                            artifact.error = Some("cancelled".to_string());
                            break;
                        }
                        continue;
                    }
                    break;
                }
                Err(msg) => {
                    if msg == "cancelled" {
                        artifact.error = Some(msg);
                        break;
                    }
                    if attempt < self.config.max_retries {
                        attempt += 1;
                        let delay = retry_delay(attempt, None, self.config.backoff_factor);
                        tracing::debug!(url, error = %msg, attempt, "transport error, retrying");
                        if sleep_cancellable(delay, cancel).await.is_err() {
                            artifact.error = Some("cancelled".to_string());
                            break;
                        }
                        continue;
                    }
                    artifact.error = Some(msg);
                    break;
                }
            }
        }

        artifact.timings_ms = TimingsMs::total(t0.elapsed().as_millis() as u64);
        artifact
    }

    /// One request/response exchange. Returns the parsed `Retry-After`
    /// value, or a transport error message.
    async fn execute(&self, url: &str, artifact: &mut HttpArtifact) -> Result<Option<u64>, String> {
        let profile = pick_profile();
        let user_agent = if self.config.user_agent_pool.is_empty() {
            profile.user_agent.to_string()
        } else {
            let idx = rand::thread_rng().gen_range(0..self.config.user_agent_pool.len());
            self.config.user_agent_pool[idx].clone()
        };

        let response = self
            .client
            .get(url)
            .header("user-agent", user_agent)
            .header("accept", profile.accept)
            .header("accept-language", profile.accept_language)
            .send()
            .await
            .map_err(|e| format!("request_failed: {e}"))?;

        artifact.status_code = Some(response.status().as_u16());
        artifact.effective_url = response.url().to_string();
        if let Some(addr) = response.remote_addr() {
            artifact.ip = addr.ip().to_string();
        }
        artifact.headers.clear();
        for (name, value) in response.headers() {
            let key = name.as_str().to_ascii_lowercase();
            let value = value.to_str().unwrap_or_default().trim().to_string();
            artifact
                .headers
                .entry(key)
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        let retry_after = artifact.header("retry-after").and_then(|v| v.trim().parse().ok());

        let (body, truncated) = read_capped(
            response.bytes_stream(),
            self.config.response_raw_max_bytes,
        )
        .await
        .map_err(|e| format!("body_read_failed: {e}"))?;
        artifact.response_truncated = truncated;
        artifact.response_hash = Some(format!("sha256:{:x}", Sha256::digest(&body)));
        let text = String::from_utf8_lossy(&body);
        artifact.response_analysis_snippet = Some(text.chars().take(SNIPPET_MAX_CHARS).collect());

        Ok(retry_after)
    }
}

async fn sleep_cancellable(delay: Duration, cancel: &CancellationToken) -> Result<(), ()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(()),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
