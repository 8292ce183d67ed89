use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Browser-shaped header set sent with each request. One profile is picked
/// uniformly at random per request.
pub struct StealthProfile {
    pub user_agent: &'static str,
    pub accept: &'static str,
    pub accept_language: &'static str,
}

pub static STEALTH_PROFILES: &[StealthProfile] = &[
    StealthProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
    },
    StealthProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.5",
    },
    StealthProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
    },
    StealthProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
    },
    StealthProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
    },
    StealthProfile {
        user_agent: "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.5",
    },
];

pub fn pick_profile() -> &'static StealthProfile {
    let idx = rand::thread_rng().gen_range(0..STEALTH_PROFILES.len());
    &STEALTH_PROFILES[idx]
}

#[derive(Debug)]
pub struct Cancelled;

/// Process-wide reservation point enforcing a minimum inter-start interval
/// between outbound requests, across every scan running in this process.
///
/// The lock region only computes the slot; the sleep happens outside it so
/// waiting tasks never hold the reservation mutex.
pub struct StealthScheduler {
    last_reserved: Mutex<Option<Instant>>,
    min_interval: Duration,
    jitter: Option<(f64, f64)>,
}

static GLOBAL_SCHEDULER: OnceCell<Arc<StealthScheduler>> = OnceCell::new();

impl StealthScheduler {
    pub fn new(min_interval: Duration, jitter: Option<(f64, f64)>) -> Self {
        StealthScheduler {
            last_reserved: Mutex::new(None),
            min_interval,
            jitter,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let jitter = cfg.enable_jitter.then_some(cfg.jitter_range);
        StealthScheduler::new(Duration::from_secs_f64(cfg.global_rate_limit), jitter)
    }

    /// The process-global scheduler. First caller's config wins; later scans
    /// share the same reservation state.
    pub fn global(cfg: &Config) -> Arc<StealthScheduler> {
        GLOBAL_SCHEDULER
            .get_or_init(|| Arc::new(StealthScheduler::from_config(cfg)))
            .clone()
    }

    /// Reserve the next start slot and return how long the caller must wait.
    /// The first reservation in a quiet process starts immediately; every
    /// later slot is `max(now, last_reserved + min_interval)`.
    fn reserve(&self) -> Duration {
        let mut last = self.last_reserved.lock();
        let now = Instant::now();
        let slot = match *last {
            None => now,
            Some(prev) => {
                let next = prev + self.min_interval;
                if next > now {
                    next
                } else {
                    now
                }
            }
        };
        *last = Some(slot);
        slot.saturating_duration_since(now)
    }

    fn sample_jitter(&self) -> Duration {
        match self.jitter {
            Some((lo, hi)) if hi > 0.0 => {
                let secs = rand::thread_rng().gen_range(lo..=hi);
                Duration::from_secs_f64(secs.max(0.0))
            }
            _ => Duration::ZERO,
        }
    }

    /// Reserve a slot, then sleep until it arrives (plus jitter). Cancellable.
    pub async fn wait_for_slot(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let wait = self.reserve() + self.sample_jitter();
        if wait.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}
