//! Per-client throttling for login and password-reset requests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Limits applied to every key
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_attempts: usize,
    /// Attempts older than this no longer count
    pub window: Duration,
    /// How long a key stays blocked once it goes over the limit
    pub ban: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(5 * 60),
            ban: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Default)]
struct Attempts {
    recent: VecDeque<Instant>,
    banned_until: Option<Instant>,
}

impl Attempts {
    fn prune(&mut self, now: Instant, window: Duration) {
        while self
            .recent
            .front()
            .is_some_and(|at| now.duration_since(*at) >= window)
        {
            self.recent.pop_front();
        }
    }

    /// Neither banned nor holding an attempt inside the window
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        self.banned_until.is_none_or(|until| now >= until)
            && self
                .recent
                .back()
                .is_none_or(|at| now.duration_since(*at) >= window)
    }
}

#[derive(Debug)]
struct Keys {
    attempts: HashMap<String, Attempts>,
    last_sweep: Instant,
}

/// Sliding-window limiter keyed by strings such as `login:<ip>`
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    keys: Arc<Mutex<Keys>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            keys: Arc::new(Mutex::new(Keys {
                attempts: HashMap::new(),
                last_sweep: Instant::now(),
            })),
        }
    }

    /// Count an attempt for `key`; `false` means the caller should answer 429
    pub async fn is_allowed(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut keys = self.keys.lock().await;

        // Forget idle clients once per window so the map stays bounded
        if now.duration_since(keys.last_sweep) >= self.config.window {
            let window = self.config.window;
            keys.attempts.retain(|_, attempts| !attempts.is_stale(now, window));
            keys.last_sweep = now;
        }

        let attempts = keys.attempts.entry(key.to_string()).or_default();

        match attempts.banned_until {
            Some(until) if now < until => return false,
            Some(_) => *attempts = Attempts::default(),
            None => {}
        }

        attempts.prune(now, self.config.window);

        if attempts.recent.len() >= self.config.max_attempts {
            attempts.banned_until = Some(now + self.config.ban);
            warn!(
                "Too many attempts for {}, blocking for {}s",
                key,
                self.config.ban.as_secs()
            );
            return false;
        }

        attempts.recent.push_back(now);
        true
    }

    /// Drop all history for `key`, e.g. after a successful login
    pub async fn reset(&self, key: &str) {
        self.keys.lock().await.attempts.remove(key);
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.keys.lock().await.attempts.len()
    }
}
