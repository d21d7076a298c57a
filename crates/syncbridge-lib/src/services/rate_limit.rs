// Webhook Rate Limiting
// Fixed one-minute window counters keyed by webhook id

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Window length in seconds
pub const DEFAULT_WINDOW_SECS: u64 = 60;

#[derive(Debug, Clone, Copy)]
struct Window {
    start: u64,
    count: u64,
}

/// Per-key fixed window limiter.
///
/// Each key gets its own window; the limit is passed per call because every
/// webhook carries its own `rate_limit_per_minute`.
#[derive(Debug)]
pub struct RateLimiter {
    window_secs: u64,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs: window_secs.max(1),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check if a request for `key` is allowed and count it
    pub fn check_and_increment(&self, key: &str, max_requests: u32) -> Result<(), String> {
        self.check_at(key, max_requests, unix_now())
    }

    fn check_at(&self, key: &str, max_requests: u32, now: u64) -> Result<(), String> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| "Rate limiter state poisoned".to_string())?;

        let window = windows.entry(key.to_string()).or_insert(Window {
            start: now,
            count: 0,
        });

        // Reset window if expired
        if now.saturating_sub(window.start) >= self.window_secs {
            window.start = now;
            window.count = 0;
        }

        if window.count >= u64::from(max_requests) {
            return Err(format!(
                "Rate limit exceeded: {} requests per {} seconds",
                max_requests, self.window_secs
            ));
        }

        window.count += 1;
        Ok(())
    }

    /// Drop the window of a deleted webhook
    pub fn forget(&self, key: &str) {
        if let Ok(mut windows) = self.windows.lock() {
            windows.remove(key);
        }
    }

    #[cfg(test)]
    fn current_count(&self, key: &str) -> u64 {
        self.windows
            .lock()
            .ok()
            .and_then(|w| w.get(key).map(|w| w.count))
            .unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
