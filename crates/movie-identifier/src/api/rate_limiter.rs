//! Request throttling for the TMDb client.
//!
//! Enforces a minimum spacing between requests and a cap on requests within
//! any sliding 60 second window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiter with dual constraints (per-second and per-minute)
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between two requests
    min_interval: Duration,
    /// Maximum requests per minute
    max_per_minute: usize,
    /// Request timestamps inside the current window, oldest first
    recent: VecDeque<Instant>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(max_per_second: f64, max_per_minute: u32) -> Self {
        let min_interval = if max_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / max_per_second)
        } else {
            Duration::ZERO
        };

        Self {
            min_interval,
            max_per_minute: max_per_minute.max(1) as usize,
            recent: VecDeque::with_capacity(max_per_minute as usize),
        }
    }

    /// How long a request issued at `now` has to wait.
    fn delay_at(&mut self, now: Instant) -> Duration {
        while let Some(&oldest) = self.recent.front() {
            if now.duration_since(oldest) >= WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        let mut delay = Duration::ZERO;

        if self.recent.len() >= self.max_per_minute {
            if let Some(&oldest) = self.recent.front() {
                delay = delay.max(WINDOW - now.duration_since(oldest));
            }
        }

        if let Some(&last) = self.recent.back() {
            let elapsed = now.duration_since(last);
            if elapsed < self.min_interval {
                delay = delay.max(self.min_interval - elapsed);
            }
        }

        delay
    }

    /// Wait until a request can be made, then record it
    pub async fn acquire(&mut self) {
        let delay = self.delay_at(Instant::now());
        if !delay.is_zero() {
            tracing::debug!(wait_ms = delay.as_millis() as u64, "Rate limit: waiting");
            sleep(delay).await;
        }
        self.recent.push_back(Instant::now());
    }

    /// Number of requests recorded in the last minute
    pub fn current_minute_count(&mut self) -> usize {
        let now = Instant::now();
        self.recent
            .retain(|&timestamp| now.duration_since(timestamp) < WINDOW);
        self.recent.len()
    }
}
