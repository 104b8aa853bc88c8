/// CoinGecko API rate limiter - sliding window over the last minute
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    /// Timestamps of requests inside the current window
    request_times: Mutex<VecDeque<Instant>>,
    /// Max requests per window
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            request_times: Mutex::new(VecDeque::new()),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Limiter allowing `max_requests` calls per minute
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Record a request at `now` if the window has room.
    /// Returns zero when recorded, otherwise how long to wait before retrying.
    fn check_and_record(&self, now: Instant) -> Duration {
        let mut times = match self.request_times.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Remove old timestamps outside the window
        while let Some(&front) = times.front() {
            if now.duration_since(front) >= self.window {
                times.pop_front();
            } else {
                break;
            }
        }

        if times.len() >= self.max_requests {
            if let Some(&oldest) = times.front() {
                return self.window.saturating_sub(now.duration_since(oldest));
            }
        }

        times.push_back(now);
        Duration::ZERO
    }

    /// Wait until the window has room, then record the request
    pub async fn acquire(&self) {
        loop {
            let wait = self.check_and_record(Instant::now());
            if wait.is_zero() {
                return;
            }
            tracing::debug!("CoinGecko rate limit: waiting {}ms", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }
}
