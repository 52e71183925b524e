// ABOUTME: Fixed-window request limiter keyed by user id.
// ABOUTME: Expired windows are dropped by an explicit sweep driven from a tokio interval task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<u64, Window>>,
}

impl RateLimiter {
    /// `max_requests` of 0 turns limiting off
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Window>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count one request from `user_id` if the window has room
    pub fn check(&self, user_id: u64) -> RateDecision {
        if !self.is_enabled() {
            return RateDecision::Allowed {
                remaining: u32::MAX,
            };
        }

        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows.entry(user_id).or_insert(Window {
            start: now,
            count: 0,
        });

        if now.duration_since(window.start) >= self.window {
            *window = Window {
                start: now,
                count: 0,
            };
        }

        if window.count >= self.max_requests {
            let retry_after = self.window.saturating_sub(now.duration_since(window.start));
            tracing::debug!(user_id, retry_after_secs = retry_after.as_secs(), "Rate limited");
            return RateDecision::Limited { retry_after };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - window.count,
        }
    }

    /// Requests left in the current window without counting one
    pub fn remaining(&self, user_id: u64) -> u32 {
        if !self.is_enabled() {
            return u32::MAX;
        }
        let now = Instant::now();
        match self.lock().get(&user_id) {
            Some(w) if now.duration_since(w.start) < self.window => {
                self.max_requests.saturating_sub(w.count)
            }
            _ => self.max_requests,
        }
    }

    /// Drop windows that have expired; returns how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.start) < self.window);
        before - windows.len()
    }

    pub fn tracked_users(&self) -> usize {
        self.lock().len()
    }

    /// Sweep on a fixed interval for as long as the limiter is alive
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let removed = limiter.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired rate-limit windows");
                }
            }
        })
    }
}
