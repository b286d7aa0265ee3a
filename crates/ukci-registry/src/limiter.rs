//! Sliding-window rate limiter shared by every registry caller in the process.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::RegistryError;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Test clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_calls: usize,
    pub window: Duration,
    /// Pause applied to every caller after the registry answers 429.
    pub cooldown: Duration,
    /// Longest a single request may spend waiting for capacity.
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 600,
            window: Duration::from_secs(300),
            cooldown: Duration::from_secs(60),
            max_wait: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Default)]
struct WindowState {
    calls: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
}

#[derive(Debug)]
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<WindowState>,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: RateLimitConfig {
                max_calls: config.max_calls.max(1),
                ..config
            },
            clock,
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Records a call if the window has room, otherwise returns how long to wait.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(until) = state.cooldown_until {
            if until > now {
                return Err(until - now);
            }
            state.cooldown_until = None;
        }

        while let Some(oldest) = state.calls.front() {
            if now.duration_since(*oldest) >= self.config.window {
                state.calls.pop_front();
            } else {
                break;
            }
        }

        if state.calls.len() < self.config.max_calls {
            state.calls.push_back(now);
            return Ok(());
        }

        let oldest = state.calls.front().copied().unwrap_or(now);
        Err(self.config.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Waits until a call slot is free, giving up once `budget` has been spent waiting.
    pub async fn acquire(&self, budget: Duration) -> Result<Duration, RegistryError> {
        let mut waited = Duration::ZERO;
        loop {
            match self.try_acquire() {
                Ok(()) => return Ok(waited),
                Err(wait) => {
                    let wait = wait.max(Duration::from_millis(10));
                    if waited + wait > budget {
                        return Err(RegistryError::RateLimited { waited });
                    }
                    warn!(
                        wait_ms = wait.as_millis() as u64,
                        in_window = self.in_window(),
                        "registry rate limit reached, waiting for capacity"
                    );
                    tokio::time::sleep(wait).await;
                    waited += wait;
                }
            }
        }
    }

    /// Blocks all callers for the configured cool-down after an upstream 429.
    pub fn back_off(&self) {
        let until = self.clock.now() + self.config.cooldown;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cooldown_until = Some(state.cooldown_until.map_or(until, |cur| cur.max(until)));
    }

    pub fn in_window(&self) -> usize {
        let now = self.clock.now();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .calls
            .iter()
            .filter(|t| now.duration_since(**t) < self.config.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_calls: usize, window_secs: u64) -> (Arc<ManualClock>, SlidingWindowLimiter) {
        let clock = Arc::new(ManualClock::new());
        let limiter = SlidingWindowLimiter::with_clock(
            RateLimitConfig {
                max_calls,
                window: Duration::from_secs(window_secs),
                cooldown: Duration::from_secs(60),
                max_wait: Duration::from_secs(600),
            },
            clock.clone(),
        );
        (clock, limiter)
    }

    #[test]
    fn full_window_reports_time_until_oldest_call_expires() {
        let (clock, limiter) = limiter(3, 300);
        assert!(limiter.try_acquire().is_ok());
        clock.advance(Duration::from_secs(100));
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());

        assert_eq!(limiter.try_acquire(), Err(Duration::from_secs(200)));

        clock.advance(Duration::from_secs(200));
        assert!(limiter.try_acquire().is_ok());
        assert_eq!(limiter.in_window(), 3);
    }

    #[test]
    fn back_off_blocks_every_caller_until_cooldown_ends() {
        let (clock, limiter) = limiter(10, 300);
        limiter.back_off();
        assert_eq!(limiter.try_acquire(), Err(Duration::from_secs(60)));
        clock.advance(Duration::from_secs(45));
        assert_eq!(limiter.try_acquire(), Err(Duration::from_secs(15)));
        clock.advance(Duration::from_secs(15));
        assert!(limiter.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn acquire_gives_up_when_wait_exceeds_budget() {
        let (_clock, limiter) = limiter(1, 300);
        assert!(limiter.try_acquire().is_ok());
        let err = limiter
            .acquire(Duration::from_secs(5))
            .await
            .expect_err("window is full for 300s");
        assert!(matches!(err, RegistryError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn shared_limiter_counts_calls_across_tasks() {
        let (_clock, limiter) = limiter(5, 300);
        let limiter = Arc::new(limiter);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.try_acquire().is_ok() }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.expect("join") {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
    }
}
