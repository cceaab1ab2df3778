// src/orchestrator/rate_limit.rs
//! Per-platform token buckets, owned by the orchestrator so limits hold no
//! matter how an adapter is written.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::platform::Platform;

pub type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Default)]
pub struct RateLimiterPool {
    inner: Mutex<HashMap<Platform, (Duration, Arc<DirectLimiter>)>>,
}

impl RateLimiterPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket for a platform refilling one cell per `period` (burst 1).
    /// `None` period means no local limit. A changed period replaces the bucket.
    pub fn limiter_for(&self, platform: Platform, period: Option<Duration>) -> Option<Arc<DirectLimiter>> {
        let period = period?;
        let quota = Quota::with_period(period)?;
        let mut map = self.inner.lock();
        match map.get(&platform) {
            Some((p, l)) if *p == period => Some(Arc::clone(l)),
            _ => {
                let l = Arc::new(RateLimiter::direct(quota));
                map.insert(platform, (period, Arc::clone(&l)));
                Some(l)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RateLimiterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut platforms: Vec<Platform> = self.inner.lock().keys().copied().collect();
        platforms.sort();
        f.debug_struct("RateLimiterPool")
            .field("platforms", &platforms)
            .finish()
    }
}

/// Wait for a cell. Returns `false` when cancelled first; a dropped wait
/// consumes nothing.
pub async fn acquire(limiter: &DirectLimiter, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = limiter.until_ready() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn zero_period_means_unlimited() {
        let pool = RateLimiterPool::new();
        assert!(pool.limiter_for(Platform::Github, None).is_none());
        assert!(pool
            .limiter_for(Platform::Github, Some(Duration::ZERO))
            .is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn same_period_shares_bucket() {
        let pool = RateLimiterPool::new();
        let a = pool.limiter_for(Platform::Reddit, Some(Duration::from_millis(100))).unwrap();
        let b = pool.limiter_for(Platform::Reddit, Some(Duration::from_millis(100))).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = pool.limiter_for(Platform::Reddit, Some(Duration::from_millis(200))).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn second_cell_waits_for_refill() {
        let pool = RateLimiterPool::new();
        let l = pool.limiter_for(Platform::Github, Some(Duration::from_millis(80))).unwrap();
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(acquire(&l, &token).await);
        assert!(acquire(&l, &token).await);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn cancelled_wait_returns_promptly() {
        let pool = RateLimiterPool::new();
        let l = pool.limiter_for(Platform::Github, Some(Duration::from_secs(60))).unwrap();
        let token = CancellationToken::new();
        assert!(acquire(&l, &token).await);
        token.cancel();
        let start = Instant::now();
        assert!(!acquire(&l, &token).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
