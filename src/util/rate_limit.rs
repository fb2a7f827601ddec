//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Inbound WebSocket frames per second, per connection
pub const FRAME_RATE_LIMIT: u32 = 20;

/// Queue joins and bot match requests per second, per connection
pub const MATCHMAKING_RATE_LIMIT: u32 = 2;

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    frame_limiter: Arc<Limiter>,
    matchmaking_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self {
            frame_limiter: create_limiter(FRAME_RATE_LIMIT),
            matchmaking_limiter: create_limiter(MATCHMAKING_RATE_LIMIT),
        }
    }

    /// Check if an inbound frame is allowed (returns true if allowed)
    pub fn check_frame(&self) -> bool {
        self.frame_limiter.check().is_ok()
    }

    /// Check if a join or practice request is allowed
    pub fn check_matchmaking(&self) -> bool {
        self.matchmaking_limiter.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_beyond_quota_is_rejected() {
        let limiter = ConnectionRateLimiter::new();
        let allowed = (0..FRAME_RATE_LIMIT * 2).filter(|_| limiter.check_frame()).count();
        assert!(allowed >= FRAME_RATE_LIMIT as usize);
        assert!(allowed < (FRAME_RATE_LIMIT * 2) as usize);
    }

    #[test]
    fn test_matchmaking_quota_is_separate() {
        let limiter = ConnectionRateLimiter::new();
        for _ in 0..FRAME_RATE_LIMIT {
            limiter.check_frame();
        }
        assert!(limiter.check_matchmaking());
    }
}
