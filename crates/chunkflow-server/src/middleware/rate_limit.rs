//! Rate limiting middleware using tower-governor
//!
//! One token bucket per client IP. The IP is taken from `X-Forwarded-For`,
//! `X-Real-Ip` or `Forwarded` when present, then from the peer address, so the
//! server must be served with connect info.

use anyhow::{anyhow, Result};
use axum::Router;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

use crate::config::RateLimitConfig;

/// Milliseconds between token replenishments for the configured rate
fn replenish_interval_ms(requests_per_second: u64) -> u64 {
    (1000 / requests_per_second.max(1)).max(1)
}

/// Wrap `router` in a rate limiting layer built from configuration
pub fn with_rate_limit(router: Router, config: &RateLimitConfig) -> Result<Router> {
    let governor_conf = GovernorConfigBuilder::default()
        .per_millisecond(replenish_interval_ms(config.requests_per_second))
        .burst_size(config.burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| {
            anyhow!(
                "Invalid rate limit: {} req/s with burst {}",
                config.requests_per_second,
                config.burst_size
            )
        })?;

    Ok(router.layer(GovernorLayer {
        config: Arc::new(governor_conf),
    }))
}
