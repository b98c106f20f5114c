use std::net::IpAddr;
use std::time::Duration as StdDuration;

use chrono::DateTime;
use chrono::Utc;
use dashmap::DashMap;

/// Per-process, per-IP fixed-window limiter guarding the demo endpoint
/// (§6). Note (§9 Open Questions): under multi-replica deployment this
/// becomes per-replica, since the counters live in process memory rather
/// than a shared store — acceptable for a demo surface, called out here
/// rather than silently assumed.
pub struct DemoRateLimiter {
    window: chrono::Duration,
    max_per_window: u32,
    counters: DashMap<IpAddr, (u32, DateTime<Utc>)>,
}

impl DemoRateLimiter {
    pub fn new(
        max_per_window: u32,
        window: StdDuration,
    ) -> Self {
        Self { window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::minutes(1)), max_per_window, counters: DashMap::new() }
    }

    /// Returns `true` if `ip` is still within its quota for the current
    /// window, incrementing the count as a side effect.
    pub fn allow(
        &self,
        ip: IpAddr,
    ) -> bool {
        let now = Utc::now();
        let mut entry = self.counters.entry(ip).or_insert((0, now));
        if now - entry.1 >= self.window {
            *entry = (0, now);
        }
        if entry.0 >= self.max_per_window {
            return false;
        }
        entry.0 += 1;
        true
    }
}
