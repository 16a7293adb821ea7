//! Engine clock.
//!
//! Timestamps are milliseconds since the Unix epoch, anchored once per process
//! and advanced with a monotonic [`Instant`], so they never go backwards and
//! are never `0` (which the engine reserves for "not reached yet").

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

struct Anchor {
    wall_ms: u64,
    instant: Instant,
}

static ANCHOR: OnceLock<Anchor> = OnceLock::new();

/// Current engine time in milliseconds since the Unix epoch (monotonic, never `0`).
pub fn now_ms() -> u64 {
    let anchor = ANCHOR.get_or_init(|| Anchor {
        wall_ms: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(1, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        instant: Instant::now(),
    });
    let elapsed = u64::try_from(anchor.instant.elapsed().as_millis()).unwrap_or(u64::MAX);
    anchor.wall_ms.saturating_add(elapsed).max(1)
}
