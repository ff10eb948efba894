//! Overflow policy and delivery accounting for the sink channel.
//!
//! The sink runs behind a bounded channel. When the writer cannot keep up,
//! the producer either waits for space ([`OverflowPolicy::Block`], which
//! slows the capture path down) or drops the event and counts it
//! ([`OverflowPolicy::DropNewest`]). Either way [`SinkStats`] records what
//! happened so losses stay observable.
//!
//! # Configuration
//!
//! - `overflow`: `block` (default) or `drop_newest`
//! - `channel_capacity`: bound of the sink channel (default: 1024)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// What to do with an event when the sink channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for channel space; backpressure reaches the capture side.
    #[default]
    Block,
    /// Drop the new event and count it.
    DropNewest,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
}

/// Shared delivery counters.
///
/// Clones share the same counters, so the producer handle and the writer
/// task can both update them without locking.
#[derive(Debug, Clone, Default)]
pub struct SinkStats {
    inner: Arc<Counters>,
}

/// Point-in-time copy of [`SinkStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Events queued for the writer.
    pub accepted: u64,
    /// Events dropped because the channel was full.
    pub dropped: u64,
    /// Events written out by the writer task.
    pub written: u64,
}

impl SinkStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_accepted(&self) {
        self.inner.accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dropped(&self) -> u64 {
        self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub(crate) fn record_written(&self, count: u64) {
        self.inner.written.fetch_add(count, Ordering::Release);
    }

    /// Events queued for the writer so far.
    #[inline]
    pub fn accepted(&self) -> u64 {
        self.inner.accepted.load(Ordering::Relaxed)
    }

    /// Events dropped so far.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Events written so far.
    #[inline]
    pub fn written(&self) -> u64 {
        self.inner.written.load(Ordering::Acquire)
    }

    /// Events accepted but not yet written.
    #[inline]
    pub fn pending(&self) -> u64 {
        self.accepted().saturating_sub(self.written())
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted(),
            dropped: self.dropped(),
            written: self.written(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_default_is_block() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::Block);
    }

    #[test]
    fn test_policy_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            overflow: OverflowPolicy,
        }

        let w: Wrapper = toml::from_str("overflow = \"drop_newest\"").unwrap();
        assert_eq!(w.overflow, OverflowPolicy::DropNewest);
    }

    #[test]
    fn test_counters() {
        let stats = SinkStats::new();

        stats.record_accepted();
        stats.record_accepted();
        stats.record_accepted();
        assert_eq!(stats.record_dropped(), 1);
        stats.record_written(2);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                accepted: 3,
                dropped: 1,
                written: 2
            }
        );
        assert_eq!(stats.pending(), 1);
    }

    #[test]
    fn test_clone_shares_state() {
        let stats1 = SinkStats::new();
        let stats2 = stats1.clone();

        stats1.record_accepted();
        assert_eq!(stats2.accepted(), 1);

        stats2.record_dropped();
        assert_eq!(stats1.dropped(), 1);
    }

    #[test]
    fn test_pending_never_underflows() {
        let stats = SinkStats::new();
        stats.record_written(5);
        assert_eq!(stats.pending(), 0);
    }
}
