//! Bridge traffic counters.
//!
//! Every stage bumps its counters with relaxed atomics; the coordinator
//! takes a snapshot at shutdown and logs it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by the stages.
#[derive(Debug, Default)]
pub struct BridgeStats {
    tun_frames_read: AtomicU64,
    tun_drops: AtomicU64,
    radio_frames_received: AtomicU64,
    radio_drops: AtomicU64,
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
    resolve_failures: AtomicU64,
    frames_written: AtomicU64,
    oversized_frames: AtomicU64,
    partial_writes: AtomicU64,
}

macro_rules! counter {
    ($($name:ident),* $(,)?) => {
        impl BridgeStats {
            $(
                pub fn $name(&self) {
                    self.$name.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

// Each method increments the counter of the same name.
counter!(
    tun_frames_read,
    tun_drops,
    radio_frames_received,
    radio_drops,
    frames_sent,
    send_failures,
    resolve_failures,
    frames_written,
    oversized_frames,
    partial_writes,
);

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            tun_frames_read: load(&self.tun_frames_read),
            tun_drops: load(&self.tun_drops),
            radio_frames_received: load(&self.radio_frames_received),
            radio_drops: load(&self.radio_drops),
            frames_sent: load(&self.frames_sent),
            send_failures: load(&self.send_failures),
            resolve_failures: load(&self.resolve_failures),
            frames_written: load(&self.frames_written),
            oversized_frames: load(&self.oversized_frames),
            partial_writes: load(&self.partial_writes),
        }
    }
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub tun_frames_read: u64,
    pub tun_drops: u64,
    pub radio_frames_received: u64,
    pub radio_drops: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub resolve_failures: u64,
    pub frames_written: u64,
    pub oversized_frames: u64,
    pub partial_writes: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tun read={} dropped={} | radio rx={} dropped={} | sent ok={} failed={} unresolved={} | \
             tun written={} oversized={} partial={}",
            self.tun_frames_read,
            self.tun_drops,
            self.radio_frames_received,
            self.radio_drops,
            self.frames_sent,
            self.send_failures,
            self.resolve_failures,
            self.frames_written,
            self.oversized_frames,
            self.partial_writes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = BridgeStats::new();
        stats.tun_frames_read();
        stats.tun_frames_read();
        stats.tun_drops();
        stats.send_failures();

        let snap = stats.snapshot();
        assert_eq!(snap.tun_frames_read, 2);
        assert_eq!(snap.tun_drops, 1);
        assert_eq!(snap.send_failures, 1);
        assert_eq!(snap.frames_sent, 0);
    }

    #[test]
    fn snapshot_display() {
        let snap = StatsSnapshot {
            tun_frames_read: 3,
            radio_drops: 1,
            ..StatsSnapshot::default()
        };
        let text = snap.to_string();
        assert!(text.contains("tun read=3"));
        assert!(text.contains("radio rx=0 dropped=1"));
    }
}
