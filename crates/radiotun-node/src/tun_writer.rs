//! TUN Writer stage: moves frames from the inbound queue to the virtual
//! interface.

use std::sync::Arc;
use std::time::{Duration, Instant};

use radiotun_core::{Frame, FrameQueue, PopError};
use radiotun_interfaces::{StopSignal, VirtualInterface};

use crate::config::Timing;
use crate::stats::BridgeStats;

/// Result of delivering one frame to the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The device accepted only part of the frame.
    Partial { written: usize, expected: usize },
    /// Zero-length frame, nothing to do.
    Skipped,
    /// Larger than the interface MTU; discarded.
    Oversized,
    /// The device kept accepting nothing until the retry budget ran out.
    TimedOut,
    Failed,
    /// The device is gone; the stage must exit.
    Terminated,
}

pub struct TunWriter {
    iface: Arc<dyn VirtualInterface>,
    inbound: Arc<FrameQueue>,
    stop: StopSignal,
    stats: Arc<BridgeStats>,
    poll_timeout: Duration,
    retry_interval: Duration,
    write_timeout: Duration,
}

impl TunWriter {
    pub fn new(
        iface: Arc<dyn VirtualInterface>,
        inbound: Arc<FrameQueue>,
        stop: StopSignal,
        stats: Arc<BridgeStats>,
        timing: &Timing,
    ) -> Self {
        Self {
            iface,
            inbound,
            stop,
            stats,
            poll_timeout: timing.poll_timeout,
            retry_interval: timing.write_retry_interval,
            write_timeout: timing.write_timeout,
        }
    }

    /// Run until the stop flag is set, the queue is closed and drained, or
    /// the device fails for good.
    pub fn run(self) {
        tracing::info!("tun writer started on {}", self.iface.name());
        while !self.stop.is_stopped() {
            let frame = match self.inbound.pop_timeout(self.poll_timeout) {
                Ok(frame) => frame,
                Err(PopError::Timeout) => continue,
                Err(PopError::Closed) => break,
            };
            if self.deliver(&frame) == WriteOutcome::Terminated {
                break;
            }
        }
        tracing::info!("tun writer stopped");
    }

    /// Write one frame, retrying while the device accepts nothing.
    pub fn deliver(&self, frame: &Frame) -> WriteOutcome {
        let mtu = self.iface.mtu();
        if frame.len() > mtu {
            self.stats.oversized_frames();
            tracing::error!(
                "tun writer: inbound frame of {} bytes exceeds MTU {mtu}, discarded",
                frame.len()
            );
            return WriteOutcome::Oversized;
        }
        if frame.is_empty() {
            return WriteOutcome::Skipped;
        }

        let started = Instant::now();
        loop {
            match self.iface.write_frame(frame) {
                Ok(0) => {
                    if started.elapsed() >= self.write_timeout {
                        self.stats.partial_writes();
                        tracing::warn!(
                            "tun writer: device accepted nothing for {:?}, discarded {} bytes",
                            self.write_timeout,
                            frame.len()
                        );
                        return WriteOutcome::TimedOut;
                    }
                    std::thread::sleep(self.retry_interval);
                }
                Ok(n) if n == frame.len() => {
                    self.stats.frames_written();
                    tracing::debug!("tun wrote {n} bytes");
                    return WriteOutcome::Written;
                }
                Ok(written) => {
                    self.stats.partial_writes();
                    tracing::warn!(
                        "tun writer: partial write, {written} of {} bytes",
                        frame.len()
                    );
                    return WriteOutcome::Partial {
                        written,
                        expected: frame.len(),
                    };
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("tun writer: device unusable: {e}");
                    return WriteOutcome::Terminated;
                }
                Err(e) => {
                    tracing::warn!("tun writer: write failed: {e}");
                    return WriteOutcome::Failed;
                }
            }
        }
    }
}
