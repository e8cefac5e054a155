//! TUN Reader stage: moves frames from the virtual interface to the
//! outbound queue.

use std::sync::Arc;
use std::time::Duration;

use radiotun_core::{Frame, FrameQueue, PushError};
use radiotun_interfaces::{StopSignal, VirtualInterface};

use crate::logging::hex_dump;
use crate::stats::BridgeStats;

/// What one [`TunReader::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStep {
    /// Nothing to read before the poll timeout.
    Idle,
    Forwarded,
    /// The outbound queue was full; the frame was discarded.
    Dropped,
    /// A transient read error; the stage keeps going.
    Failed,
    /// The device is gone; the stage must exit.
    Terminated,
}

pub struct TunReader {
    iface: Arc<dyn VirtualInterface>,
    outbound: Arc<FrameQueue>,
    stop: StopSignal,
    stats: Arc<BridgeStats>,
    poll_timeout: Duration,
    buf: Vec<u8>,
}

impl TunReader {
    pub fn new(
        iface: Arc<dyn VirtualInterface>,
        outbound: Arc<FrameQueue>,
        stop: StopSignal,
        stats: Arc<BridgeStats>,
        poll_timeout: Duration,
    ) -> Self {
        let buf = vec![0u8; iface.mtu()];
        Self {
            iface,
            outbound,
            stop,
            stats,
            poll_timeout,
            buf,
        }
    }

    /// Run until the stop flag is set or the device fails for good.
    pub fn run(mut self) {
        tracing::info!("tun reader started on {}", self.iface.name());
        while !self.stop.is_stopped() {
            if self.step() == ReadStep::Terminated {
                break;
            }
        }
        tracing::info!("tun reader stopped");
    }

    /// Wait up to the poll timeout for one frame and forward it.
    pub fn step(&mut self) -> ReadStep {
        match self.iface.wait_readable(self.poll_timeout) {
            Ok(true) => {}
            Ok(false) => return ReadStep::Idle,
            Err(e) if e.is_fatal() => {
                tracing::error!("tun reader: device unusable: {e}");
                return ReadStep::Terminated;
            }
            Err(e) => {
                tracing::warn!("tun reader: poll failed: {e}");
                return ReadStep::Failed;
            }
        }

        let n = match self.iface.read_frame(&mut self.buf) {
            Ok(0) => return ReadStep::Idle,
            Ok(n) => n,
            Err(e) if e.is_fatal() => {
                tracing::error!("tun reader: device unusable: {e}");
                return ReadStep::Terminated;
            }
            Err(e) => {
                tracing::warn!("tun reader: read failed: {e}");
                return ReadStep::Failed;
            }
        };

        self.stats.tun_frames_read();
        let bytes = &self.buf[..n];
        tracing::trace!("tun read {n} bytes: {}", hex_dump(bytes));

        match self.outbound.push(Frame::new(bytes)) {
            Ok(()) => ReadStep::Forwarded,
            Err(PushError::Full(frame)) => {
                self.stats.tun_drops();
                tracing::warn!("Tun Drop: outbound queue full, discarded {} bytes", frame.len());
                ReadStep::Dropped
            }
            Err(PushError::Closed(_)) => ReadStep::Terminated,
        }
    }
}
