//! Radio Bridge stage: the only owner of the radio transport.
//!
//! Each iteration runs the same fixed sequence:
//!
//! 1. housekeeping tick (plus address assignment on the mesh master, or an
//!    address request on a mesh node that has none yet)
//! 2. drain every received radio message into the inbound queue
//! 3. housekeeping tick
//! 4. pause for the data-rate delay
//! 5. send queued outbound frames until the queue is empty or the radio
//!    reports received data
//!
//! Received traffic always wins over outbound traffic in step 5, so a busy
//! sender cannot starve the receive path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use radiotun_core::constants::MAX_RADIO_PAYLOAD;
use radiotun_core::{Frame, FrameQueue, NodeAddress, PushError};
use radiotun_interfaces::{RadioTransport, StopSignal};

use crate::addressing::{AddressingStrategy, Route, RouteError};
use crate::config::BridgeConfig;
use crate::logging::hex_dump;
use crate::stats::BridgeStats;

/// How one outbound frame was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Unicast { to: NodeAddress, delivered: bool },
    /// Root only: repeated multicast at `level`.
    Broadcast { level: u8, sends: usize, delivered: bool },
    /// Non-root broadcast handed to the root for redistribution.
    ToRoot { delivered: bool },
    Unroutable(RouteError),
}

/// Parameters of the radio loop, taken from the bridge configuration.
#[derive(Debug, Clone)]
pub struct RadioLoopConfig {
    pub strategy: AddressingStrategy,
    /// Serve address assignment each tick (mesh master only).
    pub assigns_addresses: bool,
    /// Request an address while unassigned (mesh nodes other than the master).
    pub requests_address: bool,
    pub rate_delay: Duration,
    pub broadcast_windows: Vec<Duration>,
    pub broadcast_hop_level: u8,
}

impl RadioLoopConfig {
    pub fn from_bridge(config: &BridgeConfig) -> Self {
        Self {
            strategy: AddressingStrategy::for_mode(config.mode, config.timing.broadcast_max_len),
            assigns_addresses: config.mesh && config.local_address.is_root(),
            requests_address: config.mesh && !config.local_address.is_root(),
            rate_delay: config.rate_delay(),
            broadcast_windows: config.timing.broadcast_windows.clone(),
            broadcast_hop_level: config.timing.broadcast_hop_level,
        }
    }
}

pub struct RadioBridge<T: RadioTransport> {
    transport: T,
    config: RadioLoopConfig,
    inbound: Arc<FrameQueue>,
    outbound: Arc<FrameQueue>,
    stop: StopSignal,
    stats: Arc<BridgeStats>,
    buf: Vec<u8>,
}

impl<T: RadioTransport> RadioBridge<T> {
    /// `transport` must already be started.
    pub fn new(
        transport: T,
        config: RadioLoopConfig,
        inbound: Arc<FrameQueue>,
        outbound: Arc<FrameQueue>,
        stop: StopSignal,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            transport,
            config,
            inbound,
            outbound,
            stop,
            stats,
            buf: vec![0u8; MAX_RADIO_PAYLOAD],
        }
    }

    /// Run iterations until the stop flag is set.
    pub fn run(mut self) {
        tracing::info!(
            "radio bridge started as {} ({:?})",
            self.transport.local_address(),
            self.config.strategy
        );
        while !self.stop.is_stopped() {
            self.run_iteration();
        }
        tracing::info!("radio bridge stopped");
    }

    pub fn run_iteration(&mut self) {
        self.housekeeping();
        self.drain_inbound();
        self.housekeeping();
        if !self.config.rate_delay.is_zero() {
            std::thread::sleep(self.config.rate_delay);
        }
        self.transport.update();
        self.drain_outbound();
    }

    fn housekeeping(&mut self) {
        self.transport.update();
        if self.config.assigns_addresses {
            self.transport.service_address_assignment();
        } else if self.config.requests_address && self.transport.needs_address() {
            self.transport.request_address();
        }
    }

    /// Move every pending radio message into the inbound queue.
    ///
    /// Returns the number of messages queued.
    pub fn drain_inbound(&mut self) -> usize {
        let mut queued = 0;
        while self.transport.available() {
            let Some((header, n)) = self.transport.read(&mut self.buf) else {
                break;
            };
            self.stats.radio_frames_received();
            tracing::debug!("radio rx {n} bytes from {}", header.from);
            tracing::trace!("radio rx payload: {}", hex_dump(&self.buf[..n]));

            match self.inbound.push(Frame::new(&self.buf[..n])) {
                Ok(()) => queued += 1,
                Err(PushError::Full(frame)) => {
                    self.stats.radio_drops();
                    tracing::warn!(
                        "Radio Drop: inbound queue full, discarded {} bytes from {}",
                        frame.len(),
                        header.from
                    );
                }
                Err(PushError::Closed(_)) => break,
            }
        }
        queued
    }

    /// Send queued frames until the queue is empty, the radio has received
    /// data, or shutdown is requested.
    ///
    /// Returns the number of frames taken from the queue.
    pub fn drain_outbound(&mut self) -> usize {
        let mut taken = 0;
        while !self.stop.is_stopped() && !self.transport.available() {
            let Some(frame) = self.outbound.try_pop() else {
                break;
            };
            self.transmit(&frame);
            taken += 1;
        }
        taken
    }

    /// Route and send one frame.
    pub fn transmit(&mut self, frame: &Frame) -> Dispatch {
        let route = match self.config.strategy.resolve(frame, &self.transport) {
            Ok(route) => route,
            Err(e) => {
                self.stats.resolve_failures();
                if e.is_quiet() {
                    tracing::debug!("dropping {} byte frame: {e}", frame.len());
                } else {
                    tracing::warn!("dropping {} byte frame: {e}", frame.len());
                }
                return Dispatch::Unroutable(e);
            }
        };

        let dispatch = match route {
            Route::Unicast(to) => {
                let delivered = self.send_to(to, frame);
                Dispatch::Unicast { to, delivered }
            }
            Route::Broadcast if self.transport.local_address().is_root() => {
                self.broadcast_with_retries(frame)
            }
            Route::Broadcast => {
                let delivered = self.send_to(NodeAddress::ROOT, frame);
                Dispatch::ToRoot { delivered }
            }
        };
        self.record(&dispatch);
        dispatch
    }

    fn send_to(&mut self, to: NodeAddress, frame: &Frame) -> bool {
        match self.transport.write(to, frame) {
            Ok(()) => {
                tracing::debug!("radio tx {} bytes to {to}", frame.len());
                true
            }
            Err(e) => {
                tracing::warn!("radio tx of {} bytes to {to} failed: {e}", frame.len());
                false
            }
        }
    }

    /// Multicast `frame`, then repeat it once after each broadcast window,
    /// keeping the radio serviced while waiting.
    ///
    /// Only the first send decides whether the broadcast counts as delivered.
    fn broadcast_with_retries(&mut self, frame: &Frame) -> Dispatch {
        let level = self.config.broadcast_hop_level;
        let delivered = match self.transport.multicast(frame, level) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("broadcast of {} bytes failed: {e}", frame.len());
                false
            }
        };

        let windows = self.config.broadcast_windows.clone();
        for window in &windows {
            self.service_for(*window);
            if let Err(e) = self.transport.multicast(frame, level) {
                tracing::debug!("broadcast repeat failed: {e}");
            }
        }

        tracing::debug!(
            "broadcast {} bytes at level {level}, {} sends",
            frame.len(),
            windows.len() + 1
        );
        Dispatch::Broadcast {
            level,
            sends: windows.len() + 1,
            delivered,
        }
    }

    /// Busy-service the radio for `window`.
    fn service_for(&mut self, window: Duration) {
        let started = Instant::now();
        while started.elapsed() < window {
            self.transport.update();
            std::thread::yield_now();
        }
    }

    fn record(&self, dispatch: &Dispatch) {
        match dispatch {
            Dispatch::Unicast { delivered, .. }
            | Dispatch::Broadcast { delivered, .. }
            | Dispatch::ToRoot { delivered } => {
                if *delivered {
                    self.stats.frames_sent();
                } else {
                    self.stats.send_failures();
                }
            }
            Dispatch::Unroutable(_) => {}
        }
    }
}
