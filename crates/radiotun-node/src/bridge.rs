//! Lifecycle coordinator.
//!
//! The [`Bridge`] owns the two frame queues and the shutdown token, starts
//! the three stages on blocking threads, and tears them down in order:
//! stop flag, queue close, grace period, device release, bounded join.

use std::sync::Arc;

use radiotun_core::FrameQueue;
use radiotun_interfaces::{RadioTransport, ShutdownToken, VirtualInterface};

use crate::config::BridgeConfig;
use crate::error::NodeError;
use crate::radio_bridge::{RadioBridge, RadioLoopConfig};
use crate::setup::begin_radio;
use crate::stats::{BridgeStats, StatsSnapshot};
use crate::tun_reader::TunReader;
use crate::tun_writer::TunWriter;

/// Clonable handle that asks a running [`Bridge`] to stop.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<ShutdownToken>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.signal_stop();
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.is_stopped()
    }
}

/// What happened during [`Bridge::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stats: StatsSnapshot,
    /// Stages that had not exited when the join timeout expired.
    pub stuck: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.stuck.is_empty()
    }
}

/// The TUN/TAP to radio bridge.
pub struct Bridge {
    config: BridgeConfig,
    token: Arc<ShutdownToken>,
    inbound: Arc<FrameQueue>,
    outbound: Arc<FrameQueue>,
    stats: Arc<BridgeStats>,
    device: Option<Arc<dyn VirtualInterface>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let inbound = Arc::new(FrameQueue::new(config.queue_capacity));
        let outbound = Arc::new(FrameQueue::new(config.queue_capacity));
        Self {
            config,
            token: Arc::new(ShutdownToken::new()),
            inbound,
            outbound,
            stats: Arc::new(BridgeStats::new()),
            device: None,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.token))
    }

    pub fn is_running(&self) -> bool {
        self.device.is_some()
    }

    /// Bring the radio up and start the three stages.
    ///
    /// Fails without starting anything if the radio cannot be brought up
    /// or the device does not match the configured mode.
    pub async fn start<T>(
        &mut self,
        device: Arc<dyn VirtualInterface>,
        mut transport: T,
    ) -> Result<(), NodeError>
    where
        T: RadioTransport + 'static,
    {
        if self.device.is_some() || self.token.is_stopped() {
            return Err(NodeError::AlreadyRunning);
        }
        if device.mode() != self.config.mode {
            return Err(NodeError::Config(format!(
                "device {} is in {} mode, expected {}",
                device.name(),
                device.mode(),
                self.config.mode
            )));
        }

        begin_radio(&mut transport, &self.config)?;

        let timing = &self.config.timing;

        let reader = TunReader::new(
            Arc::clone(&device),
            Arc::clone(&self.outbound),
            self.token.subscribe(),
            Arc::clone(&self.stats),
            timing.poll_timeout,
        );
        let writer = TunWriter::new(
            Arc::clone(&device),
            Arc::clone(&self.inbound),
            self.token.subscribe(),
            Arc::clone(&self.stats),
            timing,
        );
        let radio = RadioBridge::new(
            transport,
            RadioLoopConfig::from_bridge(&self.config),
            Arc::clone(&self.inbound),
            Arc::clone(&self.outbound),
            self.token.subscribe(),
            Arc::clone(&self.stats),
        );

        self.token
            .add_task("radio-bridge", tokio::task::spawn_blocking(move || radio.run()))
            .await;
        self.token
            .add_task("tun-reader", tokio::task::spawn_blocking(move || reader.run()))
            .await;
        self.token
            .add_task("tun-writer", tokio::task::spawn_blocking(move || writer.run()))
            .await;

        tracing::info!(
            "bridge running: {} on {} as node {}",
            self.config.mode,
            device.name(),
            self.config.local_address
        );
        self.device = Some(device);
        Ok(())
    }

    /// Wait until a [`ShutdownHandle`] requests a stop.
    pub async fn wait_for_shutdown(&self) {
        self.token.subscribe().stopped().await;
    }

    /// Stop every stage and release the device.
    ///
    /// Stages still running after the join timeout are reported in
    /// [`ShutdownReport::stuck`]; the caller decides whether to force exit.
    pub async fn shutdown(mut self) -> ShutdownReport {
        tracing::info!("shutting down bridge");
        self.token.signal_stop();
        self.inbound.close();
        self.outbound.close();

        tokio::time::sleep(self.config.timing.shutdown_grace).await;
        if let Some(device) = self.device.take() {
            tracing::debug!("releasing {}", device.name());
            device.close();
        }

        let stuck = self.token.join_all(self.config.timing.join_timeout).await;
        for name in &stuck {
            tracing::warn!("{name} did not stop within {:?}", self.config.timing.join_timeout);
        }

        let stats = self.stats.snapshot();
        tracing::info!("bridge stopped: {stats}");
        ShutdownReport { stats, stuck }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use radiotun_core::{InterfaceMode, NodeAddress};
    use radiotun_interfaces::testing::{MemoryInterface, MockTransport};

    use super::*;
    use crate::config::Timing;

    fn quick_config() -> BridgeConfig {
        BridgeConfig {
            timing: Timing {
                poll_timeout: Duration::from_millis(10),
                shutdown_grace: Duration::from_millis(20),
                join_timeout: Duration::from_secs(2),
                ..Timing::default()
            },
            ..BridgeConfig::default()
        }
    }

    #[tokio::test]
    async fn start_then_shutdown_is_clean() {
        let mut bridge = Bridge::new(quick_config());
        let iface = Arc::new(MemoryInterface::new(InterfaceMode::Tap));
        let mock = MockTransport::new(NodeAddress::ROOT);

        bridge.start(iface, mock.clone()).await.unwrap();
        assert!(bridge.is_running());
        assert!(mock.settings().is_some());
        assert!(matches!(
            bridge
                .start(Arc::new(MemoryInterface::new(InterfaceMode::Tap)), mock.clone())
                .await,
            Err(NodeError::AlreadyRunning)
        ));

        let report = bridge.shutdown().await;
        assert!(report.is_clean());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn releasing_device_wakes_reader_parked_in_long_poll() {
        let mut bridge = Bridge::new(BridgeConfig {
            timing: Timing {
                poll_timeout: Duration::from_secs(3),
                shutdown_grace: Duration::from_millis(50),
                join_timeout: Duration::from_millis(500),
                ..Timing::default()
            },
            ..BridgeConfig::default()
        });
        let iface = Arc::new(MemoryInterface::new(InterfaceMode::Tap));
        bridge
            .start(iface.clone(), MockTransport::new(NodeAddress::ROOT))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        let report = bridge.shutdown().await;
        assert!(report.is_clean(), "stuck stages: {:?}", report.stuck);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(iface.wait_readable(Duration::ZERO).unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn mode_mismatch_starts_nothing() {
        let mut bridge = Bridge::new(quick_config());
        let iface = Arc::new(MemoryInterface::new(InterfaceMode::Tun));
        let mock = MockTransport::new(NodeAddress::ROOT);

        let err = bridge.start(iface, mock.clone()).await.unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
        assert!(!bridge.is_running());
        assert!(mock.settings().is_none());
    }

    #[tokio::test]
    async fn shutdown_handle_wakes_waiter() {
        let bridge = Bridge::new(quick_config());
        let handle = bridge.shutdown_handle();
        assert!(!handle.is_shutdown());

        let trigger = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.shutdown();
        });
        tokio::time::timeout(Duration::from_secs(2), bridge.wait_for_shutdown())
            .await
            .unwrap();
        assert!(handle.is_shutdown());
    }

    #[tokio::test]
    async fn shutdown_without_start() {
        let bridge = Bridge::new(quick_config());
        let report = bridge.shutdown().await;
        assert!(report.is_clean());
        assert_eq!(report.stats, StatsSnapshot::default());
    }
}
