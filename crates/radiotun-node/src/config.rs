//! TOML-based configuration for the bridge.
//!
//! The file is optional: every field has a default, and the command-line
//! flags override whatever the file says. [`BridgeConfig::resolve`] merges
//! both and validates the result once, before any stage starts.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use radiotun_core::constants::{
    BROADCAST_HOP_LEVEL, BROADCAST_MAX_LEN, DEFAULT_CHANNEL, DEFAULT_MESH_NODE_ID,
    DEFAULT_QUEUE_CAPACITY, MAX_ADDRESS_DEPTH,
};
use radiotun_core::{CoreError, DataRate, InterfaceMode, MeshNodeId, NodeAddress};
use radiotun_interfaces::udp::{DEFAULT_BASE_PORT, UdpRadioConfig};

use crate::error::NodeError;

/// Configuration file contents, before validation.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub radio: RadioSection,
    #[serde(default)]
    pub mesh: MeshSection,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }
}

/// The `[bridge]` section.
#[derive(Debug, Deserialize)]
pub struct BridgeSection {
    /// "tap" (Ethernet frames) or "tun" (IP packets).
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Octal radio address of this node, e.g. "00" or "011".
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Keep the kernel interface after exit. Default: true.
    #[serde(default = "default_true")]
    pub persist: bool,
}

fn default_mode() -> String {
    "tap".to_string()
}

fn default_address() -> String {
    "00".to_string()
}

fn default_interface() -> String {
    "tun_nrf24".to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_true() -> bool {
    true
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            address: default_address(),
            interface: default_interface(),
            queue_capacity: default_queue_capacity(),
            persist: true,
        }
    }
}

/// The `[radio]` section.
#[derive(Debug, Deserialize)]
pub struct RadioSection {
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Data rate tier: 1 (1 Mbps), 2 (2 Mbps) or 250 (250 kbps).
    #[serde(default = "default_data_rate")]
    pub data_rate: u16,
    /// Host of the UDP radio emulation.
    #[serde(default = "default_udp_host")]
    pub udp_host: String,
    /// UDP port of node 00; node N listens on `udp_base_port + N`.
    #[serde(default = "default_udp_base_port")]
    pub udp_base_port: u16,
}

fn default_channel() -> u8 {
    DEFAULT_CHANNEL
}

fn default_data_rate() -> u16 {
    DataRate::default().tier()
}

fn default_udp_host() -> String {
    "127.0.0.1".to_string()
}

fn default_udp_base_port() -> u16 {
    DEFAULT_BASE_PORT
}

impl Default for RadioSection {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            data_rate: default_data_rate(),
            udp_host: default_udp_host(),
            udp_base_port: default_udp_base_port(),
        }
    }
}

/// The `[mesh]` section.
#[derive(Debug, Default, Deserialize)]
pub struct MeshSection {
    #[serde(default)]
    pub enabled: bool,
    /// Mesh node id for non-master nodes. Defaults to 253.
    pub node_id: Option<u16>,
}

/// The `[timing]` section. Durations are in milliseconds unless the field
/// name says otherwise.
#[derive(Debug, Deserialize)]
pub struct TimingSection {
    /// Housekeeping windows between the repeated broadcast sends.
    #[serde(default = "default_broadcast_windows")]
    pub broadcast_windows_ms: Vec<u64>,
    #[serde(default = "default_broadcast_max_len")]
    pub broadcast_max_len: usize,
    #[serde(default = "default_broadcast_hop_level")]
    pub broadcast_hop_level: u8,
    #[serde(default = "default_rate_delay_2mbps")]
    pub rate_delay_2mbps_us: u64,
    #[serde(default = "default_rate_delay_1mbps")]
    pub rate_delay_1mbps_us: u64,
    #[serde(default = "default_rate_delay_250kbps")]
    pub rate_delay_250kbps_us: u64,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_write_retry")]
    pub write_retry_ms: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_join_timeout")]
    pub join_timeout_ms: u64,
}

fn default_broadcast_windows() -> Vec<u64> {
    vec![5, 15]
}

fn default_broadcast_max_len() -> usize {
    BROADCAST_MAX_LEN
}

fn default_broadcast_hop_level() -> u8 {
    BROADCAST_HOP_LEVEL
}

fn default_rate_delay_2mbps() -> u64 {
    1000
}

fn default_rate_delay_1mbps() -> u64 {
    1700
}

fn default_rate_delay_250kbps() -> u64 {
    4500
}

fn default_poll_timeout() -> u64 {
    1000
}

fn default_write_retry() -> u64 {
    3
}

fn default_write_timeout() -> u64 {
    500
}

fn default_shutdown_grace() -> u64 {
    1000
}

fn default_join_timeout() -> u64 {
    5000
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            broadcast_windows_ms: default_broadcast_windows(),
            broadcast_max_len: default_broadcast_max_len(),
            broadcast_hop_level: default_broadcast_hop_level(),
            rate_delay_2mbps_us: default_rate_delay_2mbps(),
            rate_delay_1mbps_us: default_rate_delay_1mbps(),
            rate_delay_250kbps_us: default_rate_delay_250kbps(),
            poll_timeout_ms: default_poll_timeout(),
            write_retry_ms: default_write_retry(),
            write_timeout_ms: default_write_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
            join_timeout_ms: default_join_timeout(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Command-line overrides
// ---------------------------------------------------------------------------

/// Values taken from the command line. `None`/`false` leaves the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Octal address string, validated during resolution.
    pub address: Option<String>,
    /// TUN mode. Implies mesh.
    pub tun: bool,
    pub mesh: bool,
    pub node_id: Option<u16>,
    pub data_rate: Option<u16>,
    pub channel: Option<u8>,
    pub interface: Option<String>,
}

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

/// Per-rate pause inserted after each inbound drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDelays {
    pub mbps2: Duration,
    pub mbps1: Duration,
    pub kbps250: Duration,
}

impl RateDelays {
    pub fn for_rate(&self, rate: DataRate) -> Duration {
        match rate {
            DataRate::Mbps2 => self.mbps2,
            DataRate::Mbps1 => self.mbps1,
            DataRate::Kbps250 => self.kbps250,
        }
    }
}

/// Timing knobs shared by the stages and the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    pub broadcast_windows: Vec<Duration>,
    pub broadcast_max_len: usize,
    pub broadcast_hop_level: u8,
    pub rate_delays: RateDelays,
    pub poll_timeout: Duration,
    pub write_retry_interval: Duration,
    pub write_timeout: Duration,
    pub shutdown_grace: Duration,
    pub join_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self::from_section(&TimingSection::default())
    }
}

impl Timing {
    fn from_section(section: &TimingSection) -> Self {
        Self {
            broadcast_windows: section
                .broadcast_windows_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            broadcast_max_len: section.broadcast_max_len,
            broadcast_hop_level: section.broadcast_hop_level,
            rate_delays: RateDelays {
                mbps2: Duration::from_micros(section.rate_delay_2mbps_us),
                mbps1: Duration::from_micros(section.rate_delay_1mbps_us),
                kbps250: Duration::from_micros(section.rate_delay_250kbps_us),
            },
            poll_timeout: Duration::from_millis(section.poll_timeout_ms),
            write_retry_interval: Duration::from_millis(section.write_retry_ms),
            write_timeout: Duration::from_millis(section.write_timeout_ms),
            shutdown_grace: Duration::from_millis(section.shutdown_grace_ms),
            join_timeout: Duration::from_millis(section.join_timeout_ms),
        }
    }
}

/// Validated, immutable bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub mode: InterfaceMode,
    pub mesh: bool,
    pub local_address: NodeAddress,
    /// Mesh node id the radio registers under. Only meaningful with mesh.
    pub mesh_node_id: MeshNodeId,
    pub data_rate: DataRate,
    pub channel: u8,
    pub interface: String,
    pub persist: bool,
    pub queue_capacity: usize,
    pub timing: Timing,
    pub udp: UdpRadioConfig,
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: InterfaceMode::default(),
            mesh: false,
            local_address: NodeAddress::ROOT,
            mesh_node_id: MeshNodeId::MASTER,
            data_rate: DataRate::default(),
            channel: DEFAULT_CHANNEL,
            interface: default_interface(),
            persist: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timing: Timing::default(),
            udp: UdpRadioConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl BridgeConfig {
    /// Merge `file` with the command-line `overrides` and validate.
    pub fn resolve(file: ConfigFile, overrides: &Overrides) -> Result<Self, NodeError> {
        let address_text = overrides
            .address
            .as_deref()
            .unwrap_or(&file.bridge.address);
        let local_address = NodeAddress::parse_octal(address_text)?;
        if local_address.is_multicast() {
            return Err(CoreError::InvalidAddress(address_text.to_string()).into());
        }

        let rate_tier = overrides.data_rate.unwrap_or(file.radio.data_rate);
        let data_rate = DataRate::from_tier(rate_tier)?;

        let mode = if overrides.tun {
            InterfaceMode::Tun
        } else {
            parse_mode(&file.bridge.mode)?
        };
        let mesh = overrides.mesh || overrides.tun || file.mesh.enabled;
        if mode.requires_mesh() && !mesh {
            return Err(NodeError::Config(
                "tun mode needs mesh addressing; set [mesh] enabled = true".into(),
            ));
        }

        let mesh_node_id = if local_address.is_root() {
            MeshNodeId::MASTER
        } else {
            let raw = overrides
                .node_id
                .or(file.mesh.node_id)
                .unwrap_or(u16::from(DEFAULT_MESH_NODE_ID));
            let id = MeshNodeId::try_from(raw)?;
            if mesh && id.is_master() {
                return Err(CoreError::InvalidMeshNodeId(raw).into());
            }
            id
        };

        if file.bridge.queue_capacity == 0 {
            return Err(NodeError::Config("queue_capacity must be at least 1".into()));
        }

        let host: IpAddr = file.radio.udp_host.parse().map_err(|e| {
            NodeError::Config(format!("invalid udp_host {:?}: {e}", file.radio.udp_host))
        })?;

        let timing = Timing::from_section(&file.timing);
        if timing.poll_timeout.is_zero() {
            return Err(NodeError::Config("poll_timeout_ms must be positive".into()));
        }
        if !(1..=MAX_ADDRESS_DEPTH).contains(&u32::from(timing.broadcast_hop_level)) {
            return Err(NodeError::Config(format!(
                "broadcast_hop_level must be between 1 and {MAX_ADDRESS_DEPTH}, got {}",
                timing.broadcast_hop_level
            )));
        }

        Ok(Self {
            mode,
            mesh,
            local_address,
            mesh_node_id,
            data_rate,
            channel: overrides.channel.unwrap_or(file.radio.channel),
            interface: overrides
                .interface
                .clone()
                .unwrap_or(file.bridge.interface),
            persist: file.bridge.persist,
            queue_capacity: file.bridge.queue_capacity,
            timing,
            udp: UdpRadioConfig {
                host,
                base_port: file.radio.udp_base_port,
            },
            log_level: file.logging.level,
        })
    }

    /// Pause inserted after each inbound drain for the configured rate.
    pub fn rate_delay(&self) -> Duration {
        self.timing.rate_delays.for_rate(self.data_rate)
    }
}

fn parse_mode(s: &str) -> Result<InterfaceMode, NodeError> {
    match s.to_ascii_lowercase().as_str() {
        "tap" => Ok(InterfaceMode::Tap),
        "tun" => Ok(InterfaceMode::Tun),
        other => Err(NodeError::Config(format!(
            "unknown interface mode {other:?} (expected \"tap\" or \"tun\")"
        ))),
    }
}
