//! Collaborator traits used by the bridge stages.

use std::time::Duration;

use radiotun_core::constants::MAX_FRAME_SIZE;
use radiotun_core::{DataRate, InterfaceMode, MeshNodeId, NodeAddress};

use crate::error::InterfaceError;

/// The local TUN/TAP device.
///
/// One stage reads and another writes, concurrently, through a shared
/// reference; implementations must not serialize the two directions.
pub trait VirtualInterface: Send + Sync {
    /// Kernel name of the interface (e.g. "tun_nrf24").
    fn name(&self) -> &str;

    /// Whether the device carries IP packets or Ethernet frames.
    fn mode(&self) -> InterfaceMode;

    /// Largest frame the device accepts. Defaults to [`MAX_FRAME_SIZE`].
    fn mtu(&self) -> usize {
        MAX_FRAME_SIZE
    }

    /// Wait up to `timeout` for a frame. `Ok(false)` means the wait timed out.
    fn wait_readable(&self, timeout: Duration) -> Result<bool, InterfaceError>;

    /// Read one frame into `buf`, returning its length.
    fn read_frame(&self, buf: &mut [u8]) -> Result<usize, InterfaceError>;

    /// Write one frame, returning the number of bytes the device accepted.
    fn write_frame(&self, frame: &[u8]) -> Result<usize, InterfaceError>;

    /// Release the device. A thread parked in [`wait_readable`] wakes up,
    /// and every later call fails with [`InterfaceError::Closed`].
    ///
    /// [`wait_readable`]: VirtualInterface::wait_readable
    fn close(&self);
}

/// Network header of a message received from the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioHeader {
    pub from: NodeAddress,
    pub to: NodeAddress,
    pub id: u16,
    pub message_type: u8,
}

/// Mesh (dynamic addressing) parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshSettings {
    pub node_id: MeshNodeId,
}

/// One-time radio link configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioSettings {
    pub channel: u8,
    pub data_rate: DataRate,
    /// Forward multicast traffic one level down the tree.
    pub multicast_relay: bool,
    pub mesh: Option<MeshSettings>,
}

/// Message-oriented radio network.
///
/// The transport has no blocking I/O: callers drive it with [`update`]
/// and poll [`available`]. It is owned by a single thread.
///
/// [`update`]: RadioTransport::update
/// [`available`]: RadioTransport::available
pub trait RadioTransport: Send {
    /// Bring the link up on `settings.channel` as node `local`.
    fn begin(&mut self, settings: &RadioSettings, local: NodeAddress) -> Result<(), InterfaceError>;

    /// Address this node was started with.
    fn local_address(&self) -> NodeAddress;

    /// Housekeeping tick: receive pending traffic, run routing and
    /// keepalive timers.
    fn update(&mut self);

    /// Whether a received message is waiting to be read.
    fn available(&self) -> bool;

    /// Take the next received message, copying at most `buf.len()` bytes.
    fn read(&mut self, buf: &mut [u8]) -> Option<(RadioHeader, usize)>;

    /// Send `payload` to one node.
    fn write(&mut self, to: NodeAddress, payload: &[u8]) -> Result<(), InterfaceError>;

    /// Send `payload` to every node `level` hops below the root.
    fn multicast(&mut self, payload: &[u8], level: u8) -> Result<(), InterfaceError>;

    /// Current address of mesh node `node_id`. Always `None` without mesh.
    fn resolve(&self, node_id: MeshNodeId) -> Option<NodeAddress> {
        let _ = node_id;
        None
    }

    /// Serve dynamic address requests from other mesh nodes (master only).
    fn service_address_assignment(&mut self) {}

    /// Whether this mesh node still has to obtain its address from the master.
    fn needs_address(&self) -> bool {
        false
    }

    /// Ask the master for an address. Called while [`needs_address`] holds.
    ///
    /// [`needs_address`]: RadioTransport::needs_address
    fn request_address(&mut self) {}
}
