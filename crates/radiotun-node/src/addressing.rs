//! Destination resolution for outbound frames.
//!
//! The strategy is fixed once at startup from the interface mode:
//! - [`AddressingStrategy::Direct`] (TAP): the frame starts with a link
//!   descriptor. Magic `RF24` names a unicast node address, magic `FF FF FF
//!   FF` a broadcast.
//! - [`AddressingStrategy::Mesh`] (TUN): the last octet of the IPv4
//!   destination is a mesh node id, looked up through the transport.

use radiotun_core::{
    DescriptorError, InterfaceMode, LinkDescriptor, MeshNodeId, NodeAddress,
    ipv4_destination_octet,
};
use radiotun_interfaces::RadioTransport;

/// Where an outbound frame goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Unicast(NodeAddress),
    /// Every node in radio range; the sender decides how to reach them.
    Broadcast,
}

/// Why a frame could not be routed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("broadcast frame of {len} bytes exceeds {max}")]
    BroadcastTooLarge { len: usize, max: usize },
    #[error("packet of {len} bytes has no IPv4 destination")]
    NoDestination { len: usize },
    #[error("no mesh address for node id {0}")]
    NoMapping(MeshNodeId),
}

impl RouteError {
    /// Failures expected in normal operation, logged below WARN.
    pub fn is_quiet(&self) -> bool {
        matches!(self, Self::NoMapping(_) | Self::NoDestination { .. })
    }
}

/// Address resolution policy, chosen from the interface mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingStrategy {
    Direct { broadcast_max_len: usize },
    Mesh,
}

impl AddressingStrategy {
    pub fn for_mode(mode: InterfaceMode, broadcast_max_len: usize) -> Self {
        match mode {
            InterfaceMode::Tap => Self::Direct { broadcast_max_len },
            InterfaceMode::Tun => Self::Mesh,
        }
    }

    /// Decide where `frame` should be sent.
    pub fn resolve<T: RadioTransport + ?Sized>(
        &self,
        frame: &[u8],
        transport: &T,
    ) -> Result<Route, RouteError> {
        match *self {
            Self::Direct { broadcast_max_len } => match LinkDescriptor::parse(frame)? {
                LinkDescriptor::Unicast(to) => Ok(Route::Unicast(to)),
                LinkDescriptor::Broadcast if frame.len() <= broadcast_max_len => {
                    Ok(Route::Broadcast)
                }
                LinkDescriptor::Broadcast => Err(RouteError::BroadcastTooLarge {
                    len: frame.len(),
                    max: broadcast_max_len,
                }),
            },
            Self::Mesh => {
                let octet = ipv4_destination_octet(frame)
                    .ok_or(RouteError::NoDestination { len: frame.len() })?;
                let node_id = MeshNodeId(octet);
                transport
                    .resolve(node_id)
                    .map(Route::Unicast)
                    .ok_or(RouteError::NoMapping(node_id))
            }
        }
    }
}
