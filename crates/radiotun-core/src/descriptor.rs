//! Link descriptor embedded at the head of Ethernet frames.
//!
//! In TAP mode every bridge assigns its interface the hardware address
//! `52:46:32:34:<addr lo>:<addr hi>`, so the destination MAC of an outbound
//! frame names the radio node it is meant for:
//!
//! ```text
//! offset  0        4          6
//!         +--------+----------+----------------
//!         | magic  | address  | rest of frame
//!         +--------+----------+----------------
//! magic   "RF24" (unicast) or ff ff ff ff (broadcast)
//! address u16 little-endian node address (unicast only)
//! ```

use crate::constants::{
    ADDRESS_OFFSET, BROADCAST_MAGIC, DESCRIPTOR_LEN, IPV4_DEST_LAST_OCTET_OFFSET, MAGIC_OFFSET,
    UNICAST_MAGIC,
};
use crate::error::DescriptorError;
use crate::types::NodeAddress;

/// Destination class decoded from a frame's descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDescriptor {
    /// Addressed to one radio node.
    Unicast(NodeAddress),
    /// All-ones destination (address-resolution traffic).
    Broadcast,
}

impl LinkDescriptor {
    /// Decode the descriptor at the head of `frame`.
    pub fn parse(frame: &[u8]) -> Result<Self, DescriptorError> {
        let magic: [u8; 4] = frame
            .get(MAGIC_OFFSET..MAGIC_OFFSET + 4)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(DescriptorError::TooShort {
                min: MAGIC_OFFSET + 4,
                actual: frame.len(),
            })?;

        match magic {
            BROADCAST_MAGIC => Ok(Self::Broadcast),
            UNICAST_MAGIC => {
                let raw = frame
                    .get(ADDRESS_OFFSET..DESCRIPTOR_LEN)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .ok_or(DescriptorError::TooShort {
                        min: DESCRIPTOR_LEN,
                        actual: frame.len(),
                    })?;
                NodeAddress::new(raw)
                    .map(Self::Unicast)
                    .map_err(|_| DescriptorError::InvalidAddress(raw))
            }
            other => Err(DescriptorError::UnknownMagic(other)),
        }
    }

    /// Encode the six descriptor bytes.
    pub fn to_bytes(self) -> [u8; DESCRIPTOR_LEN] {
        match self {
            Self::Unicast(address) => hardware_address(address),
            Self::Broadcast => [0xFF; DESCRIPTOR_LEN],
        }
    }
}

/// Synthetic TAP hardware address for `address`: the "RF24" prefix followed
/// by the little-endian node address.
pub fn hardware_address(address: NodeAddress) -> [u8; 6] {
    let [lo, hi] = address.to_le_bytes();
    let mut mac = [0u8; 6];
    mac[..4].copy_from_slice(&UNICAST_MAGIC);
    mac[4] = lo;
    mac[5] = hi;
    mac
}

/// Last octet of the IPv4 destination of a raw IPv4 packet, if present.
pub fn ipv4_destination_octet(packet: &[u8]) -> Option<u8> {
    packet.get(IPV4_DEST_LAST_OCTET_OFFSET).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(head: &[u8], len: usize) -> Vec<u8> {
        let mut frame = vec![0u8; len];
        frame[..head.len()].copy_from_slice(head);
        frame
    }

    #[test]
    fn unicast_descriptor_decodes_little_endian_address() {
        let frame = frame_with(&[0x52, 0x46, 0x32, 0x34, 0x0B, 0x00], 60);
        assert_eq!(
            LinkDescriptor::parse(&frame).unwrap(),
            LinkDescriptor::Unicast(NodeAddress::new(0x0B).unwrap())
        );
    }

    #[test]
    fn broadcast_descriptor_ignores_address_bytes() {
        let frame = frame_with(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 42);
        assert_eq!(
            LinkDescriptor::parse(&frame).unwrap(),
            LinkDescriptor::Broadcast
        );
        assert_eq!(
            LinkDescriptor::parse(&[0xFF; 4]).unwrap(),
            LinkDescriptor::Broadcast
        );
    }

    #[test]
    fn short_frames_are_rejected_before_offset_access() {
        assert_eq!(
            LinkDescriptor::parse(&[0x52, 0x46]).unwrap_err(),
            DescriptorError::TooShort { min: 4, actual: 2 }
        );
        assert_eq!(
            LinkDescriptor::parse(b"RF24\x01").unwrap_err(),
            DescriptorError::TooShort { min: 6, actual: 5 }
        );
        assert!(LinkDescriptor::parse(&[]).is_err());
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let frame = frame_with(&[0x33, 0x33, 0x00, 0x00, 0x00, 0x01], 80);
        assert_eq!(
            LinkDescriptor::parse(&frame).unwrap_err(),
            DescriptorError::UnknownMagic([0x33, 0x33, 0x00, 0x00])
        );
    }

    #[test]
    fn illegal_embedded_address_is_rejected() {
        let frame = frame_with(&[0x52, 0x46, 0x32, 0x34, 0x07, 0x00], 60);
        assert_eq!(
            LinkDescriptor::parse(&frame).unwrap_err(),
            DescriptorError::InvalidAddress(7)
        );
    }

    #[test]
    fn hardware_address_matches_descriptor_layout() {
        let address = NodeAddress::new(0o1234).unwrap();
        let mac = hardware_address(address);
        assert_eq!(&mac[..4], b"RF24");
        assert_eq!(u16::from_le_bytes([mac[4], mac[5]]), 0o1234);
        assert_eq!(
            LinkDescriptor::parse(&mac).unwrap(),
            LinkDescriptor::Unicast(address)
        );
        assert_eq!(LinkDescriptor::Unicast(address).to_bytes(), mac);
        assert_eq!(LinkDescriptor::Broadcast.to_bytes(), [0xFF; 6]);
    }

    #[test]
    fn ipv4_destination_octet_is_bounds_checked() {
        let mut packet = vec![0u8; 20];
        packet[16..20].copy_from_slice(&[10, 10, 2, 22]);
        assert_eq!(ipv4_destination_octet(&packet), Some(22));
        assert_eq!(ipv4_destination_octet(&packet[..19]), None);
    }
}
