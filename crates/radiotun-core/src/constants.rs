//! Protocol constants for the TUN/TAP to radio bridge.

// Frame sizes
/// Largest frame read from or written to the virtual interface.
pub const MAX_FRAME_SIZE: usize = 1514;
/// Largest payload the radio network layer delivers in one message.
pub const MAX_RADIO_PAYLOAD: usize = 1514;

/// Default depth of each inter-stage queue. At ~1500 bytes per frame this
/// caps in-flight data around 150 KB per direction.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

// Link descriptor layout
/// Magic prefix marking a radio-derived hardware address ("RF24").
pub const UNICAST_MAGIC: [u8; 4] = *b"RF24";
/// Magic prefix of an all-ones (broadcast) destination.
pub const BROADCAST_MAGIC: [u8; 4] = [0xFF; 4];
/// Byte offset of the magic within a frame.
pub const MAGIC_OFFSET: usize = 0;
/// Byte offset of the little-endian node address within a frame.
pub const ADDRESS_OFFSET: usize = 4;
/// Bytes needed to decode a descriptor.
pub const DESCRIPTOR_LEN: usize = 6;
/// Largest frame treated as address-resolution broadcast (ARP-class).
pub const BROADCAST_MAX_LEN: usize = 42;

/// Offset of the last octet of the IPv4 destination address in a raw
/// (no packet-info) IPv4 packet.
pub const IPV4_DEST_LAST_OCTET_OFFSET: usize = 19;

// Radio network
/// Address of the root/master node.
pub const ROOT_ADDRESS: u16 = 0;
/// Reserved multicast address of the radio network layer.
pub const MULTICAST_ADDRESS: u16 = 0o100;
/// Reserved default address used by mesh nodes before assignment.
pub const MESH_DEFAULT_ADDRESS: u16 = 0o4444;
/// Maximum number of octal digits (tree depth) in a node address.
pub const MAX_ADDRESS_DEPTH: u32 = 4;
/// Message type for bridged payloads ("external data").
pub const EXTERNAL_DATA_TYPE: u8 = 131;
/// Hop level used when the master re-broadcasts address-resolution frames.
pub const BROADCAST_HOP_LEVEL: u8 = 1;
/// Default radio channel.
pub const DEFAULT_CHANNEL: u8 = 97;
/// Mesh node id assigned to non-master nodes unless configured.
pub const DEFAULT_MESH_NODE_ID: u8 = 253;
