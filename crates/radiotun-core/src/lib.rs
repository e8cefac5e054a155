//! Core types, constants, and wire formats for the radiotun bridge.
//!
//! This crate defines the radio node addressing space, the frame and bounded
//! frame queue shared by the pipeline stages, and the link-descriptor
//! micro-format used to route Ethernet frames onto the radio network.

pub mod constants;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod queue;
pub mod types;

pub use descriptor::{LinkDescriptor, hardware_address, ipv4_destination_octet};
pub use error::{CoreError, DescriptorError};
pub use frame::Frame;
pub use queue::{FrameQueue, PopError, PushError};
pub use types::{DataRate, InterfaceMode, MeshNodeId, NodeAddress};
