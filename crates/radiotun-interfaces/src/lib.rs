//! Collaborators of the radiotun bridge.
//!
//! This crate provides the traits the bridge uses to talk to the local
//! virtual interface and the radio network, a Linux TUN/TAP device, a
//! UDP-backed emulation of the radio network, and the shared shutdown token.

pub mod error;
pub mod shutdown;
pub mod testing;
pub mod traits;
#[cfg(target_os = "linux")]
pub mod tun;
pub mod udp;

pub use error::InterfaceError;
pub use shutdown::{ShutdownToken, StopSignal};
pub use traits::{MeshSettings, RadioHeader, RadioSettings, RadioTransport, VirtualInterface};
