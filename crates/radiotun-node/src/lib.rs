//! The radiotun bridge daemon.
//!
//! This crate wires a TUN/TAP device to the radio network through three
//! concurrent stages joined by two bounded frame queues, and provides the
//! configuration, logging and lifecycle management around them.

pub mod addressing;
pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod radio_bridge;
pub mod setup;
pub mod stats;
pub mod tun_reader;
pub mod tun_writer;

pub use addressing::{AddressingStrategy, Route, RouteError};
pub use bridge::{Bridge, ShutdownHandle, ShutdownReport};
pub use config::{BridgeConfig, ConfigFile, Overrides, Timing};
pub use error::NodeError;
pub use stats::{BridgeStats, StatsSnapshot};
