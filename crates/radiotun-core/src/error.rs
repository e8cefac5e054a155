//! Error types for the radiotun-core crate.

/// Errors raised while validating addressing and configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid node address: {0}")]
    InvalidAddress(String),
    #[error("unsupported data rate: {0} (expected 1, 2 or 250)")]
    InvalidDataRate(u16),
    #[error("invalid mesh node id: {0}")]
    InvalidMeshNodeId(u16),
}

/// Errors raised while decoding the link descriptor at the head of a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("frame too short: need at least {min} bytes, got {actual}")]
    TooShort { min: usize, actual: usize },
    #[error("unrecognized address magic: {0:02x?}")]
    UnknownMagic([u8; 4]),
    #[error("descriptor carries an illegal node address: {0:#o}")]
    InvalidAddress(u16),
}
