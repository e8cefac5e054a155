//! Error types for the interfaces layer.

use radiotun_core::CoreError;

/// Errors that can occur while driving the virtual interface or the radio.
#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("device closed")]
    Closed,
    #[error("failed to allocate {name}: {reason}")]
    Allocation { name: String, reason: String },
    #[error("radio not started")]
    NotStarted,
    #[error("transmit failed: {0}")]
    TransmitFailed(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl InterfaceError {
    /// Whether the failing handle can no longer be used at all.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Closed | Self::NotStarted => true,
            Self::Io(e) => e.raw_os_error() == Some(libc::EBADF),
            _ => false,
        }
    }
}
