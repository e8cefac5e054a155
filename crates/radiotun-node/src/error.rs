//! Error types for the bridge daemon.

use radiotun_core::CoreError;
use radiotun_interfaces::InterfaceError;

/// Errors that can occur while configuring or starting the bridge.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("interface error: {0}")]
    Interface(#[from] InterfaceError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("bridge already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_variants() {
        let cfg = NodeError::Config("bad".into());
        assert_eq!(cfg.to_string(), "configuration error: bad");

        let iface = NodeError::from(InterfaceError::NotStarted);
        assert_eq!(iface.to_string(), "interface error: radio not started");

        let core = NodeError::from(CoreError::InvalidDataRate(7));
        assert_eq!(
            core.to_string(),
            "unsupported data rate: 7 (expected 1, 2 or 250)"
        );

        assert_eq!(NodeError::AlreadyRunning.to_string(), "bridge already running");
    }
}
