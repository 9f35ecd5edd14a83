//! Error types for device supervision.
//!
//! [`SdrError`] consolidates the failure modes seen while supervising an
//! external sampling server: process spawn failures, control-channel faults,
//! malformed protocol replies and invalid configuration. None of these are
//! fatal to the owning process; controllers translate them into recovery
//! cycles or bus signals.

use thiserror::Error;

/// Convenience alias for results using the supervision error type.
pub type SdrResult<T> = std::result::Result<T, SdrError>;

/// Primary error type for device supervision.
#[derive(Error, Debug)]
pub enum SdrError {
    /// Standard I/O failure (socket or filesystem operation).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The external sampling server could not be started.
    ///
    /// Not retried automatically; recovery is driven by the owning registry
    /// through the remove/re-add cycle.
    #[error("failed to spawn sampling server '{prog}': {source}")]
    Spawn {
        prog: String,
        #[source]
        source: std::io::Error,
    },

    /// Control channel fault (connect, read or write).
    #[error("control channel error: {0}")]
    Channel(String),

    /// A reply record from the server could not be parsed.
    #[error("malformed reply record: {0}")]
    Reply(#[from] serde_json::Error),

    /// A parameter value cannot be represented on the wire.
    #[error("cannot encode parameter: {0}")]
    Encode(String),

    /// Driver configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The parameter name is not part of the device's command table.
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// The controller is shutting down and no longer accepts requests.
    #[error("controller is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SdrError::Channel("connection reset".to_string());
        assert_eq!(err.to_string(), "control channel error: connection reset");

        let err = SdrError::UnknownParameter("bandwidth".to_string());
        assert_eq!(err.to_string(), "unknown parameter 'bandwidth'");
    }

    #[test]
    fn test_spawn_error_carries_program() {
        let err = SdrError::Spawn {
            prog: "/usr/bin/rtl_tcp".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/usr/bin/rtl_tcp"));
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> SdrResult<()> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(SdrError::Io(_))));
    }
}
