//! Error types for the bus and the broker transport.
//!
//! Broker failures are recovered locally along the background publish,
//! refresh, and dispatch paths: they are logged and dropped there. The
//! variants below surface from lifecycle calls, configuration, and the
//! publish forms callers choose to await.

use thiserror::Error;

/// Failure reported by a [`crate::broker::BrokerConnection`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The transport is disconnected or refused the command.
    ///
    /// Reconnection is the transport's own business; the bus only logs.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The connection was closed by its owner.
    #[error("broker connection closed")]
    Closed,
}

/// Errors produced by the bus, its codec, and the public facade.
#[derive(Debug, Error)]
pub enum BusError {
    /// A received frame did not split into source, channel, and payload.
    #[error("malformed frame: {frame:?}")]
    MalformedFrame {
        /// The raw text that failed to decode.
        frame: String,
    },

    /// Transport failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Identity or hub name missing or invalid at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The facade was already shut down.
    #[error("bus has been shut down")]
    ShutDown,

    /// The facade has not been started yet.
    #[error("bus is not running")]
    NotRunning,

    /// A channel name contained the frame delimiter.
    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),

    /// A blocking call was made from a thread driving the async runtime.
    #[error("blocking publish called from within an async context")]
    BlockingInAsyncContext,
}

/// Convenience alias used across the crate.
pub type Result<T, E = BusError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_error_converts_into_bus_error() {
        let err: BusError = BrokerError::Unavailable("connection reset".into()).into();
        assert!(matches!(err, BusError::Broker(BrokerError::Unavailable(_))));
        assert_eq!(err.to_string(), "broker unavailable: connection reset");
    }

    #[test]
    fn test_malformed_frame_display_quotes_input() {
        let err = BusError::MalformedFrame {
            frame: "only/\\two".into(),
        };
        assert_eq!(err.to_string(), r#"malformed frame: "only/\\two""#);
    }
}
