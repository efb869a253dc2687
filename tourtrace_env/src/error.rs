//! Error types for the tourtrace collaborator interfaces.

use thiserror::Error;

/// Failures reported by a location provider.
///
/// These map one-to-one onto the reason codes a geolocation service exposes;
/// all of them are non-fatal to the tracking client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The host has no geolocation capability at all
    #[error("geolocation is not supported on this device")]
    Unsupported,

    /// The user (or platform policy) denied the location permission
    #[error("location permission denied")]
    PermissionDenied,

    /// The provider could not determine a position
    #[error("device position unavailable")]
    PositionUnavailable,

    /// No fix was produced within the configured window
    #[error("no position fix within {after_ms}ms")]
    Timeout {
        /// Configured timeout that elapsed
        after_ms: u64,
    },
}

/// Failures reported by the realtime channel.
///
/// The channel is best-effort; an `Io` error does not distinguish an
/// unreachable server from a slow one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Transport-level failure (send buffer full, connection refused, ...)
    #[error("channel error: {0}")]
    Io(String),

    /// The channel was shut down and will produce no further events
    #[error("channel closed")]
    Closed,

    /// An operation that requires a joined room was issued outside one
    #[error("no room joined")]
    NotJoined,
}

impl ChannelError {
    /// Creates a transport error from any displayable cause.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}
