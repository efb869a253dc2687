//! Consumer-facing error taxonomy.

use tourtrace_env::{ChannelError, LocationError};

/// Errors surfaced through the tracker's "last error" slot.
///
/// All of these are non-fatal: they are recorded for UI display and never
/// crash the tracker. Recovery is a manual `start_tracking()` retry, except
/// for channel disconnects which the tracker rejoins on its own.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackError {
    /// The host has no geolocation capability; tracking cannot start
    #[error("geolocation is not supported on this device")]
    CapabilityUnavailable,

    /// The location permission was denied
    #[error("location permission denied")]
    PermissionDenied,

    /// The provider could not determine a position
    #[error("device position unavailable")]
    PositionUnavailable,

    /// No fix arrived within the provider's configured window
    #[error("no position fix within {after_ms}ms")]
    Timeout {
        /// Configured timeout that elapsed
        after_ms: u64,
    },

    /// Opaque messaging-channel failure
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// `join` was called with an empty tour identifier
    #[error("tour id must be non-empty")]
    InvalidTourId,

    /// An operation that needs a session was issued while idle
    #[error("no active tour session")]
    NotJoined,

    /// A fix carried coordinates outside the WGS84 ranges
    #[error("invalid coordinates: lat={latitude}, lon={longitude}")]
    InvalidCoordinates {
        latitude: f64,
        longitude: f64,
    },
}

impl From<LocationError> for TrackError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::Unsupported => TrackError::CapabilityUnavailable,
            LocationError::PermissionDenied => TrackError::PermissionDenied,
            LocationError::PositionUnavailable => TrackError::PositionUnavailable,
            LocationError::Timeout { after_ms } => TrackError::Timeout { after_ms },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_error_mapping() {
        assert_eq!(
            TrackError::from(LocationError::PermissionDenied),
            TrackError::PermissionDenied
        );
        assert_eq!(
            TrackError::from(LocationError::Timeout { after_ms: 10_000 }),
            TrackError::Timeout { after_ms: 10_000 }
        );
    }

    #[test]
    fn test_channel_error_wraps() {
        let err: TrackError = ChannelError::io("socket reset").into();
        assert!(matches!(err, TrackError::Channel(ChannelError::Io(_))));
    }
}
