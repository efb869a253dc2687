//! Common types shared by the tracking client and its collaborators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A geographic coordinate in WGS84 degrees.
///
/// Valid latitudes span [-90, 90] and longitudes [-180, 180]; values are
/// captured once from a provider fix and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a new coordinate.
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns true if both components are within their WGS84 ranges.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

/// A single reported device position ("fix") with accuracy and timestamp.
///
/// Produced by a [`crate::LocationProvider`]; never mutated, only superseded
/// by newer samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Reported position
    pub position: Coordinate,

    /// Estimated accuracy radius in meters
    pub accuracy_m: f64,

    /// Capture time in milliseconds since the Unix epoch (provider clock)
    pub captured_at_ms: u64,
}

impl LocationSample {
    /// Creates a new sample.
    pub fn new(position: Coordinate, accuracy_m: f64, captured_at_ms: u64) -> Self {
        Self {
            position,
            accuracy_m,
            captured_at_ms,
        }
    }
}

/// Identifier of a tour-scoped channel room.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TourId(String);

impl TourId {
    /// Creates a tour id from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty (rejected by `join`).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for TourId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identity of a participant on the channel.
///
/// The wire key of the peer set: at most one last-known location is held
/// per participant id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a participant id from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the inner identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last-known location of one participant, keyed by identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantLocation {
    /// Sender identity
    pub participant_id: ParticipantId,

    /// Most recently applied sample for that sender
    pub sample: LocationSample,
}

impl ParticipantLocation {
    /// Creates a participant location record.
    pub fn new(participant_id: ParticipantId, sample: LocationSample) -> Self {
        Self {
            participant_id,
            sample,
        }
    }
}

/// The outbound wire record: one fix, tagged with its tour and sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    /// Room the update belongs to
    pub tour_id: TourId,

    /// Sender identity
    pub participant_id: ParticipantId,

    /// The fix being shared
    pub sample: LocationSample,
}
