//! Tourtrace Core - Realtime Tour Location Sharing
//!
//! This library bridges a local, possibly noisy, possibly failing device
//! location stream into:
//! 1. **Broadcast**: every accepted fix is published to a tour-scoped room
//! 2. **Peer view**: a last-write-wins roster of where everyone else is
//! 3. **Distances**: haversine great-circle distances to peers, the guide,
//!    or any coordinate

pub mod error;
pub mod geo;
pub mod reconnect;
pub mod roster;
pub mod session;
pub mod tracker;

// Re-export key types for convenience
pub use error::TrackError;
pub use geo::{haversine_km, haversine_m, EARTH_RADIUS_KM};
pub use reconnect::ReconnectPolicy;
pub use roster::{Roster, RosterConfig};
pub use session::{SessionPhase, TrackingSession};
pub use tracker::{TourTracker, TrackerConfig, TrackerEvent};
