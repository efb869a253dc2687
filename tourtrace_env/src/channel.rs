//! Realtime channel abstraction: room-scoped, best-effort location fan-out.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::types::{LocationSample, LocationUpdate, ParticipantId, ParticipantLocation, TourId};

/// Inbound event from the channel, routed through a single dispatcher per
/// session so liveness checks live in one place.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Another participant in the room reported a location
    Peer(ParticipantLocation),

    /// The tour's designated guide reported a location
    Guide(LocationSample),

    /// The channel lost its connection; room membership is gone until a
    /// rejoin succeeds
    Disconnected,

    /// The underlying connection is back; the room must be rejoined
    Reconnected,

    /// Asynchronous channel-level failure
    Error(ChannelError),
}

/// Abstraction for the bidirectional messaging channel.
///
/// Rooms are scoped by [`TourId`]; delivery is best-effort and at-most-once,
/// with no acknowledgement contract.
///
/// ```text
/// Client A                   Channel                   Client B
///   |                           |                          |
///   |-- publish_location() ---->|                          |
///   |                           |-- [room fan-out] ------->|
///   |                           |                          |-- next_event() -> Peer(..)
/// ```
#[async_trait]
pub trait RealtimeChannel: Send + Sync + 'static {
    /// Announces presence in a tour-scoped room.
    ///
    /// # Returns
    /// * `Ok(())` - the join was accepted by the transport
    /// * `Err(ChannelError)` - immediate failure; handshake failures after
    ///   this point surface as [`ChannelEvent::Error`] / [`ChannelEvent::Disconnected`]
    async fn join_room(&self, tour_id: &TourId) -> Result<(), ChannelError>;

    /// Announces departure from a room. Safe to call when never joined.
    async fn leave_room(&self, tour_id: &TourId) -> Result<(), ChannelError>;

    /// Broadcasts one location update to the room named in the update.
    ///
    /// Success means "queued for delivery", not "delivered".
    async fn publish_location(&self, update: LocationUpdate) -> Result<(), ChannelError>;

    /// Waits for the next inbound event.
    ///
    /// Returns `None` when the channel is shut down for good.
    async fn next_event(&self) -> Option<ChannelEvent>;

    /// Returns the next already-delivered event without waiting.
    fn try_next_event(&self) -> Option<ChannelEvent>;

    /// Returns this client's identity on the channel.
    fn local_id(&self) -> ParticipantId;
}
