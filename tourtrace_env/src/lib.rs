//! Tourtrace Environment Abstraction Layer
//!
//! This crate provides the collaborator interfaces that let the tracking
//! client run against a real device in **Production** (tokio, OS services)
//! or against scripted fakes in **Simulation** (virtual clock, in-memory
//! channel router).
//!
//! # Core Concept: Injected Collaborators
//!
//! The client never touches an ambient global. Everything it needs from the
//! outside world comes in through three traits:
//! - Time (`now()`, `sleep()`) — [`TrackerContext`]
//! - Device location (`current_fix()`, `watch()`) — [`LocationProvider`]
//! - Room-scoped messaging (`join_room()`, `publish_location()`, `next_event()`) — [`RealtimeChannel`]
//!
//! # Example
//!
//! ```ignore
//! use tourtrace_env::{TrackerContext, LocationProvider, RealtimeChannel};
//!
//! async fn tracking_loop<Ctx, Loc, Chan>(ctx: &Ctx, provider: &Loc, channel: &Chan)
//! where
//!     Ctx: TrackerContext,
//!     Loc: LocationProvider,
//!     Chan: RealtimeChannel,
//! {
//!     loop {
//!         tokio::select! {
//!             event = channel.next_event() => handle_event(event),
//!             _ = ctx.sleep(Duration::from_secs(1)) => tick(),
//!         }
//!     }
//! }
//! ```

mod channel;
mod context;
mod error;
mod provider;
mod tokio_impl;
mod types;

pub use channel::{ChannelEvent, RealtimeChannel};
pub use context::TrackerContext;
pub use error::{ChannelError, LocationError};
pub use provider::{FixOptions, LocationProvider, PositionWatch, WatchFeed};
pub use tokio_impl::TokioContext;
pub use types::{
    Coordinate, LocationSample, LocationUpdate, ParticipantId, ParticipantLocation, TourId,
};
