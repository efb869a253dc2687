//! The tracking client: one instance per mounted tour view.
//!
//! Bridges the device location stream into a room broadcast and keeps the
//! local view of everyone else's position. Generic over the context,
//! provider, and channel implementations, so the same client code runs in
//! production (tokio, real device) or simulation (virtual clock, scripted
//! provider, in-memory router).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       TourTracker                        │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │            Context: TrackerContext                 │  │
//! │  │  • epoch_ms() → sample timestamps                  │  │
//! │  │  • sleep()    → rejoin backoff                     │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                                                          │
//! │  LocationProvider ──fixes──▶ session ──▶ RealtimeChannel │
//! │                               │  ▲                       │
//! │                               ▼  └──peer/guide events    │
//! │                             Roster                       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! All mutation happens through `&mut self` from the single task that owns
//! the instance; there is no internal locking and no ordering assumption
//! between fix callbacks and channel events beyond arrival order.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use tourtrace_env::{
    ChannelError, ChannelEvent, Coordinate, FixOptions, LocationError, LocationProvider,
    LocationSample, LocationUpdate, ParticipantId, ParticipantLocation, PositionWatch,
    RealtimeChannel, TourId, TrackerContext,
};

use crate::error::TrackError;
use crate::geo::haversine_km;
use crate::reconnect::ReconnectPolicy;
use crate::roster::{Roster, RosterConfig};
use crate::session::{SessionPhase, TrackingSession};

/// Configuration for a tracker instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerConfig {
    /// Accuracy/timeout knobs passed to the provider
    pub fix_options: FixOptions,

    /// Conflict policy for inbound samples
    pub roster: RosterConfig,

    /// Backoff schedule for room rejoin after a disconnect
    pub reconnect: ReconnectPolicy,
}

/// One unit of asynchronous work for the tracker.
///
/// Produced by [`TourTracker::next_event`] / [`TourTracker::try_next_event`]
/// and consumed by [`TourTracker::apply`]; every inbound callback funnels
/// through this single dispatch point so the session liveness guard is
/// centralized.
#[derive(Debug)]
pub enum TrackerEvent {
    /// A fix (or provider error) from the continuous watch
    Fix(Result<LocationSample, LocationError>),

    /// An inbound channel event
    Channel(ChannelEvent),
}

enum Pumped {
    Fix(Option<Result<LocationSample, LocationError>>),
    Channel(Option<ChannelEvent>),
}

/// The location-sharing client.
pub struct TourTracker<Ctx, Loc, Chan>
where
    Ctx: TrackerContext,
    Loc: LocationProvider,
    Chan: RealtimeChannel,
{
    context: Arc<Ctx>,
    provider: Arc<Loc>,
    channel: Arc<Chan>,
    config: TrackerConfig,

    session: Option<TrackingSession>,
    self_location: Option<LocationSample>,
    roster: Roster,
    last_error: Option<TrackError>,
    watch: Option<PositionWatch>,

    disconnected: bool,
    reconnect_attempts: u32,
    reconnects: u64,
    rng: StdRng,
}

impl<Ctx, Loc, Chan> TourTracker<Ctx, Loc, Chan>
where
    Ctx: TrackerContext,
    Loc: LocationProvider,
    Chan: RealtimeChannel,
{
    /// Creates a tracker over the given collaborators.
    pub fn new(context: Arc<Ctx>, provider: Arc<Loc>, channel: Arc<Chan>, config: TrackerConfig) -> Self {
        let roster = Roster::new(config.roster);
        Self {
            context,
            provider,
            channel,
            config,
            session: None,
            self_location: None,
            roster,
            last_error: None,
            watch: None,
            disconnected: false,
            reconnect_attempts: 0,
            reconnects: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeds the backoff jitter RNG for reproducible schedules.
    pub fn with_backoff_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    // ========================================================================
    // SESSION LIFECYCLE
    // ========================================================================

    /// Enters the tour-scoped room.
    ///
    /// An empty tour id is rejected. If a session is already active, it is
    /// left first. Failures are recorded in the last-error slot; handshake
    /// failures past the initial send surface later as channel events.
    pub async fn join(&mut self, tour_id: TourId) {
        if tour_id.is_empty() {
            self.last_error = Some(TrackError::InvalidTourId);
            return;
        }
        if self.session.is_some() {
            self.leave().await;
        }

        let self_id = self.channel.local_id();
        info!(tour = %tour_id, participant = %self_id, "joining tour room");

        // Fresh session, fresh view of the room
        self.roster.clear();

        match self.channel.join_room(&tour_id).await {
            Ok(()) => {
                self.session = Some(TrackingSession::joined(tour_id, self_id));
                self.disconnected = false;
                self.reconnect_attempts = 0;
            }
            Err(err) => {
                warn!(tour = %tour_id, error = %err, "join failed");
                self.last_error = Some(err.into());
            }
        }
    }

    /// Announces departure and releases the session. Idempotent.
    ///
    /// After this returns, no further inbound event is applied until the
    /// next `join`. Roster contents are left as-is (frozen), matching the
    /// rule that departure does not retroactively undo prior state.
    pub async fn leave(&mut self) {
        self.stop_tracking();
        let Some(session) = self.session.take() else {
            return;
        };

        info!(tour = %session.tour_id, "leaving tour room");
        if let Err(err) = self.channel.leave_room(&session.tour_id).await {
            // Departure is best-effort; the room will age us out
            debug!(error = %err, "leave_room failed");
        }
        self.disconnected = false;
        self.reconnect_attempts = 0;
    }

    /// Forced teardown for view unmount: cancel the watch, leave the room.
    pub async fn shutdown(&mut self) {
        self.stop_tracking();
        self.leave().await;
    }

    // ========================================================================
    // TRACKING LIFECYCLE
    // ========================================================================

    /// Requests an initial fix, then begins continuous observation.
    ///
    /// Re-entrant: a call while already tracking is a no-op, so two calls
    /// can never hold two subscriptions. All failures (missing capability,
    /// permission denial, timeout, no position) land in the last-error slot
    /// and leave the session in `Joined`; nothing is thrown.
    pub async fn start_tracking(&mut self) {
        match self.session.as_ref().map(|s| s.is_tracking()) {
            None => {
                self.last_error = Some(TrackError::NotJoined);
                return;
            }
            Some(true) => {
                debug!("start_tracking while tracking is a no-op");
                return;
            }
            Some(false) => {}
        }

        if !self.provider.is_available() {
            warn!("geolocation capability missing on this host");
            self.last_error = Some(TrackError::CapabilityUnavailable);
            return;
        }

        // One-shot fix first; a failure here means tracking does not start
        let initial = match self.provider.current_fix(&self.config.fix_options).await {
            Ok(sample) => sample,
            Err(err) => {
                warn!(error = %err, "initial fix failed");
                self.last_error = Some(err.into());
                return;
            }
        };

        let watch = match self.provider.watch(&self.config.fix_options) {
            Ok(watch) => watch,
            Err(err) => {
                warn!(error = %err, "watch registration failed");
                self.last_error = Some(err.into());
                return;
            }
        };
        self.watch = Some(watch);

        if let Some(session) = &mut self.session {
            session.phase = SessionPhase::Tracking;
        }
        info!("tracking started");

        self.accept_self_fix(initial).await;
    }

    /// Cancels the active observation, if any. Idempotent, synchronous.
    ///
    /// No fix delivered after this returns is applied; an already-in-flight
    /// callback is discarded by the liveness guard.
    pub fn stop_tracking(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.cancel();
            info!("tracking stopped");
        }
        if let Some(session) = &mut self.session {
            if session.phase == SessionPhase::Tracking {
                session.phase = SessionPhase::Joined;
            }
        }
    }

    // ========================================================================
    // EVENT LOOP
    // ========================================================================

    /// Waits for the next unit of work from either the watch or the channel.
    ///
    /// Returns `None` once the channel shuts down and no watch is live.
    pub async fn next_event(&mut self) -> Option<TrackerEvent> {
        loop {
            if let Some(watch) = self.watch.as_mut() {
                let pumped = tokio::select! {
                    biased;
                    fix = watch.recv() => Pumped::Fix(fix),
                    event = self.channel.next_event() => Pumped::Channel(event),
                };
                match pumped {
                    Pumped::Fix(Some(result)) => return Some(TrackerEvent::Fix(result)),
                    // Watch cancelled or provider dropped the feed
                    Pumped::Fix(None) => self.watch = None,
                    Pumped::Channel(event) => return event.map(TrackerEvent::Channel),
                }
            } else {
                return self.channel.next_event().await.map(TrackerEvent::Channel);
            }
        }
    }

    /// Returns the next already-delivered unit of work without waiting.
    pub fn try_next_event(&mut self) -> Option<TrackerEvent> {
        if let Some(watch) = self.watch.as_mut() {
            if let Some(result) = watch.try_recv() {
                return Some(TrackerEvent::Fix(result));
            }
        }
        self.channel.try_next_event().map(TrackerEvent::Channel)
    }

    /// Applies one unit of work to the local state.
    pub async fn apply(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::Fix(Ok(sample)) => self.accept_self_fix(sample).await,
            TrackerEvent::Fix(Err(err)) => {
                // Watch errors are transient; observation continues
                if self.is_tracking() {
                    warn!(error = %err, "watch reported an error");
                    self.last_error = Some(err.into());
                }
            }
            TrackerEvent::Channel(event) => self.apply_channel_event(event).await,
        }
    }

    /// Drains everything already delivered. For tick-driven hosts.
    pub async fn pump(&mut self) {
        while let Some(event) = self.try_next_event() {
            self.apply(event).await;
        }
    }

    /// Blocking event loop for production hosts: applies events as they
    /// arrive and runs the rejoin backoff whenever the channel drops.
    pub async fn drive(&mut self) {
        loop {
            if self.needs_reconnect() {
                self.reconnect_once().await;
                continue;
            }
            match self.next_event().await {
                Some(event) => self.apply(event).await,
                None => break,
            }
        }
    }

    async fn accept_self_fix(&mut self, sample: LocationSample) {
        // Liveness guard: a callback that lands after stop_tracking() is a no-op
        if !self.is_tracking() {
            debug!("discarding fix outside an active tracking phase");
            return;
        }

        if !sample.position.is_valid() {
            self.last_error = Some(TrackError::InvalidCoordinates {
                latitude: sample.position.latitude,
                longitude: sample.position.longitude,
            });
            return;
        }

        if let Some(existing) = &self.self_location {
            if self.config.roster.reject_stale && sample.captured_at_ms < existing.captured_at_ms {
                debug!(
                    incoming_ms = sample.captured_at_ms,
                    stored_ms = existing.captured_at_ms,
                    "discarding stale self fix"
                );
                return;
            }
        }
        self.self_location = Some(sample);

        let Some(session) = &self.session else {
            return;
        };
        let update = LocationUpdate {
            tour_id: session.tour_id.clone(),
            participant_id: session.self_id.clone(),
            sample,
        };
        if let Err(err) = self.channel.publish_location(update).await {
            warn!(error = %err, "location broadcast failed");
            self.last_error = Some(err.into());
        }
    }

    async fn apply_channel_event(&mut self, event: ChannelEvent) {
        // Liveness guard: after leave(), inbound events no longer apply
        let Some(session) = &self.session else {
            debug!("discarding channel event outside a session");
            return;
        };

        match event {
            ChannelEvent::Peer(update) => {
                if update.participant_id == session.self_id {
                    return;
                }
                self.roster.upsert_peer(update);
            }
            ChannelEvent::Guide(sample) => {
                self.roster.set_guide(sample);
            }
            ChannelEvent::Disconnected => {
                warn!(tour = %session.tour_id, "channel disconnected");
                self.disconnected = true;
                self.last_error = Some(TrackError::Channel(ChannelError::io("connection lost")));
            }
            ChannelEvent::Reconnected => {
                let tour = session.tour_id.clone();
                info!(tour = %tour, "channel reconnected, rejoining room");
                match self.channel.join_room(&tour).await {
                    Ok(()) => {
                        self.disconnected = false;
                        self.reconnect_attempts = 0;
                        self.reconnects += 1;
                    }
                    Err(err) => {
                        self.disconnected = true;
                        self.last_error = Some(err.into());
                    }
                }
            }
            ChannelEvent::Error(err) => {
                warn!(error = %err, "channel error");
                self.last_error = Some(TrackError::Channel(err));
            }
        }
    }

    // ========================================================================
    // RECONNECT
    // ========================================================================

    /// True while a session exists but the channel connection is down.
    pub fn needs_reconnect(&self) -> bool {
        self.disconnected && self.session.is_some()
    }

    /// One backoff-delayed rejoin attempt.
    ///
    /// The delay comes from the configured [`ReconnectPolicy`] and is slept
    /// on the context, so simulated clocks make this instantaneous.
    pub async fn reconnect_once(&mut self) {
        if !self.needs_reconnect() {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let tour = session.tour_id.clone();

        let delay = self.config.reconnect.delay(self.reconnect_attempts, &mut self.rng);
        self.reconnect_attempts += 1;
        debug!(
            tour = %tour,
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "rejoin backoff"
        );
        self.context.sleep(delay).await;

        match self.channel.join_room(&tour).await {
            Ok(()) => {
                info!(tour = %tour, "rejoined tour room");
                self.disconnected = false;
                self.reconnect_attempts = 0;
                self.reconnects += 1;
            }
            Err(err) => {
                debug!(error = %err, "rejoin attempt failed");
                self.last_error = Some(err.into());
            }
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// The active session, if any.
    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    /// Last accepted own fix.
    pub fn self_location(&self) -> Option<&LocationSample> {
        self.self_location.as_ref()
    }

    /// True while the observation subscription is live.
    pub fn is_tracking(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.is_tracking())
    }

    /// Last-known locations of the other participants.
    pub fn peers(&self) -> impl Iterator<Item = &ParticipantLocation> {
        self.roster.peers()
    }

    /// Number of distinct participants seen this session.
    pub fn peer_count(&self) -> usize {
        self.roster.peer_count()
    }

    /// Last-known location of one participant.
    pub fn peer(&self, id: &ParticipantId) -> Option<&ParticipantLocation> {
        self.roster.peer(id)
    }

    /// The guide's last-known location.
    pub fn guide_location(&self) -> Option<&LocationSample> {
        self.roster.guide()
    }

    /// Most recent error, if any. Last write wins; no history.
    pub fn last_error(&self) -> Option<&TrackError> {
        self.last_error.as_ref()
    }

    /// Completed room rejoins.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Inbound samples dropped by the stale guard.
    pub fn stale_discards(&self) -> u64 {
        self.roster.stale_discards()
    }

    /// Great-circle distance from the last own fix to a target, in km.
    /// `None` until a fix has been accepted.
    pub fn distance_to_coordinate(&self, target: &Coordinate) -> Option<f64> {
        let own = self.self_location.as_ref()?;
        Some(haversine_km(&own.position, target))
    }

    /// Great-circle distance to a peer's last-known position, in km.
    /// `None` if either side is unknown.
    pub fn distance_to_peer(&self, id: &ParticipantId) -> Option<f64> {
        let own = self.self_location.as_ref()?;
        let peer = self.roster.peer(id)?;
        Some(haversine_km(&own.position, &peer.sample.position))
    }

    /// Great-circle distance to the guide's last-known position, in km.
    pub fn distance_to_guide(&self) -> Option<f64> {
        let own = self.self_location.as_ref()?;
        let guide = self.roster.guide()?;
        Some(haversine_km(&own.position, &guide.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tourtrace_env::{TokioContext, WatchFeed};

    const MUMBAI: Coordinate = Coordinate {
        latitude: 19.0760,
        longitude: 72.8777,
    };
    const GOA: Coordinate = Coordinate {
        latitude: 15.2993,
        longitude: 74.1240,
    };

    fn sample_at(coord: Coordinate, ts: u64) -> LocationSample {
        LocationSample::new(coord, 8.0, ts)
    }

    struct StubProvider {
        available: AtomicBool,
        fixes: Mutex<VecDeque<Result<LocationSample, LocationError>>>,
        watch_calls: AtomicUsize,
        feeds: Mutex<Vec<WatchFeed>>,
    }

    impl StubProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                available: AtomicBool::new(true),
                fixes: Mutex::new(VecDeque::new()),
                watch_calls: AtomicUsize::new(0),
                feeds: Mutex::new(Vec::new()),
            })
        }

        fn queue_fix(&self, result: Result<LocationSample, LocationError>) {
            self.fixes.lock().unwrap().push_back(result);
        }

        fn emit(&self, sample: LocationSample) {
            for feed in self.feeds.lock().unwrap().iter() {
                feed.push(Ok(sample));
            }
        }

        fn watch_calls(&self) -> usize {
            self.watch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LocationProvider for StubProvider {
        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        async fn current_fix(
            &self,
            _options: &FixOptions,
        ) -> Result<LocationSample, LocationError> {
            self.fixes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LocationError::PositionUnavailable))
        }

        fn watch(&self, _options: &FixOptions) -> Result<PositionWatch, LocationError> {
            self.watch_calls.fetch_add(1, Ordering::SeqCst);
            let (feed, watch) = PositionWatch::pair();
            self.feeds.lock().unwrap().push(feed);
            Ok(watch)
        }
    }

    struct StubChannel {
        id: ParticipantId,
        joins: Mutex<Vec<TourId>>,
        leaves: Mutex<Vec<TourId>>,
        published: Mutex<Vec<LocationUpdate>>,
        events_tx: mpsc::UnboundedSender<ChannelEvent>,
        events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ChannelEvent>>,
    }

    impl StubChannel {
        fn new(id: &str) -> Arc<Self> {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            Arc::new(Self {
                id: ParticipantId::new(id),
                joins: Mutex::new(Vec::new()),
                leaves: Mutex::new(Vec::new()),
                published: Mutex::new(Vec::new()),
                events_tx,
                events_rx: tokio::sync::Mutex::new(events_rx),
            })
        }

        fn inject(&self, event: ChannelEvent) {
            self.events_tx.send(event).unwrap();
        }

        fn published(&self) -> Vec<LocationUpdate> {
            self.published.lock().unwrap().clone()
        }

        fn join_count(&self) -> usize {
            self.joins.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RealtimeChannel for StubChannel {
        async fn join_room(&self, tour_id: &TourId) -> Result<(), ChannelError> {
            self.joins.lock().unwrap().push(tour_id.clone());
            Ok(())
        }

        async fn leave_room(&self, tour_id: &TourId) -> Result<(), ChannelError> {
            self.leaves.lock().unwrap().push(tour_id.clone());
            Ok(())
        }

        async fn publish_location(&self, update: LocationUpdate) -> Result<(), ChannelError> {
            self.published.lock().unwrap().push(update);
            Ok(())
        }

        async fn next_event(&self) -> Option<ChannelEvent> {
            self.events_rx.lock().await.recv().await
        }

        fn try_next_event(&self) -> Option<ChannelEvent> {
            self.events_rx.try_lock().ok()?.try_recv().ok()
        }

        fn local_id(&self) -> ParticipantId {
            self.id.clone()
        }
    }

    type TestTracker = TourTracker<TokioContext, StubProvider, StubChannel>;

    fn tracker_with(provider: Arc<StubProvider>, channel: Arc<StubChannel>) -> TestTracker {
        TourTracker::new(
            TokioContext::shared(),
            provider,
            channel,
            TrackerConfig::default(),
        )
        .with_backoff_seed(7)
    }

    async fn joined_tracker() -> (TestTracker, Arc<StubProvider>, Arc<StubChannel>) {
        let provider = StubProvider::new();
        let channel = StubChannel::new("me");
        let mut tracker = tracker_with(Arc::clone(&provider), Arc::clone(&channel));
        tracker.join(TourId::new("tour-42")).await;
        (tracker, provider, channel)
    }

    #[tokio::test]
    async fn test_join_rejects_empty_tour_id() {
        let provider = StubProvider::new();
        let channel = StubChannel::new("me");
        let mut tracker = tracker_with(provider, Arc::clone(&channel));

        tracker.join(TourId::new("")).await;

        assert!(tracker.session().is_none());
        assert_eq!(tracker.last_error(), Some(&TrackError::InvalidTourId));
        assert_eq!(channel.join_count(), 0);
    }

    #[tokio::test]
    async fn test_start_tracking_requires_session() {
        let provider = StubProvider::new();
        let channel = StubChannel::new("me");
        let mut tracker = tracker_with(provider, channel);

        tracker.start_tracking().await;

        assert!(!tracker.is_tracking());
        assert_eq!(tracker.last_error(), Some(&TrackError::NotJoined));
    }

    #[tokio::test]
    async fn test_missing_capability_blocks_tracking() {
        let (mut tracker, provider, _channel) = joined_tracker().await;
        provider.available.store(false, Ordering::SeqCst);

        tracker.start_tracking().await;

        assert!(!tracker.is_tracking());
        assert_eq!(
            tracker.last_error(),
            Some(&TrackError::CapabilityUnavailable)
        );
        assert_eq!(provider.watch_calls(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_blocks_tracking() {
        let (mut tracker, provider, _channel) = joined_tracker().await;
        provider.queue_fix(Err(LocationError::PermissionDenied));

        tracker.start_tracking().await;

        assert!(!tracker.is_tracking());
        assert_eq!(tracker.last_error(), Some(&TrackError::PermissionDenied));
        assert_eq!(provider.watch_calls(), 0);
    }

    #[tokio::test]
    async fn test_start_broadcasts_initial_fix() {
        let (mut tracker, provider, channel) = joined_tracker().await;
        provider.queue_fix(Ok(sample_at(MUMBAI, 1000)));

        tracker.start_tracking().await;

        assert!(tracker.is_tracking());
        assert_eq!(tracker.self_location().unwrap().captured_at_ms, 1000);

        let published = channel.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].tour_id, TourId::new("tour-42"));
        assert_eq!(published[0].participant_id, ParticipantId::new("me"));
    }

    #[tokio::test]
    async fn test_double_start_registers_one_watch() {
        let (mut tracker, provider, _channel) = joined_tracker().await;
        provider.queue_fix(Ok(sample_at(MUMBAI, 1000)));
        provider.queue_fix(Ok(sample_at(MUMBAI, 2000)));

        tracker.start_tracking().await;
        tracker.start_tracking().await;

        assert_eq!(provider.watch_calls(), 1);
        // The second call must not have consumed another fix
        assert_eq!(tracker.self_location().unwrap().captured_at_ms, 1000);
    }

    #[tokio::test]
    async fn test_watch_fixes_update_and_broadcast() {
        let (mut tracker, provider, channel) = joined_tracker().await;
        provider.queue_fix(Ok(sample_at(MUMBAI, 1000)));
        tracker.start_tracking().await;

        provider.emit(sample_at(GOA, 2000));
        tracker.pump().await;

        assert_eq!(tracker.self_location().unwrap().captured_at_ms, 2000);
        assert_eq!(channel.published().len(), 2);
    }

    #[tokio::test]
    async fn test_fix_after_stop_is_discarded() {
        let (mut tracker, provider, channel) = joined_tracker().await;
        provider.queue_fix(Ok(sample_at(MUMBAI, 1000)));
        tracker.start_tracking().await;

        tracker.stop_tracking();
        assert!(!tracker.is_tracking());

        // An already-in-flight callback delivered after cancellation
        tracker
            .apply(TrackerEvent::Fix(Ok(sample_at(GOA, 2000))))
            .await;

        assert_eq!(tracker.self_location().unwrap().captured_at_ms, 1000);
        assert_eq!(channel.published().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_tracking_is_idempotent() {
        let (mut tracker, provider, _channel) = joined_tracker().await;
        provider.queue_fix(Ok(sample_at(MUMBAI, 1000)));
        tracker.start_tracking().await;

        tracker.stop_tracking();
        tracker.stop_tracking();

        assert!(!tracker.is_tracking());
        assert!(tracker.session().is_some());
    }

    #[tokio::test]
    async fn test_peer_events_upsert_roster() {
        let (mut tracker, _provider, _channel) = joined_tracker().await;

        let p1 = ParticipantId::new("p1");
        tracker
            .apply(TrackerEvent::Channel(ChannelEvent::Peer(
                ParticipantLocation::new(p1.clone(), sample_at(GOA, 1000)),
            )))
            .await;
        assert_eq!(tracker.peer_count(), 1);

        tracker
            .apply(TrackerEvent::Channel(ChannelEvent::Peer(
                ParticipantLocation::new(p1.clone(), sample_at(GOA, 2000)),
            )))
            .await;
        assert_eq!(tracker.peer_count(), 1);
        assert_eq!(tracker.peer(&p1).unwrap().sample.captured_at_ms, 2000);
    }

    #[tokio::test]
    async fn test_own_echo_is_ignored() {
        let (mut tracker, _provider, _channel) = joined_tracker().await;

        tracker
            .apply(TrackerEvent::Channel(ChannelEvent::Peer(
                ParticipantLocation::new(ParticipantId::new("me"), sample_at(GOA, 1000)),
            )))
            .await;

        assert_eq!(tracker.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_events_after_leave_are_discarded() {
        let (mut tracker, _provider, _channel) = joined_tracker().await;

        tracker
            .apply(TrackerEvent::Channel(ChannelEvent::Peer(
                ParticipantLocation::new(ParticipantId::new("p1"), sample_at(GOA, 1000)),
            )))
            .await;
        tracker.leave().await;

        tracker
            .apply(TrackerEvent::Channel(ChannelEvent::Peer(
                ParticipantLocation::new(ParticipantId::new("p2"), sample_at(GOA, 2000)),
            )))
            .await;
        tracker
            .apply(TrackerEvent::Channel(ChannelEvent::Guide(sample_at(
                GOA, 2000,
            ))))
            .await;

        // Frozen at pre-leave state
        assert_eq!(tracker.peer_count(), 1);
        assert!(tracker.guide_location().is_none());
    }

    #[tokio::test]
    async fn test_rejoin_clears_roster() {
        let (mut tracker, _provider, _channel) = joined_tracker().await;

        tracker
            .apply(TrackerEvent::Channel(ChannelEvent::Peer(
                ParticipantLocation::new(ParticipantId::new("p1"), sample_at(GOA, 1000)),
            )))
            .await;
        tracker.leave().await;
        tracker.join(TourId::new("tour-43")).await;

        assert_eq!(tracker.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_guide_updates_fill_guide_slot() {
        let (mut tracker, _provider, _channel) = joined_tracker().await;

        tracker
            .apply(TrackerEvent::Channel(ChannelEvent::Guide(sample_at(
                GOA, 1000,
            ))))
            .await;

        assert!(tracker.guide_location().is_some());
        assert_eq!(tracker.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_distance_queries_need_self_location() {
        let (mut tracker, provider, _channel) = joined_tracker().await;
        let p1 = ParticipantId::new("p1");

        assert!(tracker.distance_to_coordinate(&GOA).is_none());
        assert!(tracker.distance_to_peer(&p1).is_none());
        assert!(tracker.distance_to_guide().is_none());

        provider.queue_fix(Ok(sample_at(MUMBAI, 1000)));
        tracker.start_tracking().await;

        let d = tracker.distance_to_coordinate(&GOA).unwrap();
        assert!((435.0..445.0).contains(&d), "got {d} km");

        // Peer still unknown
        assert!(tracker.distance_to_peer(&p1).is_none());

        tracker
            .apply(TrackerEvent::Channel(ChannelEvent::Peer(
                ParticipantLocation::new(p1.clone(), sample_at(GOA, 1000)),
            )))
            .await;
        let d = tracker.distance_to_peer(&p1).unwrap();
        assert!((435.0..445.0).contains(&d), "got {d} km");
    }

    #[tokio::test]
    async fn test_distance_to_self_position_is_zero() {
        let (mut tracker, provider, _channel) = joined_tracker().await;
        provider.queue_fix(Ok(sample_at(MUMBAI, 1000)));
        tracker.start_tracking().await;

        assert_eq!(tracker.distance_to_coordinate(&MUMBAI), Some(0.0));
    }

    #[tokio::test]
    async fn test_disconnect_then_reconnect_rejoins() {
        let (mut tracker, _provider, channel) = joined_tracker().await;
        assert_eq!(channel.join_count(), 1);

        tracker
            .apply(TrackerEvent::Channel(ChannelEvent::Disconnected))
            .await;
        assert!(tracker.needs_reconnect());

        tracker.reconnect_once().await;

        assert!(!tracker.needs_reconnect());
        assert_eq!(channel.join_count(), 2);
        assert_eq!(tracker.reconnects(), 1);
    }

    #[tokio::test]
    async fn test_reconnected_event_triggers_rejoin() {
        let (mut tracker, _provider, channel) = joined_tracker().await;

        channel.inject(ChannelEvent::Disconnected);
        channel.inject(ChannelEvent::Reconnected);
        tracker.pump().await;

        assert!(!tracker.needs_reconnect());
        assert_eq!(channel.join_count(), 2);
        assert_eq!(tracker.reconnects(), 1);
    }

    #[tokio::test]
    async fn test_invalid_coordinates_rejected() {
        let (mut tracker, provider, channel) = joined_tracker().await;
        provider.queue_fix(Ok(sample_at(Coordinate::new(91.0, 0.0), 1000)));

        tracker.start_tracking().await;

        assert!(tracker.self_location().is_none());
        assert!(matches!(
            tracker.last_error(),
            Some(TrackError::InvalidCoordinates { .. })
        ));
        assert!(channel.published().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_leaves() {
        let (mut tracker, provider, channel) = joined_tracker().await;
        provider.queue_fix(Ok(sample_at(MUMBAI, 1000)));
        tracker.start_tracking().await;

        tracker.shutdown().await;

        assert!(!tracker.is_tracking());
        assert!(tracker.session().is_none());
        assert_eq!(channel.leaves.lock().unwrap().len(), 1);
    }
}
