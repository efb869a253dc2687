//! Simulated realtime channel with fault injection.
//!
//! A central router fans each published update out to the other members of
//! its tour room, applying per-link loss and latency from a seeded RNG.
//! Latency is measured in ticks; [`SimChannelRouter::advance_tick`] delivers
//! what has come due.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::trace;

use tourtrace_env::{
    ChannelError, ChannelEvent, LocationUpdate, ParticipantId, ParticipantLocation,
    RealtimeChannel, TourId,
};

/// Delivery counters, for scenario assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Updates accepted from senders
    pub published: u64,

    /// Events handed to a recipient queue
    pub delivered: u64,

    /// Deliveries dropped by link loss
    pub dropped_loss: u64,

    /// Deliveries dropped because the recipient was offline
    pub dropped_offline: u64,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    loss: f64,
    latency_ticks: u64,
}

struct Pending {
    due: u64,
    to: ParticipantId,
    event: ChannelEvent,
}

struct RouterInner {
    tick: u64,
    rooms: BTreeMap<TourId, BTreeSet<ParticipantId>>,
    endpoints: HashMap<ParticipantId, mpsc::UnboundedSender<ChannelEvent>>,
    guides: BTreeMap<TourId, ParticipantId>,
    offline: BTreeSet<ParticipantId>,
    links: HashMap<(ParticipantId, ParticipantId), Link>,
    default_loss: f64,
    default_latency_ticks: u64,
    latency_jitter_ticks: u64,
    pending: Vec<Pending>,
    rng: ChaCha8Rng,
    stats: RouterStats,
}

impl RouterInner {
    fn deliver(&mut self, to: &ParticipantId, event: ChannelEvent) {
        if let Some(tx) = self.endpoints.get(to) {
            if tx.send(event).is_ok() {
                self.stats.delivered += 1;
            }
        }
    }
}

/// Central message router shared by every simulated client.
pub struct SimChannelRouter {
    inner: Mutex<RouterInner>,
}

impl SimChannelRouter {
    /// Creates a router with the given RNG seed.
    pub fn new(seed: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(RouterInner {
                tick: 0,
                rooms: BTreeMap::new(),
                endpoints: HashMap::new(),
                guides: BTreeMap::new(),
                offline: BTreeSet::new(),
                links: HashMap::new(),
                default_loss: 0.0,
                default_latency_ticks: 0,
                latency_jitter_ticks: 0,
                pending: Vec::new(),
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: RouterStats::default(),
            }),
        })
    }

    /// Creates a client endpoint on this router.
    pub fn register(self: &Arc<Self>, id: &ParticipantId) -> Arc<SimChannel> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap()
            .endpoints
            .insert(id.clone(), tx);
        Arc::new(SimChannel {
            id: id.clone(),
            router: Arc::clone(self),
            rx: tokio::sync::Mutex::new(rx),
        })
    }

    /// Designates the single privileged broadcaster for a tour; their
    /// updates fan out as guide events instead of peer events.
    pub fn set_guide(&self, tour_id: &TourId, id: &ParticipantId) {
        self.inner
            .lock()
            .unwrap()
            .guides
            .insert(tour_id.clone(), id.clone());
    }

    /// Sets the loss probability applied to links without an override.
    pub fn set_default_loss(&self, loss: f64) {
        self.inner.lock().unwrap().default_loss = loss.clamp(0.0, 1.0);
    }

    /// Sets loss probability for a specific directed link.
    pub fn set_link_loss(&self, from: &ParticipantId, to: &ParticipantId, loss: f64) {
        let mut inner = self.inner.lock().unwrap();
        let latency = inner.default_latency_ticks;
        inner
            .links
            .entry((from.clone(), to.clone()))
            .or_insert(Link {
                loss: 0.0,
                latency_ticks: latency,
            })
            .loss = loss.clamp(0.0, 1.0);
    }

    /// Sets latency in ticks for a specific directed link.
    pub fn set_link_latency(&self, from: &ParticipantId, to: &ParticipantId, ticks: u64) {
        let mut inner = self.inner.lock().unwrap();
        let loss = inner.default_loss;
        inner
            .links
            .entry((from.clone(), to.clone()))
            .or_insert(Link {
                loss,
                latency_ticks: 0,
            })
            .latency_ticks = ticks;
    }

    /// Adds a random 0..=ticks extra delay per delivery, which can reorder
    /// messages from the same sender.
    pub fn set_latency_jitter(&self, ticks: u64) {
        self.inner.lock().unwrap().latency_jitter_ticks = ticks;
    }

    /// Takes a client offline (or back online).
    ///
    /// Going offline evicts the client from every room and delivers a
    /// `Disconnected` event; coming back delivers `Reconnected`, after
    /// which the client is expected to rejoin its room.
    pub fn set_offline(&self, id: &ParticipantId, offline: bool) {
        let mut inner = self.inner.lock().unwrap();
        let event = if offline {
            inner.offline.insert(id.clone());
            for members in inner.rooms.values_mut() {
                members.remove(id);
            }
            ChannelEvent::Disconnected
        } else {
            inner.offline.remove(id);
            ChannelEvent::Reconnected
        };
        if let Some(tx) = inner.endpoints.get(id) {
            let _ = tx.send(event);
        }
    }

    /// Advances the router clock by one tick and delivers due messages.
    pub fn advance_tick(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;

        let pending = std::mem::take(&mut inner.pending);
        let mut still_pending = Vec::with_capacity(pending.len());
        for p in pending {
            if p.due > tick {
                still_pending.push(p);
            } else if inner.offline.contains(&p.to) {
                inner.stats.dropped_offline += 1;
            } else {
                inner.deliver(&p.to, p.event);
            }
        }
        inner.pending = still_pending;
    }

    /// Current delivery counters.
    pub fn stats(&self) -> RouterStats {
        self.inner.lock().unwrap().stats
    }

    fn join(&self, id: &ParticipantId, tour_id: &TourId) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline.contains(id) {
            return Err(ChannelError::io("unreachable"));
        }
        inner
            .rooms
            .entry(tour_id.clone())
            .or_default()
            .insert(id.clone());
        trace!(tour = %tour_id, participant = %id, "joined room");
        Ok(())
    }

    fn leave(&self, id: &ParticipantId, tour_id: &TourId) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(members) = inner.rooms.get_mut(tour_id) {
            members.remove(id);
        }
        trace!(tour = %tour_id, participant = %id, "left room");
        Ok(())
    }

    fn publish(&self, from: &ParticipantId, update: LocationUpdate) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline.contains(from) {
            return Err(ChannelError::io("unreachable"));
        }
        let members = match inner.rooms.get(&update.tour_id) {
            Some(members) if members.contains(from) => members.clone(),
            _ => return Err(ChannelError::NotJoined),
        };
        inner.stats.published += 1;

        let is_guide = inner.guides.get(&update.tour_id) == Some(from);
        for member in members.iter().filter(|m| *m != from) {
            if inner.offline.contains(member) {
                inner.stats.dropped_offline += 1;
                continue;
            }

            let (loss, base_latency) = match inner.links.get(&(from.clone(), member.clone())) {
                Some(link) => (link.loss, link.latency_ticks),
                None => (inner.default_loss, inner.default_latency_ticks),
            };
            if loss > 0.0 && inner.rng.gen::<f64>() < loss {
                inner.stats.dropped_loss += 1;
                continue;
            }

            let event = if is_guide {
                ChannelEvent::Guide(update.sample)
            } else {
                ChannelEvent::Peer(ParticipantLocation::new(
                    update.participant_id.clone(),
                    update.sample,
                ))
            };

            let jitter = if inner.latency_jitter_ticks > 0 {
                let max = inner.latency_jitter_ticks;
                inner.rng.gen_range(0..=max)
            } else {
                0
            };
            let latency = base_latency + jitter;
            if latency == 0 {
                inner.deliver(member, event);
            } else {
                let due = inner.tick + latency;
                inner.pending.push(Pending {
                    due,
                    to: member.clone(),
                    event,
                });
            }
        }
        Ok(())
    }
}

/// One client's endpoint on the simulated channel.
pub struct SimChannel {
    id: ParticipantId,
    router: Arc<SimChannelRouter>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ChannelEvent>>,
}

#[async_trait]
impl RealtimeChannel for SimChannel {
    async fn join_room(&self, tour_id: &TourId) -> Result<(), ChannelError> {
        self.router.join(&self.id, tour_id)
    }

    async fn leave_room(&self, tour_id: &TourId) -> Result<(), ChannelError> {
        self.router.leave(&self.id, tour_id)
    }

    async fn publish_location(&self, update: LocationUpdate) -> Result<(), ChannelError> {
        self.router.publish(&self.id, update)
    }

    async fn next_event(&self) -> Option<ChannelEvent> {
        self.rx.lock().await.recv().await
    }

    fn try_next_event(&self) -> Option<ChannelEvent> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    fn local_id(&self) -> ParticipantId {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourtrace_env::{Coordinate, LocationSample};

    fn update(tour: &str, from: &str, ts: u64) -> LocationUpdate {
        LocationUpdate {
            tour_id: TourId::new(tour),
            participant_id: ParticipantId::new(from),
            sample: LocationSample::new(Coordinate::new(18.9220, 72.8347), 5.0, ts),
        }
    }

    async fn join(channel: &SimChannel, tour: &str) {
        channel.join_room(&TourId::new(tour)).await.unwrap();
    }

    #[tokio::test]
    async fn test_room_fan_out_excludes_sender() {
        let router = SimChannelRouter::new(1);
        let a = router.register(&ParticipantId::new("a"));
        let b = router.register(&ParticipantId::new("b"));
        let c = router.register(&ParticipantId::new("c"));
        join(&a, "t1").await;
        join(&b, "t1").await;
        join(&c, "t1").await;

        a.publish_location(update("t1", "a", 100)).await.unwrap();

        assert!(a.try_next_event().is_none());
        assert!(matches!(
            b.try_next_event(),
            Some(ChannelEvent::Peer(p)) if p.participant_id == ParticipantId::new("a")
        ));
        assert!(matches!(c.try_next_event(), Some(ChannelEvent::Peer(_))));
        assert_eq!(router.stats().delivered, 2);
    }

    #[tokio::test]
    async fn test_guide_updates_route_as_guide_events() {
        let router = SimChannelRouter::new(1);
        let guide = router.register(&ParticipantId::new("guide"));
        let p = router.register(&ParticipantId::new("p"));
        join(&guide, "t1").await;
        join(&p, "t1").await;
        router.set_guide(&TourId::new("t1"), &ParticipantId::new("guide"));

        guide
            .publish_location(update("t1", "guide", 100))
            .await
            .unwrap();

        assert!(matches!(p.try_next_event(), Some(ChannelEvent::Guide(_))));
    }

    #[tokio::test]
    async fn test_publish_requires_membership() {
        let router = SimChannelRouter::new(1);
        let a = router.register(&ParticipantId::new("a"));

        let err = a.publish_location(update("t1", "a", 100)).await;
        assert_eq!(err, Err(ChannelError::NotJoined));
    }

    #[tokio::test]
    async fn test_total_loss_drops_everything() {
        let router = SimChannelRouter::new(1);
        let a = router.register(&ParticipantId::new("a"));
        let b = router.register(&ParticipantId::new("b"));
        join(&a, "t1").await;
        join(&b, "t1").await;
        router.set_default_loss(1.0);

        a.publish_location(update("t1", "a", 100)).await.unwrap();

        assert!(b.try_next_event().is_none());
        assert_eq!(router.stats().dropped_loss, 1);
        assert_eq!(router.stats().delivered, 0);
    }

    #[tokio::test]
    async fn test_latency_delays_until_due_tick() {
        let router = SimChannelRouter::new(1);
        let a = router.register(&ParticipantId::new("a"));
        let b = router.register(&ParticipantId::new("b"));
        join(&a, "t1").await;
        join(&b, "t1").await;
        router.set_link_latency(&ParticipantId::new("a"), &ParticipantId::new("b"), 2);

        a.publish_location(update("t1", "a", 100)).await.unwrap();
        assert!(b.try_next_event().is_none());

        router.advance_tick();
        assert!(b.try_next_event().is_none());

        router.advance_tick();
        assert!(matches!(b.try_next_event(), Some(ChannelEvent::Peer(_))));
    }

    #[tokio::test]
    async fn test_offline_client_cannot_join_or_publish() {
        let router = SimChannelRouter::new(1);
        let a = router.register(&ParticipantId::new("a"));
        join(&a, "t1").await;

        router.set_offline(&ParticipantId::new("a"), true);
        assert!(matches!(
            a.try_next_event(),
            Some(ChannelEvent::Disconnected)
        ));

        assert!(a.publish_location(update("t1", "a", 100)).await.is_err());
        assert!(a.join_room(&TourId::new("t1")).await.is_err());

        router.set_offline(&ParticipantId::new("a"), false);
        assert!(matches!(
            a.try_next_event(),
            Some(ChannelEvent::Reconnected)
        ));
        assert!(a.join_room(&TourId::new("t1")).await.is_ok());
    }
}
