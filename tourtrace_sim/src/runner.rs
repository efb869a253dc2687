//! Scenario runner - executes deterministic tour-group scenarios.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use tourtrace_core::{TourTracker, TrackError, TrackerConfig};
use tourtrace_env::{Coordinate, LocationError, ParticipantId, TourId, TrackerContext};

use crate::channel::{SimChannel, SimChannelRouter};
use crate::context::SimContext;
use crate::oracle::Oracle;
use crate::provider::SimLocationProvider;
use crate::scenarios::ScenarioId;

/// Ticks run after the last emission so in-flight deliveries settle.
const DRAIN_TICKS: u64 = 10;

/// Derived-vs-true distance tolerance in km (GPS noise plus one tick of
/// staleness).
const DISTANCE_TOLERANCE_KM: f64 = 0.05;

type SimTracker = TourTracker<SimContext, SimLocationProvider, SimChannel>;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether the scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// First failed assertion, if any
    pub failure_reason: Option<String>,

    /// Digest of every tracker's final state, for determinism checks
    pub fingerprint: u64,

    /// Counters collected during the run
    pub metrics: ScenarioMetrics,
}

/// Counters collected during scenario execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScenarioMetrics {
    /// Updates accepted from senders
    pub updates_published: u64,

    /// Events handed to recipient queues
    pub updates_delivered: u64,

    /// Deliveries dropped by link loss
    pub updates_dropped_loss: u64,

    /// Deliveries dropped while the recipient was offline
    pub updates_dropped_offline: u64,

    /// Inbound samples discarded by the stale guard, across all clients
    pub stale_discards: u64,

    /// Completed room rejoins, across all clients
    pub reconnects: u64,
}

struct Client {
    id: ParticipantId,
    provider: Arc<SimLocationProvider>,
    tracker: SimTracker,
}

/// One tour group wired to a shared router and oracle.
///
/// `clients[0]` is the guide; the rest are participants.
struct TourWorld {
    context: Arc<SimContext>,
    router: Arc<SimChannelRouter>,
    oracle: Oracle,
    tour: TourId,
    clients: Vec<Client>,
}

impl TourWorld {
    /// Joins every client and starts tracking with a fresh initial fix.
    async fn launch(&mut self) {
        let t0 = self.context.epoch_ms();
        for client in self.clients.iter_mut() {
            if let Some(sample) = self.oracle.sample_for(&client.id, t0) {
                client.provider.script_fix(Ok(sample));
            }
            client.tracker.join(self.tour.clone()).await;
        }
        for client in self.clients.iter_mut() {
            client.tracker.start_tracking().await;
        }
        self.router.advance_tick();
        self.pump_all().await;
    }

    /// One simulation step: advance clocks and walkers, optionally emit a
    /// fix per client, deliver due messages, let every client catch up.
    async fn tick(&mut self, dt: Duration, emit: bool) {
        self.context.advance_time(dt);
        self.oracle.step(dt.as_secs_f64());

        if emit {
            let now_ms = self.context.epoch_ms();
            for client in self.clients.iter_mut() {
                if let Some(sample) = self.oracle.sample_for(&client.id, now_ms) {
                    client.provider.emit(sample);
                }
            }
        }

        self.router.advance_tick();
        self.pump_all().await;
    }

    async fn pump_all(&mut self) {
        for client in self.clients.iter_mut() {
            client.tracker.pump().await;
            if client.tracker.needs_reconnect() {
                client.tracker.reconnect_once().await;
            }
        }
    }

    fn metrics(&self) -> ScenarioMetrics {
        let stats = self.router.stats();
        ScenarioMetrics {
            updates_published: stats.published,
            updates_delivered: stats.delivered,
            updates_dropped_loss: stats.dropped_loss,
            updates_dropped_offline: stats.dropped_offline,
            stale_discards: self
                .clients
                .iter()
                .map(|c| c.tracker.stale_discards())
                .sum(),
            reconnects: self.clients.iter().map(|c| c.tracker.reconnects()).sum(),
        }
    }

    /// Order-independent digest of every tracker's final view.
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for client in &self.clients {
            client.id.as_str().hash(&mut hasher);
            if let Some(own) = client.tracker.self_location() {
                own.captured_at_ms.hash(&mut hasher);
                own.position.latitude.to_bits().hash(&mut hasher);
                own.position.longitude.to_bits().hash(&mut hasher);
            }

            let mut peers: Vec<_> = client.tracker.peers().collect();
            peers.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
            for peer in peers {
                peer.participant_id.as_str().hash(&mut hasher);
                peer.sample.captured_at_ms.hash(&mut hasher);
                peer.sample.position.latitude.to_bits().hash(&mut hasher);
                peer.sample.position.longitude.to_bits().hash(&mut hasher);
            }

            if let Some(guide) = client.tracker.guide_location() {
                guide.captured_at_ms.hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

/// Runs scripted tour scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of participants besides the guide
    participants: usize,

    /// Tick rate in Hz
    tick_rate_hz: u32,

    /// Scenario duration in simulated seconds
    duration_secs: f64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, participants: usize) -> Self {
        Self {
            seed,
            participants: participants.max(2),
            tick_rate_hz: 5,
            duration_secs: 30.0,
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the scenario duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!(scenario = scenario.name(), seed = self.seed, "starting scenario");
        match scenario {
            ScenarioId::SteadyWalk => self.run_steady_walk().await,
            ScenarioId::LossyChannel => self.run_lossy_channel().await,
            ScenarioId::PartitionRejoin => self.run_partition_rejoin().await,
            ScenarioId::PermissionDenied => self.run_permission_denied().await,
            ScenarioId::StaleFlood => self.run_stale_flood().await,
        }
    }

    fn dt(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz as f64)
    }

    fn target_ticks(&self) -> u64 {
        (self.duration_secs * self.tick_rate_hz as f64) as u64
    }

    fn build_world(&self, noise_std_m: f64) -> TourWorld {
        let context = SimContext::shared(self.seed);
        let router = SimChannelRouter::new(self.seed ^ 0x9e37_79b9_7f4a_7c15);
        let mut oracle = Oracle::new(self.seed.wrapping_mul(0x517c_c1b7_2722_0a95), noise_std_m);
        let tour = TourId::new("tour-1");

        // Walking pace is ~1.4 m/s; a degree of latitude is ~111 km
        let base = Coordinate::new(18.9220, 72.8347);
        let mut clients = Vec::with_capacity(self.participants + 1);

        let guide_id = ParticipantId::new("guide");
        oracle.add_walker(guide_id.clone(), base, (1.2e-5, 0.0));
        router.set_guide(&tour, &guide_id);
        clients.push(Self::make_client(&context, &router, guide_id, self.seed));

        for i in 0..self.participants {
            let id = ParticipantId::new(format!("p{i}"));
            let start = Coordinate::new(
                base.latitude + 0.0005 * (i + 1) as f64,
                base.longitude + 0.0003 * (i + 1) as f64,
            );
            let velocity = (1.0e-5, 5.0e-6 * ((i % 3) as f64 - 1.0));
            oracle.add_walker(id.clone(), start, velocity);
            clients.push(Self::make_client(
                &context,
                &router,
                id,
                self.seed.wrapping_add(i as u64 + 1),
            ));
        }

        TourWorld {
            context,
            router,
            oracle,
            tour,
            clients,
        }
    }

    fn make_client(
        context: &Arc<SimContext>,
        router: &Arc<SimChannelRouter>,
        id: ParticipantId,
        backoff_seed: u64,
    ) -> Client {
        let provider = SimLocationProvider::shared();
        let channel = router.register(&id);
        let tracker = TourTracker::new(
            Arc::clone(context),
            Arc::clone(&provider),
            channel,
            TrackerConfig::default(),
        )
        .with_backoff_seed(backoff_seed);
        Client {
            id,
            provider,
            tracker,
        }
    }

    fn finish(
        &self,
        scenario: ScenarioId,
        world: &TourWorld,
        total_ticks: u64,
        failures: Vec<String>,
    ) -> ScenarioResult {
        let passed = failures.is_empty();
        if passed {
            info!(scenario = scenario.name(), "scenario passed");
        }
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks,
            final_time_secs: world.oracle.time(),
            failure_reason: failures.into_iter().next(),
            fingerprint: world.fingerprint(),
            metrics: world.metrics(),
        }
    }

    /// Checks that every client ended with a complete view of the room.
    fn check_rosters(world: &TourWorld, failures: &mut Vec<String>) {
        let n = world.clients.len();
        let guide = &world.clients[0];
        if guide.tracker.peer_count() != n - 1 {
            failures.push(format!(
                "guide sees {} peers, expected {}",
                guide.tracker.peer_count(),
                n - 1
            ));
        }
        for client in &world.clients[1..] {
            if client.tracker.peer_count() != n - 2 {
                failures.push(format!(
                    "{} sees {} peers, expected {}",
                    client.id,
                    client.tracker.peer_count(),
                    n - 2
                ));
            }
            if client.tracker.guide_location().is_none() {
                failures.push(format!("{} never saw the guide", client.id));
            }
        }
    }

    /// SIM-001: SteadyWalk - happy-path convergence.
    ///
    /// A guide and N participants walk and broadcast; every client must end
    /// with a complete roster and distances that match ground truth.
    async fn run_steady_walk(&self) -> ScenarioResult {
        let mut world = self.build_world(5.0);
        world.launch().await;

        let total_ticks = self.target_ticks();
        for tick in 0..total_ticks {
            world.tick(self.dt(), true).await;
            if tick % (self.tick_rate_hz as u64 * 5) == 0 {
                debug!(t = world.oracle.time(), "steady_walk progress");
            }
        }
        for _ in 0..DRAIN_TICKS {
            world.tick(self.dt(), false).await;
        }

        let mut failures = Vec::new();
        Self::check_rosters(&world, &mut failures);

        for client in &world.clients[1..] {
            for other in &world.clients[1..] {
                if other.id == client.id {
                    continue;
                }
                let derived = client.tracker.distance_to_peer(&other.id);
                let truth = world.oracle.true_distance_km(&client.id, &other.id);
                match (derived, truth) {
                    (Some(d), Some(t)) if (d - t).abs() <= DISTANCE_TOLERANCE_KM => {}
                    (d, t) => failures.push(format!(
                        "{} -> {}: derived {:?} km vs true {:?} km",
                        client.id, other.id, d, t
                    )),
                }
            }

            let derived = client.tracker.distance_to_guide();
            let truth = world
                .oracle
                .true_distance_km(&client.id, &world.clients[0].id);
            match (derived, truth) {
                (Some(d), Some(t)) if (d - t).abs() <= DISTANCE_TOLERANCE_KM => {}
                (d, t) => failures.push(format!(
                    "{} -> guide: derived {:?} km vs true {:?} km",
                    client.id, d, t
                )),
            }
        }

        self.finish(ScenarioId::SteadyWalk, &world, total_ticks, failures)
    }

    /// SIM-002: LossyChannel - 50% link loss.
    ///
    /// Rosters must still converge (enough repeats get through) and the
    /// observed loss rate must stay in the configured band.
    async fn run_lossy_channel(&self) -> ScenarioResult {
        let mut world = self.build_world(5.0);
        world.router.set_default_loss(0.5);
        world.launch().await;

        let total_ticks = self.target_ticks();
        for _ in 0..total_ticks {
            world.tick(self.dt(), true).await;
        }
        for _ in 0..DRAIN_TICKS {
            world.tick(self.dt(), false).await;
        }

        let mut failures = Vec::new();
        Self::check_rosters(&world, &mut failures);

        let stats = world.router.stats();
        let attempts = stats.delivered + stats.dropped_loss;
        let loss_rate = if attempts > 0 {
            stats.dropped_loss as f64 / attempts as f64
        } else {
            0.0
        };
        if !(0.35..=0.65).contains(&loss_rate) {
            failures.push(format!("loss rate {loss_rate:.2} outside [0.35, 0.65]"));
        }

        self.finish(ScenarioId::LossyChannel, &world, total_ticks, failures)
    }

    /// SIM-003: PartitionRejoin - one participant drops and recovers.
    ///
    /// The dropped client must back off, rejoin after the heal, and both
    /// sides must converge on fresh state.
    async fn run_partition_rejoin(&self) -> ScenarioResult {
        let mut world = self.build_world(5.0);
        world.launch().await;

        let total_ticks = self.target_ticks().max(30);
        let offline_at = total_ticks / 3;
        let heal_at = total_ticks * 2 / 3;
        let victim = world.clients[1].id.clone();
        let mut heal_time_ms = 0;

        for tick in 0..total_ticks {
            if tick == offline_at {
                info!(participant = %victim, "taking participant offline");
                world.router.set_offline(&victim, true);
            }
            if tick == heal_at {
                info!(participant = %victim, "healing connection");
                world.router.set_offline(&victim, false);
                heal_time_ms = world.context.epoch_ms();
            }
            world.tick(self.dt(), true).await;
        }
        for _ in 0..DRAIN_TICKS {
            world.tick(self.dt(), false).await;
        }

        let mut failures = Vec::new();
        Self::check_rosters(&world, &mut failures);

        let victim_client = &world.clients[1];
        if victim_client.tracker.reconnects() == 0 {
            failures.push(format!("{victim} never rejoined the room"));
        }
        match victim_client.tracker.guide_location() {
            Some(guide) if guide.captured_at_ms >= heal_time_ms => {}
            other => failures.push(format!(
                "{victim} guide view not refreshed after heal: {other:?}"
            )),
        }
        for client in &world.clients {
            if client.id == victim {
                continue;
            }
            match client.tracker.peer(&victim) {
                Some(entry) if entry.sample.captured_at_ms >= heal_time_ms => {}
                other => failures.push(format!(
                    "{} holds no post-heal sample for {}: {:?}",
                    client.id, victim, other
                )),
            }
        }

        self.finish(ScenarioId::PartitionRejoin, &world, total_ticks, failures)
    }

    /// SIM-004: PermissionDenied - the provider refuses the initial fix.
    ///
    /// Tracking must not start, the error must be surfaced, and a manual
    /// retry must recover once permission is granted.
    async fn run_permission_denied(&self) -> ScenarioResult {
        let mut world = self.build_world(5.0);

        let t0 = world.context.epoch_ms();
        for (i, client) in world.clients.iter_mut().enumerate() {
            if i == 1 {
                client
                    .provider
                    .script_fix(Err(LocationError::PermissionDenied));
            } else if let Some(sample) = world.oracle.sample_for(&client.id, t0) {
                client.provider.script_fix(Ok(sample));
            }
            client.tracker.join(world.tour.clone()).await;
        }
        for client in world.clients.iter_mut() {
            client.tracker.start_tracking().await;
        }

        let total_ticks = self.target_ticks().min(25);
        for _ in 0..total_ticks {
            world.tick(self.dt(), true).await;
        }

        let mut failures = Vec::new();
        let denied = &world.clients[1];
        if denied.tracker.is_tracking() {
            failures.push(format!("{} is tracking despite denial", denied.id));
        }
        if denied.tracker.last_error() != Some(&TrackError::PermissionDenied) {
            failures.push(format!(
                "{} last_error is {:?}, expected PermissionDenied",
                denied.id,
                denied.tracker.last_error()
            ));
        }
        if denied.provider.watch_calls() != 0 {
            failures.push(format!(
                "{} registered a watch despite denial",
                denied.id
            ));
        }
        if denied.tracker.self_location().is_some() {
            failures.push(format!("{} has a self location despite denial", denied.id));
        }
        for client in &world.clients {
            if client.id != denied.id && client.tracker.peer(&denied.id).is_some() {
                failures.push(format!(
                    "{} received an update from the denied participant",
                    client.id
                ));
            }
        }

        // Manual retry after the user grants permission
        let denied_id = world.clients[1].id.clone();
        let now_ms = world.context.epoch_ms();
        if let Some(sample) = world.oracle.sample_for(&denied_id, now_ms) {
            world.clients[1].provider.script_fix(Ok(sample));
        }
        world.clients[1].tracker.start_tracking().await;
        if !world.clients[1].tracker.is_tracking() {
            failures.push("retry after grant did not start tracking".to_string());
        }

        self.finish(ScenarioId::PermissionDenied, &world, total_ticks, failures)
    }

    /// SIM-005: StaleFlood - jittered latency reorders deliveries.
    ///
    /// Out-of-order arrivals must be discarded by the stale guard, leaving
    /// every roster entry at the newest published timestamp.
    async fn run_stale_flood(&self) -> ScenarioResult {
        let mut world = self.build_world(5.0);
        world.router.set_latency_jitter(4);
        world.launch().await;

        let total_ticks = self.target_ticks();
        let mut last_emit_ms = 0;
        for _ in 0..total_ticks {
            world.tick(self.dt(), true).await;
            last_emit_ms = world.context.epoch_ms();
        }
        for _ in 0..DRAIN_TICKS {
            world.tick(self.dt(), false).await;
        }

        let mut failures = Vec::new();
        Self::check_rosters(&world, &mut failures);

        let metrics = world.metrics();
        if metrics.stale_discards == 0 {
            failures.push("jitter produced no out-of-order deliveries".to_string());
        }
        for client in &world.clients {
            for peer in client.tracker.peers() {
                if peer.sample.captured_at_ms != last_emit_ms {
                    failures.push(format!(
                        "{} holds {} at {} instead of newest {}",
                        client.id, peer.participant_id, peer.sample.captured_at_ms, last_emit_ms
                    ));
                }
            }
        }
        for client in &world.clients[1..] {
            if let Some(guide) = client.tracker.guide_location() {
                if guide.captured_at_ms != last_emit_ms {
                    failures.push(format!(
                        "{} guide view at {} instead of newest {}",
                        client.id, guide.captured_at_ms, last_emit_ms
                    ));
                }
            }
        }

        self.finish(ScenarioId::StaleFlood, &world, total_ticks, failures)
    }
}
