//! Ground truth oracle for simulation.
//!
//! Maintains the true position of every walker in the tour group, advances
//! them along straight-line paths, and produces the noisy GPS samples the
//! scripted providers feed to their clients. True pairwise distances let
//! scenarios check the client's derived distances against reality.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use tourtrace_core::geo::haversine_km;
use tourtrace_env::{Coordinate, LocationSample, ParticipantId};

/// Meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_195.0;

/// One simulated person with a true position and a constant walking
/// velocity expressed in degrees per second.
#[derive(Debug, Clone)]
struct Walker {
    id: ParticipantId,
    position: Coordinate,
    velocity_deg_per_s: (f64, f64),
}

/// The "God's eye view" of the simulated tour group.
pub struct Oracle {
    /// Walkers in insertion order, which keeps runs reproducible
    walkers: Vec<Walker>,

    /// Simulated time in seconds
    time_s: f64,

    /// GPS noise applied to generated samples
    noise: Normal<f64>,
    noise_std_m: f64,
    rng: ChaCha8Rng,
}

impl Oracle {
    /// Creates an oracle with the given seed and GPS noise level.
    pub fn new(seed: u64, noise_std_m: f64) -> Self {
        Self {
            walkers: Vec::new(),
            time_s: 0.0,
            noise: Normal::new(0.0, noise_std_m.max(0.0)).unwrap(),
            noise_std_m,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Adds a walker at a starting position with a constant velocity.
    pub fn add_walker(
        &mut self,
        id: ParticipantId,
        start: Coordinate,
        velocity_deg_per_s: (f64, f64),
    ) {
        self.walkers.push(Walker {
            id,
            position: start,
            velocity_deg_per_s,
        });
    }

    /// Advances every walker by `dt_s` seconds.
    pub fn step(&mut self, dt_s: f64) {
        for walker in &mut self.walkers {
            walker.position.latitude += walker.velocity_deg_per_s.0 * dt_s;
            walker.position.longitude += walker.velocity_deg_per_s.1 * dt_s;
        }
        self.time_s += dt_s;
    }

    /// Simulated time in seconds.
    pub fn time(&self) -> f64 {
        self.time_s
    }

    /// True position of one walker.
    pub fn true_position(&self, id: &ParticipantId) -> Option<Coordinate> {
        self.walkers
            .iter()
            .find(|w| &w.id == id)
            .map(|w| w.position)
    }

    /// True great-circle distance between two walkers, in km.
    pub fn true_distance_km(&self, a: &ParticipantId, b: &ParticipantId) -> Option<f64> {
        let pa = self.true_position(a)?;
        let pb = self.true_position(b)?;
        Some(haversine_km(&pa, &pb))
    }

    /// Produces the noisy GPS sample a device would report for a walker.
    pub fn sample_for(
        &mut self,
        id: &ParticipantId,
        captured_at_ms: u64,
    ) -> Option<LocationSample> {
        let position = self.true_position(id)?;

        let noise_lat_m = self.noise.sample(&mut self.rng);
        let noise_lon_m = self.noise.sample(&mut self.rng);
        let lat = position.latitude + noise_lat_m / METERS_PER_DEGREE;
        let lon_scale = METERS_PER_DEGREE * position.latitude.to_radians().cos().max(0.01);
        let lon = position.longitude + noise_lon_m / lon_scale;

        Some(LocationSample::new(
            Coordinate::new(lat, lon),
            self.noise_std_m.max(1.0),
            captured_at_ms,
        ))
    }

    /// Ids of all walkers, in insertion order.
    pub fn walker_ids(&self) -> Vec<ParticipantId> {
        self.walkers.iter().map(|w| w.id.clone()).collect()
    }
}
