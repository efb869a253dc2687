//! Peer roster: last-known locations of everyone else in the room.
//!
//! One entry per participant id, replaced on update. The guide occupies a
//! dedicated slot since there is a single privileged broadcaster per tour.

use std::collections::HashMap;
use tracing::debug;

use tourtrace_env::{LocationSample, ParticipantId, ParticipantLocation};

/// Conflict policy for inbound samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RosterConfig {
    /// When true, an inbound sample whose `captured_at_ms` is older than
    /// the stored one for the same participant is discarded instead of
    /// overwriting it. When false, last-write-wins unconditionally.
    pub reject_stale: bool,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self { reject_stale: true }
    }
}

/// Local view of the other participants' positions.
#[derive(Debug, Default)]
pub struct Roster {
    /// Last-known location per participant, keyed by identity
    peers: HashMap<ParticipantId, ParticipantLocation>,

    /// The single guide slot
    guide: Option<LocationSample>,

    /// Inbound samples discarded by the stale guard
    stale_discards: u64,

    config: RosterConfig,
}

impl Roster {
    /// Creates an empty roster with the given conflict policy.
    pub fn new(config: RosterConfig) -> Self {
        Self {
            peers: HashMap::new(),
            guide: None,
            stale_discards: 0,
            config,
        }
    }

    /// Applies one peer update. Returns true if the roster changed.
    pub fn upsert_peer(&mut self, update: ParticipantLocation) -> bool {
        if self.config.reject_stale {
            if let Some(existing) = self.peers.get(&update.participant_id) {
                if update.sample.captured_at_ms < existing.sample.captured_at_ms {
                    self.stale_discards += 1;
                    debug!(
                        participant = %update.participant_id,
                        incoming_ms = update.sample.captured_at_ms,
                        stored_ms = existing.sample.captured_at_ms,
                        "discarding stale peer sample"
                    );
                    return false;
                }
            }
        }
        self.peers.insert(update.participant_id.clone(), update);
        true
    }

    /// Applies one guide update. Returns true if the slot changed.
    pub fn set_guide(&mut self, sample: LocationSample) -> bool {
        if self.config.reject_stale {
            if let Some(existing) = &self.guide {
                if sample.captured_at_ms < existing.captured_at_ms {
                    self.stale_discards += 1;
                    debug!(
                        incoming_ms = sample.captured_at_ms,
                        stored_ms = existing.captured_at_ms,
                        "discarding stale guide sample"
                    );
                    return false;
                }
            }
        }
        self.guide = Some(sample);
        true
    }

    /// Last-known location of one participant.
    pub fn peer(&self, id: &ParticipantId) -> Option<&ParticipantLocation> {
        self.peers.get(id)
    }

    /// All peer locations.
    pub fn peers(&self) -> impl Iterator<Item = &ParticipantLocation> {
        self.peers.values()
    }

    /// Number of distinct participants seen.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// The guide's last-known location.
    pub fn guide(&self) -> Option<&LocationSample> {
        self.guide.as_ref()
    }

    /// Samples discarded by the stale guard so far.
    pub fn stale_discards(&self) -> u64 {
        self.stale_discards
    }

    /// Drops all peer and guide state (fresh session).
    pub fn clear(&mut self) {
        self.peers.clear();
        self.guide = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourtrace_env::Coordinate;

    fn sample(ts: u64) -> LocationSample {
        LocationSample::new(Coordinate::new(19.0760, 72.8777), 10.0, ts)
    }

    fn peer(id: &str, ts: u64) -> ParticipantLocation {
        ParticipantLocation::new(ParticipantId::new(id), sample(ts))
    }

    #[test]
    fn test_upsert_replaces_not_appends() {
        let mut roster = Roster::new(RosterConfig::default());

        assert!(roster.upsert_peer(peer("p1", 100)));
        assert_eq!(roster.peer_count(), 1);

        assert!(roster.upsert_peer(peer("p1", 200)));
        assert_eq!(roster.peer_count(), 1);
        let stored = roster.peer(&ParticipantId::new("p1")).unwrap();
        assert_eq!(stored.sample.captured_at_ms, 200);
    }

    #[test]
    fn test_stale_guard_discards_older() {
        let mut roster = Roster::new(RosterConfig::default());

        roster.upsert_peer(peer("p1", 200));
        assert!(!roster.upsert_peer(peer("p1", 100)));

        let stored = roster.peer(&ParticipantId::new("p1")).unwrap();
        assert_eq!(stored.sample.captured_at_ms, 200);
        assert_eq!(roster.stale_discards(), 1);
    }

    #[test]
    fn test_equal_timestamp_replaces() {
        let mut roster = Roster::new(RosterConfig::default());

        roster.upsert_peer(peer("p1", 100));
        assert!(roster.upsert_peer(peer("p1", 100)));
        assert_eq!(roster.stale_discards(), 0);
    }

    #[test]
    fn test_permissive_mode_accepts_stale() {
        let mut roster = Roster::new(RosterConfig {
            reject_stale: false,
        });

        roster.upsert_peer(peer("p1", 200));
        assert!(roster.upsert_peer(peer("p1", 100)));

        let stored = roster.peer(&ParticipantId::new("p1")).unwrap();
        assert_eq!(stored.sample.captured_at_ms, 100);
        assert_eq!(roster.stale_discards(), 0);
    }

    #[test]
    fn test_guide_slot_overwrites() {
        let mut roster = Roster::new(RosterConfig::default());

        assert!(roster.set_guide(sample(100)));
        assert!(roster.set_guide(sample(150)));
        assert!(!roster.set_guide(sample(120)));
        assert_eq!(roster.guide().unwrap().captured_at_ms, 150);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut roster = Roster::new(RosterConfig::default());
        roster.upsert_peer(peer("p1", 100));
        roster.set_guide(sample(100));

        roster.clear();
        assert_eq!(roster.peer_count(), 0);
        assert!(roster.guide().is_none());
    }
}
