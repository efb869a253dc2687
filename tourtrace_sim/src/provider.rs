//! Scripted location provider with fault injection.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tourtrace_env::{
    FixOptions, LocationError, LocationProvider, LocationSample, PositionWatch, WatchFeed,
};

/// Simulated geolocation service for one client.
///
/// One-shot fixes come from a scripted queue so scenarios can inject
/// permission denials or timeouts at exact points; watch fixes are pushed
/// by the tick loop through [`emit`]. Call counters let tests assert the
/// client's single-subscription guarantee.
///
/// [`emit`]: SimLocationProvider::emit
pub struct SimLocationProvider {
    /// Host capability flag; false models a device without geolocation
    available: AtomicBool,

    /// Scripted results for `current_fix`, consumed front to back
    one_shots: Mutex<VecDeque<Result<LocationSample, LocationError>>>,

    current_fix_calls: AtomicUsize,
    watch_calls: AtomicUsize,

    /// Producer halves of every watch handed out
    feeds: Mutex<Vec<WatchFeed>>,
}

impl SimLocationProvider {
    /// Creates a provider with an empty script.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            one_shots: Mutex::new(VecDeque::new()),
            current_fix_calls: AtomicUsize::new(0),
            watch_calls: AtomicUsize::new(0),
            feeds: Mutex::new(Vec::new()),
        }
    }

    /// Creates an Arc-wrapped provider for sharing with a tracker.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Flips the host capability flag.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Appends one scripted `current_fix` result.
    pub fn script_fix(&self, result: Result<LocationSample, LocationError>) {
        self.one_shots.lock().unwrap().push_back(result);
    }

    /// Delivers a fix to every live watch, pruning cancelled ones.
    pub fn emit(&self, sample: LocationSample) {
        self.feeds
            .lock()
            .unwrap()
            .retain(|feed| feed.push(Ok(sample)));
    }

    /// Delivers a provider error to every live watch.
    pub fn emit_error(&self, error: LocationError) {
        self.feeds
            .lock()
            .unwrap()
            .retain(|feed| feed.push(Err(error.clone())));
    }

    /// Number of `current_fix` calls observed.
    pub fn current_fix_calls(&self) -> usize {
        self.current_fix_calls.load(Ordering::SeqCst)
    }

    /// Number of `watch` registrations observed.
    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Number of watches that have not been cancelled.
    pub fn live_watches(&self) -> usize {
        self.feeds
            .lock()
            .unwrap()
            .iter()
            .filter(|feed| !feed.is_cancelled())
            .count()
    }
}

impl Default for SimLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationProvider for SimLocationProvider {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn current_fix(&self, _options: &FixOptions) -> Result<LocationSample, LocationError> {
        self.current_fix_calls.fetch_add(1, Ordering::SeqCst);
        self.one_shots
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LocationError::PositionUnavailable))
    }

    fn watch(&self, _options: &FixOptions) -> Result<PositionWatch, LocationError> {
        if !self.is_available() {
            return Err(LocationError::Unsupported);
        }
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let (feed, watch) = PositionWatch::pair();
        self.feeds.lock().unwrap().push(feed);
        Ok(watch)
    }
}
