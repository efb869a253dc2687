//! Location provider abstraction: one-shot fixes and continuous watches.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::LocationError;
use crate::types::LocationSample;

/// Accuracy/timeout knobs for a fix request, mirroring the options a
/// geolocation service accepts for both one-shot and continuous requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixOptions {
    /// Request the most accurate positioning mode the device offers
    pub high_accuracy: bool,

    /// Provider-level window after which a pending fix is reported as
    /// [`LocationError::Timeout`]
    pub timeout: Duration,

    /// Maximum acceptable age of a cached fix
    pub max_age: Duration,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            max_age: Duration::ZERO,
        }
    }
}

/// Abstraction over the host's geolocation service.
///
/// # Implementations
///
/// - **Production**: wraps the platform positioning service
/// - **Simulation**: `SimLocationProvider` - scripted fixes with fault injection
#[async_trait]
pub trait LocationProvider: Send + Sync + 'static {
    /// Returns true if the host exposes a geolocation capability at all.
    ///
    /// When false, every other method would fail with
    /// [`LocationError::Unsupported`]; callers check this first.
    fn is_available(&self) -> bool;

    /// Requests a single fix.
    ///
    /// Resolves once the provider produces a position, or with an error
    /// after the `options.timeout` window.
    async fn current_fix(&self, options: &FixOptions) -> Result<LocationSample, LocationError>;

    /// Begins continuous observation.
    ///
    /// Returns a [`PositionWatch`] that yields every subsequent fix (or
    /// provider error) until cancelled. Each call creates an independent
    /// subscription; the caller owns its lifetime.
    fn watch(&self, options: &FixOptions) -> Result<PositionWatch, LocationError>;
}

/// Producer half of a watch subscription.
///
/// Held by the provider implementation; pushing into a cancelled feed is a
/// no-op so an already-in-flight callback cannot resurrect a subscription.
#[derive(Debug, Clone)]
pub struct WatchFeed {
    tx: mpsc::UnboundedSender<Result<LocationSample, LocationError>>,
    cancelled: Arc<AtomicBool>,
}

impl WatchFeed {
    /// Delivers one fix result to the subscriber.
    ///
    /// Returns false if the watch was cancelled or dropped, in which case
    /// the provider should release the feed.
    pub fn push(&self, item: Result<LocationSample, LocationError>) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.send(item).is_ok()
    }

    /// Returns true once the subscriber side has cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// An active continuous-observation subscription.
///
/// The single cancellation capability for a watch: after [`cancel`]
/// returns, [`recv`] yields nothing further, even for items already queued.
/// Dropping the watch cancels it.
///
/// [`cancel`]: PositionWatch::cancel
/// [`recv`]: PositionWatch::recv
#[derive(Debug)]
pub struct PositionWatch {
    rx: mpsc::UnboundedReceiver<Result<LocationSample, LocationError>>,
    cancelled: Arc<AtomicBool>,
}

impl PositionWatch {
    /// Creates a connected feed/watch pair.
    pub fn pair() -> (WatchFeed, PositionWatch) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            WatchFeed {
                tx,
                cancelled: Arc::clone(&cancelled),
            },
            PositionWatch { rx, cancelled },
        )
    }

    /// Waits for the next fix result.
    ///
    /// Returns `None` once the watch is cancelled or the provider dropped
    /// its feed.
    pub async fn recv(&mut self) -> Option<Result<LocationSample, LocationError>> {
        if self.cancelled.load(Ordering::SeqCst) {
            return None;
        }
        let item = self.rx.recv().await;
        if self.cancelled.load(Ordering::SeqCst) {
            return None;
        }
        item
    }

    /// Returns the next already-delivered fix result without waiting.
    pub fn try_recv(&mut self) -> Option<Result<LocationSample, LocationError>> {
        if self.cancelled.load(Ordering::SeqCst) {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Cancels the subscription.
    ///
    /// Synchronous: after this returns no further fix is observable through
    /// this watch, regardless of what the provider still delivers.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        self.cancel();
    }
}
