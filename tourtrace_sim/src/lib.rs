//! Tourtrace Deterministic Simulation Harness
//!
//! A controlled environment where whole tour groups run deterministically:
//! scripted walkers, an in-memory channel router with fault injection, and
//! a virtual clock. Any failing run is reproducible from its seed.
//!
//! All sources of non-determinism are intercepted:
//! - **Time**: a virtual clock advanced by the tick loop (and by backoff
//!   sleeps, which complete instantly)
//! - **Channel**: per-link latency, jitter, loss, and offline injection,
//!   all drawn from a seeded RNG
//! - **Device**: scripted fixes and GPS noise from the same seed
//!
//! # Usage
//!
//! ```ignore
//! use tourtrace_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42, 4).run(ScenarioId::SteadyWalk).await;
//! assert!(result.passed);
//! ```

mod channel;
mod context;
mod oracle;
mod provider;
mod runner;
pub mod scenarios;

pub use channel::{RouterStats, SimChannel, SimChannelRouter};
pub use context::SimContext;
pub use oracle::Oracle;
pub use provider::SimLocationProvider;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
