//! Scripted test scenarios for the simulation harness.

use std::str::FromStr;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Guide plus participants walking; rosters and distances converge
    SteadyWalk,

    /// 50% link loss; rosters still converge, loss stays in band
    LossyChannel,

    /// One participant drops offline, backs off, rejoins, recovers
    PartitionRejoin,

    /// Provider denies the location permission; tracking never starts
    PermissionDenied,

    /// Jittered latency reorders deliveries; stale samples are discarded
    StaleFlood,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyWalk,
            ScenarioId::LossyChannel,
            ScenarioId::PartitionRejoin,
            ScenarioId::PermissionDenied,
            ScenarioId::StaleFlood,
        ]
    }

    /// Stable name used by the CLI and reports.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyWalk => "steady_walk",
            ScenarioId::LossyChannel => "lossy_channel",
            ScenarioId::PartitionRejoin => "partition_rejoin",
            ScenarioId::PermissionDenied => "permission_denied",
            ScenarioId::StaleFlood => "stale_flood",
        }
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "steady_walk" => Ok(ScenarioId::SteadyWalk),
            "lossy_channel" => Ok(ScenarioId::LossyChannel),
            "partition_rejoin" => Ok(ScenarioId::PartitionRejoin),
            "permission_denied" => Ok(ScenarioId::PermissionDenied),
            "stale_flood" => Ok(ScenarioId::StaleFlood),
            other => Err(format!("unknown scenario: {other}")),
        }
    }
}
