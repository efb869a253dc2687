//! End-to-end scenario runs across several seeds.

use tourtrace_sim::{ScenarioId, ScenarioRunner};

#[tokio::test]
async fn all_scenarios_pass_across_seeds() {
    for seed in [1, 7, 42] {
        for scenario in ScenarioId::all() {
            let result = ScenarioRunner::new(seed, 4).run(scenario).await;
            assert!(
                result.passed,
                "{} (seed={}) failed: {:?}",
                scenario.name(),
                seed,
                result.failure_reason
            );
        }
    }
}

#[tokio::test]
async fn same_seed_is_deterministic() {
    let a = ScenarioRunner::new(42, 4).run(ScenarioId::SteadyWalk).await;
    let b = ScenarioRunner::new(42, 4).run(ScenarioId::SteadyWalk).await;

    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.metrics, b.metrics);
    assert_eq!(a.total_ticks, b.total_ticks);
}

#[tokio::test]
async fn different_seeds_diverge() {
    // GPS noise and jitter depend on the seed, so final states differ
    let a = ScenarioRunner::new(1, 4).run(ScenarioId::SteadyWalk).await;
    let b = ScenarioRunner::new(2, 4).run(ScenarioId::SteadyWalk).await;

    assert_ne!(a.fingerprint, b.fingerprint);
}

#[tokio::test]
async fn lossy_channel_reports_drops() {
    let result = ScenarioRunner::new(7, 4).run(ScenarioId::LossyChannel).await;

    assert!(result.passed, "{:?}", result.failure_reason);
    assert!(result.metrics.updates_dropped_loss > 0);
}

#[tokio::test]
async fn partition_rejoin_counts_reconnects() {
    let result = ScenarioRunner::new(7, 4)
        .run(ScenarioId::PartitionRejoin)
        .await;

    assert!(result.passed, "{:?}", result.failure_reason);
    assert!(result.metrics.reconnects >= 1);
}

#[tokio::test]
async fn stale_flood_exercises_the_guard() {
    let result = ScenarioRunner::new(7, 4).run(ScenarioId::StaleFlood).await;

    assert!(result.passed, "{:?}", result.failure_reason);
    assert!(result.metrics.stale_discards > 0);
}
