//! End-to-end orchestration scenarios against the in-memory services.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use suitectl_core::testing::{MockConcurrency, MockJobs, MockTunnels, ScriptedPoll};
use suitectl_core::{
    ConcurrencyGate, EXIT_FAILURE, EXIT_SUCCESS, ExecutorSettings, Project, RetryPolicy,
    RunOptions, RunOrchestrator, Services, SuiteExecutor, TunnelGate,
};
use suitectl_proto::{JobStatus, ServiceError, Suite, TunnelRef};
use tokio_util::sync::CancellationToken;

fn services(jobs: &Arc<MockJobs>, allowed: usize, tunnels: MockTunnels) -> Services {
    Services::remote(
        jobs.clone(),
        Arc::new(MockConcurrency::new(allowed)),
        Arc::new(tunnels),
    )
}

fn suites(names: &[&str]) -> Vec<Suite> {
    names.iter().map(|n| Suite::new(*n, "cypress")).collect()
}

fn options() -> RunOptions {
    RunOptions::default()
        .with_poll_interval(Duration::from_secs(5))
        .with_tunnel_check(Duration::from_secs(10), Duration::from_secs(2))
}

#[tokio::test(start_paused = true)]
async fn test_serial_run_of_passing_suites() {
    let jobs = Arc::new(
        MockJobs::new()
            .with_script("a", ScriptedPoll::statuses(&[JobStatus::Passed]))
            .with_script("b", ScriptedPoll::statuses(&[JobStatus::Passed]))
            .with_script("c", ScriptedPoll::statuses(&[JobStatus::Passed])),
    );
    let orchestrator =
        RunOrchestrator::new(services(&jobs, 1, MockTunnels::new()), options());

    let run = orchestrator.run(suites(&["a", "b", "c"])).await.unwrap();

    assert_eq!(run.passed_count(), 3);
    assert!(run.success());
    assert_eq!(run.exit_code(), EXIT_SUCCESS);
    assert_eq!(jobs.start_calls(), 3);
    assert_eq!(jobs.peak_active(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_huge_configured_timeout_runs_to_completion() {
    let mut project: Project = r#"
kind: cypress
sauce:
  region: us-west-1
suites:
  - name: patient
    timeout: "9223372036854775807"
"#
    .parse()
    .unwrap();
    project.set_defaults();
    project.validate().unwrap();

    let jobs = Arc::new(MockJobs::new().with_script(
        "patient",
        ScriptedPoll::statuses(&[JobStatus::Running, JobStatus::Passed]),
    ));
    let orchestrator =
        RunOrchestrator::new(services(&jobs, 1, MockTunnels::new()), options());

    let run = orchestrator.run(project.into_suites()).await.unwrap();

    let result = &run.results[0];
    assert_eq!(result.status, JobStatus::Passed, "error: {:?}", result.error);
    assert_eq!(jobs.start_calls(), 1);
    assert_eq!(jobs.total_stop_calls(), 0);
    assert_eq!(run.exit_code(), EXIT_SUCCESS);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_poll_retries_error_one_suite_only() {
    let jobs = Arc::new(
        MockJobs::new()
            .with_script("flaky", ScriptedPoll::always_error())
            .with_script(
                "steady",
                ScriptedPoll::statuses(&[JobStatus::Running, JobStatus::Passed]),
            ),
    );
    let orchestrator = RunOrchestrator::new(
        services(&jobs, 2, MockTunnels::new()),
        options().with_retry(RetryPolicy::default().with_max_attempts(2)),
    );

    let run = orchestrator.run(suites(&["flaky", "steady"])).await.unwrap();

    let flaky = run.results.iter().find(|r| r.suite_name == "flaky").unwrap();
    let steady = run.results.iter().find(|r| r.suite_name == "steady").unwrap();
    assert_eq!(flaky.status, JobStatus::Errored);
    assert!(flaky.error.is_some());
    assert_eq!(jobs.poll_calls("flaky"), 3);
    assert_eq!(steady.status, JobStatus::Passed);
    assert_ne!(run.exit_code(), EXIT_SUCCESS);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_tunnel_never_starts_a_job() {
    let jobs = Arc::new(MockJobs::new());
    let orchestrator =
        RunOrchestrator::new(services(&jobs, 1, MockTunnels::new()), options());

    let suite = Suite::new("private", "cypress").with_tunnel(TunnelRef::new("missing"));
    let run = orchestrator.run(vec![suite]).await.unwrap();

    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].status, JobStatus::Errored);
    assert!(run.results[0].job_id.is_none());
    assert_eq!(jobs.start_calls(), 0);
    assert!(!run.anything_executed());
}

#[tokio::test(start_paused = true)]
async fn test_tunnel_failure_releases_the_slot_for_the_next_suite() {
    let jobs = Arc::new(
        MockJobs::new().with_script("public", ScriptedPoll::statuses(&[JobStatus::Passed])),
    );
    let orchestrator =
        RunOrchestrator::new(services(&jobs, 1, MockTunnels::new()), options());

    let run = orchestrator
        .run(vec![
            Suite::new("private", "cypress").with_tunnel(TunnelRef::new("missing")),
            Suite::new("public", "cypress"),
        ])
        .await
        .unwrap();

    assert_eq!(run.results.len(), 2);
    assert_eq!(jobs.started_suites(), vec!["public".to_string()]);
    assert_eq!(run.exit_code(), EXIT_FAILURE);
}

#[tokio::test(start_paused = true)]
async fn test_abort_on_first_failure_stops_in_flight_suites() {
    let mut jobs = MockJobs::new().with_script(
        "s1",
        ScriptedPoll::statuses(&[JobStatus::Running, JobStatus::Failed]),
    );
    for name in ["s2", "s3", "s4", "s5"] {
        jobs = jobs.with_script(name, ScriptedPoll::new());
    }
    let jobs = Arc::new(jobs);
    let orchestrator = RunOrchestrator::new(
        services(&jobs, 5, MockTunnels::new()),
        options().abort_on_failure(true),
    );

    let run = orchestrator
        .run(suites(&["s1", "s2", "s3", "s4", "s5"]))
        .await
        .unwrap();

    assert_eq!(run.results.len(), 5);
    assert_eq!(run.failed_count(), 1);
    assert_eq!(run.stopped_count(), 4);
    assert_eq!(jobs.start_calls(), 5);
    assert_eq!(jobs.stop_calls("s1"), 0);
    for name in ["s2", "s3", "s4", "s5"] {
        assert_eq!(jobs.stop_calls(name), 1, "{name} should be stopped once");
    }
    assert_eq!(run.exit_code(), EXIT_FAILURE);
}

#[tokio::test(start_paused = true)]
async fn test_abort_on_first_failure_never_starts_queued_suites() {
    let mut jobs = MockJobs::new();
    for name in ["s1", "s2", "s3", "s4", "s5"] {
        jobs = jobs.with_script(
            name,
            ScriptedPoll::statuses(&[JobStatus::Running, JobStatus::Failed]),
        );
    }
    let jobs = Arc::new(jobs);
    let orchestrator = RunOrchestrator::new(
        services(&jobs, 1, MockTunnels::new()),
        options().abort_on_failure(true),
    );

    let run = orchestrator
        .run(suites(&["s1", "s2", "s3", "s4", "s5"]))
        .await
        .unwrap();

    assert_eq!(jobs.start_calls(), 1);
    assert_eq!(jobs.total_stop_calls(), 0);
    assert_eq!(run.results.len(), 5);
    assert_eq!(run.failed_count(), 1);
    assert_eq!(run.stopped_count(), 4);
    assert!(
        run.results
            .iter()
            .filter(|r| r.status == JobStatus::Stopped)
            .all(|r| r.job_id.is_none())
    );
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_never_starts_jobs() {
    let jobs = Arc::new(MockJobs::new());
    let concurrency = Arc::new(MockConcurrency::new(3));
    let services = Services::remote(
        jobs.clone(),
        concurrency.clone(),
        Arc::new(MockTunnels::new().with_ready("tunnel")),
    );
    let orchestrator = RunOrchestrator::new(services, options().dry_run(true));

    let run = orchestrator
        .run(vec![
            Suite::new("a", "cypress"),
            Suite::new("b", "cypress").with_tunnel(TunnelRef::new("tunnel")),
        ])
        .await
        .unwrap();

    assert_eq!(jobs.start_calls(), 0);
    assert_eq!(concurrency.reads(), 0);
    assert!(run.results.iter().all(|r| r.dry_run && r.passed()));
    assert_eq!(run.exit_code(), EXIT_SUCCESS);
}

#[tokio::test(start_paused = true)]
async fn test_requested_concurrency_caps_upstream() {
    let mut jobs = MockJobs::new();
    let names = ["a", "b", "c", "d", "e", "f"];
    for name in names {
        jobs = jobs.with_script(
            name,
            ScriptedPoll::statuses(&[JobStatus::Running, JobStatus::Running, JobStatus::Passed]),
        );
    }
    let jobs = Arc::new(jobs);
    let orchestrator = RunOrchestrator::new(
        services(&jobs, 10, MockTunnels::new()),
        options().with_concurrency(2),
    );

    let run = orchestrator.run(suites(&names)).await.unwrap();

    assert!(run.success());
    assert_eq!(jobs.peak_active(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_concurrency_read_runs_serially() {
    let mut jobs = MockJobs::new();
    for name in ["a", "b", "c"] {
        jobs = jobs.with_script(
            name,
            ScriptedPoll::statuses(&[JobStatus::Running, JobStatus::Passed]),
        );
    }
    let jobs = Arc::new(jobs);
    let services = Services::remote(
        jobs.clone(),
        Arc::new(MockConcurrency::failing()),
        Arc::new(MockTunnels::new()),
    );
    let orchestrator = RunOrchestrator::new(services, options());

    let run = orchestrator.run(suites(&["a", "b", "c"])).await.unwrap();

    assert!(run.success());
    assert_eq!(jobs.peak_active(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slots_balance_across_every_exit_path() {
    let jobs = Arc::new(
        MockJobs::new()
            .with_script("pass", ScriptedPoll::statuses(&[JobStatus::Passed]))
            .with_script("fail", ScriptedPoll::statuses(&[JobStatus::Failed]))
            .with_script("flaky", ScriptedPoll::always_error())
            .with_script("slow", ScriptedPoll::new())
            .with_failing_start("broken"),
    );
    let gate = ConcurrencyGate::with_capacity(2);
    let cancel = CancellationToken::new();
    let tunnels = TunnelGate::new(Arc::new(MockTunnels::new()))
        .with_check_window(Duration::from_secs(4))
        .with_check_interval(Duration::from_secs(1));
    let settings = Arc::new(ExecutorSettings::default());

    let specs = vec![
        Suite::new("pass", "cypress"),
        Suite::new("fail", "cypress"),
        Suite::new("flaky", "cypress"),
        Suite::new("slow", "cypress").with_timeout(Duration::from_secs(20)),
        Suite::new("broken", "cypress"),
        Suite::new("tunnelled", "cypress").with_tunnel(TunnelRef::new("absent")),
    ];
    let count = specs.len();

    let mut handles = Vec::new();
    for suite in specs {
        let mut executor = SuiteExecutor::new(
            suite,
            jobs.clone(),
            gate.clone(),
            tunnels.clone(),
            settings.clone(),
            cancel.clone(),
        );
        handles.push(tokio::spawn(async move { executor.run().await }));
    }
    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap().status);
    }

    assert_eq!(statuses.len(), count);
    assert!(statuses.contains(&JobStatus::TimedOut));
    assert_eq!(gate.acquired_total(), count);
    assert_eq!(gate.released_total(), count);
    assert_eq!(gate.in_use(), 0);
    assert!(gate.peak_in_use() <= 2);
}

fn script_strategy() -> impl Strategy<Value = Vec<Option<JobStatus>>> {
    let step = prop_oneof![
        Just(None),
        Just(Some(JobStatus::Running)),
        Just(Some(JobStatus::Passed)),
        Just(Some(JobStatus::Failed)),
        Just(Some(JobStatus::Errored)),
    ];
    prop::collection::vec(step, 1..6)
}

fn build_script(steps: &[Option<JobStatus>]) -> ScriptedPoll {
    let script = steps.iter().fold(ScriptedPoll::new(), |script, step| match step {
        Some(status) => script.then_status(*status),
        None => script.then_error(ServiceError::Transient("gateway timeout".into())),
    });
    script.then_status(JobStatus::Passed)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_every_suite_gets_one_result_within_capacity(
        capacity in 1usize..4,
        scripts in prop::collection::vec(script_strategy(), 1..8),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let names: Vec<String> = (0..scripts.len()).map(|i| format!("suite-{i}")).collect();
        let mut jobs = MockJobs::new();
        for (name, steps) in names.iter().zip(&scripts) {
            jobs = jobs.with_script(name, build_script(steps));
        }
        let jobs = Arc::new(jobs);
        let orchestrator = RunOrchestrator::new(
            services(&jobs, capacity, MockTunnels::new()),
            options(),
        );
        let input: Vec<Suite> = names.iter().map(|n| Suite::new(n.as_str(), "cypress")).collect();

        let run = runtime.block_on(orchestrator.run(input)).unwrap();

        let expected: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        let actual: BTreeSet<&str> = run.results.iter().map(|r| r.suite_name.as_str()).collect();
        prop_assert_eq!(run.results.len(), names.len());
        prop_assert_eq!(actual, expected);
        prop_assert!(jobs.peak_active() <= capacity);
    }
}
