//! Startup recovery and shutdown tests.

use std::time::Duration;

use runward::*;
use runward_testkit::{
    init_test_tracing, running_run, test_config, url_input, InMemoryRunStore, RecordingNotifier,
    ScriptedCluster, TestHarness,
};

const WAIT: Duration = Duration::from_secs(2);

fn finished_run(id: &str, status: RunStatus) -> Run {
    let mut run = running_run(id, WorkflowKind::Simulation, None);
    match status {
        RunStatus::Completed => {
            run.apply_result(JobResult::new(0, ["out.pdb"], "https://x/"))
                .unwrap();
        }
        RunStatus::Error => run.mark_error().unwrap(),
        RunStatus::Canceled => run.acknowledge_cancel().unwrap(),
        other => panic!("not a terminal status: {other}"),
    }
    run
}

fn seeded(runs: Vec<Run>) -> TestHarness {
    let store = InMemoryRunStore::new();
    for run in runs {
        store.seed(run);
    }
    TestHarness::with_parts(
        test_config(),
        store,
        ScriptedCluster::new(),
        RecordingNotifier::new(),
    )
}

#[tokio::test]
async fn building_an_orchestrator_does_not_recover() {
    let h = seeded(vec![running_run("r1", WorkflowKind::Simulation, None)]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.cluster.await_calls().is_empty());
    assert_eq!(h.orchestrator.active_monitors().await, 0);
}

#[tokio::test]
async fn recover_all_attaches_one_monitor_per_running_run() {
    init_test_tracing();
    let h = seeded(vec![
        running_run("r1", WorkflowKind::Simulation, None),
        running_run("r2", WorkflowKind::LigandSimulation, None),
        running_run("r3", WorkflowKind::Simulation, Some("user@example.com")),
        finished_run("done", RunStatus::Completed),
        finished_run("failed", RunStatus::Error),
        finished_run("canceled", RunStatus::Canceled),
    ]);

    let report = h.orchestrator.recover_all().await.expect("recover");

    assert_eq!(
        report,
        RecoveryReport {
            scanned: 6,
            reattached: 3,
            already_monitored: 0,
            failed: 0,
        }
    );
    assert!(h.cluster.wait_for_awaits(3, WAIT).await);
    let mut awaited = h.cluster.await_calls();
    awaited.sort();
    assert_eq!(
        awaited,
        vec![RunId::from("r1"), RunId::from("r2"), RunId::from("r3")]
    );
    assert_eq!(h.orchestrator.active_monitors().await, 3);

    for id in ["done", "failed", "canceled"] {
        assert!(h.store.writes_for(&RunId::from(id)).is_empty());
    }
}

#[tokio::test]
async fn recovered_run_is_finalized_and_notified() {
    let h = seeded(vec![running_run(
        "r1",
        WorkflowKind::Simulation,
        Some("user@example.com"),
    )]);
    let mut events = h.orchestrator.subscribe();

    h.orchestrator.recover_all().await.unwrap();
    h.cluster
        .finish("r1", JobResult::new(0, ["a.pdb", "b.pdb"], "https://x/"));

    let run = h
        .wait_for_status(&RunId::from("r1"), RunStatus::Completed, WAIT)
        .await
        .expect("recovered run completed");
    assert_eq!(run.outputs.len(), 2);

    let ended = h.notifier.wait_for(1, WAIT).await;
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].kind, NotificationKind::RunEnded);
    assert_eq!(ended[0].run_url(), Some("https://apps.test/workflow/0/r1"));

    let attached = loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("event")
            .expect("bus open");
        if let RunEventPayload::MonitorAttached { recovered } = event.payload {
            break recovered;
        }
    };
    assert!(attached);
}

#[tokio::test]
async fn recover_all_skips_runs_already_monitored() {
    let h = TestHarness::new();
    let run_id = h
        .orchestrator
        .launch("0", None, vec![url_input("a.pdb")])
        .await
        .unwrap();
    assert!(h.cluster.wait_for_awaits(1, WAIT).await);

    let report = h.orchestrator.recover_all().await.unwrap();
    assert_eq!(report.reattached, 0);
    assert_eq!(report.already_monitored, 1);

    let again = h.orchestrator.recover_all().await.unwrap();
    assert_eq!(again.already_monitored, 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.cluster.await_count_for(&run_id), 1);
}

#[tokio::test]
async fn unreadable_records_are_counted_not_fatal() {
    init_test_tracing();
    let h = seeded(vec![
        running_run("ok", WorkflowKind::Simulation, None),
        running_run("flaky", WorkflowKind::Simulation, None),
    ]);
    h.store.fail_get_for("flaky");
    h.store
        .insert_raw("corrupt", serde_json::json!({ "status": 12 }));

    let report = h.orchestrator.recover_all().await.unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.reattached, 1);
    assert_eq!(report.failed, 2);
    assert!(h.orchestrator.is_monitored(&RunId::from("ok")).await);
    assert!(!h.orchestrator.is_monitored(&RunId::from("flaky")).await);
}

#[tokio::test]
async fn listing_failure_aborts_recovery() {
    let h = seeded(vec![running_run("r1", WorkflowKind::Simulation, None)]);
    h.store.fail_list(true);

    let err = h.orchestrator.recover_all().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Persistence(_)));
    assert_eq!(h.orchestrator.active_monitors().await, 0);
}

#[tokio::test]
async fn records_without_status_are_treated_as_idle() {
    let h = seeded(vec![]);
    h.store.insert_raw(
        "legacy",
        serde_json::json!({
            "id": "legacy",
            "workflowId": 0,
            "created": "2024-01-01T00:00:00Z"
        }),
    );

    let report = h.orchestrator.recover_all().await.unwrap();
    assert_eq!(report.reattached, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(
        h.orchestrator
            .get_status(&RunId::from("legacy"))
            .await
            .unwrap(),
        RunStatus::Idle
    );
}

#[tokio::test]
async fn shutdown_stops_monitors_and_leaves_runs_running() {
    let h = seeded(vec![
        running_run("r1", WorkflowKind::Simulation, None),
        running_run("r2", WorkflowKind::Simulation, None),
    ]);
    h.orchestrator.recover_all().await.unwrap();
    assert!(h.cluster.wait_for_awaits(2, WAIT).await);

    h.orchestrator.shutdown().await;
    assert!(h.orchestrator.is_shut_down());
    assert_eq!(h.orchestrator.active_monitors().await, 0);

    h.cluster
        .finish("r1", JobResult::new(0, ["a.pdb"], "https://x/"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    for id in ["r1", "r2"] {
        let run = h.store.snapshot(&RunId::from(id)).unwrap();
        assert_eq!(run.status, RunStatus::Running, "{id} must stay running");
    }
    assert!(h.store.writes().is_empty());
}

#[tokio::test]
async fn restarted_orchestrator_picks_up_where_the_last_one_stopped() {
    let store = InMemoryRunStore::new();
    let cluster = ScriptedCluster::new();

    let first = TestHarness::with_parts(
        test_config(),
        store.clone(),
        cluster.clone(),
        RecordingNotifier::new(),
    );
    let run_id = first
        .orchestrator
        .launch("0", Some("user@example.com".into()), vec![url_input("a.pdb")])
        .await
        .unwrap();
    first.orchestrator.shutdown().await;

    let notifier = RecordingNotifier::new();
    let second = TestHarness::with_parts(test_config(), store, cluster, notifier);
    let report = second.orchestrator.recover_all().await.unwrap();
    assert_eq!(report.reattached, 1);

    second
        .cluster
        .finish(run_id.clone(), JobResult::new(0, ["result.pdb"], "https://x/"));
    let run = second
        .wait_for_status(&run_id, RunStatus::Completed, WAIT)
        .await
        .expect("completed by the second process");
    assert_eq!(
        run.outputs,
        vec![IoDescriptor::url("result.pdb", "https://x/result.pdb")]
    );

    let sent = second.notifier.wait_for(1, WAIT).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::RunEnded);
}
