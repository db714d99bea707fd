//! Integration tests for `PostgresRunStore`.
//!
//! Requires a running Postgres instance reachable through `DATABASE_URL`.
//! Run with: `cargo test --test postgres_store --features postgres -- --ignored`

#![cfg(feature = "postgres")]

use runward::persistence::PostgresRunStore;
use runward::*;
use sqlx::{PgPool, Row};
use uuid::Uuid;

async fn connect() -> Option<PostgresRunStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let store = PostgresRunStore::new(pool);
    store.ensure_schema().await.expect("schema applies");
    Some(store)
}

fn unique_run(workflow: WorkflowKind) -> Run {
    Run::running(
        RunId::new(format!("test-{}", Uuid::new_v4())),
        workflow,
        Some("user@example.com".into()),
        vec![IoDescriptor::url("protein.pdb", "https://files.test/protein.pdb")],
    )
}

async fn cleanup(store: &PostgresRunStore, run_id: &RunId) {
    let _ = sqlx::query("DELETE FROM runward_runs WHERE id = $1")
        .bind(run_id.as_str())
        .execute(store.pool())
        .await;
}

#[tokio::test]
#[ignore]
async fn put_then_get_returns_the_same_run() {
    let Some(store) = connect().await else { return };
    let run = unique_run(WorkflowKind::Simulation);

    store.put(&run).await.expect("put");
    let loaded = store.get(&run.id).await.expect("get").expect("present");

    assert_eq!(loaded.id, run.id);
    assert_eq!(loaded.status, RunStatus::Running);
    assert_eq!(loaded.inputs, run.inputs);
    assert!(store.list_ids().await.unwrap().contains(&run.id));

    cleanup(&store, &run.id).await;
}

#[tokio::test]
#[ignore]
async fn second_put_replaces_record_and_status_column() {
    let Some(store) = connect().await else { return };
    let mut run = unique_run(WorkflowKind::LigandSimulation);
    store.put(&run).await.unwrap();

    run.apply_result(JobResult::new(0, ["a.pdb"], "https://x/"))
        .unwrap();
    store.put(&run).await.unwrap();

    let loaded = store.get(&run.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, RunStatus::Completed);
    assert_eq!(loaded.outputs, vec![IoDescriptor::url("a.pdb", "https://x/a.pdb")]);

    let row = sqlx::query("SELECT status FROM runward_runs WHERE id = $1")
        .bind(run.id.as_str())
        .fetch_one(store.pool())
        .await
        .unwrap();
    let status: String = row.try_get("status").unwrap();
    assert_eq!(status, "COMPLETED");

    cleanup(&store, &run.id).await;
}

#[tokio::test]
#[ignore]
async fn missing_run_reads_as_none() {
    let Some(store) = connect().await else { return };
    let missing = RunId::new(format!("absent-{}", Uuid::new_v4()));
    assert!(store.get(&missing).await.unwrap().is_none());
}
