//! Store behavior against a file-backed database shared by several handles.

use portal_db::{DbError, EventType, NewRun, PortalDb, RunStatus, RunUpdate};
use portal_ids::RunId;
use std::time::Duration;
use tempfile::TempDir;

fn new_run(input: &str) -> NewRun {
    NewRun {
        run_id: RunId::new(),
        triggered_by: "alice".to_string(),
        input_file: input.to_string(),
        workspace_id: "ws".to_string(),
        pipeline_item_id: "pipe".to_string(),
        external_job_handle: "https://jobs.example/1".to_string(),
        status: RunStatus::Submitted,
        app_version: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquire_has_exactly_one_winner() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("portal.sqlite");

    // Independent pools model independent server processes.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let db = PortalDb::open(&path).await.unwrap();
        handles.push(tokio::spawn(async move {
            let run_id = RunId::new();
            let won = db.run_lock().acquire(&run_id, "racer").await.unwrap();
            (run_id, won)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (run_id, won) = handle.await.unwrap();
        if won {
            winners.push(run_id);
        }
    }
    assert_eq!(winners.len(), 1);

    let db = PortalDb::open(&path).await.unwrap();
    let holder = db.run_lock().check().await.unwrap().unwrap();
    assert_eq!(holder.run_id, winners[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn force_release_never_evicts_unreported() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("portal.sqlite");
    let admin = PortalDb::open(&path).await.unwrap();
    let admitter = PortalDb::open(&path).await.unwrap();

    for _ in 0..100 {
        admin.run_lock().force_release().await.unwrap();

        let run_id = RunId::new();
        let acquire = {
            let lock = admitter.run_lock();
            let run_id = run_id.clone();
            tokio::spawn(async move { lock.acquire(&run_id, "racer").await.unwrap() })
        };
        let force = {
            let lock = admin.run_lock();
            tokio::spawn(async move { lock.force_release().await.unwrap() })
        };
        let acquired = acquire.await.unwrap();
        let evicted = force.await.unwrap();

        let still_held = admin.run_lock().check().await.unwrap();
        if acquired && still_held.is_none() {
            // The new holder was cleared, so it must be the one reported.
            let evicted = evicted.expect("eviction of a fresh holder was not reported");
            assert_eq!(evicted.run_id, run_id);
        }
        if let Some(holder) = still_held {
            assert_eq!(holder.run_id, run_id);
        }
    }
}

#[tokio::test]
async fn lock_state_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("portal.sqlite");
    let run_id = RunId::new();

    let db = PortalDb::open(&path).await.unwrap();
    assert!(db.run_lock().acquire(&run_id, "alice").await.unwrap());
    db.close().await;

    let db = PortalDb::open(&path).await.unwrap();
    assert_eq!(db.run_lock().check().await.unwrap().unwrap().run_id, run_id);
}

#[tokio::test]
async fn started_at_is_set_once() {
    let db = PortalDb::open_memory().await.unwrap();
    let run = new_run("orders.csv");
    db.insert_run(&run).await.unwrap();

    db.update_run(&run.run_id, &RunUpdate::status(RunStatus::Running))
        .await
        .unwrap();
    let first = db.get_run(&run.run_id).await.unwrap().unwrap().started_at;
    assert!(first.is_some());

    tokio::time::sleep(Duration::from_millis(5)).await;
    db.update_run(&run.run_id, &RunUpdate::status(RunStatus::Running))
        .await
        .unwrap();
    let second = db.get_run(&run.run_id).await.unwrap().unwrap().started_at;
    assert_eq!(first, second);
}

#[tokio::test]
async fn finished_at_is_set_on_first_terminal_status() {
    let db = PortalDb::open_memory().await.unwrap();
    let run = new_run("orders.csv");
    db.insert_run(&run).await.unwrap();

    db.update_run(&run.run_id, &RunUpdate::status(RunStatus::Queued))
        .await
        .unwrap();
    let queued = db.get_run(&run.run_id).await.unwrap().unwrap();
    assert!(queued.started_at.is_none());
    assert!(queued.finished_at.is_none());

    let failure = RunUpdate::status(RunStatus::Failed).with_error_message(Some("boom".into()));
    db.update_run(&run.run_id, &failure).await.unwrap();
    let failed = db.get_run(&run.run_id).await.unwrap().unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));
    // Straight from QUEUED to terminal: the run never reported RUNNING.
    assert!(failed.started_at.is_none());
    let finished = failed.finished_at.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    db.update_run(&run.run_id, &RunUpdate::kpis(serde_json::json!({"rows": 1})))
        .await
        .unwrap();
    db.update_run(&run.run_id, &RunUpdate::status(RunStatus::Failed))
        .await
        .unwrap();
    assert_eq!(
        db.get_run(&run.run_id).await.unwrap().unwrap().finished_at,
        Some(finished)
    );
}

#[tokio::test]
async fn duplicate_run_id_is_rejected() {
    let db = PortalDb::open_memory().await.unwrap();
    let run = new_run("orders.csv");
    db.insert_run(&run).await.unwrap();

    let err = db.insert_run(&run).await.unwrap_err();
    assert!(matches!(err, DbError::Sqlx(_)));
}

#[tokio::test]
async fn closed_store_reports_unavailable() {
    let db = PortalDb::open_memory().await.unwrap();
    db.close().await;

    let err = db.get_active_run().await.unwrap_err();
    assert!(err.is_unavailable());
    assert!(db
        .append_event(&RunId::new(), EventType::Log, "x")
        .await
        .is_err());
}
