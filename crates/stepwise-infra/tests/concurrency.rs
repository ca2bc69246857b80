//! Concurrent mutations of one workflow are serialized.

mod common;

use std::sync::Arc;

use common::{data, engine_at, database_url, test_engine};
use serde_json::json;
use stepwise_types::checkpoint::CreateCheckpointRequest;
use stepwise_types::error::WorkflowError;
use stepwise_types::workflow::{StartWorkflowRequest, StepData, WorkflowStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_completions_succeed_once() {
    let (engine, _pool) = test_engine().await;
    let engine = Arc::new(engine);
    let wf = engine
        .start_workflow(StartWorkflowRequest::new("two-step", StepData::new(), "tester"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        let id = wf.id.clone();
        handles.push(tokio::spawn(async move {
            engine.complete_step(&id, "step1", data(json!({"writer": i}))).await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(WorkflowError::StepNotEligible { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(engine.get_workflow(&wf.id).await.unwrap().revision, 1);
    assert_eq!(engine.active_locks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_checkpoints_with_one_request_id_store_once() {
    let (engine, _pool) = test_engine().await;
    let engine = Arc::new(engine);
    let wf = engine
        .start_workflow(StartWorkflowRequest::new("two-step", StepData::new(), "tester"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        let id = wf.id.clone();
        handles.push(tokio::spawn(async move {
            engine
                .create_checkpoint(
                    &id,
                    CreateCheckpointRequest::new("step1", data(json!({"attempt": i})), "")
                        .with_request_id("req-race"),
                )
                .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(engine.list_checkpoints(&wf.id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_workflows_progress_in_parallel() {
    let (engine, _pool) = test_engine().await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let wf = engine
                .start_workflow(StartWorkflowRequest::new("two-step", StepData::new(), "tester"))
                .await?;
            engine.complete_step(&wf.id, "step1", StepData::new()).await?;
            engine.complete_step(&wf.id, "step2", StepData::new()).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, WorkflowStatus::Completed);
    }
}

#[tokio::test]
async fn engines_sharing_a_database_see_each_others_commits() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(dir.path());
    let (first, _pool_a) = engine_at(&url).await;
    first
        .registry()
        .load_from_str(common::TWO_STEP, "fixture")
        .await
        .unwrap();
    let (second, _pool_b) = engine_at(&url).await;

    let wf = first
        .start_workflow(StartWorkflowRequest::new("two-step", StepData::new(), "tester"))
        .await
        .unwrap();

    second.pause(&wf.id).await.unwrap();
    let err = first.complete_step(&wf.id, "step1", StepData::new()).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidTransition {
            from: WorkflowStatus::Paused,
            ..
        }
    ));
    assert_eq!(first.get_workflow(&wf.id).await.unwrap().revision, 1);
}
