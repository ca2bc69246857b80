//! A new engine on the same database sees exactly what the old one wrote.

mod common;

use common::{TWO_STEP, data, database_url, engine_at};
use serde_json::json;
use stepwise_types::checkpoint::CreateCheckpointRequest;
use stepwise_types::workflow::{StartWorkflowRequest, StepData};

#[tokio::test]
async fn restarted_engine_reconstructs_state() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(dir.path());

    let (workflow_id, state_before, next_before, checkpoints_before) = {
        let (engine, pool) = engine_at(&url).await;
        engine.registry().load_from_str(TWO_STEP, "fixture").await.unwrap();
        let wf = engine
            .start_workflow(StartWorkflowRequest::new(
                "two-step",
                data(json!({"ticket": 42})),
                "ops",
            ))
            .await
            .unwrap();
        engine
            .complete_step(&wf.id, "step1", data(json!({"a": 1})))
            .await
            .unwrap();
        engine
            .create_checkpoint(
                &wf.id,
                CreateCheckpointRequest::new("step2", data(json!({"progress": 50})), "halfway")
                    .with_request_id("req-123"),
            )
            .await
            .unwrap();

        let snapshot = (
            wf.id.clone(),
            engine.get_workflow_state(&wf.id).await.unwrap(),
            engine.get_next_step(&wf.id).await.unwrap(),
            engine.list_checkpoints(&wf.id).await.unwrap(),
        );
        pool.writer.close().await;
        pool.reader.close().await;
        snapshot
    };

    let (engine, _pool) = engine_at(&url).await;
    assert_eq!(engine.get_workflow_state(&workflow_id).await.unwrap(), state_before);
    assert_eq!(engine.get_next_step(&workflow_id).await.unwrap(), next_before);
    assert_eq!(engine.list_checkpoints(&workflow_id).await.unwrap(), checkpoints_before);

    // Reloading the same templates after a restart changes nothing.
    let report = engine.registry().load_from_str(TWO_STEP, "fixture").await.unwrap();
    assert!(report.registered.is_empty());
    assert_eq!(report.unchanged.len(), 1);

    // The replayed request still resolves to the stored checkpoint.
    let replay = engine
        .create_checkpoint(
            &workflow_id,
            CreateCheckpointRequest::new("step2", StepData::new(), "retry").with_request_id("req-123"),
        )
        .await
        .unwrap();
    assert_eq!(replay, checkpoints_before[0]);

    let state = engine
        .complete_step(&workflow_id, "step2", data(json!({"b": 2})))
        .await
        .unwrap();
    assert_eq!(state.step_data, data(json!({"ticket": 42, "a": 1, "b": 2})));
}
