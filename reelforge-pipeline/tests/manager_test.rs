use reelforge_core::config::PipelineConfig;
use reelforge_core::stages::*;
use reelforge_core::{Error, FailureKind, RunStatus, StageDefinition, StageFailure, StageStatus};
use reelforge_pipeline::{CreateRun, PipelineError, PipelineManager, StageUpdate};
use reelforge_storage::InMemoryRunStore;
use serde_json::json;
use std::sync::Arc;

fn manager() -> PipelineManager {
    PipelineManager::new(Arc::new(InMemoryRunStore::new()), PipelineConfig::default())
}

fn request(target: f64) -> CreateRun {
    CreateRun {
        source_url: "https://example.com/mug".to_string(),
        target_duration: target,
        ..Default::default()
    }
}

fn three_stage_request() -> CreateRun {
    CreateRun {
        stages: Some(vec![
            StageDefinition::new("fetch", "Fetch", "", "test"),
            StageDefinition::new("write", "Write", "", "test"),
            StageDefinition::new("speak", "Speak", "", "test"),
        ]),
        ..request(15.0)
    }
}

fn core_err(err: PipelineError) -> Error {
    match err {
        PipelineError::Core(e) => e,
        other => panic!("expected core error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_run_starts_waiting() {
    let manager = manager();
    let run = manager.create_run(request(15.0)).await.unwrap();

    assert_eq!(run.status, RunStatus::Waiting);
    assert_eq!(run.stages.len(), 14);
    assert_eq!(run.title, "https://example.com/mug");
    assert!(run.stages.iter().all(|s| s.started_at.is_none()));
    assert_eq!(
        run.stage(FINAL_MERGE).map(|s| s.status),
        Some(StageStatus::NotImplemented)
    );

    let report = manager.report(&run.id).await.unwrap();
    assert_eq!(report.progress.total, 11);
    assert_eq!(report.progress.percentage, 0);
    assert_eq!(report.current_stage.as_deref(), Some(WEB_SCRAPING));
}

#[tokio::test]
async fn test_create_run_rejects_bad_input() {
    let manager = manager();
    for target in [0.0, 2.0, 61.0, f64::NAN] {
        let err = manager.create_run(request(target)).await.unwrap_err();
        assert!(matches!(core_err(err), Error::Validation(_)), "target {target}");
    }

    let err = manager
        .create_run(CreateRun {
            source_url: "  ".to_string(),
            ..request(15.0)
        })
        .await
        .unwrap_err();
    assert!(matches!(core_err(err), Error::Validation(_)));

    let duplicate = CreateRun {
        stages: Some(vec![
            StageDefinition::new("a", "A", "", "test"),
            StageDefinition::new("a", "A again", "", "test"),
        ]),
        ..request(15.0)
    };
    assert!(manager.create_run(duplicate).await.is_err());
}

#[tokio::test]
async fn test_advance_is_idempotent() {
    let manager = manager();
    let run = manager.create_run(three_stage_request()).await.unwrap();

    let first = manager
        .advance_stage(&run.id, "fetch", StageUpdate::running())
        .await
        .unwrap();
    let again = manager
        .advance_stage(&run.id, "fetch", StageUpdate::running())
        .await
        .unwrap();
    assert_eq!(first, again);
    assert_eq!(again.status, RunStatus::Running);

    let output = json!({ "content": "Hot coffee", "audio": "/uploads/a.mp3" });
    let done = manager
        .advance_stage(&run.id, "fetch", StageUpdate::completed(output.clone()))
        .await
        .unwrap();
    let done_again = manager
        .advance_stage(&run.id, "fetch", StageUpdate::completed(output))
        .await
        .unwrap();
    assert_eq!(done, done_again);

    let stage = done.stage("fetch").unwrap();
    assert_eq!(stage.asset_refs, vec!["/uploads/a.mp3"]);
    assert!(stage.started_at.unwrap() <= stage.finished_at.unwrap());
    assert_eq!(done.status, RunStatus::Waiting);
}

#[tokio::test]
async fn test_second_running_stage_conflicts() {
    let manager = manager();
    let run = manager.create_run(three_stage_request()).await.unwrap();
    manager
        .advance_stage(&run.id, "fetch", StageUpdate::running())
        .await
        .unwrap();

    let err = manager
        .advance_stage(&run.id, "write", StageUpdate::running())
        .await
        .unwrap_err();
    assert!(matches!(core_err(err), Error::Conflict(_)));

    let stored = manager.get_run(&run.id).await.unwrap();
    assert_eq!(stored.stage("write").unwrap().status, StageStatus::Pending);
}

#[tokio::test]
async fn test_not_implemented_stage_cannot_run() {
    let manager = manager();
    let run = manager.create_run(request(15.0)).await.unwrap();

    let err = manager
        .advance_stage(&run.id, AVATAR_GENERATION, StageUpdate::running())
        .await
        .unwrap_err();
    assert!(matches!(core_err(err), Error::InvalidTransition(_)));

    let err = manager
        .advance_stage(&run.id, "no-such-stage", StageUpdate::running())
        .await
        .unwrap_err();
    assert!(matches!(core_err(err), Error::StageNotFound { .. }));
}

#[tokio::test]
async fn test_all_participating_completed_means_completed() {
    let manager = manager();
    let run = manager.create_run(request(15.0)).await.unwrap();

    let mut last = run.clone();
    for stage in run.stages.iter().filter(|s| s.status == StageStatus::Pending) {
        manager
            .advance_stage(&run.id, &stage.id, StageUpdate::running())
            .await
            .unwrap();
        last = manager
            .advance_stage(&run.id, &stage.id, StageUpdate::completed(json!({ "text": "ok" })))
            .await
            .unwrap();
    }
    assert_eq!(last.status, RunStatus::Completed);
    assert_eq!(last.report().progress.percentage, 100);
}

#[tokio::test]
async fn test_error_then_resume_keeps_earlier_stages() {
    let manager = manager();
    let run = manager.create_run(three_stage_request()).await.unwrap();
    manager.advance_stage(&run.id, "fetch", StageUpdate::running()).await.unwrap();
    manager
        .advance_stage(&run.id, "fetch", StageUpdate::completed(json!({ "text": "page" })))
        .await
        .unwrap();
    manager.advance_stage(&run.id, "write", StageUpdate::running()).await.unwrap();
    let failed = manager
        .advance_stage(
            &run.id,
            "write",
            StageUpdate::failed(StageFailure::new(FailureKind::Collaborator, "upstream 503")),
        )
        .await
        .unwrap();
    assert_eq!(failed.status, RunStatus::Error);
    assert_eq!(failed.report().current_stage.as_deref(), Some("write"));

    let (resumed, stage_id) = manager.resume(&run.id).await.unwrap();
    assert_eq!(stage_id, "write");
    assert_eq!(resumed.status, RunStatus::Running);
    let fetch = resumed.stage("fetch").unwrap();
    assert_eq!(fetch.status, StageStatus::Completed);
    assert_eq!(fetch.output, Some(json!({ "text": "page" })));
    let write = resumed.stage("write").unwrap();
    assert!(write.error.is_none());
    assert!(write.finished_at.is_none());

    let err = manager.resume(&run.id).await.unwrap_err();
    assert!(matches!(core_err(err), Error::Conflict(_)));
}

#[tokio::test]
async fn test_resume_on_finished_run() {
    let manager = manager();
    let run = manager
        .create_run(CreateRun {
            stages: Some(vec![StageDefinition::new("only", "Only", "", "test")]),
            ..request(10.0)
        })
        .await
        .unwrap();
    manager.advance_stage(&run.id, "only", StageUpdate::running()).await.unwrap();
    manager
        .advance_stage(&run.id, "only", StageUpdate::completed(json!({})))
        .await
        .unwrap();

    let err = manager.resume(&run.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::NothingToResume(_)));
}

#[tokio::test]
async fn test_run_stage_only_for_pending_or_error() {
    let manager = manager();
    let run = manager.create_run(three_stage_request()).await.unwrap();

    let running = manager.run_stage(&run.id, "write").await.unwrap();
    assert_eq!(running.stage("write").unwrap().status, StageStatus::Running);
    manager
        .advance_stage(&run.id, "write", StageUpdate::completed(json!({ "text": "script" })))
        .await
        .unwrap();

    let err = manager.run_stage(&run.id, "write").await.unwrap_err();
    assert!(matches!(core_err(err), Error::InvalidTransition(_)));
}

#[tokio::test]
async fn test_restart_from_copies_earlier_completed_stages() {
    let manager = manager();
    let run = manager.create_run(three_stage_request()).await.unwrap();
    for id in ["fetch", "write"] {
        manager.advance_stage(&run.id, id, StageUpdate::running()).await.unwrap();
        manager
            .advance_stage(&run.id, id, StageUpdate::completed(json!({ "text": id })))
            .await
            .unwrap();
    }

    let restarted = manager.restart_from(&run.id, 2).await.unwrap();
    assert_ne!(restarted.id, run.id);
    assert_eq!(restarted.title, "https://example.com/mug (restart from stage 2)");
    assert_eq!(restarted.stage("fetch").unwrap().output, Some(json!({ "text": "fetch" })));
    assert_eq!(restarted.stage("write").unwrap().status, StageStatus::Pending);
    assert!(restarted.stage("write").unwrap().output.is_none());
    assert_eq!(restarted.stage("speak").unwrap().status, StageStatus::Pending);

    let origin = restarted.restarted_from.clone().unwrap();
    assert_eq!(origin.run_id, run.id);
    assert_eq!(origin.from_order, 2);

    let snapshots = manager.list_snapshots(&run.id).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].id, origin.snapshot_id);
    assert!(snapshots[0].automatic);
    assert_eq!(snapshots[0].completed_stages, 2);

    let source = manager.get_run(&run.id).await.unwrap();
    assert_eq!(source.stage("write").unwrap().status, StageStatus::Completed);

    for order in [0, 4] {
        let err = manager.restart_from(&run.id, order).await.unwrap_err();
        assert!(matches!(core_err(err), Error::Validation(_)));
    }
}

#[tokio::test]
async fn test_snapshot_restore_round_trip() {
    let manager = manager();
    let run = manager.create_run(three_stage_request()).await.unwrap();
    manager.advance_stage(&run.id, "fetch", StageUpdate::running()).await.unwrap();
    manager
        .advance_stage(&run.id, "fetch", StageUpdate::completed(json!({ "text": "v1" })))
        .await
        .unwrap();

    let snapshot = manager
        .create_snapshot(&run.id, Some("before edits".to_string()))
        .await
        .unwrap();
    assert_eq!(snapshot.label, "v1");
    assert_eq!(snapshot.note.as_deref(), Some("before edits"));
    let before = manager.get_run(&run.id).await.unwrap().stages;

    manager
        .update_stage_output(&run.id, "fetch", json!({ "text": "edited" }))
        .await
        .unwrap();
    manager.advance_stage(&run.id, "write", StageUpdate::running()).await.unwrap();
    manager
        .advance_stage(&run.id, "write", StageUpdate::completed(json!({ "text": "w" })))
        .await
        .unwrap();

    let err = manager.restore_snapshot(&run.id, &snapshot.id, false).await.unwrap_err();
    assert!(matches!(core_err(err), Error::Validation(_)));

    let restored = manager.restore_snapshot(&run.id, &snapshot.id, true).await.unwrap();
    assert_eq!(restored.stages, before);
    assert_eq!(manager.get_run(&run.id).await.unwrap().stages, before);

    let second = manager.create_snapshot(&run.id, None).await.unwrap();
    assert_eq!(second.label, "v2");

    let err = manager.restore_snapshot(&run.id, "missing", true).await.unwrap_err();
    assert!(matches!(core_err(err), Error::SnapshotNotFound(_)));
}

#[tokio::test]
async fn test_snapshot_of_running_stage_restores_as_pending() {
    let manager = manager();
    let run = manager.create_run(three_stage_request()).await.unwrap();
    manager.advance_stage(&run.id, "fetch", StageUpdate::running()).await.unwrap();
    manager
        .advance_stage(&run.id, "fetch", StageUpdate::completed(json!({ "text": "v1" })))
        .await
        .unwrap();
    manager.advance_stage(&run.id, "write", StageUpdate::running()).await.unwrap();

    let snapshot = manager.create_snapshot(&run.id, None).await.unwrap();
    assert_eq!(snapshot.completed_stages, 1);
    let write = snapshot.stages.iter().find(|s| s.id == "write").unwrap();
    assert_eq!(write.status, StageStatus::Pending);
    assert!(write.started_at.is_none());

    let failure = StageFailure::new(FailureKind::Collaborator, "timeout");
    manager
        .advance_stage(&run.id, "write", StageUpdate::failed(failure))
        .await
        .unwrap();
    let restored = manager.restore_snapshot(&run.id, &snapshot.id, true).await.unwrap();
    assert_eq!(restored.stage("write").unwrap().status, StageStatus::Pending);
    assert_eq!(restored.stage("fetch").unwrap().status, StageStatus::Completed);

    let (_, next) = manager.resume(&run.id).await.unwrap();
    assert_eq!(next, "write");
}

#[tokio::test]
async fn test_restore_rejects_foreign_snapshot() {
    let manager = manager();
    let a = manager.create_run(three_stage_request()).await.unwrap();
    let b = manager.create_run(three_stage_request()).await.unwrap();
    let snapshot = manager.create_snapshot(&a.id, None).await.unwrap();

    let err = manager.restore_snapshot(&b.id, &snapshot.id, true).await.unwrap_err();
    assert!(matches!(core_err(err), Error::Validation(_)));
}

#[tokio::test]
async fn test_update_output_requires_completed_stage() {
    let manager = manager();
    let run = manager.create_run(three_stage_request()).await.unwrap();

    let err = manager
        .update_stage_output(&run.id, "fetch", json!({ "text": "early" }))
        .await
        .unwrap_err();
    assert!(matches!(core_err(err), Error::InvalidTransition(_)));

    manager.advance_stage(&run.id, "fetch", StageUpdate::running()).await.unwrap();
    manager
        .advance_stage(&run.id, "fetch", StageUpdate::completed(json!({ "text": "first" })))
        .await
        .unwrap();
    let stage = manager
        .update_stage_output(&run.id, "fetch", json!({ "text": "second", "file": "/uploads/x.wav" }))
        .await
        .unwrap();
    assert_eq!(stage.status, StageStatus::Completed);
    assert_eq!(stage.asset_refs, vec!["/uploads/x.wav"]);
}

#[tokio::test]
async fn test_concurrent_claims_allow_one_running_stage() {
    let manager = Arc::new(manager());
    let run = manager.create_run(three_stage_request()).await.unwrap();

    let handles: Vec<_> = ["fetch", "write", "speak"]
        .into_iter()
        .map(|id| {
            let manager = manager.clone();
            let run_id = run.id.clone();
            tokio::spawn(async move { manager.advance_stage(&run_id, id, StageUpdate::running()).await })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            ok += 1;
        }
    }
    assert_eq!(ok, 1);
    let stored = manager.get_run(&run.id).await.unwrap();
    assert_eq!(
        stored.stages.iter().filter(|s| s.status == StageStatus::Running).count(),
        1
    );
}

#[tokio::test]
async fn test_list_runs() {
    let manager = manager();
    manager.create_run(request(15.0)).await.unwrap();
    manager.create_run(request(30.0)).await.unwrap();

    let runs = manager.list_runs().await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.total_stages == 11 && !r.has_error));
}
