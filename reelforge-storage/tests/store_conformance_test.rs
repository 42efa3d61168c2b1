//! The same scenarios against every RunStore implementation

use chrono::{Duration, Utc};
use reelforge_core::{build_stages, default_stages, Run, RunStatus, Snapshot, StageStatus};
use reelforge_storage::{CachedRunStore, InMemoryRunStore, RunStore, SledRunStore};
use std::sync::Arc;

fn run_created(id: &str, minutes_ago: i64) -> Run {
    let at = Utc::now() - Duration::minutes(minutes_ago);
    Run {
        id: id.to_string(),
        title: format!("Run {}", id),
        source_url: "https://shop.example.com/product".to_string(),
        target_duration: 15.0,
        status: RunStatus::Waiting,
        created_at: at,
        updated_at: at,
        stages: build_stages(&default_stages()),
        final_outputs: None,
        restarted_from: None,
    }
}

fn stores() -> Vec<(&'static str, Arc<dyn RunStore>)> {
    let sled: Arc<dyn RunStore> = Arc::new(SledRunStore::temporary().unwrap());
    vec![
        ("memory", Arc::new(InMemoryRunStore::new())),
        ("sled", sled.clone()),
        ("cached", Arc::new(CachedRunStore::new(sled, 4))),
    ]
}

#[tokio::test]
async fn test_list_runs_newest_first() {
    for (name, store) in stores() {
        let suffix = name;
        store.insert_run(&run_created(&format!("old-{}", suffix), 30)).await.unwrap();
        store.insert_run(&run_created(&format!("new-{}", suffix), 1)).await.unwrap();

        let runs = store.list_runs().await.unwrap();
        let ours: Vec<&Run> = runs.iter().filter(|r| r.id.ends_with(suffix)).collect();
        assert_eq!(ours.len(), 2, "{}", name);
        assert!(ours[0].id.starts_with("new-"), "{}", name);
        assert_eq!(ours[0].stages.len(), 14, "{}", name);
    }
}

#[tokio::test]
async fn test_stage_write_updates_header() {
    for (name, store) in stores() {
        let mut run = run_created(&format!("hdr-{}", name), 0);
        store.insert_run(&run).await.unwrap();

        run.status = RunStatus::Running;
        run.stages[0].status = StageStatus::Running;
        let stage = run.stages[0].clone();
        store.save_stage(&run, &stage).await.unwrap();

        let loaded = store.load_run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Running, "{}", name);
        assert_eq!(loaded.stages[0].status, StageStatus::Running, "{}", name);
        assert_eq!(loaded.stages[1].status, StageStatus::Pending, "{}", name);
    }
}

#[tokio::test]
async fn test_snapshots_listed_per_run() {
    for (name, store) in stores() {
        let run = run_created(&format!("snap-{}", name), 0);
        store.insert_run(&run).await.unwrap();

        for i in 0..3 {
            let snapshot = Snapshot {
                id: format!("{}-s{}", name, i),
                run_id: run.id.clone(),
                label: format!("v{}", i + 1),
                note: None,
                run_title: run.title.clone(),
                total_stages: 11,
                completed_stages: 0,
                automatic: false,
                stages: run.stages.clone(),
                created_at: Utc::now() + Duration::seconds(i),
            };
            store.insert_snapshot(&snapshot).await.unwrap();
        }

        let listed = store.list_snapshots(&run.id).await.unwrap();
        assert_eq!(listed.len(), 3, "{}", name);
        assert_eq!(listed[0].label, "v3", "{}", name);
        assert!(store.list_snapshots("other").await.unwrap().is_empty());

        let loaded = store.load_snapshot(&format!("{}-s0", name)).await.unwrap().unwrap();
        assert_eq!(loaded.stages, run.stages, "{}", name);
    }
}
