//! sled-backed run store. Authoritative state: survives process restarts.

use crate::store::{sort_newest_first, stage_key, stage_prefix, RunStore};
use async_trait::async_trait;
use reelforge_core::{Error, Result, Run, Snapshot, Stage};
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::Transactional;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub struct SledRunStore {
    db: sled::Db,
    runs: sled::Tree,
    stages: sled::Tree,
    snapshots: sled::Tree,
}

fn sled_err(op: &str) -> impl Fn(sled::Error) -> Error + '_ {
    move |e| Error::Storage(format!("Sled {} error: {}", op, e))
}

fn tx_err(e: TransactionError<()>) -> Error {
    Error::Storage(format!("Sled transaction error: {:?}", e))
}

impl SledRunStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(sled_err("open"))?;
        Self::from_db(db)
    }

    /// Throwaway store for tests and ephemeral servers.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(sled_err("open"))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let runs = db.open_tree("runs").map_err(sled_err("open_tree"))?;
        let stages = db.open_tree("stages").map_err(sled_err("open_tree"))?;
        let snapshots = db.open_tree("snapshots").map_err(sled_err("open_tree"))?;
        Ok(Self {
            db,
            runs,
            stages,
            snapshots,
        })
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(sled_err("flush"))?;
        Ok(())
    }

    fn load_stages(&self, run_id: &str) -> Result<Vec<Stage>> {
        let mut stages = Vec::new();
        for item in self.stages.scan_prefix(stage_prefix(run_id)) {
            let (_, value) = item.map_err(sled_err("scan"))?;
            stages.push(serde_json::from_slice::<Stage>(&value)?);
        }
        stages.sort_by_key(|s| s.order);
        Ok(stages)
    }

    fn encode_stages(run: &Run) -> Result<Vec<(String, Vec<u8>)>> {
        run.stages
            .iter()
            .map(|s| Ok((stage_key(&run.id, &s.id), serde_json::to_vec(s)?)))
            .collect()
    }
}

#[async_trait]
impl RunStore for SledRunStore {
    async fn insert_run(&self, run: &Run) -> Result<()> {
        let header = serde_json::to_vec(&run.header())?;
        let stages = Self::encode_stages(run)?;

        (&self.runs, &self.stages)
            .transaction(|(runs, tx_stages)| -> ConflictableTransactionResult<(), ()> {
                runs.insert(run.id.as_bytes(), header.as_slice())?;
                for (key, value) in &stages {
                    tx_stages.insert(key.as_bytes(), value.as_slice())?;
                }
                Ok(())
            })
            .map_err(tx_err)?;

        debug!(run_id = %run.id, stages = run.stages.len(), "run inserted");
        self.flush().await
    }

    async fn load_run(&self, run_id: &str) -> Result<Option<Run>> {
        let Some(header) = self.runs.get(run_id).map_err(sled_err("get"))? else {
            return Ok(None);
        };
        let mut run: Run = serde_json::from_slice(&header)?;
        run.stages = self.load_stages(run_id)?;
        Ok(Some(run))
    }

    async fn list_runs(&self) -> Result<Vec<Run>> {
        let mut by_run: HashMap<String, Vec<Stage>> = HashMap::new();
        for item in self.stages.iter() {
            let (key, value) = item.map_err(sled_err("scan"))?;
            let key = String::from_utf8_lossy(&key);
            if let Some((run_id, _)) = key.split_once('/') {
                by_run
                    .entry(run_id.to_string())
                    .or_default()
                    .push(serde_json::from_slice(&value)?);
            }
        }

        let mut runs = Vec::new();
        for item in self.runs.iter() {
            let (_, value) = item.map_err(sled_err("scan"))?;
            let mut run: Run = serde_json::from_slice(&value)?;
            let mut stages = by_run.remove(&run.id).unwrap_or_default();
            stages.sort_by_key(|s| s.order);
            run.stages = stages;
            runs.push(run);
        }
        sort_newest_first(&mut runs);
        Ok(runs)
    }

    async fn save_stage(&self, run: &Run, stage: &Stage) -> Result<()> {
        let header = serde_json::to_vec(&run.header())?;
        let key = stage_key(&run.id, &stage.id);
        let value = serde_json::to_vec(stage)?;

        (&self.runs, &self.stages)
            .transaction(|(runs, stages)| -> ConflictableTransactionResult<(), ()> {
                runs.insert(run.id.as_bytes(), header.as_slice())?;
                stages.insert(key.as_bytes(), value.as_slice())?;
                Ok(())
            })
            .map_err(tx_err)?;

        debug!(run_id = %run.id, stage_id = %stage.id, status = %stage.status, "stage saved");
        self.flush().await
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        let header = serde_json::to_vec(&run.header())?;
        self.runs
            .insert(run.id.as_bytes(), header)
            .map_err(sled_err("insert"))?;
        self.flush().await
    }

    async fn replace_stages(&self, run: &Run) -> Result<()> {
        let header = serde_json::to_vec(&run.header())?;
        let fresh = Self::encode_stages(run)?;
        let mut stale = Vec::new();
        for item in self.stages.scan_prefix(stage_prefix(&run.id)).keys() {
            stale.push(item.map_err(sled_err("scan"))?);
        }

        (&self.runs, &self.stages)
            .transaction(|(runs, stages)| -> ConflictableTransactionResult<(), ()> {
                for key in &stale {
                    stages.remove(key.clone())?;
                }
                for (key, value) in &fresh {
                    stages.insert(key.as_bytes(), value.as_slice())?;
                }
                runs.insert(run.id.as_bytes(), header.as_slice())?;
                Ok(())
            })
            .map_err(tx_err)?;

        debug!(run_id = %run.id, removed = stale.len(), written = fresh.len(), "stages replaced");
        self.flush().await
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let value = serde_json::to_vec(snapshot)?;
        self.snapshots
            .insert(snapshot.id.as_bytes(), value)
            .map_err(sled_err("insert"))?;
        self.flush().await
    }

    async fn load_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>> {
        match self.snapshots.get(snapshot_id).map_err(sled_err("get"))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn list_snapshots(&self, run_id: &str) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        for item in self.snapshots.iter() {
            let (_, value) = item.map_err(sled_err("scan"))?;
            let snapshot: Snapshot = serde_json::from_slice(&value)?;
            if snapshot.run_id == run_id {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snapshots)
    }
}
