//! Pure derivations over a run's stage list.

use crate::error::{Error, Result};
use crate::types::{Progress, Run, RunReport, RunStatus, RunSummary, Stage, StageStatus};
use chrono::Utc;
use std::collections::HashSet;

/// Run status as a function of stage statuses alone.
///
/// `error` wins over everything, then `completed` when every participating
/// stage is completed, then `running`, else `waiting`.
pub fn derive_run_status(stages: &[Stage]) -> RunStatus {
    if stages.iter().any(|s| s.status == StageStatus::Error) {
        return RunStatus::Error;
    }

    let mut participating = stages.iter().filter(|s| s.status.participates()).peekable();
    if participating.peek().is_some() && participating.all(|s| s.status == StageStatus::Completed) {
        return RunStatus::Completed;
    }
    if stages.iter().any(|s| s.status == StageStatus::Running) {
        return RunStatus::Running;
    }
    RunStatus::Waiting
}

pub fn progress(stages: &[Stage]) -> Progress {
    let count = |status: StageStatus| stages.iter().filter(|s| s.status == status).count();
    let completed = count(StageStatus::Completed);
    let total = stages.iter().filter(|s| s.status.participates()).count();
    let percentage = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u32
    };

    Progress {
        completed,
        running: count(StageStatus::Running),
        error: count(StageStatus::Error),
        pending: count(StageStatus::Pending),
        total,
        percentage,
    }
}

/// The stage a caller should look at: the running one, else the first
/// errored one, else the first pending one.
pub fn current_stage(stages: &[Stage]) -> Option<&Stage> {
    stages
        .iter()
        .find(|s| s.status == StageStatus::Running)
        .or_else(|| stages.iter().find(|s| s.status == StageStatus::Error))
        .or_else(|| stages.iter().find(|s| s.status == StageStatus::Pending))
}

/// Checks ids are unique and orders are exactly 1..=n.
pub fn validate_stage_list(stages: &[Stage]) -> Result<()> {
    let mut ids = HashSet::new();
    for stage in stages {
        if !ids.insert(stage.id.as_str()) {
            return Err(Error::Validation(format!("duplicate stage id '{}'", stage.id)));
        }
    }

    let mut orders: Vec<u32> = stages.iter().map(|s| s.order).collect();
    orders.sort_unstable();
    for (i, order) in orders.iter().enumerate() {
        if *order != i as u32 + 1 {
            return Err(Error::Validation(format!(
                "stage orders must be contiguous from 1, found {:?}",
                orders
            )));
        }
    }

    let running = stages.iter().filter(|s| s.status == StageStatus::Running).count();
    if running > 1 {
        return Err(Error::Validation(format!(
            "{} stages running at once",
            running
        )));
    }
    Ok(())
}

impl Run {
    pub fn report(&self) -> RunReport {
        let end = if self.status.is_terminal() {
            self.updated_at
        } else {
            Utc::now()
        };
        RunReport {
            run_id: self.id.clone(),
            title: self.title.clone(),
            source_url: self.source_url.clone(),
            status: self.status,
            target_duration: self.target_duration,
            progress: progress(&self.stages),
            current_stage: current_stage(&self.stages).map(|s| s.id.clone()),
            stages: self.stages.clone(),
            final_outputs: self.final_outputs.clone(),
            restarted_from: self.restarted_from.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            duration_seconds: (end - self.created_at).num_seconds().max(0),
        }
    }

    pub fn summary(&self) -> RunSummary {
        let p = progress(&self.stages);
        RunSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            status: self.status,
            completed_stages: p.completed,
            total_stages: p.total,
            has_error: p.error > 0,
            percentage: p.percentage,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::default_stages;
    use proptest::prelude::*;

    fn stages_with(statuses: &[StageStatus]) -> Vec<Stage> {
        let now = Utc::now();
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| Stage {
                id: format!("stage-{}", i + 1),
                name: format!("Stage {}", i + 1),
                description: String::new(),
                service: "test".to_string(),
                ai_stage: false,
                order: i as u32 + 1,
                status: *status,
                output: None,
                asset_refs: Vec::new(),
                error: None,
                started_at: None,
                finished_at: None,
                updated_at: now,
            })
            .collect()
    }

    #[test]
    fn test_fresh_run_is_waiting() {
        let stages: Vec<Stage> = default_stages()
            .iter()
            .enumerate()
            .map(|(i, d)| d.to_stage(i as u32 + 1))
            .collect();
        assert_eq!(derive_run_status(&stages), RunStatus::Waiting);
    }

    #[test]
    fn test_error_dominates() {
        use StageStatus::*;
        let stages = stages_with(&[Completed, Running, Error, Pending]);
        assert_eq!(derive_run_status(&stages), RunStatus::Error);
    }

    #[test]
    fn test_not_implemented_does_not_block_completion() {
        use StageStatus::*;
        let stages = stages_with(&[Completed, Completed, NotImplemented]);
        assert_eq!(derive_run_status(&stages), RunStatus::Completed);
    }

    #[test]
    fn test_only_not_implemented_is_waiting() {
        let stages = stages_with(&[StageStatus::NotImplemented]);
        assert_eq!(derive_run_status(&stages), RunStatus::Waiting);
        assert_eq!(derive_run_status(&[]), RunStatus::Waiting);
    }

    #[test]
    fn test_partial_progress_without_running_is_waiting() {
        use StageStatus::*;
        let stages = stages_with(&[Completed, Pending]);
        assert_eq!(derive_run_status(&stages), RunStatus::Waiting);
    }

    #[test]
    fn test_progress_rounds_percentage() {
        use StageStatus::*;
        let stages = stages_with(&[Completed, Completed, Pending, NotImplemented]);
        let p = progress(&stages);
        assert_eq!(p.completed, 2);
        assert_eq!(p.total, 3);
        assert_eq!(p.percentage, 67);
    }

    #[test]
    fn test_current_stage_prefers_running() {
        use StageStatus::*;
        let stages = stages_with(&[Completed, Error, Running, Pending]);
        assert_eq!(current_stage(&stages).map(|s| s.order), Some(3));
        let stages = stages_with(&[Completed, Error, Pending]);
        assert_eq!(current_stage(&stages).map(|s| s.order), Some(2));
    }

    #[test]
    fn test_validate_rejects_gaps_and_duplicates() {
        use StageStatus::*;
        let mut stages = stages_with(&[Pending, Pending, Pending]);
        assert!(validate_stage_list(&stages).is_ok());

        stages[2].order = 4;
        assert!(validate_stage_list(&stages).is_err());

        let mut stages = stages_with(&[Pending, Pending]);
        stages[1].id = stages[0].id.clone();
        assert!(validate_stage_list(&stages).is_err());

        let stages = stages_with(&[Running, Running]);
        assert!(validate_stage_list(&stages).is_err());
    }

    fn status_strategy() -> impl Strategy<Value = StageStatus> {
        prop_oneof![
            Just(StageStatus::Pending),
            Just(StageStatus::Running),
            Just(StageStatus::Completed),
            Just(StageStatus::Error),
            Just(StageStatus::NotImplemented),
        ]
    }

    proptest! {
        #[test]
        fn prop_status_ignores_order_and_payloads(
            statuses in proptest::collection::vec(status_strategy(), 0..20)
        ) {
            let stages = stages_with(&statuses);
            let expected = derive_run_status(&stages);

            let mut shuffled = stages.clone();
            shuffled.reverse();
            for s in shuffled.iter_mut() {
                s.output = Some(serde_json::json!({"noise": s.order}));
            }
            prop_assert_eq!(derive_run_status(&shuffled), expected);

            if statuses.contains(&StageStatus::Error) {
                prop_assert_eq!(expected, RunStatus::Error);
            }
        }

        #[test]
        fn prop_percentage_bounded(
            statuses in proptest::collection::vec(status_strategy(), 0..20)
        ) {
            let p = progress(&stages_with(&statuses));
            prop_assert!(p.percentage <= 100);
            prop_assert!(p.completed <= p.total);
        }
    }
}
