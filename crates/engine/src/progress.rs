//! Application progress state machine
//!
//! Derives an overall progress report from the persisted step statuses.
//! Every application has the same six steps; a step with no row is simply
//! not started, and overall percentage counts completed steps only.

use claimforge_common::errors::Result;
use claimforge_common::store::ClaimStore;
use claimforge_common::types::{ApplicationStep, StepState};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct StepProgress {
    pub step: ApplicationStep,
    pub status: StepState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub steps: Vec<StepProgress>,
    pub completed: usize,
    pub total: usize,
    /// Completed steps as a whole percentage of the six
    pub percent: u8,
}

impl ProgressReport {
    /// Build the report for `user_id` from stored statuses
    pub async fn load(store: &dyn ClaimStore, user_id: &str) -> Result<Self> {
        let rows = store.list_steps(user_id).await?;
        let by_step: HashMap<ApplicationStep, StepState> =
            rows.into_iter().map(|r| (r.step, r.status)).collect();
        Ok(Self::from_statuses(&by_step))
    }

    fn from_statuses(statuses: &HashMap<ApplicationStep, StepState>) -> Self {
        let steps: Vec<StepProgress> = ApplicationStep::ALL
            .iter()
            .map(|&step| StepProgress {
                step,
                status: statuses
                    .get(&step)
                    .copied()
                    .unwrap_or(StepState::NotStarted),
            })
            .collect();

        let total = steps.len();
        let completed = steps
            .iter()
            .filter(|s| s.status == StepState::Completed)
            .count();
        let percent = ((completed * 100) / total) as u8;

        Self {
            steps,
            completed,
            total,
            percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimforge_common::store::MemStore;

    #[tokio::test]
    async fn missing_rows_default_to_not_started() {
        let store = MemStore::new();
        let report = ProgressReport::load(&store, "u1").await.unwrap();
        assert_eq!(report.total, 6);
        assert_eq!(report.completed, 0);
        assert_eq!(report.percent, 0);
        assert!(report
            .steps
            .iter()
            .all(|s| s.status == StepState::NotStarted));
    }

    #[tokio::test]
    async fn percentage_counts_completed_steps_only() {
        let store = MemStore::new();
        store
            .set_step("u1", ApplicationStep::PersonalInfo, StepState::Completed)
            .await
            .unwrap();
        store
            .set_step("u1", ApplicationStep::MilitaryService, StepState::Completed)
            .await
            .unwrap();
        store
            .set_step("u1", ApplicationStep::VaDisability, StepState::InProgress)
            .await
            .unwrap();

        let report = ProgressReport::load(&store, "u1").await.unwrap();
        assert_eq!(report.completed, 2);
        // 2 of 6, truncated
        assert_eq!(report.percent, 33);
    }

    #[tokio::test]
    async fn steps_come_back_in_application_order() {
        let store = MemStore::new();
        store
            .set_step("u1", ApplicationStep::Review, StepState::InProgress)
            .await
            .unwrap();

        let report = ProgressReport::load(&store, "u1").await.unwrap();
        let order: Vec<ApplicationStep> = report.steps.iter().map(|s| s.step).collect();
        assert_eq!(order, ApplicationStep::ALL.to_vec());
    }
}
