//! Runtime job instances and their state history.

use crate::ids::{AgentUuid, JobId, TransitionId};
use crate::plan::JobPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    Assigned,
    Preparing,
    Building,
    Completing,
    Completed,
    Rescheduled,
}

impl JobState {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Rescheduled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_completed()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Scheduled => "Scheduled",
            JobState::Assigned => "Assigned",
            JobState::Preparing => "Preparing",
            JobState::Building => "Building",
            JobState::Completing => "Completing",
            JobState::Completed => "Completed",
            JobState::Rescheduled => "Rescheduled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResult {
    Unknown,
    Passed,
    Failed,
    Cancelled,
}

impl JobResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, JobResult::Failed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobResult::Cancelled)
    }

    /// Lower-case form used in console messages.
    pub fn as_status(&self) -> &'static str {
        match self {
            JobResult::Unknown => "unknown",
            JobResult::Passed => "passed",
            JobResult::Failed => "failed",
            JobResult::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobResult::Unknown => "Unknown",
            JobResult::Passed => "Passed",
            JobResult::Failed => "Failed",
            JobResult::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStateTransition {
    pub id: TransitionId,
    pub state: JobState,
    pub changed_at: DateTime<Utc>,
}

impl JobStateTransition {
    pub fn new(state: JobState, changed_at: DateTime<Utc>) -> Self {
        Self {
            id: TransitionId::NOT_PERSISTED,
            state,
            changed_at,
        }
    }
}

/// One scheduled, running or finished execution of a job within a stage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    pub result: JobResult,
    pub agent_uuid: Option<AgentUuid>,
    pub transitions: Vec<JobStateTransition>,
    pub run_on_all_agents: bool,
    pub run_multiple_instance: bool,
    pub rerun: bool,
    pub copy: bool,
    pub original_job_id: Option<JobId>,
    pub ignored: bool,
    pub plan: JobPlan,
}

impl JobInstance {
    /// A fresh, unpersisted instance in the Scheduled state.
    pub fn scheduled(name: impl Into<String>, plan: JobPlan, at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::NOT_PERSISTED,
            name: name.into(),
            state: JobState::Scheduled,
            result: JobResult::Unknown,
            agent_uuid: None,
            transitions: vec![JobStateTransition::new(JobState::Scheduled, at)],
            run_on_all_agents: false,
            run_multiple_instance: false,
            rerun: false,
            copy: false,
            original_job_id: None,
            ignored: false,
            plan,
        }
    }

    pub fn change_state(&mut self, state: JobState, at: DateTime<Utc>) {
        self.state = state;
        self.transitions.push(JobStateTransition::new(state, at));
    }

    pub fn complete(&mut self, result: JobResult, at: DateTime<Utc>) {
        self.result = result;
        self.change_state(JobState::Completed, at);
    }

    pub fn assign(&mut self, agent_uuid: AgentUuid, at: DateTime<Utc>) {
        self.plan.agent_uuid = Some(agent_uuid.clone());
        self.agent_uuid = Some(agent_uuid);
        self.change_state(JobState::Assigned, at);
    }

    pub fn transition(&self, state: JobState) -> Option<&JobStateTransition> {
        self.transitions.iter().find(|t| t.state == state)
    }

    /// A copy carried forward into a rerun stage. Keeps name, result,
    /// state, history and agent; drops every persisted id.
    pub fn clone_for_rerun_copy(&self) -> JobInstance {
        let mut copy = self.clone();
        copy.id = JobId::NOT_PERSISTED;
        for transition in &mut copy.transitions {
            transition.id = TransitionId::NOT_PERSISTED;
        }
        copy.plan.identifier.build_id = JobId::NOT_PERSISTED;
        copy.original_job_id = Some(self.id);
        copy.copy = true;
        copy.rerun = false;
        copy
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_completed()
    }
}
