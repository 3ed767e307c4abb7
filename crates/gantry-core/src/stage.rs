//! Stage runs.

use crate::config::ApprovalType;
use crate::ids::StageId;
use crate::job::JobInstance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One run of a stage: an ordered set of job instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub counter: u32,
    pub pipeline_name: String,
    pub pipeline_counter: u32,
    pub pipeline_label: String,
    pub jobs: Vec<JobInstance>,
    pub approval_type: ApprovalType,
    pub approved_by: String,
    /// Content hash of the stage configuration used for this run.
    pub config_version: Option<String>,
    /// Counter of the original run when this stage is a rerun of jobs.
    pub rerun_of_counter: Option<u32>,
    pub fetch_materials: bool,
    pub clean_working_dir: bool,
    pub created_at: DateTime<Utc>,
}

impl Stage {
    pub fn job_by_name(&self, name: &str) -> Option<&JobInstance> {
        self.jobs.iter().find(|j| j.name.eq_ignore_ascii_case(name))
    }

    pub fn is_rerun(&self) -> bool {
        self.rerun_of_counter.is_some()
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }
}
