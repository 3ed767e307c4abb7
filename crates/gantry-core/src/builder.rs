//! Build steps as shipped to agents.

use crate::config::RunIf;
use crate::job::JobResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a fetch step pulls an upstream artifact from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSpec {
    /// `pipeline/counter/stage/stage_counter/job` of the producing job.
    pub locator: String,
    pub source: String,
    /// Destination relative to the working directory.
    pub dest: String,
    pub is_file: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BuilderKind {
    Exec {
        command: String,
        args: Vec<String>,
        /// Relative to the job working directory.
        working_dir: Option<String>,
    },
    Fetch(FetchSpec),
    Plugin {
        plugin_id: String,
        configuration: BTreeMap<String, String>,
    },
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Builder {
    pub kind: BuilderKind,
    pub run_if: Vec<RunIf>,
    pub on_cancel: Option<Box<Builder>>,
    pub description: String,
}

impl Builder {
    pub fn new(kind: BuilderKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            run_if: vec![],
            on_cancel: None,
            description: description.into(),
        }
    }

    pub fn null() -> Self {
        Self::new(BuilderKind::Null, "")
    }

    pub fn exec(command: impl Into<String>, args: &[&str]) -> Self {
        let command = command.into();
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let description = if args.is_empty() {
            command.clone()
        } else {
            format!("{} {}", command, args.join(" "))
        };
        Self::new(
            BuilderKind::Exec {
                command,
                args,
                working_dir: None,
            },
            description,
        )
    }

    pub fn with_run_if(mut self, run_if: RunIf) -> Self {
        self.run_if.push(run_if);
        self
    }

    pub fn with_on_cancel(mut self, builder: Builder) -> Self {
        self.on_cancel = Some(Box::new(builder));
        self
    }

    /// Whether this step runs given the job result so far. Without an
    /// explicit condition a step only runs while everything has passed.
    pub fn allows_run(&self, result_so_far: JobResult) -> bool {
        if self.run_if.is_empty() {
            return RunIf::Passed.matches(result_so_far);
        }
        self.run_if.iter().any(|r| r.matches(result_so_far))
    }
}
