#![allow(dead_code)]

use gantry_core::builder::FetchSpec;
use gantry_core::plan::JobIdentifier;
use gantry_core::ports::{ArtifactSink, ConsoleOut, Property, TaskExtension, TaskRequest, TaskResponse};
use gantry_core::{Error, Result};
use gantry_runner::CancelFlag;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

#[derive(Default)]
pub struct RecordingConsole {
    pub lines: Mutex<Vec<String>>,
}

impl RecordingConsole {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }
}

impl ConsoleOut for RecordingConsole {
    fn consume_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBehaviour {
    Succeed,
    Fail,
    Panic,
}

pub struct RecordingSink {
    pub behaviour: UploadBehaviour,
    pub published: Mutex<Vec<(String, PathBuf)>>,
    pub fetched: Mutex<Vec<(FetchSpec, PathBuf)>>,
    pub properties: Mutex<Vec<Property>>,
}

impl RecordingSink {
    pub fn new(behaviour: UploadBehaviour) -> Self {
        Self {
            behaviour,
            published: Mutex::new(vec![]),
            fetched: Mutex::new(vec![]),
            properties: Mutex::new(vec![]),
        }
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new(UploadBehaviour::Succeed)
    }
}

impl ArtifactSink for RecordingSink {
    fn publish(
        &self,
        _console: &dyn ConsoleOut,
        dest_path: &str,
        source: &Path,
        _job: &JobIdentifier,
    ) -> Result<()> {
        match self.behaviour {
            UploadBehaviour::Succeed => {
                self.published
                    .lock()
                    .push((dest_path.to_string(), source.to_path_buf()));
                Ok(())
            }
            UploadBehaviour::Fail => Err(Error::Network("connection reset".into())),
            UploadBehaviour::Panic => panic!("out of memory while archiving"),
        }
    }

    fn fetch(&self, _console: &dyn ConsoleOut, spec: &FetchSpec, dest: &Path) -> Result<()> {
        self.fetched.lock().push((spec.clone(), dest.to_path_buf()));
        Ok(())
    }

    fn set_property(&self, _job: &JobIdentifier, property: &Property) -> Result<()> {
        self.properties.lock().push(property.clone());
        Ok(())
    }
}

/// Task extension whose plugin ids script the outcome:
/// `fail`, `panic`, `cancel` (raises the given flag) or anything else (passes).
#[derive(Default)]
pub struct ScriptedTasks {
    pub invoked: Mutex<Vec<String>>,
    pub cancel: Option<CancelFlag>,
}

impl ScriptedTasks {
    pub fn cancelling(flag: CancelFlag) -> Self {
        Self {
            invoked: Mutex::new(vec![]),
            cancel: Some(flag),
        }
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invoked.lock().clone()
    }
}

impl TaskExtension for ScriptedTasks {
    fn execute(&self, plugin_id: &str, _request: &TaskRequest<'_>) -> Result<TaskResponse> {
        self.invoked.lock().push(plugin_id.to_string());
        match plugin_id {
            "fail" => Ok(TaskResponse {
                success: false,
                message: "plugin said no".into(),
            }),
            "panic" => panic!("plugin blew up"),
            "cancel" => {
                if let Some(flag) = &self.cancel {
                    flag.cancel();
                }
                Ok(TaskResponse {
                    success: true,
                    message: String::new(),
                })
            }
            _ => Ok(TaskResponse {
                success: true,
                message: String::new(),
            }),
        }
    }
}

pub fn job() -> JobIdentifier {
    JobIdentifier::new("cruise", 1, "label-1", "dev", "1", "unit")
}
