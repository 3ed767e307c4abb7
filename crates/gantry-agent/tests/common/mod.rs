#![allow(dead_code)]

use gantry_agent::{AgentInstruction, BuildRepositoryRemote, BuildWork, SharedRuntimeInfo, Work, WorkContext};
use gantry_core::agent::{AgentIdentifier, AgentRuntimeInfo};
use gantry_core::assignment::BuildAssignment;
use gantry_core::builder::{Builder, FetchSpec};
use gantry_core::env::EnvironmentVariableContext;
use gantry_core::job::{JobResult, JobState};
use gantry_core::material::{BuildCause, MaterialRevisions};
use gantry_core::plan::{ArtifactPlan, JobIdentifier, JobPlan};
use gantry_core::ports::{ArtifactSink, ConsoleOut, ConsoleUploader, Property};
use gantry_core::{AgentUuid, Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct MockRemote {
    pub calls: Mutex<Vec<String>>,
    pub ignored: AtomicBool,
    pub offline: AtomicBool,
    pub instructions: Mutex<VecDeque<AgentInstruction>>,
    pub works: Mutex<VecDeque<Work>>,
    pub cookies_issued: AtomicU32,
}

impl MockRemote {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".into()));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl BuildRepositoryRemote for MockRemote {
    fn ping(&self, _info: &AgentRuntimeInfo) -> Result<AgentInstruction> {
        self.record("ping".into())?;
        Ok(self.instructions.lock().pop_front().unwrap_or_default())
    }

    fn get_cookie(&self, _info: &AgentRuntimeInfo) -> Result<String> {
        self.record("get_cookie".into())?;
        let n = self.cookies_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("cookie-{}", n))
    }

    fn get_work(&self, _info: &AgentRuntimeInfo) -> Result<Work> {
        self.record("get_work".into())?;
        Ok(self.works.lock().pop_front().unwrap_or(Work::NoWork))
    }

    fn report_current_status(&self, _info: &AgentRuntimeInfo, _job: &JobIdentifier, state: JobState) -> Result<()> {
        self.record(format!("status:{}", state))
    }

    fn report_completing(&self, _info: &AgentRuntimeInfo, _job: &JobIdentifier, result: JobResult) -> Result<()> {
        self.record(format!("completing:{}", result))
    }

    fn report_completed(&self, _info: &AgentRuntimeInfo, _job: &JobIdentifier, result: JobResult) -> Result<()> {
        self.record(format!("completed:{}", result))
    }

    fn is_ignored(&self, _job: &JobIdentifier) -> Result<bool> {
        Ok(self.ignored.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct MockSink {
    pub fail_uploads: AtomicBool,
    pub published: Mutex<Vec<(String, PathBuf)>>,
    pub properties: Mutex<Vec<Property>>,
}

impl ArtifactSink for MockSink {
    fn publish(&self, _console: &dyn ConsoleOut, dest_path: &str, source: &Path, _job: &JobIdentifier) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(Error::Network("upload refused".into()));
        }
        self.published
            .lock()
            .push((dest_path.to_string(), source.to_path_buf()));
        Ok(())
    }

    fn fetch(&self, _console: &dyn ConsoleOut, _spec: &FetchSpec, _dest: &Path) -> Result<()> {
        Ok(())
    }

    fn set_property(&self, _job: &JobIdentifier, property: &Property) -> Result<()> {
        self.properties.lock().push(property.clone());
        Ok(())
    }
}

/// Collects uploaded console text with timestamps stripped.
#[derive(Default)]
pub struct MockConsole {
    pub lines: Mutex<Vec<String>>,
}

impl MockConsole {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }
}

impl ConsoleUploader for MockConsole {
    fn upload(&self, _job: &JobIdentifier, content: &str) -> Result<()> {
        let mut lines = self.lines.lock();
        for line in content.lines() {
            let text = line.split_once(' ').map(|(_, rest)| rest).unwrap_or(line);
            lines.push(text.to_string());
        }
        Ok(())
    }
}

pub struct Harness {
    pub remote: Arc<MockRemote>,
    pub sink: Arc<MockSink>,
    pub console: Arc<MockConsole>,
    pub runtime: SharedRuntimeInfo,
    pub work_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let identifier = AgentIdentifier {
            hostname: "agent-01".into(),
            ip_address: "10.0.0.7".into(),
            uuid: AgentUuid::new("uuid-1"),
        };
        let work_dir = tempfile::TempDir::new().unwrap();
        let info = AgentRuntimeInfo::new(identifier, work_dir.path().to_path_buf());
        Self {
            remote: Arc::new(MockRemote::default()),
            sink: Arc::new(MockSink::default()),
            console: Arc::new(MockConsole::default()),
            runtime: Arc::new(Mutex::new(info)),
            work_dir,
        }
    }

    pub fn context(&self) -> WorkContext {
        WorkContext {
            remote: self.remote.clone(),
            artifacts: self.sink.clone(),
            console: self.console.clone(),
            tasks: None,
            runtime: self.runtime.clone(),
            work_dir: self.work_dir.path().to_path_buf(),
            console_publish_interval: Duration::from_secs(60),
            ambient: EnvironmentVariableContext::new(),
        }
    }

    pub fn job_dir(&self) -> PathBuf {
        self.work_dir.path().join("pipelines/cruise")
    }
}

/// Runs a build on a plain thread that has entered a tokio runtime, the way
/// the controller's blocking build thread does.
pub fn run_build(work: &BuildWork, ctx: &WorkContext) -> Result<Option<JobResult>> {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _entered = runtime.enter();
    work.do_work(ctx)
}

pub fn identifier() -> JobIdentifier {
    JobIdentifier::new("cruise", 1, "label-1", "dev", "1", "unit")
}

pub fn assignment(builders: Vec<Builder>, artifacts: Vec<ArtifactPlan>) -> BuildAssignment {
    assignment_with(builders, artifacts, EnvironmentVariableContext::new(), |_| {})
}

pub fn assignment_with(
    builders: Vec<Builder>,
    artifacts: Vec<ArtifactPlan>,
    environment: EnvironmentVariableContext,
    customize: impl FnOnce(&mut JobPlan),
) -> BuildAssignment {
    let mut plan = JobPlan::for_identifier(identifier());
    plan.artifact_plans = artifacts;
    customize(&mut plan);
    BuildAssignment::new(
        plan,
        &BuildCause::manual("admin", MaterialRevisions::default()),
        builders,
        PathBuf::from("pipelines/cruise"),
        environment,
    )
}
