//! Agent types: the scheduling-side pool entry and the agent-side runtime
//! view reported back to the server.

use crate::ids::AgentUuid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentConfigState {
    #[default]
    Pending,
    Enabled,
    Disabled,
}

/// An agent as known to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub uuid: AgentUuid,
    pub hostname: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub config_state: AgentConfigState,
}

impl Agent {
    pub fn new(uuid: impl Into<AgentUuid>, hostname: impl Into<String>, resources: &[&str]) -> Self {
        Self {
            uuid: uuid.into(),
            hostname: hostname.into(),
            ip_address: String::new(),
            resources: resources.iter().map(|r| r.to_string()).collect(),
            environments: vec![],
            config_state: AgentConfigState::Enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config_state == AgentConfigState::Enabled
    }

    /// True when the agent carries every required resource (case-insensitive).
    pub fn has_all_resources(&self, required: &[String]) -> bool {
        required.iter().all(|needed| {
            self.resources
                .iter()
                .any(|have| have.trim().eq_ignore_ascii_case(needed.trim()))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRuntimeStatus {
    Idle,
    Building,
    Cancelled,
    LostContact,
    Missing,
}

impl fmt::Display for AgentRuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentRuntimeStatus::Idle => "Idle",
            AgentRuntimeStatus::Building => "Building",
            AgentRuntimeStatus::Cancelled => "Cancelled",
            AgentRuntimeStatus::LostContact => "LostContact",
            AgentRuntimeStatus::Missing => "Missing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentifier {
    pub hostname: String,
    pub ip_address: String,
    pub uuid: AgentUuid,
}

/// Callback fired with `(old, new)` whenever the runtime status changes.
#[derive(Clone)]
pub struct StatusListener(Arc<dyn Fn(AgentRuntimeStatus, AgentRuntimeStatus) + Send + Sync>);

impl StatusListener {
    pub fn new(f: impl Fn(AgentRuntimeStatus, AgentRuntimeStatus) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for StatusListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatusListener")
    }
}

/// The agent's own view of itself, sent with every ping and work request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRuntimeInfo {
    pub identifier: AgentIdentifier,
    runtime_status: AgentRuntimeStatus,
    cookie: Option<String>,
    pub location: PathBuf,
    pub operating_system: String,
    build_locator: Option<String>,
    #[serde(skip)]
    listener: Option<StatusListener>,
}

impl AgentRuntimeInfo {
    pub fn new(identifier: AgentIdentifier, location: PathBuf) -> Self {
        Self {
            identifier,
            runtime_status: AgentRuntimeStatus::Idle,
            cookie: None,
            location,
            operating_system: std::env::consts::OS.to_string(),
            build_locator: None,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: StatusListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn uuid(&self) -> &AgentUuid {
        &self.identifier.uuid
    }

    pub fn runtime_status(&self) -> AgentRuntimeStatus {
        self.runtime_status
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn set_cookie(&mut self, cookie: impl Into<String>) {
        self.cookie = Some(cookie.into());
    }

    pub fn clear_cookie(&mut self) {
        self.cookie = None;
    }

    pub fn build_locator(&self) -> Option<&str> {
        self.build_locator.as_deref()
    }

    /// Updates the status, notifying the listener only on an actual change.
    pub fn set_runtime_status(&mut self, status: AgentRuntimeStatus) {
        let old = self.runtime_status;
        if old == status {
            return;
        }
        self.runtime_status = status;
        if let Some(listener) = &self.listener {
            (listener.0)(old, status);
        }
    }

    pub fn busy(&mut self, build_locator: impl Into<String>) {
        self.build_locator = Some(build_locator.into());
        self.set_runtime_status(AgentRuntimeStatus::Building);
    }

    pub fn cancel(&mut self) {
        self.set_runtime_status(AgentRuntimeStatus::Cancelled);
    }

    pub fn idle(&mut self) {
        self.build_locator = None;
        self.set_runtime_status(AgentRuntimeStatus::Idle);
    }

    pub fn is_cancelled(&self) -> bool {
        self.runtime_status == AgentRuntimeStatus::Cancelled
    }
}

impl PartialEq for AgentRuntimeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.runtime_status == other.runtime_status
            && self.cookie == other.cookie
            && self.location == other.location
            && self.operating_system == other.operating_system
            && self.build_locator == other.build_locator
    }
}
