//! Trigger-time inputs to scheduling.

use crate::agents;
use gantry_core::agent::Agent;
use gantry_core::env::EnvironmentVariable;

#[derive(Debug, Clone, Default)]
pub struct SchedulingContext {
    approver: String,
    agents: Vec<Agent>,
    trigger_variables: Vec<EnvironmentVariable>,
    environment_name: Option<String>,
}

impl SchedulingContext {
    pub fn new(approver: impl Into<String>, agents: Vec<Agent>) -> Self {
        Self {
            approver: approver.into(),
            agents,
            trigger_variables: vec![],
            environment_name: None,
        }
    }

    pub fn with_trigger_variable(mut self, variable: EnvironmentVariable) -> Self {
        self.trigger_variables.push(variable);
        self
    }

    pub fn with_environment(mut self, name: impl Into<String>) -> Self {
        self.environment_name = Some(name.into());
        self
    }

    pub fn approver(&self) -> &str {
        &self.approver
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn trigger_variables(&self) -> &[EnvironmentVariable] {
        &self.trigger_variables
    }

    pub fn environment_name(&self) -> Option<&str> {
        self.environment_name.as_deref()
    }

    pub fn find_agents_matching(&self, resources: &[String]) -> Vec<&Agent> {
        agents::find_matching(&self.agents, resources, self.environment_name())
    }
}
