//! Fresh scheduling and rerun-of-jobs scenarios.

use chrono::Utc;
use gantry_core::agent::Agent;
use gantry_core::config::{JobConfig, RunType, StageConfig};
use gantry_core::env::EnvironmentVariable;
use gantry_core::ids::{AgentUuid, JobId, TransitionId};
use gantry_core::job::{JobResult, JobState};
use gantry_core::stage::Stage;
use gantry_core::Error;
use gantry_scheduler::{InstanceFactory, PipelineIdentity, SchedulingContext};
use pretty_assertions::assert_eq;

const MD5: &str = "md5-test";

fn agents() -> Vec<Agent> {
    vec![
        Agent::new("uuid-1", "host1", &["linux"]),
        Agent::new("uuid-2", "host2", &["linux"]),
        Agent::new("uuid-3", "host3", &["windows"]),
    ]
}

fn context() -> SchedulingContext {
    SchedulingContext::new("admin", agents())
}

fn pipeline() -> PipelineIdentity {
    PipelineIdentity::new("cruise", 1, "1")
}

fn run_on_all(name: &str) -> JobConfig {
    JobConfig::new(name)
        .with_run_type(RunType::RunOnAllAgents)
        .with_resources(&["linux"])
}

fn run_multiple(name: &str, count: u32) -> JobConfig {
    JobConfig::new(name).with_run_type(RunType::RunMultipleInstance { count })
}

/// A completed stage whose jobs and transitions all carry persisted ids.
fn completed_stage(config: &StageConfig, counter: u32) -> Stage {
    let mut stage = InstanceFactory::new()
        .create_stage_instance(&pipeline(), config, &context(), MD5, counter)
        .unwrap();
    let now = Utc::now();
    for (i, job) in stage.jobs.iter_mut().enumerate() {
        job.id = JobId::new(100 + i as i64);
        if job.agent_uuid.is_none() {
            job.agent_uuid = Some(AgentUuid::new("uuid-1"));
        }
        job.change_state(JobState::Building, now);
        job.complete(JobResult::Failed, now);
        for (t, transition) in job.transitions.iter_mut().enumerate() {
            transition.id = TransitionId::new(1000 + t as i64);
        }
    }
    stage
}

fn names(stage: &Stage) -> Vec<&str> {
    stage.job_names()
}

#[test]
fn test_fresh_stage_expands_every_run_type() {
    let config = StageConfig::new(
        "dev",
        vec![run_on_all("rails"), run_multiple("java", 2), JobConfig::new("html")],
    );

    let stage = InstanceFactory::new()
        .create_stage_instance(&pipeline(), &config, &context(), MD5, 1)
        .unwrap();

    assert_eq!(
        names(&stage),
        vec![
            "rails-runOnAll-1",
            "rails-runOnAll-2",
            "java-runInstance-1",
            "java-runInstance-2",
            "html"
        ]
    );
    for job in &stage.jobs {
        assert_eq!(job.id, JobId::NOT_PERSISTED);
        assert_eq!(job.state, JobState::Scheduled);
        assert_eq!(job.result, JobResult::Unknown);
        assert_eq!(job.transitions.len(), 1);
    }
    assert_eq!(stage.jobs[0].agent_uuid, Some(AgentUuid::new("uuid-1")));
    assert_eq!(stage.jobs[1].agent_uuid, Some(AgentUuid::new("uuid-2")));
    assert!(stage.jobs[0].run_on_all_agents);
    assert!(stage.jobs[2].run_multiple_instance);
    assert_eq!(stage.jobs[4].agent_uuid, None);
    assert_eq!(stage.config_version.as_deref(), Some(MD5));
    assert_eq!(stage.rerun_of_counter, None);
}

#[test]
fn test_run_multiple_instance_injects_index_and_count_first() {
    let config = StageConfig::new(
        "dev",
        vec![run_multiple("rails", 3).with_variable("key1", "value1")],
    );

    let stage = InstanceFactory::new()
        .create_stage_instance(&pipeline(), &config, &context(), MD5, 1)
        .unwrap();

    assert_eq!(
        names(&stage),
        vec!["rails-runInstance-1", "rails-runInstance-2", "rails-runInstance-3"]
    );
    for (i, job) in stage.jobs.iter().enumerate() {
        let variables = &job.plan.variables;
        assert_eq!(
            variables[0],
            EnvironmentVariable::new("GO_JOB_RUN_INDEX", (i + 1).to_string())
        );
        assert_eq!(variables[1], EnvironmentVariable::new("GO_JOB_RUN_COUNT", "3"));
        assert_eq!(variables[2].name, "key1");
    }
}

#[test]
fn test_run_on_all_agents_without_matching_agents_fails() {
    let config = StageConfig::new(
        "myStage",
        vec![JobConfig::new("foo")
            .with_run_type(RunType::RunOnAllAgents)
            .with_resources(&["solaris"])],
    );

    let err = InstanceFactory::new()
        .create_stage_instance(&pipeline(), &config, &context(), MD5, 1)
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Could not find matching agents to run job [foo] of stage [myStage]."
    );
}

#[test]
fn test_rerun_copies_other_jobs_and_reschedules_requested() {
    let config = StageConfig::new("dev", vec![JobConfig::new("rails"), JobConfig::new("java")]);
    let stage = completed_stage(&config, 1);

    let rerun = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(&stage, &["java"], &context(), &config, "md5-new")
        .unwrap();

    assert_eq!(names(&rerun), vec!["rails", "java"]);

    let copy = &rerun.jobs[0];
    assert_eq!(copy.id, JobId::NOT_PERSISTED);
    assert!(copy.transitions.iter().all(|t| t.id == TransitionId::NOT_PERSISTED));
    assert_eq!(copy.original_job_id, Some(JobId::new(100)));
    assert!(copy.copy);
    assert!(!copy.rerun);
    assert_eq!(copy.result, JobResult::Failed);
    assert_eq!(copy.state, JobState::Completed);
    assert_eq!(copy.agent_uuid, Some(AgentUuid::new("uuid-1")));

    let fresh = &rerun.jobs[1];
    assert_eq!(fresh.id, JobId::NOT_PERSISTED);
    assert!(fresh.rerun);
    assert!(!fresh.copy);
    assert_eq!(fresh.state, JobState::Scheduled);
    assert_eq!(fresh.result, JobResult::Unknown);
    assert_eq!(fresh.transitions.len(), 1);
    assert_eq!(fresh.transitions[0].state, JobState::Scheduled);
    assert_eq!(fresh.transitions[0].id, TransitionId::NOT_PERSISTED);
    assert_eq!(fresh.agent_uuid, None);

    assert_eq!(rerun.config_version.as_deref(), Some("md5-new"));
    assert_eq!(rerun.counter, 2);
    assert_eq!(rerun.rerun_of_counter, Some(1));
}

#[test]
fn test_rerun_of_rerun_keeps_pointing_at_original_counter() {
    let config = StageConfig::new("dev", vec![JobConfig::new("rails"), JobConfig::new("java")]);
    let stage = completed_stage(&config, 2);
    let factory = InstanceFactory::new();

    let first = factory
        .create_stage_for_rerun_of_jobs(&stage, &["rails"], &context(), &config, MD5)
        .unwrap();
    assert_eq!(first.counter, 3);
    assert_eq!(first.rerun_of_counter, Some(2));

    let second = factory
        .create_stage_for_rerun_of_jobs(&first, &["java"], &context(), &config, MD5)
        .unwrap();
    assert_eq!(second.counter, 4);
    assert_eq!(second.rerun_of_counter, Some(2));
}

#[test]
fn test_rerun_fails_when_job_config_is_gone() {
    let config = StageConfig::new("dev", vec![JobConfig::new("rails"), JobConfig::new("java")]);
    let stage = completed_stage(&config, 1);
    let changed = StageConfig::new("dev", vec![JobConfig::new("java")]);

    let err = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(&stage, &["rails"], &context(), &changed, MD5)
        .unwrap_err();

    match err {
        Error::CannotRerunJob {
            job_name,
            information,
        } => {
            assert_eq!(job_name, "rails");
            assert_eq!(information, "Configuration for job doesn't exist.");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_rerun_of_expanded_instance_reports_config_name() {
    let config = StageConfig::new("dev", vec![run_on_all("rails")]);
    let stage = completed_stage(&config, 1);
    let changed = StageConfig::new("dev", vec![JobConfig::new("java")]);

    let err = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(&stage, &["rails-runOnAll-1"], &context(), &changed, MD5)
        .unwrap_err();

    assert!(matches!(err, Error::CannotRerunJob { ref job_name, .. } if job_name == "rails"));
}

#[test]
fn test_rerun_rejects_change_away_from_run_multiple_instance() {
    let config = StageConfig::new("dev", vec![run_multiple("rails", 2)]);
    let stage = completed_stage(&config, 1);

    for (changed_job, expected) in [
        (JobConfig::new("rails"), "simple"),
        (run_on_all("rails"), "run on all agents"),
    ] {
        let changed = StageConfig::new("dev", vec![changed_job]);
        let err = InstanceFactory::new()
            .create_stage_for_rerun_of_jobs(&stage, &["rails-runInstance-1"], &context(), &changed, MD5)
            .unwrap_err();

        match err {
            Error::CannotRerunJob {
                job_name,
                information,
            } => {
                assert_eq!(job_name, "rails");
                assert_eq!(
                    information,
                    format!("Run configuration for job has been changed to '{}'.", expected)
                );
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

#[test]
fn test_rerun_rejects_change_to_run_multiple_instance() {
    let config = StageConfig::new("dev", vec![JobConfig::new("rails")]);
    let stage = completed_stage(&config, 1);
    let changed = StageConfig::new("dev", vec![run_multiple("rails", 3)]);

    let err = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(&stage, &["rails"], &context(), &changed, MD5)
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Cannot rerun job 'rails'. Run configuration for job has been changed to 'run multiple instance'."
    );
}

#[test]
fn test_simple_job_now_run_on_all_expands_on_rerun() {
    let config = StageConfig::new("dev", vec![JobConfig::new("rails"), JobConfig::new("java")]);
    let stage = completed_stage(&config, 1);
    let changed = StageConfig::new("dev", vec![run_on_all("rails"), JobConfig::new("java")]);

    let rerun = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(&stage, &["rails"], &context(), &changed, MD5)
        .unwrap();

    assert_eq!(names(&rerun), vec!["java", "rails-runOnAll-1", "rails-runOnAll-2"]);
    assert_eq!(rerun.jobs[1].agent_uuid, Some(AgentUuid::new("uuid-1")));
    assert_eq!(rerun.jobs[2].agent_uuid, Some(AgentUuid::new("uuid-2")));
    assert!(rerun.jobs[1].rerun && rerun.jobs[2].rerun);
}

#[test]
fn test_run_on_all_instance_now_simple_reruns_on_same_agent() {
    let config = StageConfig::new("dev", vec![run_on_all("rails")]);
    let stage = completed_stage(&config, 1);
    let changed = StageConfig::new("dev", vec![JobConfig::new("rails")]);

    let rerun = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(&stage, &["rails-runOnAll-2"], &context(), &changed, MD5)
        .unwrap();

    assert_eq!(names(&rerun), vec!["rails-runOnAll-1", "rails"]);
    assert_eq!(rerun.jobs[1].agent_uuid, Some(AgentUuid::new("uuid-2")));
    assert!(!rerun.jobs[1].run_on_all_agents);
}

#[test]
fn test_rerunning_several_run_on_all_instances_as_simple_is_rejected() {
    let config = StageConfig::new("dev", vec![run_on_all("rails")]);
    let stage = completed_stage(&config, 1);
    let before = stage.clone();
    let changed = StageConfig::new("dev", vec![JobConfig::new("rails")]);

    let err = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(
            &stage,
            &["rails-runOnAll-1", "rails-runOnAll-2"],
            &context(),
            &changed,
            MD5,
        )
        .unwrap_err();

    assert!(matches!(err, Error::IllegalArgument(_)));
    assert_eq!(
        err.to_string(),
        "Cannot schedule multiple instances of job named 'rails'."
    );
    assert_eq!(stage, before);
}

#[test]
fn test_run_on_all_instance_reruns_on_its_agent() {
    let config = StageConfig::new("dev", vec![run_on_all("rails")]);
    let stage = completed_stage(&config, 1);

    let rerun = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(&stage, &["rails-runOnAll-1"], &context(), &config, MD5)
        .unwrap();

    assert_eq!(names(&rerun), vec!["rails-runOnAll-2", "rails-runOnAll-1"]);
    let fresh = &rerun.jobs[1];
    assert!(fresh.rerun);
    assert!(fresh.run_on_all_agents);
    assert_eq!(fresh.agent_uuid, Some(AgentUuid::new("uuid-1")));
}

#[test]
fn test_run_multiple_instance_rerun_keeps_names_and_indexes() {
    let config = StageConfig::new("dev", vec![run_multiple("rails", 3), JobConfig::new("java")]);
    let stage = completed_stage(&config, 1);

    let rerun = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(
            &stage,
            &["rails-runInstance-1", "rails-runInstance-2"],
            &context(),
            &config,
            MD5,
        )
        .unwrap();

    assert_eq!(
        names(&rerun),
        vec![
            "rails-runInstance-3",
            "java",
            "rails-runInstance-1",
            "rails-runInstance-2"
        ]
    );
    let first = &rerun.jobs[2];
    assert!(first.run_multiple_instance);
    assert_eq!(first.plan.variable("GO_JOB_RUN_INDEX"), Some("1"));
    assert_eq!(first.plan.variable("GO_JOB_RUN_COUNT"), Some("3"));
    assert_eq!(rerun.jobs[3].plan.variable("GO_JOB_RUN_INDEX"), Some("2"));
}

#[test]
fn test_rerun_of_unknown_job_name_fails() {
    let config = StageConfig::new("dev", vec![JobConfig::new("rails")]);
    let stage = completed_stage(&config, 1);

    let err = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(&stage, &["nope"], &context(), &config, MD5)
        .unwrap_err();

    assert!(matches!(err, Error::JobNotFound(_)));
}

#[test]
fn test_rerun_applies_trigger_variables_to_new_jobs_only() {
    let config = StageConfig::new("dev", vec![JobConfig::new("rails"), JobConfig::new("java")]);
    let stage = completed_stage(&config, 1);
    let context = context().with_trigger_variable(EnvironmentVariable::new("DEPLOY", "true"));

    let rerun = InstanceFactory::new()
        .create_stage_for_rerun_of_jobs(&stage, &["rails"], &context, &config, MD5)
        .unwrap();

    assert!(rerun.jobs[0].plan.trigger_variables.is_empty());
    assert_eq!(
        rerun.jobs[1].plan.trigger_variables,
        vec![EnvironmentVariable::new("DEPLOY", "true")]
    );
    assert_eq!(rerun.jobs[1].plan.identifier.stage_counter, "2");
}
