//! Command handlers.

use anyhow::Context;
use console::style;
use gantry_agent::http::{HttpArtifactSink, HttpConsoleUploader, HttpRemote, ServerClient};
use gantry_agent::{AgentConfig, AgentController, WorkContext};
use gantry_core::agent::{Agent, AgentIdentifier, AgentRuntimeInfo, StatusListener};
use gantry_core::config::StageConfig;
use gantry_core::env::EnvironmentVariableContext;
use gantry_core::material::{BuildCause, MaterialRevisions};
use gantry_core::plan::ArtifactPlan;
use gantry_core::system::SystemConfig;
use gantry_runner::match_plan;
use gantry_scheduler::naming::config_name;
use gantry_scheduler::{BuildAssignmentAssembler, BuilderFactory, InstanceFactory, PipelineIdentity, SchedulingContext};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Run an agent until interrupted.
pub fn agent(config_path: &Path) -> anyhow::Result<()> {
    let config = AgentConfig::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let server = ServerClient::new(config.server_url()?)?;

    let identifier = AgentIdentifier {
        hostname: config.hostname.clone(),
        ip_address: String::new(),
        uuid: config.uuid.clone(),
    };
    let runtime_info = AgentRuntimeInfo::new(identifier, config.work_dir.clone()).with_listener(
        StatusListener::new(|old, new| info!(from = ?old, to = ?new, "Agent status changed")),
    );

    let context = WorkContext {
        remote: Arc::new(HttpRemote::new(server.clone())),
        artifacts: Arc::new(HttpArtifactSink::new(server.clone())),
        console: Arc::new(HttpConsoleUploader::new(server)),
        tasks: None,
        runtime: Arc::new(Mutex::new(runtime_info)),
        work_dir: config.work_dir.clone(),
        console_publish_interval: config.console_publish_interval(),
        ambient: EnvironmentVariableContext::from_process(),
    };
    let controller = AgentController::new(&config, context);

    // The blocking HTTP clients must be created and dropped outside the runtime.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                let _ = shutdown_tx.send(true);
            }
        });
        controller.run(shutdown_rx).await;
    });
    drop(runtime);
    drop(controller);
    Ok(())
}

pub struct PlanArgs {
    pub stage_config: PathBuf,
    pub agents: PathBuf,
    pub system_config: Option<PathBuf>,
    pub pipeline: String,
    pub counter: u32,
    pub label: Option<String>,
    pub show_env: bool,
}

/// Schedule a stage in memory and print the resulting jobs.
pub fn plan(args: &PlanArgs) -> anyhow::Result<()> {
    let stage_config = StageConfig::from_yaml(&std::fs::read_to_string(&args.stage_config)?)
        .with_context(|| format!("Invalid stage config {}", args.stage_config.display()))?;
    let agents: Vec<Agent> = serde_yaml::from_str(&std::fs::read_to_string(&args.agents)?)
        .with_context(|| format!("Invalid agent list {}", args.agents.display()))?;
    let system = match &args.system_config {
        Some(path) => SystemConfig::from_file(path)?,
        None => SystemConfig::default(),
    };

    let label = args.label.clone().unwrap_or_else(|| args.counter.to_string());
    let pipeline = PipelineIdentity::new(args.pipeline.as_str(), args.counter, label);
    let context = SchedulingContext::new("gantry-cli", agents);
    let version = stage_config.digest()?;
    let stage = InstanceFactory::new().create_stage_instance(&pipeline, &stage_config, &context, &version, 1)?;

    println!(
        "{} Stage {} of {} ({} jobs, config {})",
        style("✓").green(),
        style(&stage.name).bold(),
        pipeline.name,
        stage.jobs.len(),
        &version[..12.min(version.len())]
    );

    let cause = BuildCause::manual(context.approver(), MaterialRevisions::default());
    let assembler = BuildAssignmentAssembler::new(system);
    let builder_factory = BuilderFactory::new();

    for job in &stage.jobs {
        let agent = job
            .agent_uuid
            .as_ref()
            .map(|uuid| uuid.to_string())
            .unwrap_or_else(|| "any".to_string());
        println!("  - {} (agent: {})", style(&job.name).cyan(), agent);

        let job_config = stage_config
            .job_by_name(config_name(&job.name))
            .with_context(|| format!("No configuration for job {}", job.name))?;
        let builders = builder_factory.builders_for(job_config, &job.plan.identifier, &cause)?;
        for builder in &builders {
            println!("      task: {}", builder.description);
        }

        if args.show_env {
            let working_dir = assembler.working_directory_for(&job.plan);
            let assignment = assembler.assemble(job.plan.clone(), &cause, builders, working_dir, None);
            for variable in assignment.initial_environment_variable_context().iter() {
                println!("      {}={}", variable.name, variable.display_value());
            }
        }
    }
    Ok(())
}

/// Resolve an artifact rule against a directory.
pub fn match_artifacts(dir: &Path, pattern: &str, dest: &str) -> anyhow::Result<()> {
    match match_plan(&ArtifactPlan::new(pattern, dest), dir) {
        Ok(uploads) => {
            for upload in uploads {
                let kind = if upload.is_dir { "dir " } else { "file" };
                println!(
                    "{} {} {} -> {}",
                    style("✓").green(),
                    kind,
                    upload.source.display(),
                    if upload.dest.is_empty() { "." } else { upload.dest.as_str() }
                );
            }
            Ok(())
        }
        Err(e) => {
            println!("{} {}", style("!").yellow(), e);
            Err(e.into())
        }
    }
}
