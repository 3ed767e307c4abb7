//! Gantry CD CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod handlers;

use commands::Commands;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(author, version, about = "Gantry CD command-line interface", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Agent { config } => handlers::agent(&config)?,
        Commands::Plan {
            stage_config,
            agents,
            system_config,
            pipeline,
            counter,
            label,
            show_env,
        } => handlers::plan(&handlers::PlanArgs {
            stage_config,
            agents,
            system_config,
            pipeline,
            counter,
            label,
            show_env,
        })?,
        Commands::Match { dir, pattern, dest } => handlers::match_artifacts(&dir, &pattern, &dest)?,
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
