//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a build agent
    Agent {
        /// Agent configuration file
        #[arg(short, long, default_value = "gantry-agent.yaml")]
        config: PathBuf,
    },

    /// Preview how a stage would be scheduled against a set of agents
    Plan {
        /// Stage configuration (YAML)
        #[arg(short, long)]
        stage_config: PathBuf,

        /// Agent pool (YAML list)
        #[arg(short, long)]
        agents: PathBuf,

        /// System configuration (YAML)
        #[arg(long)]
        system_config: Option<PathBuf>,

        /// Pipeline name
        #[arg(long, default_value = "pipeline")]
        pipeline: String,

        /// Pipeline counter
        #[arg(long, default_value_t = 1)]
        counter: u32,

        /// Pipeline label, defaults to the counter
        #[arg(long)]
        label: Option<String>,

        /// Print each job's resolved environment
        #[arg(long)]
        show_env: bool,
    },

    /// Show which uploads an artifact rule produces in a directory
    Match {
        /// Working directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Source pattern, e.g. `**/*.png`
        pattern: String,

        /// Destination folder
        #[arg(long, default_value = "")]
        dest: String,
    },
}
