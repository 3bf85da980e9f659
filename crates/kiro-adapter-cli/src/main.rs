mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, metrics::MetricsSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kiro-adapter",
    about = "Convert BMAD agents into Kiro agents, steering rules and hooks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .kiro/, .bmad-core/ or .git/)
    #[arg(long, global = true, env = "KIRO_ADAPTER_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .kiro/ with a default adapter config and steering files
    Init,

    /// List discovered agents
    Scan,

    /// Resolve and show one agent's dependencies
    Deps {
        /// Agent id
        id: String,
    },

    /// Convert every agent and register it with Kiro
    Convert {
        /// Fail agents whose dependencies are missing
        #[arg(long)]
        strict: bool,
    },

    /// Map context needs onto Kiro context providers
    Context {
        /// Need phrases, e.g. "current file" "test results"
        #[arg(required = true)]
        needs: Vec<String>,

        /// Providers that are unavailable (e.g. "#Terminal")
        #[arg(long = "unavailable", value_name = "TOKEN")]
        unavailable: Vec<String>,
    },

    /// Generate .kiro.hook files from a workflow definition
    Hooks {
        /// Workflow YAML file
        workflow: PathBuf,

        /// Output directory (default: configured hooks dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Check the health of every converted agent
    Health,

    /// Activate an agent once and record the attempt
    Activate {
        /// Agent id
        id: String,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        project: Option<String>,
    },

    /// Inspect or prune activation metrics
    Metrics {
        #[command(subcommand)]
        subcommand: MetricsSubcommand,
    },

    /// Show or validate .kiro/adapter.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Convert { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Scan => cmd::scan::run(&root, cli.json),
        Commands::Deps { id } => cmd::deps::run(&root, &id, cli.json),
        Commands::Convert { strict } => cmd::convert::run(&root, strict, cli.json),
        Commands::Context { needs, unavailable } => {
            cmd::context::run(&needs, &unavailable, cli.json)
        }
        Commands::Hooks { workflow, out } => {
            cmd::hooks::run(&root, &workflow, out.as_deref(), cli.json)
        }
        Commands::Health => cmd::health::run(&root, cli.json),
        Commands::Activate { id, user, project } => {
            cmd::activate::run(&root, &id, user, project, cli.json)
        }
        Commands::Metrics { subcommand } => cmd::metrics::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
