use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kiln_core::configs::settings::SettingsConfig;
use kiln_core::orchestrator::{Orchestrator, OrchestratorConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

/// Kiln - provision a speech-recognition toolchain one target at a time
#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Resumable, marker-driven provisioning of a speech-recognition toolchain")]
#[command(version)]
struct Cli {
    /// Target manifest (defaults to kiln.yml in the current directory, then the built-in recipe)
    #[arg(short, long, env = "KILN_MANIFEST", global = true)]
    manifest: Option<PathBuf>,

    /// Show debug output, including the output of every command
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SettingsArgs {
    /// Existing Python interpreter to create a virtualenv from instead of installing Miniconda
    #[arg(long, env = "KILN_PYTHON", global = true)]
    python: Option<PathBuf>,

    /// Python version for the provisioned environment [default: 3.7]
    #[arg(long, env = "KILN_PYTHON_VERSION", global = true)]
    python_version: Option<String>,

    /// PyTorch version installed into the environment [default: 1.0.0]
    #[arg(long, env = "KILN_TORCH_VERSION", global = true)]
    torch_version: Option<String>,

    /// Existing Kaldi checkout to link instead of building from source
    #[arg(long, env = "KILN_KALDI", global = true)]
    kaldi: Option<PathBuf>,

    /// Directory for all provisioned artifacts [default: .]
    #[arg(short, long, env = "KILN_WORKSPACE", global = true)]
    workspace: Option<PathBuf>,

    /// Directory for <target>.done markers [default: .]
    #[arg(long, env = "KILN_MARKER_DIR", global = true)]
    marker_dir: Option<PathBuf>,

    /// C++ compiler whose version decides how extensions are built [default: g++]
    #[arg(long, env = "CXX", global = true)]
    cxx: Option<String>,

    /// CUDA installation passed to extension builds
    #[arg(long, env = "CUDA_HOME", global = true)]
    cuda_home: Option<PathBuf>,

    /// Source tree to install into the environment in editable mode
    #[arg(long, env = "KILN_SOURCE", global = true)]
    source: Option<PathBuf>,
}

impl From<SettingsArgs> for SettingsConfig {
    fn from(args: SettingsArgs) -> Self {
        SettingsConfig {
            interpreter_override: args.python,
            runtime_version: args.python_version,
            framework_version: args.torch_version,
            preexisting_toolkit_path: args.kaldi,
            workspace_path: args.workspace,
            marker_dir: args.marker_dir,
            cxx: args.cxx,
            cuda_home: args.cuda_home,
            source_path: args.source,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run targets and their dependencies, skipping anything already marked done
    Run {
        /// Targets to run (defaults to the manifest's default targets)
        targets: Vec<String>,
        /// Only show what would run
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the execution order without running anything
    Plan {
        /// Targets to plan (defaults to the manifest's default targets)
        targets: Vec<String>,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// List targets with their dependencies and status
    List,
    /// Show the target dependency graph
    Graph,
    /// Print the JSON schema of the manifest format
    Schema,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Schema = cli.command {
        return commands::schema::execute();
    }

    let invocation_dir =
        std::env::current_dir().context("Failed to determine the current directory")?;

    // Resolve configuration and targets once (CLI layer only handles presentation)
    let orchestrator = Orchestrator::new(OrchestratorConfig {
        invocation_dir,
        manifest_path: cli.manifest,
        overrides: cli.settings.into(),
    })
    .context("Failed to initialize")?;
    debug!(
        source = ?orchestrator.source,
        targets = orchestrator.registry.len(),
        "targets registered"
    );

    match cli.command {
        Commands::Run { targets, dry_run } => {
            if dry_run {
                commands::plan::execute(&orchestrator, &targets, false)
            } else {
                commands::run::execute(&orchestrator, &targets)
            }
        }
        Commands::Plan { targets, json } => commands::plan::execute(&orchestrator, &targets, json),
        Commands::List => commands::list::execute(&orchestrator),
        Commands::Graph => commands::graph::execute(&orchestrator),
        Commands::Schema => commands::schema::execute(),
    }
}

fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "kiln_core=debug,kiln_cli=debug,warn"
    } else {
        "kiln_core=info,kiln_cli=info,warn"
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
