use anyhow::Result;
use clap::Parser;
use depboot::bootstrap::{BootstrapOptions, DEFAULT_MANIFEST, exit_code_for};
use depboot::installer::DEFAULT_PYTHON;
use std::path::PathBuf;

/// depboot - deterministic Python dependency bootstrapper
///
/// Provisions a Python environment in four fixed steps, stopping at the first failure:
///   1. upgrade pip
///   2. install the pinned build tools (setuptools, wheel)
///   3. install the pinned numerics (numpy, pandas)
///   4. install requirements.txt, with the pins taking precedence
///
/// The exit code is that of the failing pip command, or 0 on success.
///
/// Examples:
///   depboot                          # Run all four steps
///   depboot plan                     # Show the commands without running them
///   depboot verify                   # Check the pinned versions are installed
#[derive(Parser, Debug)]
#[command(author, version = env!("DEPBOOT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Requirements manifest installed in the last step
    #[arg(
        long,
        short = 'm',
        env = "DEPBOOT_MANIFEST",
        value_name = "PATH",
        default_value = DEFAULT_MANIFEST,
        global = true
    )]
    manifest: PathBuf,

    /// Python interpreter used to run pip
    #[arg(
        long,
        env = "DEPBOOT_PYTHON",
        value_name = "CMD",
        default_value = DEFAULT_PYTHON,
        global = true
    )]
    python: String,

    /// JSON plan file overriding the pinned packages
    #[arg(long = "plan", env = "DEPBOOT_PLAN", value_name = "PATH", global = true)]
    plan_file: Option<PathBuf>,

    /// Extra argument for every pip install (repeatable), e.g. --pip-arg=--no-cache-dir
    #[arg(
        long = "pip-arg",
        value_name = "ARG",
        allow_hyphen_values = true,
        global = true
    )]
    pip_args: Vec<String>,

    /// Pass -q to pip
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run all bootstrap steps (default)
    Run(RunArgs),

    /// Show the steps and commands without running them
    Plan(PlanArgs),

    /// Check that every pinned package is installed at its pinned version
    Verify,
}

#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Verify the pinned versions after installing
    #[arg(long)]
    pub verify: bool,
}

#[derive(clap::Args, Debug)]
pub struct PlanArgs {
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    fn options(&self) -> BootstrapOptions {
        BootstrapOptions {
            manifest: self.manifest.clone(),
            python: self.python.clone(),
            pip_args: self.pip_args.clone(),
            quiet: self.quiet,
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let runtime = depboot::runtime::RealRuntime;
    let options = cli.options();

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            depboot::commands::run(runtime, options, cli.plan_file, args.verify).await
        }
        Commands::Plan(args) => depboot::commands::plan(runtime, options, cli.plan_file, args.json),
        Commands::Verify => depboot::commands::verify(runtime, options, cli.plan_file).await,
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(exit_code_for(&e));
    }
}
