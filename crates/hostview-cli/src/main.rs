//! hostview command-line tool
//!
//! Runs hostview scripts against the headless runtime.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hostview")]
#[command(about = "Run hostview scripts against a headless webview runtime", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "hostview_bridge=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file
    Run {
        /// Script file
        file: PathBuf,
        /// Lifecycle event to fire after the script has loaded (repeatable),
        /// e.g. "load-finished", "title:Home", "resize:800x600"
        #[arg(long = "emit")]
        emit: Vec<String>,
        /// Simulated JS call to a bound function, as "name:id:payload" (repeatable)
        #[arg(long = "call")]
        call: Vec<String>,
    },

    /// Evaluate inline code
    Eval {
        /// Code to run
        code: String,
        /// Global to print afterwards (repeatable)
        #[arg(short, long)]
        print: Vec<String>,
    },
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { file, emit, call } => commands::run::execute(commands::run::RunArgs {
            file,
            emit,
            call,
            config,
        }),
        Commands::Eval { code, print } => commands::eval::execute(&code, &print, config),
    }
}
