//! The `monoco-daemon` binary.

use clap::Parser;
use monoco_daemon::Daemon;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Long-running workspace daemon for autonomous coding agents.
#[derive(Debug, Parser)]
#[command(name = "monoco-daemon", version, about)]
struct Args {
    /// Workspace (project) root to serve.
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Override the user configuration directory (`~/.monoco`).
    #[arg(long, env = "MONOCO_HOME")]
    monoco_home: Option<PathBuf>,

    /// Log filter directives.
    #[arg(long, env = "MONOCO_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log)?)
        .init();

    let workspace = args.workspace.canonicalize()?;
    let config = monoco_config::load(Some(&workspace), args.monoco_home.as_deref())?;

    let daemon = Daemon::new(&workspace, config)?;
    daemon.run().await
}
