use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// dockmon — Docker Private Registry maintenance
#[derive(Parser, Debug)]
#[command(name = "dockmon", version, about)]
pub struct Cli {
    /// Config file (default: ~/.docker/dockmon.yml)
    #[arg(long, env = "DOCKMON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, default_value_t = false, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List repo:tag images of every configured registry
    List {
        /// Only this registry (domain or URL)
        #[arg(long)]
        host: Option<String>,
    },

    /// Delete images by repo:tag
    Delete(DeleteArgs),

    /// Run garbage collection inside the registry container
    Gc(GcArgs),
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Registry (domain or URL)
    #[arg(long)]
    pub host: String,

    /// Images to delete
    #[arg(required = true, value_name = "REPO:TAG")]
    pub images: Vec<String>,
}

#[derive(Args, Debug)]
pub struct GcArgs {
    /// Registry (domain or URL)
    #[arg(long)]
    pub host: String,

    /// Skip GC when the read-only config could not be applied
    #[arg(long, default_value_t = false)]
    pub abort_on_step_failure: bool,
}
