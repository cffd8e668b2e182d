use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "threadctl")]
#[command(about = "Run and inspect supervised thread trees")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a thread tree and stop it after a while or on Ctrl-C
    Run(RunArgs),

    /// Validate a tree file and print its layout
    Check(CheckArgs),
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Path to the thread tree file
    #[arg(short, long, default_value = "threads.yaml", env = "THREADCTL_TREE")]
    pub tree_file: String,

    /// Stop the tree after this many milliseconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub run_for_ms: Option<u64>,

    /// Override the per-thread stop timeout in milliseconds
    #[arg(long)]
    pub stop_timeout_ms: Option<u64>,

    /// Interval between status reports in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub status_interval_ms: u64,
}

#[derive(Args, Clone)]
pub struct CheckArgs {
    /// Path to the thread tree file
    #[arg(short, long, default_value = "threads.yaml", env = "THREADCTL_TREE")]
    pub tree_file: String,
}
