use clap::Parser;
use dotenv::dotenv;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::{CheckArgs, Cli, Commands, RunArgs};
use managed_threads::config::{AppConfig, ThreadSpec, read_tree};
use managed_threads::threads::{StopToken, ThreadRegistry, wait_for_input};

mod cli;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load environment variables from .env file
    dotenv().ok();

    // Initialize tracing with environment filter using CLI log level
    let log_level = format!("managed_threads={},threadctl={},info", cli.log_level, cli.log_level);
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => run_tree(args, &cli.log_level).await,
        Commands::Check(args) => check_tree(args),
    }
}

async fn run_tree(args: RunArgs, log_level: &str) -> eyre::Result<()> {
    let app_config = AppConfig::load(
        &args.tree_file,
        log_level,
        args.run_for_ms,
        args.stop_timeout_ms,
    )?;

    let registry = ThreadRegistry::with_config(app_config.thread_config());
    let panics = registry.reporter().subscribe();
    let top_level = app_config.tree.build_into(&registry)?;

    tracing::info!(
        tree_file = %app_config.tree_file,
        top_level = top_level.len(),
        total = app_config.tree.thread_count(),
        "Thread tree built"
    );

    for thread in &top_level {
        thread.start()?;
    }

    // Drain contained failures so they show up next to the status reports
    let watcher_stop = StopToken::new();
    let watcher_token = watcher_stop.clone();
    let panic_watcher = tokio::task::spawn_blocking(move || {
        let mut seen = 0u64;
        while !watcher_token.is_stopping() {
            if let Some(panic) = wait_for_input(&panics, Duration::from_millis(200)) {
                seen += 1;
                tracing::warn!(
                    thread_name = %panic.thread_name,
                    origin = %panic.origin,
                    seen,
                    "Worker failure contained"
                );
            }
        }
        seen
    });

    let mut status = tokio::time::interval(Duration::from_millis(args.status_interval_ms.max(1)));
    let deadline = async {
        match app_config.run_for {
            Some(run_for) => tokio::time::sleep(run_for).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, stopping thread tree");
                break;
            }
            _ = &mut deadline => {
                tracing::info!("Run duration elapsed, stopping thread tree");
                break;
            }
            _ = status.tick() => {
                let stats = registry.stats();
                tracing::info!(
                    total = stats.total_threads,
                    active = stats.active_threads,
                    critical = stats.critical_threads,
                    reported_panics = stats.reported_panics,
                    "Thread registry status"
                );
            }
        }
    }

    let stopper = registry.clone();
    tokio::task::spawn_blocking(move || stopper.stop_all()).await?;

    for thread in registry.threads() {
        tracing::info!(summary = %thread.summary(), "Final thread state");
    }

    watcher_stop.stop();
    let seen = panic_watcher.await?;

    tracing::info!(
        reported_panics = registry.reporter().total_reported(),
        seen,
        "Thread tree shut down"
    );
    Ok(())
}

fn check_tree(args: CheckArgs) -> eyre::Result<()> {
    let tree = read_tree(&args.tree_file)?;
    let thread_config = tree.thread_config();

    println!(
        "{}: {} threads, stop timeout {:?}, panic history {}",
        args.tree_file,
        tree.thread_count(),
        thread_config.stop_timeout,
        thread_config.panic_history_limit
    );

    fn print_spec(spec: &ThreadSpec, depth: usize) {
        println!(
            "{}- {} (background: {}, critical: {}, behaviour: {:?})",
            "  ".repeat(depth),
            spec.name,
            spec.background,
            spec.critical,
            spec.behaviour
        );
        for child in &spec.children {
            print_spec(child, depth + 1);
        }
    }

    for spec in &tree.threads {
        print_spec(spec, 0);
    }
    Ok(())
}
