mod batch;
mod catalog;
mod cli;
mod config;
mod daemon;
mod error;
mod gc;
mod http;
mod manifest;
mod models;
mod output;

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use batch::{BatchDeleteCoordinator, Selection};
use catalog::CatalogReader;
use cli::{Cli, Command, DeleteArgs, GcArgs};
use config::Settings;
use http::HttpAdapter;
use output::{print_batch_report, print_catalog, print_catalog_error, print_gc_report};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dockmon=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let path = cli.config.clone().unwrap_or_else(config::default_config_path);
    debug!(path = %path.display(), "loading config");
    let settings = Settings::load(&path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;

    match cli.command {
        Command::List { host } => run_list(&settings, host.as_deref()).await,
        Command::Delete(args) => run_delete(&settings, &args).await,
        Command::Gc(args) => run_gc(&settings, &args).await,
    }
}

async fn run_list(settings: &Settings, host: Option<&str>) -> Result<()> {
    let http = HttpAdapter::new(settings.registry.clone())?;
    let reader = CatalogReader::new(&http);

    let hosts = match host {
        Some(h) => vec![settings.registry.registry_host_url(h)?],
        None => settings.registry.host_urls(),
    };

    // Hosts are queried one after another.
    let mut errors = 0;
    for host in &hosts {
        match reader.build_catalog(host).await {
            Ok(catalog) => print_catalog(&catalog),
            Err(e) => {
                errors += 1;
                print_catalog_error(host, &e);
            }
        }
    }

    if errors > 0 {
        process::exit(1);
    }

    Ok(())
}

async fn run_delete(settings: &Settings, args: &DeleteArgs) -> Result<()> {
    let http = HttpAdapter::new(settings.registry.clone())?;
    let host = settings.registry.registry_host_url(&args.host)?;

    let selection = Selection::all(args.images.iter().cloned());
    let report = BatchDeleteCoordinator::new(&http)
        .run(&host, &selection)
        .await;
    print_batch_report(&host, &report);

    if report.failures() > 0 {
        process::exit(1);
    }

    Ok(())
}

async fn run_gc(settings: &Settings, args: &GcArgs) -> Result<()> {
    let mut gc_config = settings.gc.clone();
    if args.abort_on_step_failure {
        gc_config.abort_on_step_failure = true;
    }

    let host = settings.registry.gc_host_url(&args.host);
    let report = gc::collect_garbage(&host, &gc_config).await;
    print_gc_report(&report);

    if !report.succeeded() {
        process::exit(1);
    }

    Ok(())
}
