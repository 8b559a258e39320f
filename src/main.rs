//! kh - Kubernetes cluster inventory and health report CLI tool.
//!
//! Scans each requested kubeconfig context and prints per-namespace,
//! per-workload, per-image and per-node summaries.

mod config;
mod error;
mod k8s;
mod output;
mod scan;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{debug, error, info};

use config::{Args, ColorMode, Config, OutputFormat};
use error::KhError;
use output::ReportOptions;
use scan::ScanOptions;
use scan::cluster::ClusterSummary;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::from_args(args);

    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }
    apply_color_mode(&config);

    debug!("Starting kh - Kubernetes cluster health report");

    if let Err(e) = run(&config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Scan every context. Fails only when no context could be scanned.
async fn run(config: &Config) -> Result<()> {
    let report_options = ReportOptions {
        pods: config.pods,
        images: config.images,
        nodes: config.nodes,
        deprecations: config.deprecations,
        true_color: config.true_color,
        restart_limit: config.restart_limit,
    };

    let mut summaries = Vec::new();
    let mut failed = 0;

    for context in &config.contexts {
        match scan_context(config, context.as_deref()).await {
            Ok(summary) => {
                if config.output == OutputFormat::Table {
                    if !summaries.is_empty() {
                        println!();
                    }
                    output::print_report(&summary, &report_options);
                }
                summaries.push(summary);
            }
            Err(e) => {
                error!("{}", e);
                failed += 1;
            }
        }
    }

    if config.output == OutputFormat::Json {
        println!("{}", output::json::render(&summaries)?);
    }

    if summaries.is_empty() {
        anyhow::bail!("No cluster could be scanned ({} context(s) failed)", failed);
    }
    Ok(())
}

/// Connect to one context and scan it.
async fn scan_context(config: &Config, context: Option<&str>) -> Result<ClusterSummary, KhError> {
    let kubeconfig = config.kubeconfig.as_deref();
    let name = k8s::client::current_context(kubeconfig, context);

    let client = k8s::client::build_client(kubeconfig, context).await?;
    let server_version = k8s::client::probe(&client, &name).await?;
    info!("[{}] Connected to API server {}", name, server_version);

    let source = k8s::source::KubeSource::new(client);
    let options = ScanOptions {
        threads: config.threads,
        resolve_owners: config.resolve_owners,
        show_progress: config.is_interactive(),
    };

    scan::scan_cluster(&source, &name, server_version, &options, Utc::now()).await
}

fn apply_color_mode(config: &Config) {
    match config.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto if !config.is_interactive() => colored::control::set_override(false),
        ColorMode::Auto => {}
    }
}

/// Initialize tracing subscriber. Logs go to stderr so stdout stays parseable.
fn init_tracing(log_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {}", e))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
