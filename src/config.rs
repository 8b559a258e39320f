//! CLI configuration and argument parsing.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Kubernetes cluster inventory and health report CLI tool.
///
/// Scans one or more clusters and summarizes pods, workloads, images,
/// nodes and legacy API usage.
#[derive(Parser, Debug, Clone)]
#[command(name = "kh")]
#[command(about = "Kubernetes cluster inventory and health report CLI tool")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    /// Kubernetes contexts to scan, comma separated [default: current context]
    #[arg(short, long, env = "KUBECONFIG_CONTEXT", value_delimiter = ',')]
    pub context: Vec<String>,

    /// Path to a kubeconfig file
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Show per-namespace pod details
    #[arg(short, long, default_value = "false")]
    pub pods: bool,

    /// Show the image breakdown
    #[arg(short, long, default_value = "false")]
    pub images: bool,

    /// Show the node summary
    #[arg(short, long, default_value = "false")]
    pub nodes: bool,

    /// Show the deprecated API digest
    #[arg(short, long, default_value = "false")]
    pub deprecations: bool,

    /// Namespace aggregation workers
    #[arg(short = 'T', long, default_value = "3", value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: u16,

    /// Resolve ReplicaSet owners through the API instead of by name
    #[arg(long, default_value = "false")]
    pub resolve_owners: bool,

    /// When to colorize output
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Use 24-bit colours for workload pool tags
    #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
    pub true_color: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Restart count at which a pod is flagged
    #[arg(long, default_value = "20")]
    pub restart_limit: i32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "KH_LOG_LEVEL")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    /// Contexts in scan order. `None` scans the current context.
    pub contexts: Vec<Option<String>>,
    pub kubeconfig: Option<PathBuf>,
    pub pods: bool,
    pub images: bool,
    pub nodes: bool,
    pub deprecations: bool,
    pub threads: usize,
    pub resolve_owners: bool,
    pub color: ColorMode,
    pub true_color: bool,
    pub output: OutputFormat,
    pub restart_limit: i32,
    pub log_level: String,
}

impl Config {
    /// Create config from CLI arguments.
    pub fn from_args(args: Args) -> Self {
        let mut contexts: Vec<Option<String>> = Vec::new();
        for ctx in args.context.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            let ctx = Some(ctx.to_string());
            if !contexts.contains(&ctx) {
                contexts.push(ctx);
            }
        }
        if contexts.is_empty() {
            contexts.push(None);
        }

        Self {
            contexts,
            kubeconfig: args.kubeconfig,
            pods: args.pods,
            images: args.images,
            nodes: args.nodes,
            deprecations: args.deprecations,
            threads: usize::from(args.threads).max(1),
            resolve_owners: args.resolve_owners,
            color: args.color,
            true_color: args.true_color,
            output: args.output,
            restart_limit: args.restart_limit,
            log_level: args.log_level,
        }
    }

    /// Progress and colour only make sense for the table report.
    pub fn is_interactive(&self) -> bool {
        self.output == OutputFormat::Table
    }
}
