//! CLI entry point for geoindex.
//!
//! Operator messages and the stats table go to stdout; logs and errors go
//! to stderr. Exits 1 on any index or persist failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use geoindex_core::{IndexerConfig, StatsStrategy};
use geoindex_lifecycle::render::render_table;
use geoindex_lifecycle::{
    BuildRequest, Lifecycle, LifecycleError, ReplaceRequest, StatsRequest, WorkflowOutcome,
};
use geoindex_store::QuadFileDataset;

#[derive(Parser)]
#[command(name = "geoindex", version)]
#[command(about = "Build, replace, and inspect spatial indexes over quad datasets")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: geoindex).
    #[arg(short, long, default_value = "geoindex", global = true)]
    config: String,

    /// Write logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Args)]
struct Target {
    /// Dataset location: a directory of N-Quads files or a single file.
    #[arg(long)]
    loc: PathBuf,

    /// Spatial index file.
    #[arg(short, long)]
    index: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Build a spatial index from the dataset.
    Build {
        #[command(flatten)]
        target: Target,

        /// SRS URI to index under (default: configured SRS, else the dataset's most common one).
        #[arg(long)]
        srs: Option<String>,

        /// Replace an existing index file atomically.
        #[arg(long)]
        overwrite: bool,

        /// One tree per named graph (true) or a single combined tree (false).
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        index_per_graph: bool,

        /// Named graphs to index (comma separated or repeated; default: all).
        #[arg(short, long = "graph", value_delimiter = ',')]
        graphs: Vec<String>,
    },
    /// Recompute the trees of the given named graphs in an existing index.
    Replace {
        #[command(flatten)]
        target: Target,

        /// Named graphs to recompute (comma separated or repeated).
        #[arg(short, long = "graph", value_delimiter = ',', required = true)]
        graphs: Vec<String>,
    },
    /// Print per-graph statistics of an existing index.
    Stats {
        #[command(flatten)]
        target: Target,

        /// Graphs to report (DEFAULT for the default graph; default: all).
        #[arg(short, long = "graph", value_delimiter = ',')]
        graphs: Vec<String>,

        /// Include tree depth.
        #[arg(long)]
        depth: bool,

        /// Measurement strategy: introspect or domain-query.
        #[arg(long)]
        strategy: Option<StatsStrategy>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<LifecycleError>()
                .map(LifecycleError::exit_code)
                .unwrap_or(1);
            eprintln!("Error: {e:#}");
            ExitCode::from(code)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = IndexerConfig::load(&cli.config)?;

    match cli.command {
        Command::Build {
            target,
            srs,
            overwrite,
            index_per_graph,
            graphs,
        } => {
            let lifecycle = open_lifecycle(&target.loc, config)?;
            let request = BuildRequest {
                index_path: target.index,
                srs,
                index_per_graph,
                overwrite,
                graphs,
            };
            if let WorkflowOutcome::Completed(summary) = lifecycle.build(&request)? {
                tracing::info!(
                    path = %request.index_path.display(),
                    srs = %summary.srs_uri,
                    graphs = summary.graph_count,
                    elements = summary.element_count,
                    atomic = summary.atomic,
                    "Build complete"
                );
            }
        }
        Command::Replace { target, graphs } => {
            let lifecycle = open_lifecycle(&target.loc, config)?;
            let request = ReplaceRequest {
                index_path: target.index,
                graphs,
            };
            match lifecycle.replace(&request)? {
                WorkflowOutcome::Completed(summary) => {
                    tracing::info!(graphs = summary.changes.len(), atomic = summary.atomic, "Replace complete");
                }
                WorkflowOutcome::Skipped { reason } => tracing::info!(reason = %reason, "Replace skipped"),
            }
        }
        Command::Stats {
            target,
            graphs,
            depth,
            strategy,
        } => {
            let lifecycle = open_lifecycle(&target.loc, config)?;
            let request = StatsRequest {
                index_path: target.index,
                graphs,
                include_depth: depth,
                strategy,
            };
            match lifecycle.stats(&request)? {
                WorkflowOutcome::Completed(report) => print!("{}", render_table(&report, depth)),
                WorkflowOutcome::Skipped { reason } => tracing::info!(reason = %reason, "Stats skipped"),
            }
        }
    }

    Ok(())
}

fn open_lifecycle(
    loc: &Path,
    config: IndexerConfig,
) -> anyhow::Result<Lifecycle<QuadFileDataset>> {
    let dataset = QuadFileDataset::open(loc)?;
    let lifecycle = Lifecycle::new(dataset, config)?.with_notifier(|notice| println!("{notice}"));
    Ok(lifecycle)
}
