//! Vesper CLI — incremental RTL synthesis with module-level caching.
//!
//! `vesper cache` manages the on-disk module cache, `vesper deps` builds
//! and queries the dependency graph, `vesper monitor` inspects change
//! tracking, `vesper synth` runs one incremental synthesis invocation,
//! and `vesper watch` re-runs it whenever the source files change.

#![warn(missing_docs)]

mod cache;
mod deps;
mod monitor;
mod pipeline;
mod synth;
mod watch;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

/// Vesper — an incremental hardware-synthesis cache.
#[derive(Parser, Debug)]
#[command(name = "vesper", version, about = "Vesper incremental synthesis cache")]
pub struct Cli {
    /// Suppress progress output (warnings still go through the logger).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the module cache.
    Cache(CacheArgs),
    /// Build and query the module dependency graph.
    Deps(DepsArgs),
    /// Inspect change tracking against a fresh baseline.
    Monitor(MonitorArgs),
    /// Run one incremental synthesis invocation.
    Synth(SynthArgs),
    /// Watch source files and re-synthesize on change.
    Watch(WatchArgs),
}

/// Arguments for `vesper cache`.
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Cache directory (default: `$CACHE_DIR`, then `$HOME/.cache/vesper`).
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Initialize the cache directory.
    #[arg(long)]
    pub init: bool,

    /// Show cache statistics.
    #[arg(long)]
    pub status: bool,

    /// List all cached entries.
    #[arg(long)]
    pub list: bool,

    /// Remove every cached entry.
    #[arg(long)]
    pub clear: bool,

    /// Persist the cache index and artifacts.
    #[arg(long)]
    pub save: bool,

    /// Invalidate all cached versions of a module.
    #[arg(long, value_name = "MODULE")]
    pub invalidate: Option<String>,

    /// Maximum number of cache entries.
    #[arg(long, value_name = "N")]
    pub max_entries: Option<usize>,

    /// Maximum cache size in megabytes.
    #[arg(long, value_name = "MB")]
    pub max_size_mb: Option<u64>,

    /// Maximum cache entry age in days.
    #[arg(long, value_name = "DAYS")]
    pub max_age_days: Option<i64>,

    /// Force eviction under the current limits.
    #[arg(long)]
    pub evict: bool,
}

/// Arguments for `vesper deps`.
#[derive(Parser, Debug)]
pub struct DepsArgs {
    /// Source files to read.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Top module hint for elaboration.
    #[arg(long, value_name = "MODULE")]
    pub top: Option<String>,

    /// Display the dependency graph.
    #[arg(long)]
    pub show: bool,

    /// Output the dependency graph as JSON.
    #[arg(long)]
    pub json: bool,

    /// Show all modules affected if the given module changes.
    #[arg(long, value_name = "MODULE")]
    pub affected: Option<String>,

    /// Show the topological synthesis order.
    #[arg(long)]
    pub order: bool,

    /// Store the graph in the design scratchpad before printing.
    #[arg(long)]
    pub store: bool,

    /// Load the graph from the design scratchpad instead of building.
    #[arg(long)]
    pub load: bool,
}

/// Arguments for `vesper monitor`.
#[derive(Parser, Debug)]
pub struct MonitorArgs {
    /// Source files to read.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Show the change summary.
    #[arg(long)]
    pub status: bool,

    /// List dirty (added or modified) modules.
    #[arg(long)]
    pub dirty: bool,

    /// Re-baseline before reporting.
    #[arg(long)]
    pub reset: bool,

    /// Detach the monitor before exiting.
    #[arg(long)]
    pub detach: bool,
}

/// Arguments for `vesper synth`.
#[derive(Parser, Debug)]
pub struct SynthArgs {
    /// Source files to read.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Top module hint for elaboration.
    #[arg(long, value_name = "MODULE")]
    pub top: Option<String>,

    /// Force full synthesis, ignoring the cache.
    #[arg(long)]
    pub full: bool,

    /// Do not update the cache with results.
    #[arg(long)]
    pub no_cache: bool,

    /// Skip hierarchy elaboration.
    #[arg(long)]
    pub skip_elaboration: bool,

    /// Re-synthesize transitive dependents of changed modules.
    #[arg(long)]
    pub conservative: bool,

    /// Show cache statistics after the run.
    #[arg(long)]
    pub stats: bool,

    /// Cache directory override.
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

/// Arguments for `vesper watch`.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Source files to watch.
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Top module hint for elaboration.
    #[arg(long, value_name = "MODULE")]
    pub top: Option<String>,

    /// Polling interval in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub poll: u64,

    /// Report port (reserved); any non-zero value enables the stdout
    /// JSON record after each reload.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub port: u16,

    /// Run once and exit.
    #[arg(long)]
    pub once: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Cache(ref args) => cache::run(args, cli.quiet),
        Command::Deps(ref args) => deps::run(args, cli.quiet),
        Command::Monitor(ref args) => monitor::run(args, cli.quiet),
        Command::Synth(ref args) => synth::run(args, cli.quiet),
        Command::Watch(ref args) => watch::run(args, cli.quiet),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
}
