use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rpki_runs::{Direction, RunKind, SortBy};
use rpki_types::ObjectType;

#[derive(Parser)]
#[command(
    name = "rpki-store",
    about = "Inspect and maintain the RPKI validator object store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Storage configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show object, run and trust anchor counts
    Stats,
    /// Cross-check object indices against the object table
    Verify,
    /// Delete objects that have not been reachable within the retention
    Gc(GcArgs),
    /// Delete old validation runs, keeping the latest successful ones
    PruneRuns(PruneArgs),
    /// List object keys of one type
    Objects(ObjectsArgs),
    /// Show one object and its locations
    Show(ShowArgs),
    /// List registered trust anchors
    TrustAnchors,
    /// List validation runs of one kind
    Runs(RunsArgs),
    /// List the checks of a validation run
    Checks(ChecksArgs),
    /// Get, set or list settings
    Settings(SettingsArgs),
    /// Delete every validation run
    ClearRuns,
}

#[derive(Args)]
pub struct GcArgs {
    /// Override the configured retention, in hours
    #[arg(long)]
    pub retention_hours: Option<u32>,
    /// Override the configured batch size (0 = one transaction)
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Args)]
pub struct PruneArgs {
    /// Override the configured retention, in days
    #[arg(long)]
    pub retention_days: Option<u32>,
}

#[derive(Args)]
pub struct ObjectsArgs {
    pub object_type: ObjectType,
}

#[derive(Args)]
pub struct ShowArgs {
    /// SHA-256 of the object, hex encoded
    pub key: String,
}

#[derive(Args)]
pub struct RunsArgs {
    pub kind: RunKind,
    /// Only the latest successful run per subject
    #[arg(long)]
    pub latest_successful: bool,
}

#[derive(Args)]
pub struct ChecksArgs {
    pub run_id: u64,
    #[arg(short, long)]
    pub search: Option<String>,
    #[arg(long, default_value = "id")]
    pub sort: SortBy,
    #[arg(long, default_value = "asc")]
    pub direction: Direction,
    #[arg(long, default_value = "0")]
    pub start: usize,
    #[arg(short = 'n', long, default_value = "50")]
    pub size: usize,
}

#[derive(Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub action: Option<SettingsAction>,
}

#[derive(Subcommand)]
pub enum SettingsAction {
    Get { name: String },
    Set { name: String, value: String },
}
