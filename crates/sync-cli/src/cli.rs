use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use sync_core::model::SyncMode;

#[derive(Parser)]
#[command(name = "sync-cli")]
#[command(about = "Drives the sync-core reconciliation pipeline for a local root and a baseline store")]
pub struct Cli {
    /// Override the configuration directory for this invocation
    #[arg(long, global = true, value_name = "PATH")]
    pub config_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the local root, diff it against the baseline, and print the action plan
    Plan(PlanArgs),
    /// Run one full sync cycle: scan, plan, execute, and commit outcomes
    Run(RunArgs),
    /// List unresolved conflicts recorded in the baseline store
    Conflicts(ConflictsArgs),
    /// Mark a conflict resolved
    Resolve(ResolveArgs),
}

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    /// Local sync root to scan
    pub root: PathBuf,
    /// SQLite baseline store path (":memory:" for an ephemeral store)
    #[arg(long, default_value = "baseline.sqlite3")]
    pub db: String,
    #[arg(long, value_enum, default_value = "bidirectional")]
    pub mode: ModeArg,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Local sync root to scan
    pub root: PathBuf,
    /// SQLite baseline store path (":memory:" for an ephemeral store)
    #[arg(long, default_value = "baseline.sqlite3")]
    pub db: String,
    #[arg(long, value_enum, default_value = "bidirectional")]
    pub mode: ModeArg,
    /// Print the plan and exit without executing or committing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ConflictsArgs {
    /// SQLite baseline store path
    #[arg(long, default_value = "baseline.sqlite3")]
    pub db: String,
    /// Include already-resolved conflicts
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ResolveArgs {
    /// SQLite baseline store path
    #[arg(long, default_value = "baseline.sqlite3")]
    pub db: String,
    /// Conflict UUID, as printed by `conflicts`
    pub id: String,
    #[arg(long, value_enum, default_value = "keep-local")]
    pub resolution: ResolutionArg,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ModeArg {
    Bidirectional,
    DownloadOnly,
    UploadOnly,
}

impl From<ModeArg> for SyncMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Bidirectional => SyncMode::Bidirectional,
            ModeArg::DownloadOnly => SyncMode::DownloadOnly,
            ModeArg::UploadOnly => SyncMode::UploadOnly,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ResolutionArg {
    KeepLocal,
    KeepRemote,
    KeepBoth,
}

impl From<ResolutionArg> for sync_core::model::Resolution {
    fn from(r: ResolutionArg) -> Self {
        match r {
            ResolutionArg::KeepLocal => sync_core::model::Resolution::KeepLocal,
            ResolutionArg::KeepRemote => sync_core::model::Resolution::KeepRemote,
            ResolutionArg::KeepBoth => sync_core::model::Resolution::KeepBoth,
        }
    }
}
