use crate::demo::{run_demo, DemoArgs};
use crate::ops::{run_backfill, run_evaluate, run_snapshot, BackfillArgs, EvaluateArgs, SnapshotArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use sitter_srs::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Sitter Reliability Service",
    about = "Run the sitter reliability scoring and tier evaluation engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Score one day of snapshots from an event archive
    Snapshot(SnapshotArgs),
    /// Score a day and apply the weekly tier rules to it
    Evaluate(EvaluateArgs),
    /// Queue daily snapshots across an inclusive date range
    Backfill(BackfillArgs),
    /// Run a scripted month of scoring against seeded sitters
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Event archive CSV to load into the in-memory store at startup
    #[arg(long)]
    pub(crate) archive: Option<std::path::PathBuf>,
    /// Organization the archive rows belong to
    #[arg(long, default_value = "org-main")]
    pub(crate) org: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Snapshot(args) => run_snapshot(args),
        Command::Evaluate(args) => run_evaluate(args),
        Command::Backfill(args) => run_backfill(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
