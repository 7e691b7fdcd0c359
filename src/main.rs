use clap::{Parser, Subcommand};
use std::io::{stdin, stdout, StdinLock, Stdout};
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing::{error, Level};
use wp_backup::backup::command::SystemToolRunner;
use wp_backup::backup::orchestrator::BackupOrchestrator;
use wp_backup::backup::project_config::{select_config, ProjectConfig};
use wp_backup::backup::restore::{RestoreOptions, RestoreOrchestrator};
use wp_backup::backup::result_error::result::Result;
use wp_backup::backup::setup::run_setup;
use wp_backup::backup::status::{read_status, status_path, LogLevel, StatusPhase, StatusReporter};

/// Backup and restore for WordPress sites
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Log debug output to the terminal
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the project configs
    #[arg(long, env = "WP_BACKUP_CONFIG_DIR", default_value = "configs", global = true)]
    config_dir: PathBuf,

    /// Directory for run logs and status records
    #[arg(long, env = "WP_BACKUP_LOG_DIR", default_value = "logs", global = true)]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump the database, archive the site and ship both offsite
    Backup {
        /// Project config, prompts for one from the config directory when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Restore the database and files from backup artifacts
    Restore {
        /// Project config, prompts for one from the config directory when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// An artifact or a directory of artifacts, prompts from fullPath when omitted
        #[arg(short = 'b', long)]
        source: Option<PathBuf>,

        /// Report what would be restored without touching anything
        #[arg(short, long)]
        dry_run: bool,

        /// Restore the site files only
        #[arg(short, long, conflicts_with = "db_only")]
        files_only: bool,

        /// Restore the database only
        #[arg(long)]
        db_only: bool,
    },
    /// Write a new project config interactively
    Setup,
    /// Print the last recorded status of an operation
    Status {
        /// backup, restore or setup
        #[arg(short, long, default_value = "backup")]
        operation: String,
    },
}

type Io<'a> = (StdinLock<'a>, Stdout);

fn resolve_config(
    config: Option<PathBuf>,
    args: &Args,
    io: &mut Io,
    operation: &str,
) -> Result<ProjectConfig> {
    let res = match config {
        Some(path) => Ok(path),
        None => select_config(&args.config_dir, &mut io.0, &mut io.1),
    }
    .and_then(ProjectConfig::load);
    res.or_else(|e| {
        // No project means no notification channels, the failure is still recorded.
        let reporter =
            StatusReporter::new(&args.log_dir, operation, "unknown", LogLevel::Info, vec![])?;
        reporter.check_status(Err(e), "Loading configuration")
    })
}

fn run(args: Args) -> Result<()> {
    let mut io: Io = (stdin().lock(), stdout());
    let runner = SystemToolRunner;
    match args.command {
        Command::Backup { ref config } => {
            let config = resolve_config(config.clone(), &args, &mut io, "backup")?;
            let reporter = StatusReporter::for_config(&config, &args.log_dir, "backup")?;
            BackupOrchestrator::new(&config, &runner, &reporter).run()?;
        }
        Command::Restore {
            ref config,
            ref source,
            dry_run,
            files_only,
            db_only,
        } => {
            let config = resolve_config(config.clone(), &args, &mut io, "restore")?;
            let reporter = StatusReporter::for_config(&config, &args.log_dir, "restore")?;
            let options = RestoreOptions::builder()
                .dry_run(dry_run)
                .files_only(files_only)
                .db_only(db_only)
                .maybe_source(source.clone())
                .build();
            let report = RestoreOrchestrator::new(&config, &runner, &reporter)
                .run(&options, &mut io.0, &mut io.1)?;
            if let Some(snapshot) = report.snapshot() {
                println!("Previous site kept at {:?}", snapshot);
            }
        }
        Command::Setup => {
            let reporter =
                StatusReporter::new(&args.log_dir, "setup", "setup", LogLevel::Info, vec![])?;
            run_setup(&args.config_dir, &mut io.0, &mut io.1, &reporter)?;
        }
        Command::Status { ref operation } => print_status(&args.log_dir, operation)?,
    }
    Ok(())
}

fn print_status(log_dir: &Path, operation: &str) -> Result<()> {
    let record = read_status(status_path(log_dir, operation))?;
    println!("{operation}: {} at {}", record.phase, record.timestamp);
    println!("{}", record.message);
    if record.phase == StatusPhase::Failure {
        exit(1);
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    if let Err(e) = run(args) {
        error!("{e}");
        exit(1);
    }
}
