use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cosmos_safe_apply::approval::TerminalApproval;
use cosmos_safe_apply::config::Config;
use cosmos_safe_apply::logging;
use cosmos_safe_apply::{FixResult, FixSuggestion, Orchestrator, ProjectRoot};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "cosmos-safe-apply",
    about = "Apply automated fixes with backups, rollback, and verification",
    version
)]
struct Cli {
    /// Project root that relative paths resolve against
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply a fix suggestion read from a JSON file
    Apply(ApplyArgs),
    /// Restore the files saved in a backup
    Rollback(RollbackArgs),
    /// List backups, newest first
    List(ListArgs),
    /// Delete backups older than the retention window
    Cleanup(CleanupArgs),
    /// Run verification for a suggestion's files without applying it
    Verify(VerifyArgs),
    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Suggestion JSON file
    file: PathBuf,
    /// Skip the approval prompt
    #[arg(short, long)]
    yes: bool,
}

#[derive(Args, Debug)]
struct RollbackArgs {
    backup_id: String,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct CleanupArgs {
    /// Defaults to `backup_retention_days` from the config
    #[arg(long)]
    keep_days: Option<u64>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    file: PathBuf,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Write the effective configuration (env overrides included) to the
    /// config file
    #[arg(long)]
    save: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("  Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let project = ProjectRoot::open(&cli.root)
        .with_context(|| format!("Project root not found: {}", cli.root.display()))?;
    let config = Config::load();
    tracing::debug!(path = %Config::config_location(), "config loaded");
    let orchestrator = Orchestrator::new(project, &config).with_gate(TerminalApproval);

    match cli.command {
        Commands::Apply(args) => {
            let suggestion = load_suggestion(&args.file)?;
            let orchestrator = Arc::new(orchestrator);
            let result = orchestrator
                .apply_fix_blocking_task(suggestion, args.yes)
                .await;
            print_fix_result(&result);
            Ok(result.success)
        }
        Commands::Rollback(args) => {
            let result = orchestrator.rollback_by_id(&args.backup_id);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if let Some(error) = &result.error {
                eprintln!("  {}", error);
            } else {
                println!(
                    "  Restored {} file(s) from {}",
                    result.restored_files.len(),
                    result.backup_id
                );
                for failed in &result.failed_files {
                    println!("  ✗ {}: {}", failed.path.display(), failed.error);
                }
            }
            Ok(result.success)
        }
        Commands::List(args) => {
            let backups = orchestrator.list_backups()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
            } else if backups.is_empty() {
                println!("  No backups in {}", orchestrator.store().store_dir().display());
            } else {
                for info in &backups {
                    println!(
                        "  {}  {}  {:>3} file(s)  {:>10} bytes",
                        info.backup_id,
                        info.created_at.format("%Y-%m-%d %H:%M:%S"),
                        info.file_count,
                        info.total_size
                    );
                }
            }
            Ok(true)
        }
        Commands::Cleanup(args) => {
            let keep_days = args.keep_days.unwrap_or(config.backup_retention_days);
            let summary = orchestrator.cleanup_old_backups(keep_days)?;
            println!(
                "  Removed {} backup(s) older than {} day(s); kept {}",
                summary.removed.len(),
                keep_days,
                summary.kept
            );
            for (backup_id, error) in &summary.errors {
                eprintln!("  ✗ {}: {}", backup_id, error);
            }
            Ok(summary.errors.is_empty())
        }
        Commands::Verify(args) => {
            let suggestion = load_suggestion(&args.file)?;
            let report = orchestrator.verify(&suggestion);
            for check in &report.checks_passed {
                println!("  ✓ {}", check);
            }
            for check in &report.checks_failed {
                println!("  ✗ {}", check);
            }
            for warning in &report.warnings {
                println!("  ! {}", warning);
            }
            for skipped in &report.skipped {
                println!("  - {}", skipped);
            }
            Ok(report.success)
        }
        Commands::Config(args) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if args.save {
                let path = config.save().map_err(anyhow::Error::msg)?;
                println!("  ✓ Config saved to {}", path.display());
            } else {
                println!("  Config location: {}", Config::config_location());
            }
            Ok(true)
        }
    }
}

fn load_suggestion(path: &Path) -> Result<FixSuggestion> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read suggestion {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse suggestion {}", path.display()))
}

fn print_fix_result(result: &FixResult) {
    println!("  {}", result.state.status_text());
    if let Some(set) = &result.backup_set {
        println!("  Backup: {}", set.backup_id);
    }
    println!("  Steps applied: {}", result.applied_steps);
    if let Some(error) = &result.error_message {
        println!("  Error: {}", error);
    }
    if let Some(report) = &result.verification_report {
        for check in &report.checks_failed {
            println!("  ✗ {}", check);
        }
        for warning in &report.warnings {
            println!("  ! {}", warning);
        }
    }
    if result.rollback_available && result.success {
        if let Some(set) = &result.backup_set {
            println!("  Undo with: cosmos-safe-apply rollback {}", set.backup_id);
        }
    }
}
