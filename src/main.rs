//! MyClinic database backup tool
//!
//! Dumps the clinic database, compresses and encrypts the dump, and uploads
//! the encrypted file to S3.

// clinic-backup/src/main.rs
mod backup;
mod config;
mod errors;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use config::{ENV_REFERENCE, PlaintextPolicy, RunOptions};
use errors::AppError;

#[derive(Parser, Debug)]
#[command(version, about = "Back up the MyClinic database to S3")]
struct Args {
    /// Print what would be done without dumping, encrypting or uploading
    #[arg(long)]
    dry_run: bool,

    /// List the environment variables the tool reads and exit
    #[arg(long)]
    env: bool,

    /// Delete the plain SQL dump once the encrypted copy is written
    #[arg(long)]
    delete_plain: bool,

    /// Dump program to run instead of mysqldump
    #[arg(long, value_name = "PROGRAM")]
    dump_program: Option<String>,

    /// Custom S3 endpoint, for S3-compatible storage
    #[arg(long, value_name = "URL")]
    s3_endpoint: Option<String>,
}

impl Args {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            plaintext_policy: if self.delete_plain {
                PlaintextPolicy::Delete
            } else {
                PlaintextPolicy::Retain
            },
            dump_program: self.dump_program.clone(),
            s3_endpoint: self.s3_endpoint.clone(),
        }
    }
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if args.env {
        print!("{}", ENV_REFERENCE);
        return ExitCode::SUCCESS;
    }

    init_tracing();
    match dotenv::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("⚠️ Ignoring unreadable .env file: {}", e),
    }

    match run_app(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(e.downcast_ref::<AppError>().map_or(1, AppError::exit_code))
        }
    }
}

async fn run_app(args: &Args) -> Result<()> {
    let now = Local::now().naive_local();
    let plan = backup::run_backup_flow(&args.run_options(), now)
        .await
        .context("Backup process failed")?;
    debug!("Backup finished: {}", plan.storage_key);
    Ok(())
}

/// Logs go to stderr so stdout carries only the progress lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
