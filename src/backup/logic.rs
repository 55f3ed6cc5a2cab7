// clinic-backup/src/backup/logic.rs
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::backup::db_dump::DumpTool;
use crate::backup::encrypt;
use crate::backup::paths::BackupPlan;
use crate::backup::s3_upload::S3Uploader;
use crate::config::{
    BackupConfig, DatabaseCredentials, EnvSource, ExecutionMode, PlaintextPolicy, RunOptions,
    StorageConfig,
};
use crate::errors::{AppError, DumpError, EncryptError, Result, UploadError};

/// The side-effecting steps of a backup run.
#[async_trait]
pub trait BackupSteps: Send + Sync {
    async fn dump(
        &self,
        credentials: &DatabaseCredentials,
        destination: &Path,
    ) -> std::result::Result<(), DumpError>;

    async fn encrypt(
        &self,
        key_file: &Path,
        source: &Path,
        destination: &Path,
    ) -> std::result::Result<(), EncryptError>;

    async fn remove_plaintext(&self, path: &Path) -> std::result::Result<(), EncryptError>;

    async fn upload(
        &self,
        storage: &StorageConfig,
        s3_key: &str,
        file_path: &Path,
    ) -> std::result::Result<(), UploadError>;
}

/// mysqldump, age and S3.
#[derive(Debug, Clone, Default)]
pub struct SystemSteps {
    dump_tool: DumpTool,
}

impl SystemSteps {
    pub fn new(dump_tool: DumpTool) -> Self {
        Self { dump_tool }
    }
}

/// Runs synchronous work (process spawning, file IO, encryption) on the
/// blocking pool. A panic in the closure is re-raised here.
async fn run_blocking<T, F>(work: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(value) => value,
        // Blocking tasks are never aborted, so a join failure is a panic.
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

#[async_trait]
impl BackupSteps for SystemSteps {
    async fn dump(
        &self,
        credentials: &DatabaseCredentials,
        destination: &Path,
    ) -> std::result::Result<(), DumpError> {
        let tool = self.dump_tool.clone();
        let credentials = credentials.clone();
        let destination = destination.to_path_buf();
        run_blocking(move || tool.dump(&credentials, &destination)).await
    }

    async fn encrypt(
        &self,
        key_file: &Path,
        source: &Path,
        destination: &Path,
    ) -> std::result::Result<(), EncryptError> {
        let key_file = key_file.to_path_buf();
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        run_blocking(move || encrypt::encrypt_backup_file(&key_file, &source, &destination))
            .await
            .map(|_| ())
    }

    async fn remove_plaintext(&self, path: &Path) -> std::result::Result<(), EncryptError> {
        let path = path.to_path_buf();
        run_blocking(move || encrypt::remove_plaintext(&path)).await
    }

    async fn upload(
        &self,
        storage: &StorageConfig,
        s3_key: &str,
        file_path: &Path,
    ) -> std::result::Result<(), UploadError> {
        S3Uploader::connect(storage)
            .await
            .upload_file(s3_key, file_path)
            .await
    }
}

fn progress(out: &mut impl Write, line: std::fmt::Arguments<'_>) -> Result<()> {
    writeln!(out, "{}", line).map_err(AppError::Output)
}

/// Dump, encrypt, upload. In a dry run the steps are skipped but the same
/// progress lines are printed. The first failure ends the run; whatever was
/// already written stays on disk.
pub async fn perform_backup_orchestration<S, W>(
    config: &BackupConfig,
    plan: &BackupPlan,
    steps: &S,
    out: &mut W,
) -> Result<()>
where
    S: BackupSteps + ?Sized,
    W: Write,
{
    let live = match &config.mode {
        ExecutionMode::Live(settings) => Some(settings),
        ExecutionMode::DryRun => {
            info!("Dry run: dump, encryption and upload are skipped");
            None
        }
    };

    if let Some(settings) = live {
        steps.dump(&settings.credentials, &plan.plain_path).await?;
    }
    progress(
        out,
        format_args!("database backed up to {}", plan.plain_path.display()),
    )?;

    if let Some(settings) = live {
        steps
            .encrypt(&settings.key_file, &plan.plain_path, &plan.encrypted_path)
            .await?;
    }
    progress(
        out,
        format_args!("encrypted file: {}", plan.encrypted_path.display()),
    )?;

    if config.plaintext_policy == PlaintextPolicy::Delete {
        if live.is_some() {
            steps.remove_plaintext(&plan.plain_path).await?;
        }
        progress(
            out,
            format_args!("plain backup removed: {}", plan.plain_path.display()),
        )?;
    }

    progress(out, format_args!("region: {}", config.storage.region))?;
    progress(out, format_args!("S3 key: {}", plan.storage_key))?;

    if live.is_some() {
        steps
            .upload(&config.storage, &plan.storage_key, &plan.encrypted_path)
            .await?;
    }
    progress(
        out,
        format_args!(
            "uploaded to s3://{}/{}",
            config.storage.bucket, plan.storage_key
        ),
    )?;

    Ok(())
}

/// Reads the configuration, derives this run's paths from `now` and runs the
/// pipeline.
pub async fn run_backup<E, S, W>(
    source: &E,
    options: &RunOptions,
    now: NaiveDateTime,
    steps: &S,
    out: &mut W,
) -> Result<BackupPlan>
where
    E: EnvSource,
    S: BackupSteps + ?Sized,
    W: Write,
{
    let config = BackupConfig::load(source, options)?;
    let plan = BackupPlan::derive(&config.backup_dir, &config.encrypted_backup_dir, &now);
    info!(
        "{} backup plan: {} -> {} -> s3://{}/{}",
        if config.mode.is_dry_run() { "Dry-run" } else { "Live" },
        plan.plain_path.display(),
        plan.encrypted_path.display(),
        config.storage.bucket,
        plan.storage_key
    );

    perform_backup_orchestration(&config, &plan, steps, out).await?;
    Ok(plan)
}
