pub(crate) mod db_dump;
pub(crate) mod encrypt;
mod logic;
pub(crate) mod paths;
#[cfg(test)]
mod s3_stub;
pub(crate) mod s3_upload;

use chrono::NaiveDateTime;

use crate::config::{ProcessEnv, RunOptions};
use crate::errors::Result;
use db_dump::DumpTool;
use logic::SystemSteps;
use paths::BackupPlan;

/// Public entry point for the backup process. Configuration comes from the
/// process environment and progress lines go to stdout.
pub async fn run_backup_flow(options: &RunOptions, now: NaiveDateTime) -> Result<BackupPlan> {
    let dump_tool = options
        .dump_program
        .as_deref()
        .map(DumpTool::new)
        .unwrap_or_default();
    let steps = SystemSteps::new(dump_tool);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    logic::run_backup(&ProcessEnv, options, now, &steps, &mut out).await
}
