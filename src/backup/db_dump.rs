// clinic-backup/src/backup/db_dump.rs
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};
use which::which;

use crate::config::DatabaseCredentials;
use crate::errors::DumpError;

pub const DEFAULT_DUMP_PROGRAM: &str = "mysqldump";
const DATABASE_NAME: &str = "myclinic";
const CHARACTER_SET: &str = "utf8";

/// Runs the external dump tool. The tool writes the dump itself through
/// `--result-file`; its stdout and stderr go straight to ours.
#[derive(Debug, Clone)]
pub struct DumpTool {
    program: String,
}

impl Default for DumpTool {
    fn default() -> Self {
        Self::new(DEFAULT_DUMP_PROGRAM)
    }
}

impl DumpTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn find_executable(&self) -> Result<PathBuf, DumpError> {
        which(&self.program).map_err(|source| DumpError::NotFound {
            program: self.program.clone(),
            source,
        })
    }

    pub fn dump(
        &self,
        credentials: &DatabaseCredentials,
        destination: &Path,
    ) -> Result<(), DumpError> {
        if let Some(dir) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| DumpError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let executable = self.find_executable()?;
        debug!("Found {} at {}", self.program, executable.display());
        info!(
            "Dumping database {} as {} to {}",
            DATABASE_NAME,
            credentials.user,
            destination.display()
        );

        let mut result_file = OsString::from("--result-file=");
        result_file.push(destination);

        let status = Command::new(&executable)
            .arg("-u")
            .arg(&credentials.user)
            .arg(format!("-p{}", credentials.password.expose()))
            .arg(format!("--default-character-set={}", CHARACTER_SET))
            .arg(DATABASE_NAME)
            .arg(result_file)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| DumpError::Launch {
                program: self.program.clone(),
                source,
            })?;

        match status.code() {
            Some(0) => {}
            Some(code) => {
                return Err(DumpError::Exit {
                    program: self.program.clone(),
                    code,
                });
            }
            None => {
                return Err(DumpError::Terminated {
                    program: self.program.clone(),
                });
            }
        }

        if !destination.exists() {
            return Err(DumpError::MissingOutput {
                program: self.program.clone(),
                path: destination.to_path_buf(),
            });
        }

        info!("✓ Database dumped to {}", destination.display());
        Ok(())
    }
}
