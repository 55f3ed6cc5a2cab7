// clinic-backup/src/config/mod.rs
pub mod secret;

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::errors::ConfigError;
pub use secret::RedactedString;

pub const DB_USER_VAR: &str = "MYCLINIC_DB_USER";
pub const DB_PASS_VAR: &str = "MYCLINIC_DB_PASS";
pub const BACKUP_DIR_VAR: &str = "MYCLINIC_BACKUP_DIR";
pub const ENCRYPTED_BACKUP_DIR_VAR: &str = "MYCLINIC_BACKUP_ENCRYPTED_DIR";
pub const ENCRYPTION_KEY_VAR: &str = "MYCLINIC_BACKUP_ENCRYPTION_KEY";
pub const S3_REGION_VAR: &str = "MYCLINIC_BACKUP_S3_REGION";
pub const S3_BUCKET_VAR: &str = "MYCLINIC_BACKUP_S3_BUCKET";

/// Printed by `--env`.
pub const ENV_REFERENCE: &str = "
MYCLINIC_DB_USER -- database user
MYCLINIC_DB_PASS -- database password
MYCLINIC_BACKUP_DIR -- directory to store plain SQL backup file
MYCLINIC_BACKUP_ENCRYPTED_DIR -- directory to store encrypted SQL backup file
MYCLINIC_BACKUP_ENCRYPTION_KEY -- path to encryption key file
MYCLINIC_BACKUP_S3_REGION -- S3 region
MYCLINIC_BACKUP_S3_BUCKET -- S3 bucket
";

/// Where configuration values come from. The process environment in
/// production, a plain map in tests.
pub trait EnvSource {
    fn get(&self, name: &str) -> Option<OsString>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<OsString> {
        env::var_os(name)
    }
}

/// Reads a required variable as raw OS text. Unset and empty are treated
/// the same.
fn require_os(source: &impl EnvSource, name: &'static str) -> Result<OsString, ConfigError> {
    source
        .get(name)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

/// Reads a required variable that must be valid UTF-8.
pub fn require(source: &impl EnvSource, name: &'static str) -> Result<String, ConfigError> {
    require_os(source, name)?
        .into_string()
        .map_err(|_| ConfigError::NotUnicode(name))
}

/// What to do with the unencrypted dump once the encrypted copy exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaintextPolicy {
    #[default]
    Retain,
    Delete,
}

/// Options that come from the command line rather than the environment.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub plaintext_policy: PlaintextPolicy,
    pub dump_program: Option<String>,
    pub s3_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseCredentials {
    pub user: String,
    pub password: RedactedString,
}

/// Settings only a live run needs.
#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub credentials: DatabaseCredentials,
    pub key_file: PathBuf,
}

#[derive(Debug, Clone)]
pub enum ExecutionMode {
    DryRun,
    Live(LiveSettings),
}

impl ExecutionMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, ExecutionMode::DryRun)
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub region: String,
    pub bucket: String,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub backup_dir: String,
    pub encrypted_backup_dir: String,
    pub storage: StorageConfig,
    pub mode: ExecutionMode,
    pub plaintext_policy: PlaintextPolicy,
}

impl BackupConfig {
    /// Builds the configuration in one pass, before anything touches disk or
    /// network. Variables are checked in pipeline order so the first one
    /// reported missing is the first one a step would need.
    pub fn load(source: &impl EnvSource, options: &RunOptions) -> Result<Self, ConfigError> {
        let backup_dir = require(source, BACKUP_DIR_VAR)?;
        let credentials = if options.dry_run {
            None
        } else {
            Some(DatabaseCredentials {
                user: require(source, DB_USER_VAR)?,
                password: require(source, DB_PASS_VAR)?.into(),
            })
        };
        let encrypted_backup_dir = require(source, ENCRYPTED_BACKUP_DIR_VAR)?;
        let mode = match credentials {
            None => ExecutionMode::DryRun,
            Some(credentials) => ExecutionMode::Live(LiveSettings {
                credentials,
                key_file: PathBuf::from(require_os(source, ENCRYPTION_KEY_VAR)?),
            }),
        };
        let region = require(source, S3_REGION_VAR)?;
        let bucket = require(source, S3_BUCKET_VAR)?;

        Ok(BackupConfig {
            backup_dir,
            encrypted_backup_dir,
            storage: StorageConfig {
                region,
                bucket,
                endpoint_url: options.s3_endpoint.clone().filter(|s| !s.is_empty()),
            },
            mode,
            plaintext_policy: options.plaintext_policy,
        })
    }
}

#[cfg(test)]
impl EnvSource for std::collections::HashMap<String, String> {
    fn get(&self, name: &str) -> Option<OsString> {
        std::collections::HashMap::get(self, name).map(OsString::from)
    }
}

#[cfg(test)]
impl EnvSource for std::collections::HashMap<String, OsString> {
    fn get(&self, name: &str) -> Option<OsString> {
        std::collections::HashMap::get(self, name).cloned()
    }
}
