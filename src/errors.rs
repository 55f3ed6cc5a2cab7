use std::path::PathBuf;
use thiserror::Error;

/// Top level failure of a backup run. Every variant is fatal.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("mysql backup failed: {0}")]
    Dump(#[from] DumpError),

    #[error("encryption failed: {0}")]
    Encrypt(#[from] EncryptError),

    #[error("failed to upload to S3: {0}")]
    Upload(#[from] UploadError),

    #[error("failed to write progress output: {0}")]
    Output(#[source] std::io::Error),
}

impl AppError {
    /// Process exit status reported for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_)
            | AppError::Dump(_)
            | AppError::Encrypt(_)
            | AppError::Upload(_)
            | AppError::Output(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot get env var {0}")]
    MissingVar(&'static str),

    #[error("env var {0} is not valid UTF-8")]
    NotUnicode(&'static str),
}

#[derive(Error, Debug)]
pub enum DumpError {
    #[error("cannot create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} not found: {source}")]
    NotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("{program} failed with exit code: {code}")]
    Exit { program: String, code: i32 },

    #[error("{program} was terminated by a signal")]
    Terminated { program: String },

    #[error("{program} exited successfully but {} was not created", path.display())]
    MissingOutput { program: String, path: PathBuf },
}

#[derive(Error, Debug)]
pub enum EncryptError {
    #[error("cannot load encryption key from {}: {reason}", path.display())]
    KeyLoad { path: PathBuf, reason: String },

    #[error("cannot read plain backup {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compress and encrypt failed: {0}")]
    Cipher(#[from] CipherError),

    #[error("cannot write encrypted backup {}: {source}", path.display())]
    DestinationWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot remove plain backup {}: {source}", path.display())]
    PlaintextRemoval {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure inside the compress-and-encrypt primitive.
#[derive(Error, Debug)]
pub enum CipherError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Recipient(#[from] age::EncryptError),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("local file {} is missing: {source}", path.display())]
    LocalFileMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("access to bucket {bucket} denied: {message}")]
    Auth { bucket: String, message: String },

    #[error("upload of {key} to bucket {bucket} failed: {message}")]
    Transport {
        bucket: String,
        key: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;
