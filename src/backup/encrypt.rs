// clinic-backup/src/backup/encrypt.rs
//! Compress-and-encrypt for the plain SQL dump.
//!
//! The dump is gzip compressed and the compressed stream is sealed with
//! [age](https://age-encryption.org). The key file holds either an age X25519
//! identity (`AGE-SECRET-KEY-1...`), in which case the dump is encrypted to
//! its public recipient, or anything else, which is used as an age passphrase.
//! `age -d -i <key> dump.cf | gunzip` recovers the dump.

use age::secrecy::SecretString;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fmt::{Debug, Formatter};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::config::RedactedString;
use crate::errors::{CipherError, EncryptError};

const AGE_IDENTITY_PREFIX: &str = "AGE-SECRET-KEY-";

enum KeyMaterial {
    Identity(age::x25519::Identity),
    Passphrase(RedactedString),
}

/// Key material loaded from the key file.
pub struct EncryptionKey {
    material: KeyMaterial,
}

impl Debug for EncryptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.material {
            KeyMaterial::Identity(_) => "x25519 identity",
            KeyMaterial::Passphrase(_) => "passphrase",
        };
        f.debug_struct("EncryptionKey")
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

impl EncryptionKey {
    pub fn load(path: &Path) -> Result<Self, EncryptError> {
        let key_load = |reason: String| EncryptError::KeyLoad {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| key_load(e.to_string()))?;
        let mut text = String::from_utf8(bytes).map_err(|e| {
            let mut bytes = e.into_bytes();
            bytes.zeroize();
            key_load("key file is not valid UTF-8".to_string())
        })?;
        let parsed = Self::parse(text.trim_end()).map_err(key_load);
        text.zeroize();
        parsed
    }

    fn parse(material: &str) -> Result<Self, String> {
        if material.is_empty() {
            return Err("key file is empty".to_string());
        }
        let material = if material.starts_with(AGE_IDENTITY_PREFIX) {
            let identity = material
                .parse::<age::x25519::Identity>()
                .map_err(|e| format!("invalid age identity: {}", e))?;
            KeyMaterial::Identity(identity)
        } else {
            KeyMaterial::Passphrase(RedactedString::new(material))
        };
        Ok(EncryptionKey { material })
    }

    fn encryptor(&self) -> Result<age::Encryptor, CipherError> {
        match &self.material {
            KeyMaterial::Identity(identity) => {
                let recipient = identity.to_public();
                debug!("Encrypting to age recipient {}", recipient);
                Ok(age::Encryptor::with_recipients(std::iter::once(
                    &recipient as &dyn age::Recipient,
                ))?)
            }
            KeyMaterial::Passphrase(passphrase) => {
                debug!("Encrypting with age passphrase");
                Ok(age::Encryptor::with_user_passphrase(SecretString::from(
                    passphrase.expose().to_owned(),
                )))
            }
        }
    }
}

/// Gzip, then age. Empty input is fine and yields a valid, non-empty file.
pub fn compress_and_encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let sealed = key
        .encryptor()?
        .wrap_output(Vec::with_capacity(plaintext.len() / 2 + 512))?;
    let mut compressor = GzEncoder::new(sealed, Compression::default());
    compressor.write_all(plaintext)?;
    let sealed = compressor.finish()?;
    Ok(sealed.finish()?)
}

/// Encrypts `source` into `destination`. The ciphertext is staged in a temp
/// file next to the destination (mode 0600) and renamed into place.
pub fn encrypt_backup_file(
    key_file: &Path,
    source: &Path,
    destination: &Path,
) -> Result<u64, EncryptError> {
    let key = EncryptionKey::load(key_file)?;
    debug!("Loaded {:?} from {}", key, key_file.display());

    let mut plaintext = fs::read(source).map_err(|e| EncryptError::SourceRead {
        path: source.to_path_buf(),
        source: e,
    })?;
    let ciphertext = compress_and_encrypt(&key, &plaintext);
    plaintext.zeroize();
    let ciphertext = ciphertext?;

    let destination_write = |e: std::io::Error| EncryptError::DestinationWrite {
        path: destination.to_path_buf(),
        source: e,
    };
    let dir = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(destination_write)?;

    let mut staged = NamedTempFile::new_in(dir).map_err(destination_write)?;
    staged.write_all(&ciphertext).map_err(destination_write)?;
    staged.as_file().sync_all().map_err(destination_write)?;
    staged
        .persist(destination)
        .map_err(|e| destination_write(e.error))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(destination, fs::Permissions::from_mode(0o600))
            .map_err(destination_write)?;
    }

    info!(
        "✓ Encrypted {} ({} bytes) to {}",
        source.display(),
        ciphertext.len(),
        destination.display()
    );
    Ok(ciphertext.len() as u64)
}

/// Deletes the plain dump once the encrypted copy exists.
pub fn remove_plaintext(path: &Path) -> Result<(), EncryptError> {
    fs::remove_file(path).map_err(|source| EncryptError::PlaintextRemoval {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Removed plain backup {}", path.display());
    Ok(())
}
