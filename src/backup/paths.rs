// clinic-backup/src/backup/paths.rs
use chrono::NaiveDateTime;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

const DIR_FORMAT: &str = "%Y-%m";
const FILE_STAMP_FORMAT: &str = "%Y%m%d%H%M";

/// Last `.ext` of a path, `ext` being ASCII word characters.
static TRAILING_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.+)(\.((?-u:\w)+))$").expect("trailing extension pattern is valid")
});

/// `<base_dir>/<YYYY-MM>/dump-<YYYYMMDDHHMM>.sql`, lexically cleaned.
pub fn backup_path(base_dir: &str, timestamp: &NaiveDateTime) -> String {
    let raw = format!(
        "{}/{}/dump-{}.sql",
        base_dir,
        timestamp.format(DIR_FORMAT),
        timestamp.format(FILE_STAMP_FORMAT)
    );
    clean(&raw)
}

/// Folds the final extension into the file name and appends `.cf`:
/// `dump-202401011200.sql` becomes `dump-202401011200-sql.cf`.
/// A path without a trailing extension comes back unchanged.
pub fn encrypted_path(backup_path: &str) -> String {
    TRAILING_EXTENSION
        .replace(backup_path, "${1}-${3}.cf")
        .into_owned()
}

/// `<parent dir name>/<file name>`.
pub fn storage_key(encrypted_path: &str) -> String {
    let (dir, file_name) = split(encrypted_path);
    let parent = clean(&format!("{}.", dir));
    let (_, parent_name) = split(&parent);
    format!("{}/{}", parent_name, file_name)
}

/// Splits after the last separator; the directory part keeps its trailing `/`.
fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Purely lexical normalisation: collapses repeated separators, drops `.`
/// segments and resolves `..` against the preceding segment.
fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// The three names one run produces, all derived from the same timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPlan {
    pub plain_path: PathBuf,
    pub encrypted_path: PathBuf,
    pub storage_key: String,
}

impl BackupPlan {
    pub fn derive(backup_dir: &str, encrypted_backup_dir: &str, timestamp: &NaiveDateTime) -> Self {
        let plain_path = backup_path(backup_dir, timestamp);
        let encrypted = encrypted_path(&backup_path(encrypted_backup_dir, timestamp));
        let storage_key = storage_key(&encrypted);

        BackupPlan {
            plain_path: PathBuf::from(plain_path),
            encrypted_path: PathBuf::from(encrypted),
            storage_key,
        }
    }
}
