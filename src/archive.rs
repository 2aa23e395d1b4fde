//! File archive for raw payloads of failed fetches.
//!
//! When a fetch finishes with a non-empty diagnostic and a body was
//! downloaded, the raw bytes are kept on disk for post-mortem under a
//! deterministic, filesystem-safe name derived from the feed URL and the
//! fetch start time. Existing archives are never overwritten.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Characters allowed in an archive filename, besides ASCII alphanumerics.
const SAFE_PUNCTUATION: &str = ":;+-_.() ";

#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic archive name for one fetch attempt.
    ///
    /// Lowercased feed URL and start time joined with `__`, `/` mapped to
    /// `_`, everything outside the safe set dropped. Determinism matters:
    /// re-running diagnostics for the same attempt must address the same
    /// file.
    pub fn archive_name(url: &str, timestamp_start: DateTime<Utc>) -> String {
        let joined = format!(
            "{}__{}",
            url.to_lowercase(),
            timestamp_start.format("%Y-%m-%d %H:%M:%S%.3f")
        );
        make_safe(&joined)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.root.join(name).exists()
    }

    /// Write the payload under `name`, creating the archive directory if
    /// needed. Returns the stored path.
    pub fn save(&self, name: &str, data: &[u8]) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(name);
        std::fs::write(&path, data)?;
        Ok(path)
    }

    /// Attempt to archive a payload and describe what happened.
    ///
    /// The returned message is appended to the fetch diagnostic, so it
    /// covers all three cases: already archived, saved, and save failure.
    pub fn outcome(&self, name: &str, data: &[u8]) -> String {
        if self.exists(name) {
            return format!("Storage attempt: file already exists: <{}>.", name);
        }
        match self.save(name, data) {
            Ok(path) => format!("Storage attempt: file saved: <{}>.", path.display()),
            Err(e) => format!(
                "Storage attempt: cannot save the file <{}> in <{}>.\n{}",
                name,
                self.root.display(),
                e
            ),
        }
    }
}

/// Restrict a string to characters every filesystem accepts.
fn make_safe(s: &str) -> String {
    let replaced = s.replace('/', "_");
    let filtered: String = replaced
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || SAFE_PUNCTUATION.contains(*c))
        .collect();

    // Windows cannot handle a colon in a filename.
    if cfg!(windows) {
        filtered.replace(':', ";")
    } else {
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_archive_name_is_deterministic_and_safe() {
        let first = ArchiveStore::archive_name("http://Example.com/Feed?id=1&x=2", start());
        let second = ArchiveStore::archive_name("http://Example.com/Feed?id=1&x=2", start());

        assert_eq!(first, second);
        assert!(!first.contains('/'));
        assert!(!first.contains('&'));
        assert!(!first.contains('?'));
        assert!(first.starts_with("http_"));
        assert!(first.contains("__2024-05-01"));
    }

    #[test]
    fn test_distinct_attempts_get_distinct_names() {
        let a = ArchiveStore::archive_name("http://example.com/feed", start());
        let b = ArchiveStore::archive_name(
            "http://example.com/feed",
            start() + chrono::Duration::milliseconds(1),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_save_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path().join("files"));

        assert!(!store.exists("payload"));
        let path = store.save("payload", b"<rss/>").unwrap();
        assert!(store.exists("payload"));
        assert_eq!(std::fs::read(path).unwrap(), b"<rss/>");
    }

    #[test]
    fn test_outcome_reports_saved_then_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path().join("files"));

        let first = store.outcome("payload", b"<rss/>");
        assert!(first.contains("file saved"), "got: {first}");

        let second = store.outcome("payload", b"<rss/>");
        assert!(second.contains("already exists"), "got: {second}");
    }

    #[test]
    fn test_outcome_reports_save_failure() {
        // Root is a file, so the directory cannot be created under it.
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"x").unwrap();

        let store = ArchiveStore::new(blocker.join("files"));
        let msg = store.outcome("payload", b"<rss/>");
        assert!(msg.contains("cannot save"), "got: {msg}");
    }
}
