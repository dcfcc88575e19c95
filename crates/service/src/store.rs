//! Content-addressed log storage.
//!
//! Layout under `cache_dir`:
//!   `<digest>.log`              raw klippy.log
//!   `<digest>_<kind>.log`       companion files
//!   `<digest>.events.jsonl`     event stream of the last successful pass
//!   `<digest>.summary.json`     report of the last successful pass
//!
//! Derived files are written to a `.tmp` sibling and renamed into place, so a
//! reader never observes a partial output.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::companion::CompanionKind;
use crate::conf::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};

const LOG_EXT: &str = "log";
const EVENTS_SUFFIX: &str = ".events.jsonl";
const SUMMARY_SUFFIX: &str = ".summary.json";

#[derive(Debug, Clone)]
pub struct LogStore {
    root: PathBuf,
    min_bytes: u64,
    max_bytes: u64,
    retention_days: u32,
}

/// One stored log as shown by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLog {
    pub digest: String,
    pub size: u64,
    pub uploaded: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub companions: Vec<CompanionKind>,
    pub analyzed: bool,
}

pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl LogStore {
    pub fn open(config: &ServiceConfig) -> ServiceResult<Self> {
        let root = PathBuf::from(&config.cache_dir);
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "store: opened");
        Ok(Self {
            root,
            min_bytes: config.min_input_bytes,
            max_bytes: config.max_input_bytes,
            retention_days: config.retention_days,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}.{LOG_EXT}"))
    }

    pub fn companion_path(&self, digest: &str, kind: CompanionKind) -> PathBuf {
        self.root.join(format!("{digest}_{}.{LOG_EXT}", kind.suffix()))
    }

    pub fn events_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}{EVENTS_SUFFIX}"))
    }

    pub fn summary_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}{SUMMARY_SUFFIX}"))
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.log_path(digest).is_file()
    }

    /// Store a raw log and return its digest. Storing the same bytes twice is
    /// a no-op.
    pub fn put_log(&self, bytes: &[u8]) -> ServiceResult<String> {
        let size = bytes.len() as u64;
        if size < self.min_bytes {
            return Err(ServiceError::InputTooSmall {
                size,
                min: self.min_bytes,
            });
        }
        if size > self.max_bytes {
            return Err(ServiceError::InputTooLarge {
                size,
                max: self.max_bytes,
            });
        }

        let digest = digest(bytes);
        let path = self.log_path(&digest);
        if path.is_file() {
            debug!(%digest, "store: log already present");
        } else {
            write_atomic(&path, bytes)?;
            info!(%digest, size, "store: log stored");
        }
        Ok(digest)
    }

    /// Attach (or replace) a companion file. Derived output of the log is
    /// dropped since it embeds companion content.
    pub fn attach_companion(&self, digest: &str, kind: CompanionKind, bytes: &[u8]) -> ServiceResult<()> {
        if !self.contains(digest) {
            return Err(ServiceError::NotFound(digest.to_string()));
        }
        write_atomic(&self.companion_path(digest, kind), bytes)?;
        self.invalidate(digest)?;
        info!(%digest, companion = kind.suffix(), size = bytes.len(), "store: companion attached");
        Ok(())
    }

    /// Companion text, lossily decoded; `None` when not uploaded.
    pub fn read_companion(&self, digest: &str, kind: CompanionKind) -> ServiceResult<Option<String>> {
        match fs::read(self.companion_path(digest, kind)) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn open_log(&self, digest: &str) -> ServiceResult<fs::File> {
        fs::File::open(self.log_path(digest)).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ServiceError::NotFound(digest.to_string()),
            _ => err.into(),
        })
    }

    /// Previously derived report, if any.
    pub fn cached_summary<T: serde::de::DeserializeOwned>(&self, digest: &str) -> ServiceResult<Option<T>> {
        match fs::read(self.summary_path(digest)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn write_summary<T: Serialize>(&self, digest: &str, report: &T) -> ServiceResult<()> {
        let bytes = serde_json::to_vec_pretty(report)?;
        write_atomic(&self.summary_path(digest), &bytes)?;
        Ok(())
    }

    /// Temp file the event stream is written to before it is committed.
    pub fn events_staging(&self, digest: &str) -> PathBuf {
        tmp_path(&self.events_path(digest))
    }

    pub fn commit_events(&self, digest: &str) -> ServiceResult<()> {
        fs::rename(self.events_staging(digest), self.events_path(digest))?;
        Ok(())
    }

    pub fn discard_events(&self, digest: &str) {
        let _ = fs::remove_file(self.events_staging(digest));
    }

    /// Drop derived output so the next request re-analyzes.
    pub fn invalidate(&self, digest: &str) -> ServiceResult<()> {
        for path in [self.summary_path(digest), self.events_path(digest)] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "store: derived output dropped"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    pub fn expiry(&self, uploaded: DateTime<Utc>) -> DateTime<Utc> {
        uploaded + Duration::days(i64::from(self.retention_days))
    }

    pub fn describe(&self, digest: &str) -> ServiceResult<StoredLog> {
        let meta = fs::metadata(self.log_path(digest)).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ServiceError::NotFound(digest.to_string()),
            _ => err.into(),
        })?;
        let uploaded: DateTime<Utc> = meta.modified()?.into();
        let companions = CompanionKind::ALL
            .into_iter()
            .filter(|kind| self.companion_path(digest, *kind).is_file())
            .collect();

        Ok(StoredLog {
            digest: digest.to_string(),
            size: meta.len(),
            uploaded,
            expires: self.expiry(uploaded),
            companions,
            analyzed: self.summary_path(digest).is_file(),
        })
    }

    /// Stored raw logs, newest first.
    pub fn list(&self) -> ServiceResult<Vec<StoredLog>> {
        let mut logs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.contains('_') {
                continue;
            }
            logs.push(self.describe(stem)?);
        }
        logs.sort_by(|a, b| b.uploaded.cmp(&a.uploaded).then_with(|| a.digest.cmp(&b.digest)));
        Ok(logs)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LogStore {
        let config = ServiceConfig {
            cache_dir: dir.path().display().to_string(),
            min_input_bytes: 4,
            max_input_bytes: 64,
            ..Default::default()
        };
        LogStore::open(&config).unwrap()
    }

    #[test]
    fn test_digest_is_sha256_hex() {
        assert_eq!(
            digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_put_log_bounds() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(store.put_log(b"ab"), Err(ServiceError::InputTooSmall { size: 2, min: 4 })));
        assert!(matches!(store.put_log(&[b'x'; 65]), Err(ServiceError::InputTooLarge { .. })));

        let d = store.put_log(b"Starting Klippy...\n").unwrap();
        assert!(store.contains(&d));
        assert_eq!(store.put_log(b"Starting Klippy...\n").unwrap(), d);
    }

    #[test]
    fn test_companion_requires_log_and_invalidates() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.attach_companion("missing", CompanionKind::Dmesg, b"x"),
            Err(ServiceError::NotFound(_))
        ));

        let d = store.put_log(b"Starting Klippy...\n").unwrap();
        store.write_summary(&d, &serde_json::json!({"ok": true})).unwrap();
        assert!(store.describe(&d).unwrap().analyzed);

        store.attach_companion(&d, CompanionKind::Moonraker, b"count").unwrap();
        let described = store.describe(&d).unwrap();
        assert!(!described.analyzed);
        assert_eq!(described.companions, vec![CompanionKind::Moonraker]);
        assert_eq!(store.read_companion(&d, CompanionKind::Moonraker).unwrap().as_deref(), Some("count"));
        assert_eq!(store.read_companion(&d, CompanionKind::Debug).unwrap(), None);
    }

    #[test]
    fn test_list_skips_companions_and_derived() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let a = store.put_log(b"first log\n").unwrap();
        let b = store.put_log(b"second log\n").unwrap();
        store.attach_companion(&a, CompanionKind::Debug, b"dbg").unwrap();
        store.write_summary(&b, &serde_json::json!({})).unwrap();

        let listed = store.list().unwrap();
        let mut digests: Vec<&str> = listed.iter().map(|l| l.digest.as_str()).collect();
        digests.sort();
        let mut expected = vec![a.as_str(), b.as_str()];
        expected.sort();
        assert_eq!(digests, expected);
        assert!(listed.windows(2).all(|w| w[0].uploaded >= w[1].uploaded));
    }

    #[test]
    fn test_expiry_adds_retention() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let d = store.put_log(b"some log\n").unwrap();
        let described = store.describe(&d).unwrap();
        assert_eq!(described.expires - described.uploaded, Duration::days(7));
    }

    #[test]
    fn test_events_staging_commit() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let d = store.put_log(b"some log\n").unwrap();
        fs::write(store.events_staging(&d), b"{}\n").unwrap();
        store.commit_events(&d).unwrap();
        assert!(store.events_path(&d).is_file());
        assert!(!store.events_staging(&d).exists());
    }
}
