//! Filesystem cache: one file per key.
//!
//! Each entry lives in `<root>/<key>.cache` as a JSON record holding the key,
//! the base64 value, the write time and the absolute expiry (nanoseconds since
//! the Unix epoch). Expiry is checked on read; the read that finds an expired
//! entry deletes its file.
//!
//! Records are written to a uniquely named sibling file and renamed into place,
//! so concurrent readers see either the previous record or the new one.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{CacheError, Cacher};

type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    key: String,
    value: String,
    start: u64,
    expires: Option<u64>,
}

/// Cache storing each entry in its own file under a root directory.
#[derive(Clone)]
pub struct FileCache {
    root: PathBuf,
    clock: Clock,
}

impl fmt::Debug for FileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCache")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl FileCache {
    /// Create a cache rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            clock: Arc::new(SystemTime::now),
        }
    }

    /// Replace the clock used to stamp and expire entries.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> SystemTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf, CacheError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(CacheError::Backend(format!("invalid cache key '{key}'")));
        }
        Ok(self.root.join(format!("{key}.cache")))
    }

    fn now_nanos(&self) -> u64 {
        unix_nanos((self.clock)())
    }

    async fn read(&self, key: &str) -> Result<Bytes, CacheError> {
        let path = self.path(key)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(CacheError::NotFound),
            Err(err) => return Err(err.into()),
        };
        let record: FileRecord = serde_json::from_slice(&raw)?;

        if record.expires.is_some_and(|expires| self.now_nanos() >= expires) {
            debug!(path = %path.display(), "removing expired cache file");
            match tokio::fs::remove_file(&path).await {
                Err(err) if err.kind() != ErrorKind::NotFound => return Err(err.into()),
                _ => return Err(CacheError::NotFound),
            }
        }

        STANDARD
            .decode(record.value)
            .map(Bytes::from)
            .map_err(|err| CacheError::Backend(format!("invalid cache file content: {err}")))
    }

    async fn write(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let path = self.path(key)?;
        let start = self.now_nanos();
        let ttl_nanos = u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX);
        let record = FileRecord {
            key: key.to_string(),
            value: STANDARD.encode(value),
            start,
            expires: (!ttl.is_zero()).then(|| start.saturating_add(ttl_nanos)),
        };

        tokio::fs::create_dir_all(&self.root).await?;
        // Readers only ever see a complete record: write aside, then rename.
        let staging = self.root.join(format!("{key}.cache.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&staging, serde_json::to_vec(&record)?).await?;
        if let Err(err) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err.into());
        }
        Ok(())
    }
}

impl Cacher for FileCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Bytes, CacheError>> {
        Box::pin(self.read(key))
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move { self.write(key, &value, ttl).await })
    }
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert2::{check, let_assert};

    use super::*;

    /// Clock that only moves when told to.
    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<SystemTime>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(
                UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            )))
        }

        fn advance(&self, by: Duration) {
            *self.0.lock().expect("lock") += by;
        }

        fn now(&self) -> SystemTime {
            *self.0.lock().expect("lock")
        }
    }

    fn cache_with_clock(root: &Path) -> (FileCache, ManualClock) {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let cache = FileCache::new(root).with_clock(move || handle.now());
        (cache, clock)
    }

    #[tokio::test]
    async fn absent_key_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path());

        let_assert!(Err(err) = cache.get("missing").await);
        check!(err.is_not_found());
    }

    #[tokio::test]
    async fn set_then_get_returns_identical_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path().join("nested"));

        cache
            .set("abc-_=", Bytes::from_static(b"\x00payload\xff"), Duration::from_secs(60))
            .await
            .expect("set");

        check!(dir.path().join("nested").join("abc-_=.cache").exists());
        let_assert!(Ok(value) = cache.get("abc-_=").await);
        check!(&value[..] == b"\x00payload\xff");
    }

    #[tokio::test]
    async fn file_records_start_and_expiry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (cache, clock) = cache_with_clock(dir.path());

        cache
            .set("key", Bytes::from_static(b"v"), Duration::from_secs(5))
            .await
            .expect("set");

        let raw = std::fs::read(dir.path().join("key.cache")).expect("read");
        let record: FileRecord = serde_json::from_slice(&raw).expect("record");
        let start = unix_nanos(clock.now());
        check!(record.key == "key");
        check!(record.start == start);
        check!(record.expires == Some(start + 5_000_000_000));
    }

    #[tokio::test]
    async fn expired_entry_is_deleted_on_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (cache, clock) = cache_with_clock(dir.path());

        cache
            .set("key", Bytes::from_static(b"v"), Duration::from_secs(5))
            .await
            .expect("set");
        clock.advance(Duration::from_secs(4));
        check!(cache.get("key").await.is_ok());

        clock.advance(Duration::from_secs(1));
        let_assert!(Err(err) = cache.get("key").await);
        check!(err.is_not_found());
        check!(!dir.path().join("key.cache").exists());

        let_assert!(Err(err) = cache.get("key").await);
        check!(err.is_not_found());
    }

    #[tokio::test]
    async fn zero_ttl_never_expires() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (cache, clock) = cache_with_clock(dir.path());

        cache
            .set("key", Bytes::from_static(b"v"), Duration::ZERO)
            .await
            .expect("set");
        clock.advance(Duration::from_secs(365 * 24 * 3600));

        check!(cache.get("key").await.is_ok());
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path());

        let_assert!(Err(err) = cache.set("../evil", Bytes::new(), Duration::ZERO).await);
        check!(!err.is_not_found());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("key.cache"), b"garbage").expect("write");
        let cache = FileCache::new(dir.path());

        let_assert!(Err(CacheError::Codec(_)) = cache.get("key").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_never_expose_a_partial_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Arc::new(FileCache::new(dir.path()));
        let size = 512 * 1024;
        cache
            .set("shared", Bytes::from(vec![0_u8; size]), Duration::from_secs(60))
            .await
            .expect("set");

        let mut tasks = Vec::new();
        for round in 1..=25_u8 {
            let writer = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                writer
                    .set("shared", Bytes::from(vec![round; size]), Duration::from_secs(60))
                    .await
                    .map(|()| None)
            }));
            let reader = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move { reader.get("shared").await.map(Some) }));
        }

        for task in tasks {
            let_assert!(Ok(outcome) = task.await.expect("join"));
            if let Some(value) = outcome {
                check!(value.len() == size);
                let first = value[0];
                check!(value.iter().all(|byte| *byte == first));
            }
        }

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        check!(leftovers.is_empty());
    }
}
