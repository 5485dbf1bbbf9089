//! Log-structured file store for persistent data.
//!
//! A store directory looks like this:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK        # Advisory lock for single-process access
//! └─ store.log   # Append-only log of committed batches
//! ```
//!
//! Each committed [`WriteBatch`] becomes one frame in `store.log`:
//!
//! ```text
//! magic "WRLG" (4) | version (2) | payload length (4) | CBOR payload | digest (8)
//! ```
//!
//! The digest is the first eight bytes of the SHA-256 of everything before
//! it. Opening the store replays every intact frame into an ordered map; the
//! first frame that is torn or fails its digest ends the log, and the file is
//! truncated there.

use crate::batch::{BatchOp, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::memory::{apply_ops, page_of};
use crate::range::KeyRange;
use crate::store::{KvPair, KvStore};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "store.log";
const COMPACT_FILE: &str = "store.log.compact";

/// Magic bytes identifying a log frame.
pub const LOG_MAGIC: [u8; 4] = *b"WRLG";

/// Current log frame version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
const HEADER_SIZE: usize = 10;
const DIGEST_SIZE: usize = 8;

/// Options for opening a [`FileStore`].
#[derive(Debug, Clone)]
pub struct FileStoreOptions {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to `fsync` the log after every batch (safer but slower).
    pub sync_on_write: bool,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
        }
    }
}

impl FileStoreOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the log on every batch.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }
}

/// The open log file and its committed length.
#[derive(Debug)]
struct LogFile {
    file: File,
    len: u64,
}

impl LogFile {
    /// Appends a frame. `len` moves only once the frame is fully written.
    fn append(&mut self, frame: &[u8], sync: bool) -> std::io::Result<()> {
        self.file.write_all(frame)?;
        if sync {
            self.file.sync_data()?;
        }
        self.len += frame.len() as u64;
        Ok(())
    }

    /// Cuts the file back to the last committed frame.
    fn rollback(&mut self) -> std::io::Result<()> {
        self.file.set_len(self.len)?;
        self.file.seek(SeekFrom::Start(self.len))?;
        Ok(())
    }
}

/// A durable ordered key-value store backed by an append-only log.
///
/// All keys live in memory; the log is the source of truth on disk. A batch
/// is acknowledged only after its frame has been appended (and synced, when
/// `sync_on_write` is set), so a crash never exposes part of a batch.
///
/// # Example
///
/// ```no_run
/// use wrangler_storage::{FileStore, KvStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("data")).unwrap();
/// store.put(b"key", b"value").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    options: FileStoreOptions,
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    log: Mutex<LogFile>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store directory with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, another process
    /// holds the lock, or the log cannot be read.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_options(path, FileStoreOptions::default())
    }

    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (`Locked`)
    /// - I/O errors occur while replaying the log
    pub fn open_with_options(path: &Path, options: FileStoreOptions) -> StorageResult<Self> {
        if !path.exists() {
            if options.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("store directory does not exist: {}", path.display()),
                )));
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOG_FILE))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let replay = replay_log(&bytes);

        if replay.valid_len < bytes.len() as u64 {
            tracing::warn!(
                path = %path.display(),
                valid = replay.valid_len,
                total = bytes.len(),
                "truncating torn tail of store log"
            );
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(replay.valid_len))?;

        tracing::debug!(
            path = %path.display(),
            frames = replay.frames,
            keys = replay.data.len(),
            "replayed store log"
        );

        Ok(Self {
            path: path.to_path_buf(),
            options,
            data: RwLock::new(replay.data),
            log: Mutex::new(LogFile {
                file,
                len: replay.valid_len,
            }),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current size of the log in bytes.
    #[must_use]
    pub fn log_size(&self) -> u64 {
        self.log.lock().len
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Rewrites the log as a single frame holding the live keys.
    ///
    /// Returns the new log size. Writers are blocked while compaction runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the compacted log cannot be written or swapped in.
    /// The old log stays in place in that case.
    pub fn compact(&self) -> StorageResult<u64> {
        let data = self.data.write();
        let mut log = self.log.lock();

        let mut snapshot = WriteBatch::new();
        for (key, value) in data.iter() {
            snapshot.put(key.clone(), value.clone());
        }
        let frame = if snapshot.is_empty() {
            Vec::new()
        } else {
            encode_frame(snapshot.ops())?
        };

        let compact_path = self.path.join(COMPACT_FILE);
        {
            let mut tmp = File::create(&compact_path)?;
            tmp.write_all(&frame)?;
            tmp.sync_all()?;
        }
        fs::rename(&compact_path, self.path.join(LOG_FILE))?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path.join(LOG_FILE))?;
        file.seek(SeekFrom::End(0))?;

        let before = log.len;
        *log = LogFile {
            file,
            len: frame.len() as u64,
        };
        tracing::debug!(before, after = log.len, "compacted store log");
        Ok(log.len)
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let frame = encode_frame(batch.ops())?;

        // Holding the map lock keeps log order identical to apply order
        let mut data = self.data.write();
        {
            let mut log = self.log.lock();
            if let Err(e) = log.append(&frame, self.options.sync_on_write) {
                if let Err(undo) = log.rollback() {
                    tracing::warn!(
                        path = %self.path.display(),
                        committed = log.len,
                        error = %undo,
                        "could not truncate partial frame; it will be dropped on replay"
                    );
                }
                return Err(e.into());
            }
        }
        apply_ops(&mut data, batch.into_ops());
        Ok(())
    }

    fn scan_page(
        &self,
        range: &KeyRange,
        after: Option<&[u8]>,
        limit: usize,
    ) -> StorageResult<Vec<KvPair>> {
        Ok(page_of(&self.data.read(), range, after, limit))
    }

    fn flush(&self) -> StorageResult<()> {
        let mut log = self.log.lock();
        log.file.flush()?;
        log.file.sync_all()?;
        Ok(())
    }
}

/// Encodes a batch into one log frame.
fn encode_frame(ops: &[BatchOp]) -> StorageResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(&ops, &mut payload).map_err(StorageError::codec)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StorageError::codec("batch payload exceeds 4 GiB"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + DIGEST_SIZE);
    frame.extend_from_slice(&LOG_MAGIC);
    frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let digest = frame_digest(&frame);
    frame.extend_from_slice(&digest);
    Ok(frame)
}

fn frame_digest(bytes: &[u8]) -> [u8; DIGEST_SIZE] {
    let hash = Sha256::digest(bytes);
    let mut digest = [0u8; DIGEST_SIZE];
    digest.copy_from_slice(&hash[..DIGEST_SIZE]);
    digest
}

/// Outcome of replaying a log.
struct Replay {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    valid_len: u64,
    frames: usize,
}

fn replay_log(bytes: &[u8]) -> Replay {
    let mut data = BTreeMap::new();
    let mut offset = 0usize;
    let mut frames = 0usize;

    while let Some((ops, frame_len)) = decode_frame(&bytes[offset..]) {
        apply_ops(&mut data, ops);
        offset += frame_len;
        frames += 1;
    }

    Replay {
        data,
        valid_len: offset as u64,
        frames,
    }
}

/// Decodes the frame at the start of `bytes`.
///
/// Returns `None` for a torn, foreign or corrupt frame.
fn decode_frame(bytes: &[u8]) -> Option<(Vec<BatchOp>, usize)> {
    if bytes.len() < HEADER_SIZE || bytes[..4] != LOG_MAGIC {
        return None;
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != LOG_VERSION {
        return None;
    }
    let len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let body_end = HEADER_SIZE.checked_add(len)?;
    let frame_len = body_end.checked_add(DIGEST_SIZE)?;
    if bytes.len() < frame_len {
        return None;
    }
    if frame_digest(&bytes[..body_end]) != bytes[body_end..frame_len] {
        return None;
    }
    let ops: Vec<BatchOp> = ciborium::from_reader(&bytes[HEADER_SIZE..body_end]).ok()?;
    Some((ops, frame_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rollback_cuts_partial_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        fs::write(&path, b"keptPARTIAL").unwrap();
        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let mut log = LogFile { file, len: 4 };

        log.rollback().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"kept");
    }

    #[test]
    fn rollback_reports_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        fs::write(&path, b"keptPARTIAL").unwrap();
        let file = File::open(&path).unwrap();
        let mut log = LogFile { file, len: 4 };

        assert!(log.append(b"frame", false).is_err());
        assert_eq!(log.len, 4);
        assert!(log.rollback().is_err());
    }

    #[test]
    fn file_persists_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put(b"a", b"1").unwrap();
            store.put(b"b", b"2").unwrap();
            store.delete(b"a").unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_lock_prevents_second_open() {
        let dir = tempdir().unwrap();
        let _store = FileStore::open(dir.path()).unwrap();

        let second = FileStore::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked)));
    }

    #[test]
    fn file_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(FileStore::open(dir.path()).unwrap());
        assert!(FileStore::open(dir.path()).is_ok());
    }

    #[test]
    fn file_missing_dir_without_create_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope");
        let options = FileStoreOptions::new().create_if_missing(false);
        assert!(FileStore::open_with_options(&path, options).is_err());
    }

    #[test]
    fn file_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let good_len = {
            let store = FileStore::open(dir.path()).unwrap();
            store.put(b"kept", b"1").unwrap();
            store.log_size()
        };

        // Simulate a crash in the middle of appending a second frame
        let frame = encode_frame(&[BatchOp::Put {
            key: b"lost".to_vec(),
            value: b"2".to_vec(),
        }])
        .unwrap();
        {
            let mut log = OpenOptions::new()
                .append(true)
                .open(dir.path().join(LOG_FILE))
                .unwrap();
            log.write_all(&frame[..frame.len() / 2]).unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"kept").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"lost").unwrap(), None);
        assert_eq!(store.log_size(), good_len);

        // New writes land after the truncation point and survive
        store.put(b"after", b"3").unwrap();
        drop(store);
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"after").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn file_corrupt_digest_ends_log() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put(b"a", b"1").unwrap();
        }
        let log_path = dir.path().join(LOG_FILE);
        let mut bytes = fs::read(&log_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&log_path, &bytes).unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.log_size(), 0);
    }

    #[test]
    fn file_compact_keeps_live_keys() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for i in 0..20u8 {
            store.put(b"counter", &[i]).unwrap();
        }
        store.put(b"other", b"x").unwrap();
        let before = store.log_size();

        let after = store.compact().unwrap();
        assert!(after < before);

        store.put(b"post", b"y").unwrap();
        drop(store);

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"counter").unwrap(), Some(vec![19]));
        assert_eq!(store.get(b"other").unwrap(), Some(b"x".to_vec()));
        assert_eq!(store.get(b"post").unwrap(), Some(b"y".to_vec()));
    }

    #[test]
    fn file_scan_matches_memory_semantics() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for k in ["p1", "p2", "q1"] {
            store.put(k.as_bytes(), b"").unwrap();
        }
        let page = store
            .scan_page(&KeyRange::prefix(b"p".to_vec()), None, 10)
            .unwrap();
        assert_eq!(page.len(), 2);
    }
}
