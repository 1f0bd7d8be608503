//! Durable store: an in-memory store made crash-safe by a write-ahead log.
//!
//! Every mutation is appended to the log before it is applied in memory. On
//! open, the log is replayed. Merge operands are logged as operands, so a
//! replayed store has the same unresolved operands the original had.

use super::memory::MemoryStore;
use super::{CompactionFilter, CompactionStats, KvStore, MergeOperator, MergeStore, Partition};
use crate::config::StoreConfig;
use crate::error::{Result, StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Magic bytes for the log file.
const LOG_MAGIC: &[u8; 4] = b"KLS\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

const HEADER_SIZE: u64 = 5;

const LOG_FILE: &str = "state.log";

/// Mutations recorded in the log.
#[derive(Clone, Debug, Serialize, Deserialize)]
enum LogOperation {
    CreatePartition {
        name: String,
        merge_operator: Option<MergeOperator>,
    },
    Put {
        partition: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Merge {
        partition: String,
        key: Vec<u8>,
        operand: Vec<u8>,
    },
    Delete {
        partition: String,
        key: Vec<u8>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct LogEntry {
    seq: u64,
    operation: LogOperation,
}

/// Result of reading one entry during replay.
enum ReadOutcome {
    Entry(LogEntry, u64),
    /// Clean end of file.
    End,
    /// The file ends partway through an entry.
    Short,
    /// A complete entry of `size` bytes that fails its checks.
    Damaged { size: u64, error: StorageError },
}

struct LogWriter {
    file: BufWriter<File>,
    next_seq: u64,
    writes_since_sync: u64,
}

/// Log-backed [`MergeStore`].
pub struct LogStore {
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    memory: MemoryStore,

    /// Serializes log appends with their in-memory application so log order
    /// matches apply order.
    writer: Mutex<LogWriter>,
}

impl LogStore {
    /// Open an existing store or create a new one, replaying the log.
    pub fn open(config: StoreConfig) -> StorageResult<Self> {
        config.validate()?;
        if !config.path.exists() {
            if !config.create_if_missing {
                return Err(StorageError::NotInitialized(
                    config.path.display().to_string(),
                ));
            }
            fs::create_dir_all(&config.path)?;
        }

        let lock_file = Self::acquire_lock(&config.path)?;
        let log_path = config.path.join(LOG_FILE);
        let memory = MemoryStore::new();

        let next_seq = if log_path.exists() {
            Self::replay(&log_path, &memory, config.max_entry_size)? + 1
        } else {
            Self::write_header(&log_path)?;
            1
        };

        let file = OpenOptions::new().append(true).open(&log_path)?;

        Ok(Self {
            config,
            _lock_file: lock_file,
            memory,
            writer: Mutex::new(LogWriter {
                file: BufWriter::new(file),
                next_seq,
                writes_since_sync: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// The in-memory view. Writes must go through the store, not here.
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Force all logged writes to disk.
    pub fn sync(&self) -> StorageResult<()> {
        let mut writer = self.writer.lock();
        writer.file.flush()?;
        writer.file.get_ref().sync_all()?;
        writer.writes_since_sync = 0;
        Ok(())
    }

    /// Rewrite the log as one `Put` per live key, dropping history.
    ///
    /// Pending merge operands are resolved in the rewritten log.
    pub fn checkpoint(&self) -> StorageResult<()> {
        let mut writer = self.writer.lock();
        writer.file.flush()?;

        let log_path = self.config.path.join(LOG_FILE);
        let tmp_path = self.config.path.join(format!("{}.tmp", LOG_FILE));
        Self::write_header(&tmp_path)?;

        let mut seq = 0;
        {
            let mut out = BufWriter::new(OpenOptions::new().append(true).open(&tmp_path)?);
            for name in self.memory.partition_names() {
                let partition = Partition::new(name.clone());
                seq += 1;
                self.write_entry(
                    &mut out,
                    &LogEntry {
                        seq,
                        operation: LogOperation::CreatePartition {
                            name: name.clone(),
                            merge_operator: self.memory.merge_operator(&partition),
                        },
                    },
                )?;
                for (key, value) in self.memory.scan(&partition)? {
                    seq += 1;
                    self.write_entry(
                        &mut out,
                        &LogEntry {
                            seq,
                            operation: LogOperation::Put {
                                partition: name.clone(),
                                key,
                                value,
                            },
                        },
                    )?;
                }
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, &log_path)?;
        writer.file = BufWriter::new(OpenOptions::new().append(true).open(&log_path)?);
        writer.next_seq = seq + 1;
        writer.writes_since_sync = 0;

        info!(path = %log_path.display(), entries = seq, "checkpointed state log");
        Ok(())
    }

    /// Size in bytes of the log file.
    pub fn log_size(&self) -> StorageResult<u64> {
        Ok(fs::metadata(self.config.path.join(LOG_FILE))?.len())
    }

    /// Log `operation`, then apply it in memory.
    ///
    /// `check` runs under the writer lock before anything is logged. It must
    /// reject every operation `apply` would reject, since replay treats a
    /// logged entry that fails to apply as corruption.
    fn log_then_apply(
        &self,
        operation: LogOperation,
        check: impl FnOnce(&MemoryStore) -> StorageResult<()>,
        apply: impl FnOnce(&MemoryStore) -> StorageResult<()>,
    ) -> StorageResult<()> {
        if self.memory.is_closed() {
            return Err(StorageError::Closed);
        }
        let mut writer = self.writer.lock();
        check(&self.memory)?;

        let entry = LogEntry {
            seq: writer.next_seq,
            operation,
        };
        self.write_entry(&mut writer.file, &entry)?;
        writer.next_seq += 1;

        writer.writes_since_sync += 1;
        if self.config.sync_interval == 0 || writer.writes_since_sync >= self.config.sync_interval
        {
            writer.file.flush()?;
            writer.file.get_ref().sync_all()?;
            writer.writes_since_sync = 0;
        }

        apply(&self.memory)
    }

    fn write_entry(&self, out: &mut impl Write, entry: &LogEntry) -> StorageResult<()> {
        let encoded = rmp_serde::to_vec(entry)?;
        let len = match u32::try_from(encoded.len()) {
            Ok(len) if encoded.len() <= self.config.max_entry_size => len,
            _ => {
                return Err(StorageError::Serialization(format!(
                    "log entry of {} bytes exceeds limit of {}",
                    encoded.len(),
                    self.config.max_entry_size
                )))
            }
        };

        out.write_all(&len.to_le_bytes())?;
        out.write_all(&encoded)?;
        out.write_all(&crc32fast::hash(&encoded).to_le_bytes())?;
        Ok(())
    }

    fn write_header(path: &Path) -> StorageResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(LOG_MAGIC)?;
        file.write_all(&[LOG_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    /// Replay the log into `memory`, returning the highest sequence seen.
    ///
    /// A torn tail is truncated away: an entry cut short by the end of file,
    /// or a damaged entry with nothing after it. A damaged entry followed by
    /// more data is corruption and leaves the file as it is.
    fn replay(path: &Path, memory: &MemoryStore, max_entry_size: usize) -> StorageResult<u64> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != LOG_MAGIC {
            return Err(StorageError::InvalidFormat("Invalid log magic".into()));
        }
        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != LOG_VERSION {
            return Err(StorageError::InvalidFormat(format!(
                "Unsupported log version: {}",
                version[0]
            )));
        }

        let mut max_seq = 0;
        let mut entries = 0u64;
        let mut good_offset = HEADER_SIZE;
        loop {
            match Self::read_entry(&mut reader, max_entry_size)? {
                ReadOutcome::Entry(entry, size) => {
                    Self::apply(memory, entry.operation)?;
                    max_seq = max_seq.max(entry.seq);
                    entries += 1;
                    good_offset += size;
                }
                ReadOutcome::End => break,
                ReadOutcome::Short => {
                    Self::truncate_tail(path, good_offset, file_len, "entry cut short")?;
                    break;
                }
                ReadOutcome::Damaged { size, error } => {
                    if good_offset + size < file_len {
                        return Err(StorageError::Corruption(format!(
                            "damaged log entry at offset {} with {} bytes after it: {}",
                            good_offset,
                            file_len - good_offset - size,
                            error
                        )));
                    }
                    Self::truncate_tail(path, good_offset, file_len, &error.to_string())?;
                    break;
                }
            }
        }

        debug!(path = %path.display(), entries, max_seq, "replayed state log");
        Ok(max_seq)
    }

    fn truncate_tail(path: &Path, good_offset: u64, file_len: u64, reason: &str) -> StorageResult<()> {
        warn!(
            path = %path.display(),
            offset = good_offset,
            discarded = file_len - good_offset,
            reason,
            "discarding torn log tail"
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(good_offset)?;
        file.sync_all()?;
        Ok(())
    }

    /// Read one entry. I/O errors other than end of file are returned as is.
    fn read_entry(reader: &mut impl Read, max_entry_size: usize) -> StorageResult<ReadOutcome> {
        let mut len_bytes = [0u8; 4];
        match read_up_to(reader, &mut len_bytes)? {
            0 => return Ok(ReadOutcome::End),
            4 => {}
            _ => return Ok(ReadOutcome::Short),
        }
        let len = u32::from_le_bytes(len_bytes) as u64;
        let size = 4 + len + 4;
        if len > max_entry_size as u64 {
            return Ok(ReadOutcome::Damaged {
                size,
                error: StorageError::Corruption(format!(
                    "log entry of {} bytes exceeds limit of {}",
                    len, max_entry_size
                )),
            });
        }

        let mut encoded = vec![0u8; len as usize];
        if read_up_to(reader, &mut encoded)? < encoded.len() {
            return Ok(ReadOutcome::Short);
        }
        let mut checksum_bytes = [0u8; 4];
        if read_up_to(reader, &mut checksum_bytes)? < checksum_bytes.len() {
            return Ok(ReadOutcome::Short);
        }

        let expected = u32::from_le_bytes(checksum_bytes);
        let got = crc32fast::hash(&encoded);
        if expected != got {
            return Ok(ReadOutcome::Damaged {
                size,
                error: StorageError::ChecksumMismatch { expected, got },
            });
        }

        Ok(match rmp_serde::from_slice(&encoded) {
            Ok(entry) => ReadOutcome::Entry(entry, size),
            Err(e) => ReadOutcome::Damaged {
                size,
                error: e.into(),
            },
        })
    }

    fn apply(memory: &MemoryStore, operation: LogOperation) -> StorageResult<()> {
        let result = match operation {
            LogOperation::CreatePartition {
                name,
                merge_operator,
            } => memory.create_partition(&Partition::new(name), merge_operator),
            LogOperation::Put {
                partition,
                key,
                value,
            } => memory.put(&Partition::new(partition), &key, &value),
            LogOperation::Merge {
                partition,
                key,
                operand,
            } => memory.merge(&Partition::new(partition), &key, &operand),
            LogOperation::Delete { partition, key } => {
                memory.delete(&Partition::new(partition), &key)
            }
        };
        result.map_err(|e| StorageError::Corruption(format!("log replay failed: {}", e)))
    }

    fn acquire_lock(path: &Path) -> StorageResult<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StorageError::Locked)?;

        Ok(lock_file)
    }
}

/// Fill as much of `buf` as the reader has, returning the byte count.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Rejects writes to a partition that does not exist.
fn require_partition(memory: &MemoryStore, partition: &Partition) -> StorageResult<()> {
    if memory.has_partition(partition) {
        Ok(())
    } else {
        Err(StorageError::PartitionNotFound(partition.name().to_string()))
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

impl KvStore for LogStore {
    fn create_partition(
        &self,
        partition: &Partition,
        merge_operator: Option<MergeOperator>,
    ) -> StorageResult<()> {
        self.log_then_apply(
            LogOperation::CreatePartition {
                name: partition.name().to_string(),
                merge_operator,
            },
            |m| {
                if m.has_partition(partition) {
                    return Err(StorageError::PartitionExists(partition.name().to_string()));
                }
                Ok(())
            },
            |m| m.create_partition(partition, merge_operator),
        )
    }

    fn has_partition(&self, partition: &Partition) -> bool {
        self.memory.has_partition(partition)
    }

    fn get(&self, partition: &Partition, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.memory.get(partition, key)
    }

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.log_then_apply(
            LogOperation::Put {
                partition: partition.name().to_string(),
                key: key.to_vec(),
                value: value.to_vec(),
            },
            |m| require_partition(m, partition),
            |m| m.put(partition, key, value),
        )
    }

    fn delete(&self, partition: &Partition, key: &[u8]) -> StorageResult<()> {
        self.log_then_apply(
            LogOperation::Delete {
                partition: partition.name().to_string(),
                key: key.to_vec(),
            },
            |m| require_partition(m, partition),
            |m| m.delete(partition, key),
        )
    }

    fn scan(&self, partition: &Partition) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.memory.scan(partition)
    }
}

impl MergeStore for LogStore {
    fn merge(&self, partition: &Partition, key: &[u8], operand: &[u8]) -> StorageResult<()> {
        self.log_then_apply(
            LogOperation::Merge {
                partition: partition.name().to_string(),
                key: key.to_vec(),
                operand: operand.to_vec(),
            },
            |m| {
                require_partition(m, partition)?;
                if m.merge_operator(partition).is_none() {
                    return Err(StorageError::MergeNotSupported(partition.name().to_string()));
                }
                Ok(())
            },
            |m| m.merge(partition, key, operand),
        )
    }

    /// Compact in memory, then checkpoint so the result survives restart.
    fn compact(
        &self,
        partition: &Partition,
        filter: Option<&dyn CompactionFilter>,
    ) -> Result<CompactionStats> {
        let stats = self.memory.compact(partition, filter)?;
        if stats.keys_removed + stats.keys_rewritten + stats.operands_folded > 0 {
            self.checkpoint()?;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn list_partition() -> Partition {
        Partition::new("list")
    }

    fn open(dir: &TempDir) -> LogStore {
        LogStore::open(StoreConfig {
            path: dir.path().join("store"),
            sync_interval: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_replay_restores_values_and_operands() {
        let dir = TempDir::new().unwrap();
        let p = list_partition();
        {
            let store = open(&dir);
            store
                .create_partition(&p, Some(MergeOperator::string_append(b',')))
                .unwrap();
            store.put(&p, b"a", b"1").unwrap();
            store.merge(&p, b"a", b"2").unwrap();
            store.merge(&p, b"b", b"x").unwrap();
            store.delete(&p, b"b").unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.get(&p, b"a").unwrap(), Some(b"1,2".to_vec()));
        assert_eq!(store.get(&p, b"b").unwrap(), None);
        assert_eq!(store.memory().pending_operands(&p, b"a"), 1);
    }

    #[test]
    fn test_exclusive_lock() {
        let dir = TempDir::new().unwrap();
        let _store = open(&dir);
        let second = LogStore::open(StoreConfig::at(dir.path().join("store")));
        assert!(matches!(second, Err(StorageError::Locked)));
    }

    #[test]
    fn test_missing_store_without_create() {
        let dir = TempDir::new().unwrap();
        let result = LogStore::open(StoreConfig {
            path: dir.path().join("absent"),
            create_if_missing: false,
            ..Default::default()
        });
        assert!(matches!(result, Err(StorageError::NotInitialized(_))));
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let p = list_partition();
        {
            let store = open(&dir);
            store
                .create_partition(&p, Some(MergeOperator::string_append(b',')))
                .unwrap();
            store.put(&p, b"a", b"1").unwrap();
        }

        let log_path = dir.path().join("store").join(LOG_FILE);
        {
            let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
            // Length prefix promising more bytes than follow.
            file.write_all(&100u32.to_le_bytes()).unwrap();
            file.write_all(b"partial").unwrap();
        }
        let torn_len = fs::metadata(&log_path).unwrap().len();

        let store = open(&dir);
        assert_eq!(store.get(&p, b"a").unwrap(), Some(b"1".to_vec()));
        assert!(store.log_size().unwrap() < torn_len);

        // Still writable after recovery.
        store.merge(&p, b"a", b"2").unwrap();
        assert_eq!(store.get(&p, b"a").unwrap(), Some(b"1,2".to_vec()));
    }

    #[test]
    fn test_invalid_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(LOG_FILE), b"NOPE\x01").unwrap();

        let result = LogStore::open(StoreConfig::at(&path));
        assert!(matches!(result, Err(StorageError::InvalidFormat(_))));
    }

    #[test]
    fn test_compaction_checkpoints() {
        let dir = TempDir::new().unwrap();
        let p = list_partition();
        {
            let store = open(&dir);
            store
                .create_partition(&p, Some(MergeOperator::string_append(b',')))
                .unwrap();
            for i in 0..20u8 {
                store.merge(&p, b"k", &[b'a' + i]).unwrap();
            }
            let before = store.log_size().unwrap();
            let stats = store.compact(&p, None).unwrap();
            assert_eq!(stats.operands_folded, 20);
            assert!(store.log_size().unwrap() < before);
        }

        let store = open(&dir);
        assert_eq!(store.memory().pending_operands(&p, b"k"), 0);
        let value = store.get(&p, b"k").unwrap().unwrap();
        assert_eq!(value.len(), 20 + 19);
    }

    #[test]
    fn test_write_to_unknown_partition_not_logged() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let size = store.log_size().unwrap();

        let err = store.put(&Partition::new("nope"), b"k", b"v").unwrap_err();
        assert!(matches!(err, StorageError::PartitionNotFound(_)));
        assert_eq!(store.log_size().unwrap(), size);
    }

    #[test]
    fn test_concurrent_create_partition_stays_replayable() {
        let dir = TempDir::new().unwrap();
        for round in 0..100 {
            let store = Arc::new(open(&dir));
            let p = Partition::new(format!("p{}", round));
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    let p = p.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        store.create_partition(&p, Some(MergeOperator::string_append(b',')))
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(StorageError::PartitionExists(_)))));
            // Reopened at the top of the next round.
        }

        let store = open(&dir);
        assert_eq!(store.memory().partition_names().len(), 100);
    }

    #[test]
    fn test_rejected_merge_not_logged() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let plain = Partition::new("plain");
        store.create_partition(&plain, None).unwrap();
        let size = store.log_size().unwrap();

        let err = store.merge(&plain, b"k", b"v").unwrap_err();
        assert!(matches!(err, StorageError::MergeNotSupported(_)));
        let err = store.merge(&Partition::new("nope"), b"k", b"v").unwrap_err();
        assert!(matches!(err, StorageError::PartitionNotFound(_)));
        assert_eq!(store.log_size().unwrap(), size);
    }

    /// Offsets of each entry in the log, after the header.
    fn entry_offsets(log: &[u8]) -> Vec<usize> {
        let mut offsets = Vec::new();
        let mut at = HEADER_SIZE as usize;
        while at < log.len() {
            offsets.push(at);
            let len = u32::from_le_bytes(log[at..at + 4].try_into().unwrap()) as usize;
            at += 4 + len + 4;
        }
        offsets
    }

    fn write_three_entries(dir: &TempDir) -> std::path::PathBuf {
        let p = list_partition();
        let store = open(dir);
        store
            .create_partition(&p, Some(MergeOperator::string_append(b',')))
            .unwrap();
        store.put(&p, b"a", b"1").unwrap();
        store.put(&p, b"b", b"2").unwrap();
        dir.path().join("store").join(LOG_FILE)
    }

    #[test]
    fn test_damaged_entry_before_more_data_is_corruption() {
        let dir = TempDir::new().unwrap();
        let log_path = write_three_entries(&dir);

        let mut log = fs::read(&log_path).unwrap();
        let offsets = entry_offsets(&log);
        assert_eq!(offsets.len(), 3);
        log[offsets[1] + 4] ^= 0xff;
        fs::write(&log_path, &log).unwrap();

        let result = LogStore::open(StoreConfig::at(dir.path().join("store")));
        assert!(matches!(result, Err(StorageError::Corruption(_))));
        // Nothing was cut away.
        assert_eq!(fs::read(&log_path).unwrap(), log);
    }

    #[test]
    fn test_damaged_final_entry_is_truncated() {
        let dir = TempDir::new().unwrap();
        let log_path = write_three_entries(&dir);

        let mut log = fs::read(&log_path).unwrap();
        let last = *entry_offsets(&log).last().unwrap();
        let end = log.len();
        log[end - 1] ^= 0xff;
        fs::write(&log_path, &log).unwrap();

        let store = open(&dir);
        let p = list_partition();
        assert_eq!(store.get(&p, b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(&p, b"b").unwrap(), None);
        assert_eq!(store.log_size().unwrap(), last as u64);
    }

    #[test]
    fn test_partial_length_prefix_is_truncated() {
        let dir = TempDir::new().unwrap();
        let log_path = write_three_entries(&dir);
        let clean_len = fs::metadata(&log_path).unwrap().len();

        {
            let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
            file.write_all(&[7, 0]).unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.log_size().unwrap(), clean_len);
        assert_eq!(store.get(&list_partition(), b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_oversized_entry_rejected_before_logging() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(StoreConfig {
            path: dir.path().join("store"),
            sync_interval: 1,
            max_entry_size: 64,
            ..Default::default()
        })
        .unwrap();
        let p = list_partition();
        store.create_partition(&p, None).unwrap();
        let size = store.log_size().unwrap();

        let err = store.put(&p, b"k", &[0u8; 128]).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
        assert_eq!(store.log_size().unwrap(), size);
        assert_eq!(store.get(&p, b"k").unwrap(), None);

        store.put(&p, b"k", b"small").unwrap();
        assert_eq!(store.get(&p, b"k").unwrap(), Some(b"small".to_vec()));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_entry_limit_above_length_field_rejected() {
        let dir = TempDir::new().unwrap();
        let result = LogStore::open(StoreConfig {
            path: dir.path().join("store"),
            max_entry_size: u32::MAX as usize + 1,
            ..Default::default()
        });
        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
    }
}
